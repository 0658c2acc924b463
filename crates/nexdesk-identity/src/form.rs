//! Client-side checks for the sign-in and sign-up forms.
//!
//! These run before anything is sent to the provider. The provider still
//! has the last word: a form that passes here can be rejected remotely.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::types::{Credentials, IdentityMetadata, SignUpRequest};
use crate::{AuthError, Result};

/// Email and password sign-in form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignInForm {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

impl SignInForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into().trim().to_owned(),
            password: password.into(),
        }
    }

    /// Checks the form and returns the credentials to send.
    pub fn into_credentials(self) -> Result<Credentials> {
        self.validate_form()?;
        Ok(Credentials::new(self.email, self.password))
    }

    /// Checks the form.
    pub fn validate_form(&self) -> Result<()> {
        self.validate().map_err(into_auth_error)
    }
}

/// Registration form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignUpForm {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
}

impl SignUpForm {
    /// Checks the form.
    pub fn validate_form(&self) -> Result<()> {
        self.validate().map_err(into_auth_error)
    }

    /// Checks the form and builds the sign-up request, with the names
    /// carried as identity metadata.
    pub fn into_request(self) -> Result<SignUpRequest> {
        self.validate_form()?;

        let metadata = IdentityMetadata::default()
            .with_first_name(self.first_name.trim())
            .with_last_name(self.last_name.trim())
            .with_username(self.username.trim());

        Ok(SignUpRequest::new(self.email.trim(), self.password).with_metadata(metadata))
    }
}

fn into_auth_error(errors: ValidationErrors) -> AuthError {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| match &error.message {
                Some(message) => message.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .collect();
    messages.sort();

    AuthError::invalid_input(messages.join("; ")).with_source(errors)
}
