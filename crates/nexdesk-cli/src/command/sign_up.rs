//! `nexdesk sign-up`

use clap::Args;
use nexdesk_identity::{SignUpForm, SignUpOutcome};

use super::{CommandContext, user_error};

#[derive(Debug, Clone, Args)]
pub struct SignUpArgs {
    /// Account email address
    #[arg(long, env = "NEXDESK_EMAIL")]
    pub email: String,

    /// Password, at least 6 characters
    #[arg(long, env = "NEXDESK_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Password again
    #[arg(long)]
    pub confirm_password: String,

    #[arg(long)]
    pub first_name: String,

    #[arg(long)]
    pub last_name: String,

    #[arg(long)]
    pub username: String,
}

impl From<SignUpArgs> for SignUpForm {
    fn from(args: SignUpArgs) -> Self {
        Self {
            email: args.email,
            password: args.password,
            confirm_password: args.confirm_password,
            first_name: args.first_name,
            last_name: args.last_name,
            username: args.username,
        }
    }
}

pub(super) async fn run(args: SignUpArgs, context: &CommandContext<'_>) -> anyhow::Result<()> {
    let request = SignUpForm::from(args).into_request().map_err(user_error)?;
    let credentials = &request.credentials;

    let previous = context.current_session();
    let outcome = context
        .manager
        .sign_up(&credentials.email, &credentials.password, request.metadata.clone())
        .await
        .map_err(user_error)?;

    match outcome {
        SignUpOutcome::ConfirmationRequired => {
            println!("Account created. Check your email to confirm it, then sign in.");
        }
        SignUpOutcome::SignedIn => {
            let identity = context.finish_sign_in(previous).await?;
            println!(
                "Account created, signed in as {}",
                identity.email.as_deref().unwrap_or("unknown email")
            );
        }
    }

    Ok(())
}
