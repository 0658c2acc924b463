//! `nexdesk sign-in`

use clap::Args;
use nexdesk_identity::SignInForm;

use super::{CommandContext, user_error};

#[derive(Debug, Clone, Args)]
pub struct SignInArgs {
    /// Account email address
    #[arg(long, env = "NEXDESK_EMAIL")]
    pub email: String,

    /// Account password
    #[arg(long, env = "NEXDESK_PASSWORD", hide_env_values = true)]
    pub password: String,
}

pub(super) async fn run(args: SignInArgs, context: &CommandContext<'_>) -> anyhow::Result<()> {
    let credentials = SignInForm::new(args.email, args.password)
        .into_credentials()
        .map_err(user_error)?;

    let previous = context.current_session();
    context
        .manager
        .sign_in(&credentials.email, &credentials.password)
        .await
        .map_err(user_error)?;

    let identity = context.finish_sign_in(previous).await?;
    println!(
        "Signed in as {}",
        identity.email.as_deref().unwrap_or("unknown email")
    );
    Ok(())
}
