//! `nexdesk github`

use clap::Args;
use nexdesk_identity::FederatedSignIn;
use url::Url;

use super::{CommandContext, user_error};

#[derive(Debug, Clone, Args)]
pub struct FederatedArgs {
    /// URL the browser landed on after the provider redirected back
    #[arg(long)]
    pub callback_url: Option<Url>,

    /// Provider to use instead of the configured one
    #[arg(long)]
    pub provider: Option<String>,
}

pub(super) async fn run(args: FederatedArgs, context: &CommandContext<'_>) -> anyhow::Result<()> {
    if let Some(callback_url) = args.callback_url {
        let previous = context.current_session();
        context
            .manager
            .complete_federated_sign_in(&callback_url)
            .await
            .map_err(user_error)?;

        let identity = context.finish_sign_in(previous).await?;
        println!(
            "Signed in as {}",
            identity.email.as_deref().unwrap_or("unknown email")
        );
        return Ok(());
    }

    let provider = args
        .provider
        .unwrap_or_else(|| context.config.federated_provider.clone());
    let redirect = context
        .manager
        .sign_in_with_federated(&FederatedSignIn::new(provider))
        .await
        .map_err(user_error)?;

    println!("Open this URL in a browser to continue:\n\n  {}\n", redirect.url);
    println!("Then run `nexdesk github --callback-url '<url you were sent back to>'`.");
    Ok(())
}
