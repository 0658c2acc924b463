//! `nexdesk sign-out`

use super::{CommandContext, user_error};

pub(super) async fn run(context: &CommandContext<'_>) -> anyhow::Result<()> {
    if !context.manager.snapshot().is_authenticated() {
        println!("Not signed in");
        return Ok(());
    }

    context.manager.sign_out().await.map_err(user_error)?;
    println!("Signed out");
    Ok(())
}
