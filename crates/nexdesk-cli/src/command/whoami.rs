//! `nexdesk whoami`

use nexdesk_identity::ProfileRepository;

use super::{CommandContext, describe_snapshot};
use crate::TRACING_TARGET_COMMAND;

pub(super) async fn run(context: &CommandContext<'_>) -> anyhow::Result<()> {
    let snapshot = context.manager.snapshot();
    println!("{}", describe_snapshot(&snapshot));

    let Some(session) = snapshot.session else {
        return Ok(());
    };

    if let Some(expires_at) = session.expires_at {
        println!("Session expires at {expires_at}");
    }

    match context.profiles.find_profile(session.identity.id).await {
        Ok(Some(profile)) => {
            if let Some(name) = profile.display_name() {
                println!("Name: {name}");
            }
            if let Some(username) = &profile.username {
                println!("Username: {username}");
            }
        }
        Ok(None) => println!("No profile yet"),
        Err(error) => {
            tracing::warn!(
                target: TRACING_TARGET_COMMAND,
                error = %error,
                "Profile lookup failed"
            );
            println!("Profile unavailable: {}", error.describe());
        }
    }

    Ok(())
}
