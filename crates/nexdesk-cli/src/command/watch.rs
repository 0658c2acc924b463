//! `nexdesk watch`

use super::interrupt::interrupted;
use super::{CommandContext, describe_snapshot};

pub(super) async fn run(context: &CommandContext<'_>) -> anyhow::Result<()> {
    let mut reader = context.manager.reader();
    println!("{}", describe_snapshot(&reader.snapshot()));

    let interrupt = interrupted();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            signal = &mut interrupt => {
                eprintln!("Stopped by {}", signal.as_str());
                break;
            }
            changed = reader.changed() => match changed {
                Some(snapshot) => println!("{}", describe_snapshot(&snapshot)),
                None => break,
            },
        }
    }

    Ok(())
}
