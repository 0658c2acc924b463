//! Ctrl+C and SIGTERM for `nexdesk watch`.

use crate::TRACING_TARGET_SHUTDOWN;

/// Signal that ended a long-running command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Interrupt {
    CtrlC,
    Terminate,
}

impl Interrupt {
    pub(super) const fn as_str(self) -> &'static str {
        match self {
            Self::CtrlC => "ctrl-c",
            Self::Terminate => "sigterm",
        }
    }
}

/// Resolves with the first interrupt. A handler that cannot be installed
/// never fires.
pub(super) async fn interrupted() -> Interrupt {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Interrupt::CtrlC,
            Err(error) => unavailable(Interrupt::CtrlC, error).await,
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                Interrupt::Terminate
            }
            Err(error) => unavailable(Interrupt::Terminate, error).await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Interrupt>();

    let interrupt = tokio::select! {
        interrupt = ctrl_c => interrupt,
        interrupt = terminate => interrupt,
    };

    tracing::debug!(
        target: TRACING_TARGET_SHUTDOWN,
        signal = interrupt.as_str(),
        "Interrupted"
    );
    interrupt
}

async fn unavailable(interrupt: Interrupt, error: std::io::Error) -> Interrupt {
    tracing::warn!(
        target: TRACING_TARGET_SHUTDOWN,
        signal = interrupt.as_str(),
        error = %error,
        "Signal handler unavailable"
    );
    std::future::pending().await
}
