#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod command;
mod config;
mod telemetry;

use std::process;

use anyhow::Context;
use nexdesk_identity::SessionManager;
use nexdesk_reqwest::{BackendClient, ReqwestAuthClient, ReqwestProfileRepository};

use crate::command::CommandContext;
use crate::config::Cli;

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "nexdesk_cli::startup";
pub const TRACING_TARGET_SHUTDOWN: &str = "nexdesk_cli::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "nexdesk_cli::config";
pub const TRACING_TARGET_COMMAND: &str = "nexdesk_cli::command";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = %error,
            "command failed"
        );
    }
    eprintln!("Error: {error:#}");

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    telemetry::init_tracing(cli.log_format)?;
    cli.log();
    cli.validate()?;

    let backend =
        BackendClient::new(cli.backend.clone()).context("failed to create backend client")?;
    let auth = ReqwestAuthClient::new(backend.clone());
    let profiles = ReqwestProfileRepository::new(backend).with_auth(auth.clone());

    let manager = SessionManager::start(auth, profiles.clone());
    let mut reader = manager.reader();
    let snapshot = reader.wait_until_ready().await;
    tracing::debug!(
        target: TRACING_TARGET_STARTUP,
        state = %snapshot.state,
        "Session restored"
    );

    let context = CommandContext::new(&manager, &profiles, &cli.backend);
    let result = cli.command.execute(&context).await;

    manager.shutdown().await;
    tracing::debug!(target: TRACING_TARGET_SHUTDOWN, "Session manager stopped");

    result
}
