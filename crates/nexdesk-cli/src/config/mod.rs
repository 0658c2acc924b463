//! Command line arguments.
//!
//! ```text
//! Cli
//! ├── backend: BackendConfig   # project URL, key, timeouts, session file
//! ├── log_format: LogFormat    # text or json
//! └── command: Command         # sign-in, sign-up, github, ...
//! ```
//!
//! Every backend flag also reads from an environment variable, see `--help`.

use std::process;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use nexdesk_reqwest::BackendConfig;
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Parsed command line.
#[derive(Debug, Clone, Parser)]
#[command(name = "nexdesk")]
#[command(about = "Sign in to nexdesk from the command line")]
#[command(version)]
pub struct Cli {
    /// Backend connection configuration.
    #[clap(flatten)]
    pub backend: BackendConfig,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Reads `.env` when built with `dotenv`, then parses the arguments.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    /// Imports `.env` into the process environment.
    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    /// Does nothing without the `dotenv` feature.
    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Checks the backend settings before any request is made.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.backend
            .validate()
            .context("invalid backend configuration")?;
        Ok(())
    }

    /// Logs the effective settings. The project key is never logged.
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            features = ?Self::enabled_features(),
            "Build information"
        );

        tracing::debug!(
            target: TRACING_TARGET_CONFIG,
            backend_url = %self.backend.backend_url,
            http_timeout_secs = self.backend.effective_timeout().as_secs(),
            session_file = ?self.backend.session_file,
            federated_provider = %self.backend.federated_provider,
            command = self.command.name(),
            "Configuration"
        );
    }

    /// Cargo features this binary was built with.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: [&str; 5] = [
        "nexdesk",
        "--backend-url",
        "https://project.example.com",
        "--backend-anon-key",
        "anon",
    ];

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(BASE.iter().chain(args)).unwrap()
    }

    #[test]
    fn test_parse_sign_in() {
        let cli = parse(&["sign-in", "--email", "a@b.com", "--password", "secret1"]);
        assert!(cli.validate().is_ok());
        assert_eq!(cli.command.name(), "sign-in");
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_parse_defaults() {
        let cli = parse(&["whoami"]);
        assert_eq!(cli.backend.federated_provider, "github");
        assert_eq!(cli.backend.http_timeout, 30);
    }

    #[test]
    fn test_parse_github_callback() {
        let cli = parse(&[
            "github",
            "--callback-url",
            "http://localhost:3000/#access_token=abc",
        ]);
        assert_eq!(cli.command.name(), "github");
    }

    #[test]
    fn test_missing_command_is_rejected() {
        assert!(Cli::try_parse_from(BASE).is_err());
    }

    #[test]
    fn test_json_log_format() {
        let cli = parse(&["--log-format", "json", "watch"]);
        assert_eq!(cli.log_format, LogFormat::Json);
    }
}
