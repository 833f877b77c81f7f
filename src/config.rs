//! CLI configuration via clap.

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};

use crate::transport::Endpoints;

#[derive(Parser, Debug, Clone)]
#[command(name = "account-lookup")]
#[command(about = "Validates bank accounts exactly, or searches wildcard patterns as a live stream")]
pub struct Config {
    /// Validation service host
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Validation service port
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Use https/wss instead of http/ws
    #[arg(long)]
    pub secure: bool,

    /// Running inside the Android emulator: reach the host's loopback via 10.0.2.2
    #[arg(long, env = "ACCOUNT_LOOKUP_EMULATOR", value_parser = BoolishValueParser::new())]
    pub emulator: bool,

    /// Bank directory: JSON object of bank code -> bank name
    #[arg(short, long, env = "ACCOUNT_LOOKUP_BANKS", default_value = "banks.json")]
    pub banks: PathBuf,

    /// Serve /health and /metrics on this port while running
    #[arg(long)]
    pub metrics_port: Option<u16>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Look up one account number or pattern (use `*` for unknown digits)
    Lookup {
        /// Account number, e.g. 0123456789 or 09034*7364
        #[arg(short, long)]
        account: String,

        /// Bank code from the directory (see the `banks` subcommand)
        #[arg(short = 'c', long)]
        bank: Option<String>,

        /// Account holder name to match
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List banks whose name contains FILTER
    Banks {
        filter: Option<String>,
    },

    /// Read `<account> <bank_code> [name...]` lines from stdin; each line
    /// replaces the search still in flight
    Interactive,
}

impl Config {
    #[must_use]
    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(&self.host, self.port, self.secure, self.emulator)
    }
}
