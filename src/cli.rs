//! Command-line interface

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// IIIF Auth 1.0 access cookie and access token broker
#[derive(Parser, Debug)]
#[command(name = "hauth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "HAUTH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "HAUTH_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "HAUTH_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "HAUTH_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "HAUTH_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the broker (default)
    Serve,

    /// Load the configuration, build every component and print a summary
    CheckConfig,

    /// Report whether an address is on the campus network
    Classify {
        /// Client IP address
        #[arg(required = true)]
        ip: IpAddr,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_to_serve() {
        let cli = Cli::try_parse_from(["hauth", "--port", "9000"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.port, Some(9000));
    }

    #[test]
    fn test_classify_parses_address() {
        let cli = Cli::try_parse_from(["hauth", "classify", "192.168.0.1"]).unwrap();
        match cli.command {
            Some(Command::Classify { ip }) => assert_eq!(ip, "192.168.0.1".parse::<IpAddr>().unwrap()),
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Cli::try_parse_from(["hauth", "classify", "not-an-ip"]).is_err());
    }
}
