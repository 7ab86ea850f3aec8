//! CLI command definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// toolgate - route natural-language requests to tool providers through a local model
#[derive(Parser, Debug)]
#[command(name = "toolgate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the gateway: definition cache, model bridge and tool router
    Gateway,

    /// Run a tool provider server
    Provider {
        #[arg(value_enum)]
        kind: ProviderKind,
    },

    /// Ask the gateway a question; starts an interactive prompt when none is given
    Ask {
        prompt: Option<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Datetime,
    Sqlite,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_gateway() {
        let cli = Cli::try_parse_from(["toolgate", "gateway"]).unwrap();
        assert!(matches!(cli.command, Commands::Gateway));
        assert!(!cli.is_verbose());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["toolgate", "gateway", "-v", "-c", "/etc/toolgate.yml"]).unwrap();
        assert!(cli.is_verbose());
        assert_eq!(cli.config, Some(PathBuf::from("/etc/toolgate.yml")));
    }

    #[test]
    fn test_cli_provider_kinds() {
        let cli = Cli::try_parse_from(["toolgate", "provider", "sqlite"]).unwrap();
        assert!(matches!(cli.command, Commands::Provider { kind: ProviderKind::Sqlite }));

        let cli = Cli::try_parse_from(["toolgate", "provider", "datetime"]).unwrap();
        assert!(matches!(cli.command, Commands::Provider { kind: ProviderKind::Datetime }));

        assert!(Cli::try_parse_from(["toolgate", "provider", "weather"]).is_err());
    }

    #[test]
    fn test_cli_ask() {
        let cli = Cli::try_parse_from(["toolgate", "ask", "How many days until Christmas?"]).unwrap();
        match cli.command {
            Commands::Ask { prompt } => assert_eq!(prompt.as_deref(), Some("How many days until Christmas?")),
            _ => panic!("Expected ask command"),
        }

        let cli = Cli::try_parse_from(["toolgate", "ask"]).unwrap();
        assert!(matches!(cli.command, Commands::Ask { prompt: None }));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["toolgate"]).is_err());
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}
