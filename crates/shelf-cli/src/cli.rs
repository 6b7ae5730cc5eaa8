use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "shelf",
    about = "Shelf: namespaced, quota-aware key-value storage",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (TOML). Missing file means defaults.
    #[arg(short, long, global = true, default_value = "shelf.toml")]
    pub config: PathBuf,

    /// Override the configured namespace prefix.
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a JSON value under a key
    Set(SetArgs),
    /// Read the value under a key
    Get(GetArgs),
    /// Remove a key
    Remove(KeyArgs),
    /// Remove every key in the namespace
    Clear,
    /// List keys in the namespace
    Keys,
    /// Show storage size of the whole backend and of the namespace
    Size,
    /// Store a JSON value only if it fits under the quota
    Put(SetArgs),
    /// Show quota usage
    Usage,
    /// Evict oldest quota-tracked entries until under quota
    Cleanup,
    /// Print the effective configuration
    ShowConfig,
}

#[derive(Args)]
pub struct SetArgs {
    pub key: String,
    /// Value as JSON text, e.g. '{"name":"a"}' or '"plain string"'
    pub value: String,
}

#[derive(Args)]
pub struct GetArgs {
    pub key: String,
    /// JSON value to print when the key is missing or unreadable
    #[arg(short, long)]
    pub default: Option<String>,
}

#[derive(Args)]
pub struct KeyArgs {
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_set() {
        let cli = Cli::parse_from(["shelf", "set", "user", r#"{"name":"a"}"#]);
        match cli.command {
            Command::Set(args) => {
                assert_eq!(args.key, "user");
                assert_eq!(args.value, r#"{"name":"a"}"#);
            }
            _ => panic!("expected set"),
        }
        assert_eq!(cli.config, PathBuf::from("shelf.toml"));
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["shelf", "keys", "--namespace", "b_", "--format", "json"]);
        assert!(matches!(cli.command, Command::Keys));
        assert_eq!(cli.namespace.as_deref(), Some("b_"));
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn get_with_default() {
        let cli = Cli::parse_from(["shelf", "get", "missing", "--default", "[]"]);
        match cli.command {
            Command::Get(args) => assert_eq!(args.default.as_deref(), Some("[]")),
            _ => panic!("expected get"),
        }
    }

    #[test]
    fn show_config_is_kebab_case() {
        let cli = Cli::parse_from(["shelf", "show-config"]);
        assert!(matches!(cli.command, Command::ShowConfig));
    }
}
