use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "hubd",
    about = "Hub application node: genesis bootstrap and block replay",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Node home holding hub.toml and the genesis document
    #[arg(long, global = true, default_value = ".")]
    pub home: PathBuf,

    /// Log filter; overrides log_level from hub.toml. RUST_LOG wins over both.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

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
    /// Write hub.toml and a default genesis document into the home directory
    Init(InitArgs),
    /// Bootstrap from genesis, replay empty blocks and print the resulting genesis document
    Export(ExportArgs),
    /// Bootstrap from genesis and run empty blocks up to the halt height
    Run(RunArgs),
    /// Show the binary version and its protocol versions
    Version,
}

#[derive(Args)]
pub struct InitArgs {
    #[arg(long)]
    pub chain_id: Option<String>,
    /// Replace existing files
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Blocks to run before exporting
    #[arg(long, default_value = "0")]
    pub height: u64,
    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct RunArgs {
    /// Overrides halt_height from hub.toml
    #[arg(long)]
    pub halt_height: Option<u64>,
    /// Seconds between block timestamps
    #[arg(long, default_value = "5")]
    pub block_time: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["hubd", "init", "--chain-id", "hub-1"]).unwrap();
        if let Command::Init(args) = cli.command {
            assert_eq!(args.chain_id.as_deref(), Some("hub-1"));
            assert!(!args.overwrite);
        } else {
            panic!("wrong command");
        }
        assert_eq!(cli.home, PathBuf::from("."));
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["hubd", "run", "--home", "/tmp/hub", "--halt-height", "7"]).unwrap();
        assert_eq!(cli.home, PathBuf::from("/tmp/hub"));
        if let Command::Run(args) = cli.command {
            assert_eq!(args.halt_height, Some(7));
            assert_eq!(args.block_time, 5);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_export_json() {
        let cli = Cli::try_parse_from(["hubd", "--format", "json", "export", "--height", "3"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Command::Export(ExportArgs { height: 3, .. })));
    }

    #[test]
    fn parse_version() {
        let cli = Cli::try_parse_from(["hubd", "version"]).unwrap();
        assert!(matches!(cli.command, Command::Version));
    }
}
