use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Closed-loop virtual navigation on a spherical treadmill", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a session against the simulated rig
    Run(RunArgs),

    /// Write the default session config
    InitConfig {
        /// Destination (defaults to ~/.ballnav/session.toml)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective config, environment overrides included
    ShowConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Session config (defaults to ~/.ballnav/session.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Replay recorded tick inputs (JSON lines) instead of the synthetic ball
    #[arg(short, long)]
    pub replay: Option<PathBuf>,

    /// Stop the session after this many ticks
    #[arg(short = 'n', long)]
    pub ticks: Option<u64>,

    /// Append sealed trial records to this JSON-lines file
    #[arg(short, long)]
    pub trial_log: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::parse_from([
            "ballnav", "run", "--replay", "s.jsonl", "-n", "500", "--trial-log", "t.jsonl",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.replay, Some(PathBuf::from("s.jsonl")));
        assert_eq!(args.ticks, Some(500));
        assert_eq!(args.trial_log, Some(PathBuf::from("t.jsonl")));
        assert!(args.config.is_none());
    }

    #[test]
    fn init_config_defaults_to_no_force() {
        let cli = Cli::parse_from(["ballnav", "init-config"]);
        assert!(matches!(
            cli.command,
            Command::InitConfig { path: None, force: false }
        ));
    }
}
