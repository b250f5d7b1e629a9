//! CLI argument definitions for FocusCoach.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// FocusCoach -- keeps you honest about the goal you set.
#[derive(Parser)]
#[command(
    name = "focuscoach",
    version,
    about = "FocusCoach -- periodic focus checks against a stated goal",
    long_about = "Captures the screen at a fixed interval, asks a vision model whether \
                  what it sees serves your goal, and interrupts you when it does not."
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config/focuscoach.toml")]
    pub config: PathBuf,

    /// Default log level when `RUST_LOG` is unset.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines; `run` also prints its session summary as
    /// JSON on stdout.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start monitoring focus until interrupted.
    Run {
        /// Set (and save) the goal before starting.
        #[arg(long, short)]
        goal: Option<String>,

        /// Seconds between focus checks.
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Manage the saved goal.
    Goal {
        #[command(subcommand)]
        action: GoalAction,
    },

    /// Send one message to the configured chat model and print the reply.
    Chat {
        /// The message to send.
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,

        /// Optional system prompt.
        #[arg(long)]
        system: Option<String>,
    },

    /// Show goal, configuration, and credential status.
    Status,
}

#[derive(Subcommand)]
pub enum GoalAction {
    /// Save a new goal.
    Set {
        #[arg(required = true, num_args = 1..)]
        goal: Vec<String>,
    },
    /// Print the saved goal.
    Show,
    /// Forget the saved goal.
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "focuscoach",
            "--log-json",
            "run",
            "--goal",
            "write",
            "--interval-secs",
            "30",
        ])
        .unwrap();
        assert!(cli.log_json);
        assert_eq!(cli.config, PathBuf::from("config/focuscoach.toml"));
        match cli.command {
            Commands::Run {
                goal,
                interval_secs,
            } => {
                assert_eq!(goal.as_deref(), Some("write"));
                assert_eq!(interval_secs, Some(30));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn goal_set_joins_words() {
        let cli = Cli::try_parse_from(["focuscoach", "goal", "set", "finish", "the", "draft"])
            .unwrap();
        match cli.command {
            Commands::Goal {
                action: GoalAction::Set { goal },
            } => assert_eq!(goal.join(" "), "finish the draft"),
            _ => panic!("expected goal set"),
        }
    }

    #[test]
    fn global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["focuscoach", "status", "--config", "other.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("other.toml"));
    }

    #[test]
    fn chat_requires_message() {
        assert!(Cli::try_parse_from(["focuscoach", "chat"]).is_err());
    }
}
