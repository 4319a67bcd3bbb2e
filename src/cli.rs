use std::path::PathBuf;

use crate::models::{LimitType, PlanType};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanArg {
    Pro,
    #[value(name = "max5x", alias = "max_5x")]
    Max5x,
    #[value(name = "max20x", alias = "max_20x")]
    Max20x,
    Custom,
}

impl From<PlanArg> for PlanType {
    fn from(p: PlanArg) -> Self {
        match p {
            PlanArg::Pro => PlanType::Pro,
            PlanArg::Max5x => PlanType::Max5x,
            PlanArg::Max20x => PlanType::Max20x,
            PlanArg::Custom => PlanType::Custom,
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitTypeArg {
    Daily,
    Weekly,
}

impl From<LimitTypeArg> for LimitType {
    fn from(l: LimitTypeArg) -> Self {
        match l {
            LimitTypeArg::Daily => LimitType::Daily,
            LimitTypeArg::Weekly => LimitType::Weekly,
        }
    }
}

#[derive(clap::Parser, Debug)]
#[command(name = "claude-watcher", version, about = "Session usage and quota tracking")]
pub struct Args {
    /// Database file (overrides CLAUDE_WATCHER_DB_PATH and the settings file)
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Subscription plan (overrides CLAUDE_WATCHER_PLAN and the settings file)
    #[arg(long, global = true, value_enum)]
    pub plan: Option<PlanArg>,

    /// Short window length in hours (overrides CLAUDE_WATCHER_WINDOW_HOURS)
    #[arg(long, global = true)]
    pub window_hours: Option<i64>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging to stderr (otherwise RUST_LOG, default warn)
    #[arg(long, global = true, env = "CLAUDE_WATCHER_DEBUG")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Record a finished session from the session-end hook payload on stdin
    Track,
    /// Parse a transcript and print its statistics without storing anything
    Parse {
        /// Path to a .jsonl transcript
        path: PathBuf,
    },
    /// Show usage in the current short and weekly windows
    Window,
    /// Show or change the subscription plan
    Plan {
        #[command(subcommand)]
        action: Option<PlanAction>,
    },
    /// List recorded limit events
    Limits {
        /// Look back this many days
        #[arg(long, default_value_t = 7)]
        days: i64,
        /// Only hit events of this period
        #[arg(long = "type", value_enum)]
        limit_type: Option<LimitTypeArg>,
        /// Maximum number of events when filtering by type
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
    /// Import every transcript under the Claude projects directories
    Backfill {
        /// Claude data path(s), comma-separated. Defaults to ~/.claude and ~/.config/claude
        #[arg(long, env = "CLAUDE_CONFIG_DIR")]
        claude_config_dir: Option<String>,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum PlanAction {
    /// Store a plan type (and optionally the short window length)
    Set {
        #[arg(value_enum)]
        plan: PlanArg,
        #[arg(long)]
        hours: Option<i64>,
    },
}

impl Args {
    pub fn parse() -> Self {
        <Args as clap::Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "claude-watcher",
            "limits",
            "--type",
            "weekly",
            "--json",
            "--plan",
            "max_5x",
        ])
        .unwrap();
        assert!(args.json);
        assert_eq!(args.plan, Some(PlanArg::Max5x));
        match args.command {
            Command::Limits {
                days, limit_type, ..
            } => {
                assert_eq!(days, 7);
                assert_eq!(limit_type, Some(LimitTypeArg::Weekly));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn plan_set_takes_hours() {
        let args =
            Args::try_parse_from(["claude-watcher", "plan", "set", "max20x", "--hours", "4"])
                .unwrap();
        match args.command {
            Command::Plan {
                action: Some(PlanAction::Set { plan, hours }),
            } => {
                assert_eq!(PlanType::from(plan), PlanType::Max20x);
                assert_eq!(hours, Some(4));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
