//! # Config Module
//!
//! Runtime settings, resolved per key from (highest first):
//! 1. command-line flags
//! 2. environment variables
//! 3. the JSON settings file (`~/.claude/watcher-settings.json`, or the path in
//!    `CLAUDE_WATCHER_SETTINGS_FILE`)
//! 4. built-in defaults
//!
//! ```json
//! {
//!   "plan": "max_5x",
//!   "window_hours": 5,
//!   "db_path": "/data/watcher.db",
//!   "default_model": "claude-sonnet-4-5",
//!   "pricing": {
//!     "my-proxy-model": {"input": 2.0, "output": 8.0, "cache_read": 0.2, "cache_write": 2.5}
//!   }
//! }
//! ```

use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::db;
use crate::models::{MAX_WINDOW_HOURS, PlanType};
use crate::pricing::{ModelPricing, PricingTable};

pub const SETTINGS_FILE_ENV: &str = "CLAUDE_WATCHER_SETTINGS_FILE";
pub const PLAN_ENV: &str = "CLAUDE_WATCHER_PLAN";
pub const WINDOW_HOURS_ENV: &str = "CLAUDE_WATCHER_WINDOW_HOURS";

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub db_path: Option<PathBuf>,
    pub plan: Option<PlanType>,
    pub window_hours: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: PathBuf,
    /// Plan to enforce on the stored configuration, when one was specified
    /// anywhere.
    pub plan: Option<PlanType>,
    pub window_hours: Option<i64>,
    pub pricing: PricingTable,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    db_path: Option<String>,
    #[serde(alias = "plan_type")]
    plan: Option<String>,
    window_hours: Option<i64>,
    default_model: Option<String>,
    pricing: BTreeMap<String, ModelPricing>,
}

fn settings_file_path() -> Option<PathBuf> {
    if let Ok(p) = env::var(SETTINGS_FILE_ENV)
        && !p.is_empty()
    {
        return Some(PathBuf::from(p));
    }
    directories::BaseDirs::new().map(|b| b.home_dir().join(".claude").join("watcher-settings.json"))
}

fn read_settings_file() -> SettingsFile {
    let Some(path) = settings_file_path() else {
        return SettingsFile::default();
    };
    if !path.is_file() {
        return SettingsFile::default();
    }
    match fs::read_to_string(&path)
        .map_err(anyhow::Error::from)
        .and_then(|content| parse_settings_file(&content))
    {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable settings file");
            SettingsFile::default()
        }
    }
}

fn parse_settings_file(content: &str) -> Result<SettingsFile> {
    Ok(serde_json::from_str(content)?)
}

fn parse_plan(source: &str, value: &str) -> Option<PlanType> {
    let plan = PlanType::parse(value);
    if plan.is_none() {
        tracing::warn!(source, value, "unknown plan type ignored");
    }
    plan
}

fn parse_window_hours(source: &str, value: i64) -> Option<i64> {
    if (1..=MAX_WINDOW_HOURS).contains(&value) {
        Some(value)
    } else {
        tracing::warn!(
            source,
            value,
            max = MAX_WINDOW_HOURS,
            "window hours out of range ignored"
        );
        None
    }
}

/// Resolve settings from CLI flags, environment, and the settings file.
pub fn resolve(cli: &CliOverrides) -> Result<Settings> {
    let file = read_settings_file();

    let db_path = match cli.db_path.clone() {
        Some(p) => p,
        None => match env::var(db::DB_PATH_ENV).ok().filter(|s| !s.is_empty()) {
            Some(p) => PathBuf::from(p),
            None => match file.db_path.as_deref() {
                Some(p) => PathBuf::from(p),
                None => db::get_db_path()?,
            },
        },
    };

    let env_plan = env::var(PLAN_ENV)
        .ok()
        .and_then(|v| parse_plan(PLAN_ENV, &v));
    let file_plan = file.plan.as_deref().and_then(|v| parse_plan("settings", v));
    let plan = cli.plan.or(env_plan).or(file_plan);

    let env_hours = env::var(WINDOW_HOURS_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|v| parse_window_hours(WINDOW_HOURS_ENV, v));
    let file_hours = file
        .window_hours
        .and_then(|v| parse_window_hours("settings", v));
    let window_hours = cli
        .window_hours
        .and_then(|v| parse_window_hours("cli", v))
        .or(env_hours)
        .or(file_hours);

    let mut pricing = PricingTable::default().with_overrides(file.pricing);
    if let Some(model) = file.default_model.as_deref() {
        pricing = pricing.with_default_model(model);
    }

    Ok(Settings {
        db_path,
        plan,
        window_hours,
        pricing,
    })
}
