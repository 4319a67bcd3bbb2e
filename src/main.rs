use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use claude_watcher::cli::{Args, Command, PlanAction};
use claude_watcher::config::{self, CliOverrides, Settings};
use claude_watcher::db::Database;
use claude_watcher::display::{
    print_ingest_report, print_limit_events, print_plan, print_statistics, print_window,
};
use claude_watcher::models::{
    MAX_WINDOW_HOURS, ParsedTranscript, PlanType, SessionEndHook, WindowKind,
};
use claude_watcher::tracker::{IngestReport, Tracker};
use claude_watcher::transcript;
use claude_watcher::utils::{claude_projects_dirs, local_identity, read_stdin};
use claude_watcher::window::WindowStore;

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter = if debug {
        EnvFilter::new(default_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_database(settings: &Settings) -> Result<Database> {
    let db = Database::open_at(&settings.db_path)?;
    if settings.plan.is_some() || settings.window_hours.is_some() {
        let current = db.plan_config()?;
        let plan = settings.plan.unwrap_or(current.plan_type);
        let hours = settings
            .window_hours
            .unwrap_or(current.window_hours.clamp(1, MAX_WINDOW_HOURS));
        if plan != current.plan_type || hours != current.window_hours {
            tracing::info!(plan = plan.as_str(), hours, "applying configured plan");
            db.set_plan(plan, hours)?;
        }
    }
    Ok(db)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let cli = CliOverrides {
        db_path: args.db_path.clone(),
        plan: args.plan.map(PlanType::from),
        window_hours: args.window_hours,
    };
    let settings = config::resolve(&cli)?;

    match &args.command {
        Command::Track => {
            // The hook must never fail the assistant's session shutdown.
            if let Err(e) = run_track(&settings, args.json) {
                tracing::error!(error = %format!("{e:#}"), "failed to track session");
            }
            Ok(())
        }
        Command::Parse { path } => run_parse(&settings, path, args.json),
        Command::Window => run_window(&settings, args.json),
        Command::Plan { action } => run_plan(&settings, action.as_ref(), args.json),
        Command::Limits {
            days,
            limit_type,
            count,
        } => run_limits(&settings, *days, limit_type.map(Into::into), *count, args.json),
        Command::Backfill { claude_config_dir } => {
            run_backfill(&settings, claude_config_dir.as_deref(), args.json)
        }
    }
}

fn run_track(settings: &Settings, json: bool) -> Result<()> {
    let stdin = read_stdin()?;
    if stdin.iter().all(u8::is_ascii_whitespace) {
        tracing::warn!("no hook payload on stdin");
        return Ok(());
    }
    let hook: SessionEndHook = serde_json::from_slice(&stdin).context("parse hook json")?;
    let parsed = transcript::parse_path(&hook.transcript_path)?;

    let db = open_database(settings)?;
    let tracker = Tracker::new(&db, &settings.pricing, local_identity());
    let report = tracker.ingest(&hook, &parsed, Utc::now())?;
    if json {
        print_json(&report)?;
    } else {
        tracing::debug!(?report, "session tracked");
    }
    Ok(())
}

fn run_parse(settings: &Settings, path: &Path, json: bool) -> Result<()> {
    let parsed = transcript::parse_path(&path.to_string_lossy())?;
    let stats = &parsed.statistics;
    let cost = settings.pricing.cost(
        &stats.model,
        stats.input_tokens,
        stats.output_tokens,
        stats.cache_read_tokens,
        stats.cache_write_tokens,
    );
    if json {
        #[derive(Serialize)]
        struct ParseOutput<'a> {
            #[serde(flatten)]
            parsed: &'a ParsedTranscript,
            total_tokens: u64,
            duration_seconds: i64,
            cost_usd: f64,
        }
        return print_json(&ParseOutput {
            parsed: &parsed,
            total_tokens: stats.total_tokens(),
            duration_seconds: stats.duration_seconds(),
            cost_usd: cost,
        });
    }
    print_statistics(stats, cost);
    for e in &parsed.limit_events {
        println!(
            "limit {} ({}): {}",
            e.event_type.as_str(),
            e.limit_type.as_str(),
            e.message
        );
    }
    Ok(())
}

fn run_window(settings: &Settings, json: bool) -> Result<()> {
    let db = open_database(settings)?;
    let tracker = Tracker::new(&db, &settings.pricing, local_identity());
    let config = db.plan_config()?;
    let now = Utc::now();
    let short = tracker.window_status(WindowKind::Short, now)?;
    let weekly = tracker.window_status(WindowKind::Weekly, now)?;
    if json {
        return print_json(&serde_json::json!({
            "plan": config.plan_type,
            "window_hours": config.window_hours,
            "short": short,
            "weekly": weekly,
        }));
    }
    print_window(WindowKind::Short, &config, short.as_ref());
    print_window(WindowKind::Weekly, &config, weekly.as_ref());
    Ok(())
}

fn run_plan(settings: &Settings, action: Option<&PlanAction>, json: bool) -> Result<()> {
    let db = open_database(settings)?;
    if let Some(PlanAction::Set { plan, hours }) = action {
        let current = db.plan_config()?;
        let hours = hours.unwrap_or(current.window_hours.clamp(1, MAX_WINDOW_HOURS));
        db.set_plan(PlanType::from(*plan), hours)?;
    }
    let config = db.plan_config()?;
    if json {
        return print_json(&config);
    }
    print_plan(&config);
    Ok(())
}

fn run_limits(
    settings: &Settings,
    days: i64,
    limit_type: Option<claude_watcher::models::LimitType>,
    count: usize,
    json: bool,
) -> Result<()> {
    let db = open_database(settings)?;
    let tracker = Tracker::new(&db, &settings.pricing, local_identity());
    let events = match limit_type {
        Some(t) => tracker.limit_events_by_type(t, count)?,
        None => tracker.recent_limit_events(days, Utc::now())?,
    };
    if json {
        return print_json(&serde_json::json!({
            "events": events,
            "usage_since_last": tracker.current_usage()?,
            "last_limit_at": tracker.last_limit_time()?,
        }));
    }
    print_limit_events(&events);
    Ok(())
}

/// Transcripts under the projects directories, as (session id, path).
fn find_transcripts(dirs: &[PathBuf]) -> Vec<(String, PathBuf)> {
    let mut out = Vec::new();
    for dir in dirs {
        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("jsonl")
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                out.push((stem.to_string(), path.to_path_buf()));
            }
        }
    }
    out
}

fn run_backfill(settings: &Settings, claude_config_dir: Option<&str>, json: bool) -> Result<()> {
    let dirs = claude_projects_dirs(claude_config_dir);
    if dirs.is_empty() {
        anyhow::bail!("no Claude projects directory found");
    }

    let mut sessions = Vec::new();
    for (session_id, path) in find_transcripts(&dirs) {
        let path_str = path.to_string_lossy().into_owned();
        match transcript::parse_path(&path_str) {
            Ok(parsed) => sessions.push((session_id, path_str, parsed)),
            Err(e) => tracing::warn!(error = %e, "skipping transcript"),
        }
    }
    // Windows only move forward, so replay sessions in start order.
    sessions.sort_by_key(|(_, _, p)| p.statistics.start_time);

    let db = open_database(settings)?;
    let tracker = Tracker::new(&db, &settings.pricing, local_identity());
    let now = Utc::now();
    let mut reports: Vec<IngestReport> = Vec::new();
    for (session_id, path, parsed) in &sessions {
        let hook = SessionEndHook {
            session_id: session_id.clone(),
            transcript_path: path.clone(),
            cwd: None,
            reason: None,
            permission_mode: None,
            hook_event_name: None,
        };
        match tracker.ingest(&hook, parsed, now) {
            Ok(report) => reports.push(report),
            Err(e) => {
                tracing::warn!(session = %session_id, error = %format!("{e:#}"), "backfill failed")
            }
        }
    }
    db.set_metadata("last_backfill", &now.to_rfc3339())?;

    if json {
        return print_json(&reports);
    }
    for report in &reports {
        print_ingest_report(report);
    }
    println!("{} of {} transcripts imported", reports.len(), sessions.len());
    Ok(())
}
