use std::env;

#[cfg(feature = "colors")]
use owo_colors::OwoColorize;

// Provide a no-op color shim when "colors" feature is disabled
#[cfg(not(feature = "colors"))]
pub mod color_shim {
    use std::fmt::{self, Display, Formatter};

    #[derive(Clone)]
    pub struct Plain(pub String);

    impl Display for Plain {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    pub trait ColorizeShim {
        fn as_str(&self) -> &str;

        fn red(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn yellow(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn green(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn bold(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn dimmed(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
    }

    impl ColorizeShim for &str {
        fn as_str(&self) -> &str {
            self
        }
    }
    impl ColorizeShim for String {
        fn as_str(&self) -> &str {
            self.as_str()
        }
    }
    impl ColorizeShim for Plain {
        fn as_str(&self) -> &str {
            &self.0
        }
    }
}

#[cfg(not(feature = "colors"))]
use color_shim::ColorizeShim as OwoColorize;

use crate::models::{PlanConfig, SessionStatistics, StoredLimitEvent, WindowKind};
use crate::tracker::IngestReport;
use crate::utils::{format_currency, format_duration_minutes, format_path, format_tokens};
use crate::window::{UsageBand, WindowMetrics, format_time_to_limit};

fn no_color() -> bool {
    env::var("NO_COLOR").is_ok()
}

fn colorize_band(band: UsageBand, text: String) -> String {
    if no_color() {
        return text;
    }
    match band {
        UsageBand::Exceeded => text.red().bold().to_string(),
        UsageBand::Critical => text.red().to_string(),
        UsageBand::Warning => text.yellow().to_string(),
        UsageBand::Ok => text.green().to_string(),
    }
}

fn dim(text: &str) -> String {
    if no_color() {
        text.to_string()
    } else {
        text.dimmed().to_string()
    }
}

fn window_label(kind: WindowKind, config: &PlanConfig) -> String {
    match kind {
        WindowKind::Short => format!("{}h window", config.window_hours),
        WindowKind::Weekly => "weekly window".to_string(),
    }
}

pub fn print_statistics(stats: &SessionStatistics, cost: f64) {
    println!("model:      {}", stats.model);
    if !stats.git_branch.is_empty() {
        println!("branch:     {}", stats.git_branch);
    }
    if let (Some(start), Some(_)) = (stats.start_time, stats.end_time) {
        println!(
            "time:       {} ({})",
            start.format("%Y-%m-%d %H:%M UTC"),
            format_duration_minutes(stats.duration_seconds() as f64 / 60.0)
        );
    }
    println!(
        "prompts:    {} user, {} assistant",
        stats.user_prompts, stats.assistant_responses
    );
    println!(
        "tokens:     {} in, {} out, {} thinking {}",
        format_tokens(stats.input_tokens),
        format_tokens(stats.output_tokens),
        format_tokens(stats.thinking_tokens),
        dim(&format!(
            "(cache {} read, {} write)",
            format_tokens(stats.cache_read_tokens),
            format_tokens(stats.cache_write_tokens)
        ))
    );
    println!("cost:       {}", format_currency(cost));
    println!(
        "tools:      {} calls, {} errors",
        stats.tool_calls, stats.errors_count
    );
    for (tool, n) in &stats.tools_breakdown {
        println!("  {tool:<14} {n}");
    }
    println!(
        "files:      {} accessed, {} modified",
        stats.files_accessed.len(),
        stats.files_modified.len()
    );
    for f in &stats.files_modified {
        println!("  {}", format_path(f));
    }
    if !stats.summary.is_empty() {
        println!("summary:    {}", dim(&stats.summary));
    }
}

pub fn print_plan(config: &PlanConfig) {
    println!(
        "plan: {}  short window: {}h",
        config.plan_type.as_str(),
        config.window_hours
    );
    for kind in WindowKind::ALL {
        let w = config.window(kind);
        let start = w
            .start_time
            .map(|s| s.to_rfc3339())
            .unwrap_or_else(|| "not started".to_string());
        let limit = match config.effective_limit(kind) {
            Some((l, true)) => format!("{} learned", format_tokens(l as u64)),
            Some((l, false)) => format!("{} preset", format_tokens(l as u64)),
            None => "unknown".to_string(),
        };
        println!("  {:<14} start {start}, limit {limit}", window_label(kind, config));
    }
}

pub fn print_window(kind: WindowKind, config: &PlanConfig, metrics: Option<&WindowMetrics>) {
    let label = window_label(kind, config);
    let Some(m) = metrics else {
        println!("{label}: {}", dim("not started"));
        return;
    };
    let pct = m
        .usage_percent
        .map(|p| colorize_band(m.status, format!("{p:.1}%")))
        .unwrap_or_else(|| "-".to_string());
    let limit = m
        .limit
        .map(|l| format_tokens(l as u64))
        .unwrap_or_else(|| "?".to_string());
    println!(
        "{label}: {} / {limit} ({pct}) {} {}",
        format_tokens(m.tokens_used),
        m.status.as_str(),
        dim(if m.limit_learned { "[learned]" } else { "[preset]" })
    );
    println!(
        "  {} sessions, {} | {:.0} tok/min, {}/h",
        m.sessions,
        format_currency(m.cost_usd),
        m.burn_rate,
        format_currency(m.cost_per_hour)
    );
    println!(
        "  resets in {} | limit in {}",
        format_duration_minutes(m.remaining_minutes),
        format_time_to_limit(m)
    );
}

pub fn print_limit_events(events: &[StoredLimitEvent]) {
    if events.is_empty() {
        println!("{}", dim("no limit events"));
        return;
    }
    for e in events {
        println!(
            "{}  {:<5} {:<6} {} sessions, {} tokens, {}",
            e.timestamp.format("%Y-%m-%d %H:%M"),
            e.event_type.as_str(),
            e.limit_type.as_str(),
            e.usage.sessions_count,
            format_tokens(e.usage.total_tokens()),
            format_currency(e.usage.total_cost_usd)
        );
        println!("  {}", dim(&e.message));
    }
}

pub fn print_ingest_report(report: &IngestReport) {
    println!(
        "{}: {} tokens, {}",
        report.session_id,
        format_tokens(report.total_tokens),
        format_currency(report.cost_usd)
    );
    for kind in &report.windows_reset {
        println!("  {} window restarted", kind.as_str());
    }
    if report.events_recorded > 0 || report.events_skipped > 0 {
        println!(
            "  limit events: {} new, {} already known",
            report.events_recorded, report.events_skipped
        );
    }
    for l in &report.limits_learned {
        println!(
            "  learned {} limit: {}",
            l.window.as_str(),
            format_tokens(l.tokens as u64)
        );
    }
}
