//! # Window Module
//!
//! Usage windows: a short window (5 hours by default) and a weekly window.
//!
//! A window starts with the first session seen while it is unset, and restarts
//! at the start of the first session that begins strictly after
//! `start + length`. Nothing else moves it, so an idle window simply stays
//! expired until the next session arrives.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{PlanConfig, UsageSummary, WindowKind};

/// Persistence for plan and window state.
pub trait WindowStore {
    fn plan_config(&self) -> Result<PlanConfig>;

    /// Set the window start to `new` only if it still equals `expected`.
    /// Returns whether this call changed it.
    fn swap_window_start(
        &self,
        kind: WindowKind,
        expected: Option<DateTime<Utc>>,
        new: DateTime<Utc>,
    ) -> Result<bool>;

    fn set_learned_limit(&self, kind: WindowKind, limit: f64, at: DateTime<Utc>) -> Result<()>;

    /// Usage of sessions that started at or after `start`.
    fn usage_since(&self, start: DateTime<Utc>) -> Result<UsageSummary>;
}

/// Whether a session starting at `t` opens a new window.
pub fn should_reset(start: Option<DateTime<Utc>>, length: Duration, t: DateTime<Utc>) -> bool {
    match start {
        None => true,
        Some(s) => s.checked_add_signed(length).is_some_and(|end| t > end),
    }
}

/// Restart the window at `session_start` if it has expired. Concurrent callers
/// racing on the same expiry see exactly one `true`.
pub fn reset_if_expired<S: WindowStore + ?Sized>(
    store: &S,
    kind: WindowKind,
    session_start: DateTime<Utc>,
) -> Result<bool> {
    let config = store.plan_config()?;
    let current = config.window(kind).start_time;
    if !should_reset(current, config.window_length(kind), session_start) {
        return Ok(false);
    }
    let swapped = store.swap_window_start(kind, current, session_start)?;
    if swapped {
        tracing::info!(
            window = kind.as_str(),
            previous = ?current,
            start = %session_start,
            "usage window restarted"
        );
    } else {
        tracing::debug!(window = kind.as_str(), "window already restarted by another writer");
    }
    Ok(swapped)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageBand {
    Ok,
    Warning,
    Critical,
    Exceeded,
}

impl UsageBand {
    pub fn from_percent(percent: f64) -> Self {
        if percent >= 100.0 {
            Self::Exceeded
        } else if percent >= 90.0 {
            Self::Critical
        } else if percent >= 75.0 {
            Self::Warning
        } else {
            Self::Ok
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Exceeded => "exceeded",
        }
    }
}

/// Point-in-time view of one active window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowMetrics {
    pub kind: WindowKind,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub sessions: u64,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub limit: Option<f64>,
    pub limit_learned: bool,
    pub usage_percent: Option<f64>,
    pub status: UsageBand,
    /// Tokens per minute since the window opened.
    pub burn_rate: f64,
    pub cost_per_hour: f64,
    pub remaining_minutes: f64,
    pub minutes_to_limit: Option<f64>,
}

/// Derive metrics for an active window from its persisted usage.
pub fn calculate_window_metrics(
    config: &PlanConfig,
    kind: WindowKind,
    start: DateTime<Utc>,
    usage: &UsageSummary,
    now: DateTime<Utc>,
) -> WindowMetrics {
    let end = start
        .checked_add_signed(config.window_length(kind))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    let tokens = usage.total_tokens();

    let elapsed_minutes = ((now - start).num_seconds().max(0) as f64) / 60.0;
    let (burn_rate, cost_per_hour) = if elapsed_minutes > 0.0 {
        (
            tokens as f64 / elapsed_minutes,
            usage.total_cost_usd / elapsed_minutes * 60.0,
        )
    } else {
        (0.0, 0.0)
    };
    let remaining_minutes = ((end - now).num_seconds().max(0) as f64) / 60.0;

    let (limit, limit_learned) = match config.effective_limit(kind) {
        Some((l, learned)) if l > 0.0 => (Some(l), learned),
        _ => (None, false),
    };
    let usage_percent = limit.map(|l| tokens as f64 * 100.0 / l);
    let minutes_to_limit = limit.and_then(|l| {
        let left = l - tokens as f64;
        if left <= 0.0 {
            Some(0.0)
        } else if burn_rate > 0.0 {
            Some(left / burn_rate)
        } else {
            None
        }
    });

    WindowMetrics {
        kind,
        window_start: start,
        window_end: end,
        sessions: usage.sessions_count,
        tokens_used: tokens,
        cost_usd: usage.total_cost_usd,
        limit,
        limit_learned,
        usage_percent,
        status: UsageBand::from_percent(usage_percent.unwrap_or(0.0)),
        burn_rate,
        cost_per_hour,
        remaining_minutes,
        minutes_to_limit,
    }
}

/// Metrics for `kind`, or `None` while the window has not started.
pub fn window_status<S: WindowStore + ?Sized>(
    store: &S,
    kind: WindowKind,
    now: DateTime<Utc>,
) -> Result<Option<WindowMetrics>> {
    let config = store.plan_config()?;
    let Some(start) = config.window(kind).start_time else {
        return Ok(None);
    };
    let usage = store.usage_since(start)?;
    Ok(Some(calculate_window_metrics(&config, kind, start, &usage, now)))
}

/// Short human label for the projected time to the limit.
pub fn format_time_to_limit(metrics: &WindowMetrics) -> String {
    if metrics.limit.is_none() {
        return "unknown".to_string();
    }
    match metrics.minutes_to_limit {
        Some(m) if m <= 0.0 => "Limit reached".to_string(),
        Some(m) if m <= 1440.0 && m > 60.0 => format!("~{:.1}h", m / 60.0),
        Some(m) if m <= 60.0 => format!("~{:.0}m", m),
        _ => ">24h".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlanType;
    use chrono::TimeZone;
    use std::cell::RefCell;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn reset_boundary_is_strict() {
        let five = Duration::hours(5);
        assert!(!should_reset(Some(t0()), five, t0() + five));
        assert!(should_reset(
            Some(t0()),
            five,
            t0() + five + Duration::seconds(1)
        ));
        assert!(!should_reset(Some(t0()), five, t0() - Duration::hours(1)));
        assert!(should_reset(None, five, t0()));
    }

    #[test]
    fn window_ending_past_representable_time_never_resets() {
        let late = DateTime::<Utc>::MAX_UTC - Duration::hours(1);
        let length = Duration::hours(5);
        assert!(!should_reset(Some(late), length, DateTime::<Utc>::MAX_UTC));

        let config = PlanConfig::new(PlanType::Pro, 10_000_000_000_000_000);
        let m = calculate_window_metrics(
            &config,
            WindowKind::Short,
            late,
            &UsageSummary::default(),
            late,
        );
        assert_eq!(m.window_end, DateTime::<Utc>::MAX_UTC);
    }

    struct MemStore {
        config: RefCell<PlanConfig>,
    }

    impl WindowStore for MemStore {
        fn plan_config(&self) -> Result<PlanConfig> {
            Ok(self.config.borrow().clone())
        }
        fn swap_window_start(
            &self,
            kind: WindowKind,
            expected: Option<DateTime<Utc>>,
            new: DateTime<Utc>,
        ) -> Result<bool> {
            let mut cfg = self.config.borrow_mut();
            let w = match kind {
                WindowKind::Short => &mut cfg.short,
                WindowKind::Weekly => &mut cfg.weekly,
            };
            if w.start_time != expected {
                return Ok(false);
            }
            w.start_time = Some(new);
            Ok(true)
        }
        fn set_learned_limit(&self, _: WindowKind, _: f64, _: DateTime<Utc>) -> Result<()> {
            Ok(())
        }
        fn usage_since(&self, _: DateTime<Utc>) -> Result<UsageSummary> {
            Ok(UsageSummary::default())
        }
    }

    #[test]
    fn first_session_opens_window_then_waits_for_expiry() {
        let store = MemStore {
            config: RefCell::new(PlanConfig::new(PlanType::Pro, 5)),
        };
        assert!(reset_if_expired(&store, WindowKind::Short, t0()).unwrap());
        assert!(!reset_if_expired(&store, WindowKind::Short, t0() + Duration::hours(5)).unwrap());
        let later = t0() + Duration::hours(6);
        assert!(reset_if_expired(&store, WindowKind::Short, later).unwrap());
        assert_eq!(store.config.borrow().short.start_time, Some(later));
        // The weekly window is independent.
        assert_eq!(store.config.borrow().weekly.start_time, None);
    }

    #[test]
    fn stale_expected_start_loses_the_swap() {
        let store = MemStore {
            config: RefCell::new(PlanConfig::new(PlanType::Pro, 5)),
        };
        assert!(store.swap_window_start(WindowKind::Short, None, t0()).unwrap());
        assert!(!store.swap_window_start(WindowKind::Short, None, t0()).unwrap());
    }

    fn usage(tokens: u64, cost: f64) -> UsageSummary {
        UsageSummary {
            sessions_count: 2,
            input_tokens: tokens,
            total_cost_usd: cost,
            ..Default::default()
        }
    }

    #[test]
    fn metrics_burn_rate_and_projection() {
        let cfg = PlanConfig::new(PlanType::Pro, 5);
        let now = t0() + Duration::minutes(100);
        let m = calculate_window_metrics(&cfg, WindowKind::Short, t0(), &usage(35_000, 2.0), now);
        assert_eq!(m.tokens_used, 35_000);
        assert_eq!(m.limit, Some(135_000.0));
        assert!(!m.limit_learned);
        assert!((m.burn_rate - 350.0).abs() < 1e-9);
        assert!((m.cost_per_hour - 1.2).abs() < 1e-9);
        assert!((m.remaining_minutes - 200.0).abs() < 1e-9);
        // 100_000 left at 350/min
        assert!((m.minutes_to_limit.unwrap() - 100_000.0 / 350.0).abs() < 1e-6);
        assert_eq!(m.status, UsageBand::Ok);
        assert_eq!(m.window_end, t0() + Duration::hours(5));
    }

    #[test]
    fn exhausted_and_unknown_limits() {
        let now = t0() + Duration::minutes(10);
        let mut cfg = PlanConfig::new(PlanType::Pro, 5);
        cfg.short.learned_token_limit = Some(1000.0);
        let m = calculate_window_metrics(&cfg, WindowKind::Short, t0(), &usage(1500, 0.0), now);
        assert!(m.limit_learned);
        assert_eq!(m.minutes_to_limit, Some(0.0));
        assert_eq!(m.status, UsageBand::Exceeded);
        assert_eq!(format_time_to_limit(&m), "Limit reached");

        let custom = PlanConfig::new(PlanType::Custom, 5);
        let m = calculate_window_metrics(&custom, WindowKind::Short, t0(), &usage(1500, 0.0), now);
        assert_eq!(m.limit, None);
        assert_eq!(m.minutes_to_limit, None);
        assert_eq!(m.status, UsageBand::Ok);
        assert_eq!(format_time_to_limit(&m), "unknown");
    }

    #[test]
    fn zero_burn_rate_has_no_projection() {
        let cfg = PlanConfig::new(PlanType::Max5x, 5);
        let m = calculate_window_metrics(&cfg, WindowKind::Short, t0(), &usage(0, 0.0), t0());
        assert_eq!(m.burn_rate, 0.0);
        assert_eq!(m.minutes_to_limit, None);
        assert_eq!(format_time_to_limit(&m), ">24h");
    }

    #[test]
    fn expired_window_has_no_time_left() {
        let cfg = PlanConfig::new(PlanType::Pro, 5);
        let now = t0() + Duration::hours(7);
        let m = calculate_window_metrics(&cfg, WindowKind::Short, t0(), &usage(10, 0.0), now);
        assert_eq!(m.remaining_minutes, 0.0);
    }

    #[test]
    fn bands() {
        assert_eq!(UsageBand::from_percent(0.0), UsageBand::Ok);
        assert_eq!(UsageBand::from_percent(74.9), UsageBand::Ok);
        assert_eq!(UsageBand::from_percent(75.0), UsageBand::Warning);
        assert_eq!(UsageBand::from_percent(90.0), UsageBand::Critical);
        assert_eq!(UsageBand::from_percent(99.99), UsageBand::Critical);
        assert_eq!(UsageBand::from_percent(100.0), UsageBand::Exceeded);
    }

    #[test]
    fn time_to_limit_labels() {
        let cfg = PlanConfig::new(PlanType::Pro, 5);
        let mut m =
            calculate_window_metrics(&cfg, WindowKind::Short, t0(), &usage(0, 0.0), t0());
        m.minutes_to_limit = Some(45.0);
        assert_eq!(format_time_to_limit(&m), "~45m");
        m.minutes_to_limit = Some(150.0);
        assert_eq!(format_time_to_limit(&m), "~2.5h");
        m.minutes_to_limit = Some(2000.0);
        assert_eq!(format_time_to_limit(&m), ">24h");
    }
}
