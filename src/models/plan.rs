//! Subscription plan and usage window state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ratelimit::LimitType;

pub const DEFAULT_WINDOW_HOURS: i64 = 5;
pub const WEEKLY_WINDOW_HOURS: i64 = 168;
/// The short window never outlasts the weekly one.
pub const MAX_WINDOW_HOURS: i64 = WEEKLY_WINDOW_HOURS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Pro,
    Max5x,
    Max20x,
    Custom,
}

impl PlanType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pro" => Some(Self::Pro),
            "max5x" | "max_5x" | "5x" => Some(Self::Max5x),
            "max20x" | "max_20x" | "20x" => Some(Self::Max20x),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pro => "pro",
            Self::Max5x => "max_5x",
            Self::Max20x => "max_20x",
            Self::Custom => "custom",
        }
    }

    /// Estimated token ceiling for a window when nothing has been learned yet.
    /// Derived from the documented message and active-hour allowances, so only
    /// a rough guide.
    pub fn preset_token_limit(&self, kind: WindowKind) -> Option<f64> {
        match (kind, self) {
            (WindowKind::Short, Self::Pro) => Some(135_000.0),
            (WindowKind::Short, Self::Max5x) => Some(675_000.0),
            (WindowKind::Short, Self::Max20x) => Some(2_700_000.0),
            (WindowKind::Weekly, Self::Pro) => Some(4_000_000.0),
            (WindowKind::Weekly, Self::Max5x) => Some(14_000_000.0),
            (WindowKind::Weekly, Self::Max20x) => Some(24_000_000.0),
            (_, Self::Custom) => None,
        }
    }
}

/// The two independent windows tracked per plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Short,
    Weekly,
}

impl WindowKind {
    pub const ALL: [WindowKind; 2] = [WindowKind::Short, WindowKind::Weekly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Weekly => "weekly",
        }
    }

    /// Daily notices calibrate the short window, weekly notices the weekly one.
    pub fn for_limit(limit: LimitType) -> Self {
        match limit {
            LimitType::Daily => Self::Short,
            LimitType::Weekly => Self::Weekly,
        }
    }
}

/// Persisted state of one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageWindow {
    pub start_time: Option<DateTime<Utc>>,
    pub learned_token_limit: Option<f64>,
    pub learned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanConfig {
    pub plan_type: PlanType,
    pub window_hours: i64,
    pub short: UsageWindow,
    pub weekly: UsageWindow,
}

impl PlanConfig {
    pub fn new(plan_type: PlanType, window_hours: i64) -> Self {
        Self {
            plan_type,
            window_hours,
            short: UsageWindow::default(),
            weekly: UsageWindow::default(),
        }
    }

    pub fn window(&self, kind: WindowKind) -> &UsageWindow {
        match kind {
            WindowKind::Short => &self.short,
            WindowKind::Weekly => &self.weekly,
        }
    }

    /// Length of a window. Stored short-window hours outside
    /// `1..=MAX_WINDOW_HOURS` are clamped into range.
    pub fn window_length(&self, kind: WindowKind) -> Duration {
        let hours = match kind {
            WindowKind::Short => self.window_hours.clamp(1, MAX_WINDOW_HOURS),
            WindowKind::Weekly => WEEKLY_WINDOW_HOURS,
        };
        Duration::hours(hours)
    }

    /// Learned ceiling when available, otherwise the plan preset. The flag is
    /// true when the value was learned.
    pub fn effective_limit(&self, kind: WindowKind) -> Option<(f64, bool)> {
        match self.window(kind).learned_token_limit {
            Some(l) => Some((l, true)),
            None => self.plan_type.preset_token_limit(kind).map(|p| (p, false)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_type_parse_accepts_aliases() {
        assert_eq!(PlanType::parse("Pro"), Some(PlanType::Pro));
        assert_eq!(PlanType::parse("max5x"), Some(PlanType::Max5x));
        assert_eq!(PlanType::parse("max_20x"), Some(PlanType::Max20x));
        assert_eq!(PlanType::parse("enterprise"), None);
    }

    #[test]
    fn effective_limit_prefers_learned() {
        let mut cfg = PlanConfig::new(PlanType::Max5x, DEFAULT_WINDOW_HOURS);
        assert_eq!(cfg.effective_limit(WindowKind::Short), Some((675_000.0, false)));
        cfg.short.learned_token_limit = Some(500_000.0);
        assert_eq!(cfg.effective_limit(WindowKind::Short), Some((500_000.0, true)));
        assert_eq!(
            cfg.effective_limit(WindowKind::Weekly),
            Some((14_000_000.0, false))
        );
    }

    #[test]
    fn custom_plan_has_no_preset() {
        let cfg = PlanConfig::new(PlanType::Custom, DEFAULT_WINDOW_HOURS);
        assert_eq!(cfg.effective_limit(WindowKind::Short), None);
    }

    #[test]
    fn weekly_length_is_fixed() {
        let cfg = PlanConfig::new(PlanType::Pro, 3);
        assert_eq!(cfg.window_length(WindowKind::Short), Duration::hours(3));
        assert_eq!(cfg.window_length(WindowKind::Weekly), Duration::hours(168));
    }

    #[test]
    fn out_of_range_hours_are_clamped() {
        let huge = PlanConfig::new(PlanType::Pro, 10_000_000_000_000_000);
        assert_eq!(
            huge.window_length(WindowKind::Short),
            Duration::hours(MAX_WINDOW_HOURS)
        );
        let negative = PlanConfig::new(PlanType::Pro, -5);
        assert_eq!(negative.window_length(WindowKind::Short), Duration::hours(1));
    }
}
