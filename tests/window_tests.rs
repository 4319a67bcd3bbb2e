use chrono::{DateTime, Duration, TimeZone, Utc};
use claude_watcher::models::{PlanConfig, PlanType, UsageSummary, WindowKind};
use claude_watcher::window::{
    UsageBand, calculate_window_metrics, format_time_to_limit, should_reset,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap()
}

fn usage(sessions: u64, input: u64, output: u64, cost: f64) -> UsageSummary {
    UsageSummary {
        sessions_count: sessions,
        input_tokens: input,
        output_tokens: output,
        thinking_tokens: 0,
        total_cost_usd: cost,
    }
}

#[test]
fn test_window_metrics_calculation() {
    let config = PlanConfig::new(PlanType::Pro, 5);
    let now = t0() + Duration::hours(2);
    let m = calculate_window_metrics(
        &config,
        WindowKind::Short,
        t0(),
        &usage(3, 8_000, 4_000, 1.2),
        now,
    );

    assert_eq!(m.sessions, 3);
    assert_eq!(m.tokens_used, 12_000);
    assert_eq!(m.window_end, t0() + Duration::hours(5));
    assert!((m.burn_rate - 100.0).abs() < 1e-9);
    assert!((m.cost_per_hour - 0.6).abs() < 1e-9);
    assert!((m.remaining_minutes - 180.0).abs() < 1e-9);

    assert_eq!(m.limit, Some(135_000.0));
    assert!(!m.limit_learned);
    assert_eq!(m.status, UsageBand::Ok);
    // (135000 - 12000) / 100 per minute
    assert!((m.minutes_to_limit.unwrap() - 1230.0).abs() < 1e-9);
    assert_eq!(format_time_to_limit(&m), "~20.5h");
}

#[test]
fn test_learned_limit_wins_over_preset() {
    let mut config = PlanConfig::new(PlanType::Max5x, 5);
    config.short.learned_token_limit = Some(20_000.0);
    let m = calculate_window_metrics(
        &config,
        WindowKind::Short,
        t0(),
        &usage(1, 10_000, 8_000, 0.5),
        t0() + Duration::hours(1),
    );
    assert_eq!(m.limit, Some(20_000.0));
    assert!(m.limit_learned);
    assert_eq!(m.status, UsageBand::Critical);
    assert_eq!(m.usage_percent, Some(90.0));
    assert_eq!(format_time_to_limit(&m), "~7m");
}

#[test]
fn test_exhausted_window_reports_limit_reached() {
    let mut config = PlanConfig::new(PlanType::Pro, 5);
    config.weekly.learned_token_limit = Some(1_000.0);
    let m = calculate_window_metrics(
        &config,
        WindowKind::Weekly,
        t0(),
        &usage(2, 900, 300, 0.1),
        t0() + Duration::days(2),
    );
    assert_eq!(m.status, UsageBand::Exceeded);
    assert_eq!(m.minutes_to_limit, Some(0.0));
    assert_eq!(format_time_to_limit(&m), "Limit reached");
    assert_eq!(m.window_end, t0() + Duration::days(7));
}

#[test]
fn test_custom_plan_without_learned_limit() {
    let config = PlanConfig::new(PlanType::Custom, 3);
    let m = calculate_window_metrics(
        &config,
        WindowKind::Short,
        t0(),
        &usage(1, 50_000, 0, 0.0),
        t0() + Duration::hours(4),
    );
    assert_eq!(m.limit, None);
    assert_eq!(m.usage_percent, None);
    assert_eq!(m.status, UsageBand::Ok);
    assert_eq!(m.minutes_to_limit, None);
    assert_eq!(format_time_to_limit(&m), "unknown");
    // Past the end of a 3h window.
    assert_eq!(m.remaining_minutes, 0.0);
}

#[test]
fn test_idle_window_has_no_burn() {
    let config = PlanConfig::new(PlanType::Pro, 5);
    let m = calculate_window_metrics(
        &config,
        WindowKind::Short,
        t0(),
        &UsageSummary::default(),
        t0(),
    );
    assert_eq!(m.burn_rate, 0.0);
    assert_eq!(m.cost_per_hour, 0.0);
    assert_eq!(m.minutes_to_limit, None);
    assert_eq!(format_time_to_limit(&m), ">24h");
}

#[test]
fn test_reset_boundary_is_strict() {
    let length = Duration::hours(5);
    assert!(should_reset(None, length, t0()));
    assert!(!should_reset(Some(t0()), length, t0() + length));
    assert!(should_reset(
        Some(t0()),
        length,
        t0() + length + Duration::seconds(1)
    ));
}
