use anyhow::Context;
use sha2::{Digest, Sha256};
use std::env;
use std::fs;
use std::io::Read;
use std::path::PathBuf;

use crate::tracker::Identity;

/// `~/.claude`, created if missing.
pub fn claude_dir() -> anyhow::Result<PathBuf> {
    let base_dirs = directories::BaseDirs::new().context("Failed to find home directory")?;
    let claude_dir = base_dirs.home_dir().join(".claude");
    if !claude_dir.exists() {
        fs::create_dir_all(&claude_dir)?;
    }
    Ok(claude_dir)
}

/// Directories holding per-project transcripts.
///
/// `override_env` is a comma-separated list of Claude data roots; entries
/// without a `projects` directory are skipped. Without usable overrides,
/// `~/.claude` and the XDG config dir are tried.
pub fn claude_projects_dirs(override_env: Option<&str>) -> Vec<PathBuf> {
    let mut paths = vec![];
    if let Some(list) = override_env {
        for p in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let projects = PathBuf::from(p).join("projects");
            if projects.is_dir() {
                paths.push(projects);
            }
        }
        if !paths.is_empty() {
            return paths;
        }
    }
    let Some(basedirs) = directories::BaseDirs::new() else {
        return paths;
    };
    // Prefer ~/.claude, then XDG config
    for base in [
        basedirs.home_dir().join(".claude"),
        basedirs.config_dir().join("claude"),
    ] {
        let projects = base.join("projects");
        if projects.is_dir() {
            paths.push(projects);
        }
    }
    paths
}

pub fn read_stdin() -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    std::io::stdin().read_to_end(&mut buf)?;
    Ok(buf)
}

pub fn hostname() -> String {
    if let Ok(h) = env::var("HOSTNAME")
        && !h.trim().is_empty()
    {
        return h.trim().to_string();
    }
    fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Stable id for one installation: the hostname plus four digits derived
/// from a hash of the home directory.
pub fn instance_id(hostname: &str, home_dir: &str) -> String {
    let hash = Sha256::digest(home_dir.as_bytes());
    let n = (u32::from(hash[0]) << 8) | u32::from(hash[1]);
    format!("{hostname}:{:04}", n % 10_000)
}

pub fn local_identity() -> Identity {
    let hostname = hostname();
    let home = directories::BaseDirs::new()
        .map(|b| b.home_dir().to_string_lossy().into_owned())
        .unwrap_or_default();
    Identity {
        instance_id: instance_id(&hostname, &home),
        hostname,
    }
}

pub fn format_path(p: &str) -> String {
    if let Some(b) = directories::BaseDirs::new() {
        let home_s = b.home_dir().to_string_lossy();
        if let Some(rest) = p.strip_prefix(&*home_s) {
            return format!("~{rest}");
        }
    }
    p.to_owned()
}

pub fn format_currency(v: f64) -> String {
    format!("${v:.2}")
}

pub fn format_tokens(n: u64) -> String {
    if n >= 1_000_000_000 {
        format!("{:.1}B", n as f64 / 1e9)
    } else if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1e6)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1e3)
    } else {
        n.to_string()
    }
}

pub fn format_duration_minutes(minutes: f64) -> String {
    let total = minutes.max(0.0).round() as i64;
    let (h, m) = (total / 60, total % 60);
    if h > 0 {
        format!("{h}h {m}m")
    } else {
        format!("{m}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_tokens() {
        assert_eq!(format_tokens(999), "999");
        assert_eq!(format_tokens(1_500), "1.5K");
        assert_eq!(format_tokens(675_000), "675.0K");
        assert_eq!(format_tokens(2_700_000), "2.7M");
        assert_eq!(format_tokens(4_000_000_000), "4.0B");
    }

    #[test]
    fn test_format_currency_and_duration() {
        assert_eq!(format_currency(10.0), "$10.00");
        assert_eq!(format_currency(0.004), "$0.00");
        assert_eq!(format_duration_minutes(45.4), "45m");
        assert_eq!(format_duration_minutes(150.0), "2h 30m");
        assert_eq!(format_duration_minutes(-3.0), "0m");
    }

    #[test]
    fn test_instance_id_is_stable_and_bounded() {
        let a = instance_id("laptop", "/home/alice");
        let b = instance_id("laptop", "/home/alice");
        assert_eq!(a, b);
        assert!(a.starts_with("laptop:"));
        let digits = &a["laptop:".len()..];
        assert_eq!(digits.len(), 4);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_projects_dirs_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("projects")).unwrap();
        let missing = dir.path().join("nope");
        let list = format!("{}, {}", missing.display(), dir.path().display());
        assert_eq!(
            claude_projects_dirs(Some(&list)),
            vec![dir.path().join("projects")]
        );
    }
}
