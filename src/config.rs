//! Configuration loader: `.env`, then the TOML file, then environment
//! overrides, then validation.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use common::config::BotConfig;
use common::Error;

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(Error::Config(format!("{env_name} must be an integer > 0"))),
    }
}

fn parse_positive_usize(raw: &str, env_name: &str) -> Result<usize, Error> {
    match raw.trim().parse::<usize>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(Error::Config(format!("{env_name} must be an integer > 0"))),
    }
}

pub fn validate_config(config: &BotConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.history.capacity < 2 {
        issues.push("history.capacity must be >= 2".into());
    }
    if config.history.ttl_secs == 0 {
        issues.push("history.ttl_secs must be > 0".into());
    }
    if config.history.purge_interval_secs == 0 {
        issues.push("history.purge_interval_secs must be > 0".into());
    }
    if config.dedup.capacity == 0 {
        issues.push("dedup.capacity must be > 0".into());
    }
    if config.dispatch.timeout_secs == 0 {
        issues.push("dispatch.timeout_secs must be > 0".into());
    }
    let webhook = config.dispatch.webhook_url.trim();
    if !webhook.is_empty() && !webhook.starts_with("http://") && !webhook.starts_with("https://") {
        issues.push("dispatch.webhook_url must be an http(s) URL".into());
    }
    if config.storage.db_path.trim().is_empty() {
        issues.push("storage.db_path must not be empty".into());
    }
    if config.journal_dir.trim().is_empty() {
        issues.push("journal_dir must not be empty".into());
    }

    let mut seen = HashSet::new();
    for (i, rule) in config.rules.iter().enumerate() {
        if rule.subscriber_id.trim().is_empty() {
            issues.push(format!("rules[{i}].subscriber_id must not be empty"));
        }
        if rule.threshold < 2 {
            issues.push(format!(
                "rules[{i}].threshold must be >= 2 (a single outcome is never a streak)"
            ));
        }
        if rule.threshold as usize > config.history.capacity {
            issues.push(format!(
                "rules[{i}].threshold {} exceeds history.capacity {}",
                rule.threshold, config.history.capacity
            ));
        }
        if matches!(&rule.watch, Some(w) if w.is_empty()) {
            issues.push(format!("rules[{i}].watch must not be empty when present"));
        }
        // Same subscriber, scope, threshold and watched set: every alert twice.
        let watched = rule
            .watch
            .as_ref()
            .map(|w| w.iter().copied().collect::<BTreeSet<_>>());
        let key = (
            rule.subscriber_id.as_str(),
            rule.source_id.as_deref(),
            rule.threshold,
            watched,
        );
        if !seen.insert(key) {
            issues.push(format!(
                "rules[{i}] duplicates an earlier rule for {}",
                rule.subscriber_id
            ));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply `STREAK_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut BotConfig, lookup: F) -> Result<(), Error>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup("STREAK_DB_PATH") {
        config.storage.db_path = path;
    }
    if let Some(raw) = lookup("STREAK_HISTORY_CAPACITY") {
        config.history.capacity = parse_positive_usize(&raw, "STREAK_HISTORY_CAPACITY")?;
    }
    if let Some(raw) = lookup("STREAK_HISTORY_TTL_SECS") {
        config.history.ttl_secs = parse_positive_u64(&raw, "STREAK_HISTORY_TTL_SECS")?;
    }
    if let Some(raw) = lookup("STREAK_DEDUP_CAPACITY") {
        config.dedup.capacity = parse_positive_usize(&raw, "STREAK_DEDUP_CAPACITY")?;
    }
    if let Some(url) = lookup("STREAK_WEBHOOK_URL") {
        config.dispatch.webhook_url = url.trim().to_string();
    }
    if let Some(raw) = lookup("STREAK_DISPATCH_TIMEOUT_SECS") {
        config.dispatch.timeout_secs = parse_positive_u64(&raw, "STREAK_DISPATCH_TIMEOUT_SECS")?;
    }
    Ok(())
}

/// Load bot configuration from `.env`, the optional TOML file at `path`,
/// and the environment.
pub fn load_config(path: &Path) -> Result<BotConfig, Error> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let mut config = BotConfig::default();
    if path.exists() {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    } else {
        tracing::warn!("{} not found, using defaults", path.display());
    }

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config)?;

    Ok(config)
}
