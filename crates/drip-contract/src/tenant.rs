use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub const WEEKDAY_NAMES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
/// Per-tenant send ceilings for one provider, per fixed window.
///
/// A ceiling of zero disables that window's limit.
pub struct RateLimitCeilings {
    #[serde(default)]
    pub per_second: u32,
    #[serde(default)]
    pub per_minute: u32,
    #[serde(default)]
    pub per_hour: u32,
}

impl Default for RateLimitCeilings {
    fn default() -> Self {
        Self {
            per_second: 1,
            per_minute: 20,
            per_hour: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Tenant-configured window outside of which gated steps must not fire.
pub struct BusinessHoursConfig {
    /// "HH:MM", inclusive window start in the tenant's timezone.
    pub start_time: String,
    /// "HH:MM", exclusive window end.
    pub end_time: String,
    /// IANA timezone name, e.g. "America/Sao_Paulo".
    pub timezone: String,
    /// Lowercase three-letter day names, e.g. ["mon", "tue", ...].
    pub active_days: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Read-only per-tenant inputs to the dispatch engine.
pub struct TenantConfig {
    pub tenant_id: String,
    /// Provider label selecting the adapter for this tenant's traffic.
    pub provider: String,
    #[serde(default)]
    pub rate_limits: RateLimitCeilings,
    pub business_hours: BusinessHoursConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Narrow view of a lead consumed from the CRM collaborator.
pub struct LeadProfile {
    pub lead_id: String,
    pub tenant_id: String,
    /// Canonical (normalized) phone number.
    pub phone: String,
    /// Template variable bindings sourced from lead fields.
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,
}

/// Parses "HH:MM" into minutes since midnight.
pub fn parse_time_of_day(raw: &str) -> Result<u32> {
    let trimmed = raw.trim();
    let Some((hours_raw, minutes_raw)) = trimmed.split_once(':') else {
        bail!("time of day '{}' must use HH:MM format", trimmed);
    };
    let hours: u32 = hours_raw
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid hour in time of day '{}'", trimmed))?;
    let minutes: u32 = minutes_raw
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid minute in time of day '{}'", trimmed))?;
    if hours > 23 || minutes > 59 {
        bail!("time of day '{}' is out of range", trimmed);
    }
    Ok(hours * 60 + minutes)
}

pub fn validate_business_hours(config: &BusinessHoursConfig) -> Result<()> {
    let start = parse_time_of_day(&config.start_time)?;
    let end = parse_time_of_day(&config.end_time)?;
    if start >= end {
        bail!(
            "business hours start '{}' must be before end '{}'",
            config.start_time,
            config.end_time
        );
    }
    if config.timezone.trim().is_empty() {
        bail!("business hours timezone must be non-empty");
    }
    if config.active_days.is_empty() {
        bail!("business hours must include at least one active day");
    }
    for day in &config.active_days {
        if !WEEKDAY_NAMES.contains(&day.as_str()) {
            bail!(
                "unknown active day '{}' (expected one of {})",
                day,
                WEEKDAY_NAMES.join(", ")
            );
        }
    }
    Ok(())
}
