use anyhow::{bail, Context, Result};
use chrono::{Datelike, Days, Duration, LocalResult, NaiveTime, TimeZone, Timelike, Weekday};
use chrono_tz::Tz;
use drip_contract::{parse_time_of_day, validate_business_hours, BusinessHoursConfig, WEEKDAY_NAMES};

/// A tenant's business-hours window resolved against a real timezone.
///
/// `snap_forward` is idempotent: an instant already inside the window maps
/// to itself, so re-scheduling a gated step never drifts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBusinessHours {
    start_minutes: u32,
    end_minutes: u32,
    timezone: Tz,
    /// Indexed monday-first, matching `WEEKDAY_NAMES`.
    active_days: [bool; 7],
}

impl ResolvedBusinessHours {
    pub fn resolve(config: &BusinessHoursConfig) -> Result<Self> {
        validate_business_hours(config)?;
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown IANA timezone '{}'", config.timezone))?;
        let mut active_days = [false; 7];
        for day in &config.active_days {
            if let Some(index) = WEEKDAY_NAMES.iter().position(|name| name == day) {
                active_days[index] = true;
            }
        }
        Ok(Self {
            start_minutes: parse_time_of_day(&config.start_time)?,
            end_minutes: parse_time_of_day(&config.end_time)?,
            timezone,
            active_days,
        })
    }

    fn day_index(weekday: Weekday) -> usize {
        weekday.num_days_from_monday() as usize
    }

    /// Whether the instant falls on an active day inside [start, end).
    pub fn contains(&self, instant_unix_ms: u64) -> bool {
        let Some(local) = self
            .timezone
            .timestamp_millis_opt(instant_unix_ms as i64)
            .single()
        else {
            return false;
        };
        if !self.active_days[Self::day_index(local.weekday())] {
            return false;
        }
        let minutes = local.hour() * 60 + local.minute();
        minutes >= self.start_minutes && minutes < self.end_minutes
    }

    /// Earliest instant at or after `now_unix_ms` inside the window.
    pub fn snap_forward(&self, now_unix_ms: u64) -> Result<u64> {
        if self.contains(now_unix_ms) {
            return Ok(now_unix_ms);
        }
        let local = self
            .timezone
            .timestamp_millis_opt(now_unix_ms as i64)
            .single()
            .context("timestamp is not representable in the tenant timezone")?;
        let start_time = NaiveTime::from_num_seconds_from_midnight_opt(self.start_minutes * 60, 0)
            .context("business-hours start is out of range")?;

        // With at least one active day a window opens within the week; the
        // extra day covers a same-day start that already passed.
        for offset in 0..8u64 {
            let date = local
                .date_naive()
                .checked_add_days(Days::new(offset))
                .context("business-hours date overflow")?;
            if !self.active_days[Self::day_index(date.weekday())] {
                continue;
            }
            let start_naive = date.and_time(start_time);
            let localized = match self.timezone.from_local_datetime(&start_naive) {
                LocalResult::Single(instant) => instant,
                // Ambiguous wall times (DST fall-back) take the earlier pass.
                LocalResult::Ambiguous(earlier, _) => earlier,
                // The window start fell into a DST spring-forward gap.
                LocalResult::None => match self
                    .timezone
                    .from_local_datetime(&(start_naive + Duration::hours(1)))
                {
                    LocalResult::Single(instant) => instant,
                    LocalResult::Ambiguous(earlier, _) => earlier,
                    LocalResult::None => continue,
                },
            };
            let candidate_ms = u64::try_from(localized.timestamp_millis()).unwrap_or(0);
            if candidate_ms >= now_unix_ms {
                return Ok(candidate_ms);
            }
        }
        bail!("no business-hours window opens within 8 days");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekday_hours() -> ResolvedBusinessHours {
        ResolvedBusinessHours::resolve(&BusinessHoursConfig {
            start_time: "09:00".to_string(),
            end_time: "18:00".to_string(),
            timezone: "America/Sao_Paulo".to_string(),
            active_days: ["mon", "tue", "wed", "thu", "fri"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
        .expect("resolve")
    }

    fn sao_paulo_ms(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> u64 {
        let tz: Tz = "America/Sao_Paulo".parse().expect("tz");
        u64::try_from(
            tz.with_ymd_and_hms(y, mo, d, h, mi, 0)
                .single()
                .expect("local time")
                .timestamp_millis(),
        )
        .expect("ms")
    }

    #[test]
    fn instants_inside_the_window_are_untouched() {
        let hours = weekday_hours();
        // Wednesday mid-afternoon.
        let now = sao_paulo_ms(2026, 8, 26, 14, 30);
        assert!(hours.contains(now));
        assert_eq!(hours.snap_forward(now).expect("snap"), now);
    }

    #[test]
    fn friday_evening_snaps_to_monday_morning() {
        let hours = weekday_hours();
        let friday_evening = sao_paulo_ms(2026, 8, 28, 19, 30);
        let snapped = hours.snap_forward(friday_evening).expect("snap");
        assert_eq!(snapped, sao_paulo_ms(2026, 8, 31, 9, 0));
    }

    #[test]
    fn early_morning_snaps_to_same_day_open() {
        let hours = weekday_hours();
        let tuesday_dawn = sao_paulo_ms(2026, 8, 25, 6, 15);
        let snapped = hours.snap_forward(tuesday_dawn).expect("snap");
        assert_eq!(snapped, sao_paulo_ms(2026, 8, 25, 9, 0));
    }

    #[test]
    fn closing_time_is_exclusive() {
        let hours = weekday_hours();
        let thursday_close = sao_paulo_ms(2026, 8, 27, 18, 0);
        assert!(!hours.contains(thursday_close));
        let snapped = hours.snap_forward(thursday_close).expect("snap");
        assert_eq!(snapped, sao_paulo_ms(2026, 8, 28, 9, 0));
    }

    #[test]
    fn weekends_roll_to_the_next_active_day() {
        let hours = weekday_hours();
        let saturday = sao_paulo_ms(2026, 8, 29, 11, 0);
        assert!(!hours.contains(saturday));
        let snapped = hours.snap_forward(saturday).expect("snap");
        assert_eq!(snapped, sao_paulo_ms(2026, 8, 31, 9, 0));
    }

    #[test]
    fn snapping_twice_is_stable() {
        let hours = weekday_hours();
        let sunday = sao_paulo_ms(2026, 8, 30, 22, 45);
        let once = hours.snap_forward(sunday).expect("snap");
        let twice = hours.snap_forward(once).expect("snap");
        assert_eq!(once, twice);
    }

    #[test]
    fn resolve_rejects_unknown_timezone() {
        let config = BusinessHoursConfig {
            start_time: "09:00".to_string(),
            end_time: "18:00".to_string(),
            timezone: "Mars/Olympus_Mons".to_string(),
            active_days: vec!["mon".to_string()],
        };
        assert!(ResolvedBusinessHours::resolve(&config).is_err());
    }
}
