use crate::foundation::UnisonError;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_timestamp_nanos_env(env_var: Option<&str>) -> Result<u64, UnisonError> {
    if let Some(var) = env_var {
        if let Ok(value) = std::env::var(var) {
            return value.parse::<u64>().map_err(|err| UnisonError::Message(err.to_string()));
        }
    }
    let now = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|err| UnisonError::Message(err.to_string()))?;
    Ok(now.as_secs().saturating_mul(1_000_000_000).saturating_add(u64::from(now.subsec_nanos())))
}

/// Returns the current wall-clock timestamp in nanoseconds.
///
/// For test determinism, this respects `TEST_NOW_NANOS_ENV_VAR` when set.
pub fn now_nanos() -> u64 {
    current_timestamp_nanos_env(Some(crate::foundation::constants::TEST_NOW_NANOS_ENV_VAR))
        .or_else(|_| current_timestamp_nanos_env(None))
        .unwrap_or(0)
}

/// Formats a unix timestamp in nanoseconds as RFC 3339 UTC with millisecond precision
/// (`2024-03-01T12:00:05.250Z`), the form HLS `#EXT-X-PROGRAM-DATE-TIME` expects.
pub fn format_rfc3339_millis(timestamp_nanos: u64) -> String {
    let total_millis = timestamp_nanos / 1_000_000;
    let millis = total_millis % 1000;
    let total_secs = total_millis / 1000;
    let secs_of_day = total_secs % 86_400;
    let days = (total_secs / 86_400) as i64;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        secs_of_day / 3600,
        (secs_of_day % 3600) / 60,
        secs_of_day % 60
    )
}

// Howard Hinnant's days-from-civil inverse.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
