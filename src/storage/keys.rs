use crate::platform::Platform;

pub const LAST_RESET_KEY: &str = "lastResetDate";

const DAILY_USAGE_PREFIX: &str = "dailyUsage_";

/// Key under which the seconds used today on `platform` are kept.
pub fn daily_usage_key(platform: Platform) -> String {
    format!("{DAILY_USAGE_PREFIX}{}", platform.id())
}
