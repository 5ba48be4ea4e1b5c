//! Process configuration, read from environment variables once at
//! startup. No hot reload.

/// Cron expressions use the scheduler's 6-field form (seconds first).
pub const DEFAULT_SYNC_CRON: &str = "0 0 * * * *"; // hourly
pub const DEFAULT_EXPORT_CRON: &str = "0 59 23 * * *"; // 23:59 daily
pub const DEFAULT_TARIFF_API_URL: &str = "https://common-api.wildberries.ru";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: String,
    pub tariff_api_url: String,
    pub api_token: Option<String>,
    /// Frequent sync schedule (change-gated export).
    pub sync_cron: String,
    /// Daily unconditional export schedule.
    pub export_cron: String,
    /// When false, no jobs are scheduled at all; the coordinator stays
    /// importable and manually triggerable.
    pub scheduler_enabled: bool,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var(wbt_db::ENV_DB_URL).unwrap_or_default(),
            tariff_api_url: std::env::var("WBT_TARIFF_API_URL")
                .unwrap_or_else(|_| DEFAULT_TARIFF_API_URL.to_string()),
            api_token: std::env::var("WBT_API_TOKEN").ok().filter(|t| !t.is_empty()),
            sync_cron: std::env::var("WBT_SYNC_CRON")
                .unwrap_or_else(|_| DEFAULT_SYNC_CRON.to_string()),
            export_cron: std::env::var("WBT_EXPORT_CRON")
                .unwrap_or_else(|_| DEFAULT_EXPORT_CRON.to_string()),
            scheduler_enabled: std::env::var("WBT_SCHEDULER_ENABLED")
                .map(|v| parse_bool(&v))
                .unwrap_or(true),
        }
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim(), "1" | "true" | "TRUE" | "True")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_parsing_accepts_common_truthy_forms() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(parse_bool("True "));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("yes"));
    }
}
