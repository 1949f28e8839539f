//! Global application configuration manager.
//!
//! `AppConfig` is a lazily initialized, globally accessible singleton containing
//! runtime configuration values loaded from `.env` and environment variables.
//! Tests may override individual fields through the per-field setters.

use std::env;
use std::str::FromStr;
use std::sync::{OnceLock, RwLock};

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub log_to_stdout: bool,
    pub database_path: String,
    pub host: String,
    pub port: u16,

    /// Attendances per calendar day after which `DAILY_LIMIT` warns.
    pub checkin_daily_limit: u32,
    /// Hours after `start_at` past which a session can no longer be checked into.
    pub checkin_expiry_hours: i64,
    /// Minutes before `start_at` at which the live check-in window opens.
    pub checkin_early_minutes: i64,
    /// Minutes after `start_at` at which the live check-in window closes.
    pub checkin_late_minutes: i64,
    /// Offset defining the academy's calendar day (fingerprints, daily limits, streaks).
    pub checkin_utc_offset_minutes: i32,
    pub upstream_timeout_ms: u64,
    pub streak_lookback_days: i64,

    pub offline_queue_path: String,
    pub offline_retry_attempts: u32,
    pub offline_retry_base_ms: u64,
}

static CONFIG_INSTANCE: OnceLock<RwLock<AppConfig>> = OnceLock::new();

fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Loads the configuration from `.env` and environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            env: env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            project_name: env::var("PROJECT_NAME").unwrap_or_else(|_| "attendance-engine".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_file: env::var("LOG_FILE").unwrap_or_else(|_| "api.log".into()),
            log_to_stdout: env::var("LOG_TO_STDOUT").unwrap_or_else(|_| "false".into()) == "true",
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "data/attendance.db".into()),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: var_or("PORT", 3000),
            checkin_daily_limit: var_or("CHECKIN_DAILY_LIMIT", 5),
            checkin_expiry_hours: var_or("CHECKIN_EXPIRY_HOURS", 24),
            checkin_early_minutes: var_or("CHECKIN_EARLY_MINUTES", 15),
            checkin_late_minutes: var_or("CHECKIN_LATE_MINUTES", 30),
            checkin_utc_offset_minutes: var_or("CHECKIN_UTC_OFFSET_MINUTES", 0),
            upstream_timeout_ms: var_or("UPSTREAM_TIMEOUT_MS", 1500),
            streak_lookback_days: var_or("STREAK_LOOKBACK_DAYS", 366),
            offline_queue_path: env::var("OFFLINE_QUEUE_PATH")
                .unwrap_or_else(|_| "data/offline_queue.json".into()),
            offline_retry_attempts: var_or("OFFLINE_RETRY_ATTEMPTS", 3),
            offline_retry_base_ms: var_or("OFFLINE_RETRY_BASE_MS", 200),
        }
    }

    /// Returns a snapshot of the global configuration.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    pub fn global() -> AppConfig {
        CONFIG_INSTANCE
            .get_or_init(|| RwLock::new(AppConfig::from_env()))
            .read()
            .expect("Failed to acquire AppConfig read lock")
            .clone()
    }

    /// Reloads the configuration from the environment, dropping overrides.
    pub fn reset() {
        if let Some(lock) = CONFIG_INSTANCE.get() {
            let mut guard = lock.write().expect("Failed to acquire AppConfig write lock");
            *guard = AppConfig::from_env();
        }
    }

    fn set_field<F>(setter: F)
    where
        F: FnOnce(&mut AppConfig),
    {
        let lock = CONFIG_INSTANCE.get_or_init(|| RwLock::new(AppConfig::from_env()));
        let mut guard = lock
            .write()
            .expect("Failed to acquire AppConfig write lock");
        setter(&mut guard);
    }

    // --- Per-field setters below ---

    pub fn set_database_path(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.database_path = value.into());
    }

    pub fn set_log_level(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_level = value.into());
    }

    pub fn set_checkin_daily_limit(value: u32) {
        AppConfig::set_field(|cfg| cfg.checkin_daily_limit = value);
    }

    pub fn set_checkin_expiry_hours(value: i64) {
        AppConfig::set_field(|cfg| cfg.checkin_expiry_hours = value);
    }

    pub fn set_checkin_utc_offset_minutes(value: i32) {
        AppConfig::set_field(|cfg| cfg.checkin_utc_offset_minutes = value);
    }

    pub fn set_upstream_timeout_ms(value: u64) {
        AppConfig::set_field(|cfg| cfg.upstream_timeout_ms = value);
    }

    pub fn set_offline_queue_path(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.offline_queue_path = value.into());
    }
}
