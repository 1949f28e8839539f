pub mod models;
pub mod test_utils;

use common::config::AppConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::path::Path;
use std::time::Duration;

/// Connects to the configured database.
///
/// `DATABASE_PATH` may be a full DSN (`sqlite:`, `postgres://`, `mysql://`) or
/// a plain SQLite file path, in which case the parent directory is created.
pub async fn connect() -> Result<DatabaseConnection, DbErr> {
    connect_to(&AppConfig::global().database_path).await
}

pub async fn connect_to(path_or_url: &str) -> Result<DatabaseConnection, DbErr> {
    let url = if path_or_url.starts_with("sqlite:")
        || path_or_url.starts_with("postgres://")
        || path_or_url.starts_with("mysql://")
    {
        path_or_url.to_owned()
    } else {
        // SQLite won't create intermediate dirs
        if let Some(parent) = Path::new(path_or_url).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        format!("sqlite://{path_or_url}?mode=rwc")
    };

    let mut opts = ConnectOptions::new(url);
    opts.acquire_timeout(Duration::from_secs(5))
        .sqlx_logging(false);

    Database::connect(opts).await
}
