use migration::Migrator;
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

use crate::connect_to;

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory db");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

/// File-backed variant for tests that need several pooled connections to
/// contend on the same database.
pub async fn setup_file_db(path: &std::path::Path) -> DatabaseConnection {
    let db = connect_to(&path.to_string_lossy())
        .await
        .expect("Failed to open file db");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}
