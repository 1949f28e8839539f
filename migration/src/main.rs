use common::config::AppConfig;
use migration::{Migrator, runner};
use sea_orm_migration::MigratorTrait;
use std::{env, fs, path::Path};

#[tokio::main]
async fn main() {
    let db_path = AppConfig::global().database_path;
    let url = format!("sqlite://{}?mode=rwc", db_path);
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("clean") => {
            remove_db_file(&db_path);
        }
        Some("down") => {
            rollback_last(&url).await;
        }
        Some("fresh") => {
            remove_db_file(&db_path);
            create_db_dir(&db_path);
            runner::run_all_migrations(&url).await;
        }
        _ => {
            create_db_dir(&db_path);
            runner::run_all_migrations(&url).await;
        }
    }
}

/// Reverts the most recently applied migration.
async fn rollback_last(url: &str) {
    let db = match sea_orm::Database::connect(url).await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("DB connection failed: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = Migrator::down(&db, Some(1)).await {
        eprintln!("Rollback failed: {e}");
        std::process::exit(1);
    }
    println!("Rolled back last migration");
}

fn remove_db_file(path: &str) {
    let db_path = Path::new(path);
    if db_path.exists() {
        if let Err(e) = fs::remove_file(db_path) {
            eprintln!("Failed to delete DB {}: {e}", db_path.display());
            std::process::exit(1);
        }
        println!("Deleted DB: {}", db_path.display());
    } else {
        println!("DB file does not exist: {}", db_path.display());
    }
}

fn create_db_dir(path: &str) {
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent).ok();
    }
}
