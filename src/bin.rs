//! The NanoDB startup driver: configures logging, opens the data directory, runs crash
//! recovery, and shuts back down cleanly. The interactive client is not part of this crate;
//! embedders drive the engine through [`nanodb::Database`] and the command objects.

use std::process::exit;

use nanodb::{Database, DatabaseConfig};

fn main() {
    let logger = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Debug)
        .chain(std::io::stdout());

    if let Err(e) = logger.apply() {
        eprintln!("Failed to initialize logger: {}", e);
        exit(1);
    }

    let base_dir = std::env::args().nth(1).unwrap_or_else(|| "datafiles".to_string());

    let db = match Database::open(DatabaseConfig::new(&base_dir)) {
        Ok(db) => db,
        Err(e) => {
            log::error!("Could not open database in {}: {}", base_dir, e);
            exit(1);
        }
    };

    log::info!("Database in {} is ready.", base_dir);

    if let Err(e) = db.close() {
        log::error!("Error while closing database: {}", e);
        exit(1);
    }
}
