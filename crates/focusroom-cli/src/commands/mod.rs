pub mod achievements;
pub mod config;
pub mod stats;
pub mod timer;

use focusroom_core::{Config, SqliteStore};
use serde::Serialize;

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Configuration and database shared by every command.
pub struct Context {
    pub config: Config,
    pub store: SqliteStore,
}

impl Context {
    pub fn open() -> CliResult<Self> {
        Ok(Self {
            config: Config::load()?,
            store: SqliteStore::open()?,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.config.user_id
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
