//! Runtime configuration read from the environment.

pub mod game;
pub mod server;

use std::env;
use std::str::FromStr;

use crate::error::AppError;

pub use game::GameConfig;
pub use server::ServerConfig;

/// Read an optional environment variable, treating empty values as unset.
fn opt_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match opt_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| AppError::config(format!("{name} has an invalid value '{raw}'"), err)),
        None => Ok(default),
    }
}
