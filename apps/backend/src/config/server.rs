use uuid::Uuid;

use super::{opt_var, parse_var};
use crate::error::AppError;

/// Process-level settings: bind address and external service endpoints.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared Redis for rooms, locks and the cluster bus. Unset means
    /// single-process mode with in-memory backends.
    pub redis_url: Option<String>,
    /// Judgment service endpoint. Unset means every round is judged neutral.
    pub judge_url: Option<String>,
    /// Identifies this process in logs and health output.
    pub instance_id: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            host: opt_var("BACKEND_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_var("BACKEND_PORT", 3001u16)?,
            redis_url: opt_var("REDIS_URL"),
            judge_url: opt_var("JUDGE_URL"),
            instance_id: opt_var("INSTANCE_ID").unwrap_or_else(|| Uuid::new_v4().to_string()),
        })
    }
}
