use redis::aio::ConnectionManager;
use redis::Client;
use tracing::info;

use crate::error::AppError;
use crate::errors::ErrorCode;

/// Open a managed connection to the shared Redis.
pub async fn connect_redis(redis_url: &str) -> Result<ConnectionManager, AppError> {
    let client = Client::open(redis_url)
        .map_err(|err| AppError::config(format!("Invalid REDIS_URL: {err}"), err))?;
    let conn = ConnectionManager::new(client).await.map_err(|err| {
        AppError::internal(ErrorCode::StoreError, "Unable to connect to Redis", err)
    })?;
    info!("connected to redis");
    Ok(conn)
}
