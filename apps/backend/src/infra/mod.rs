//! Infrastructure layer: backend connections and state assembly.

pub mod redis_conn;
pub mod state;
