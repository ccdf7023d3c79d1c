pub mod clock;
pub mod join_code;
