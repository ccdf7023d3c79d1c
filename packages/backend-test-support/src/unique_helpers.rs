//! Test helpers for generating unique test data
//!
//! Session ids and nicknames must not collide between tests that share a
//! process (nickname reservations are global to a backend instance).

use ulid::Ulid;

/// Generate a unique session id with the given prefix
///
/// # Examples
/// ```
/// use backend_test_support::unique_helpers::unique_session;
///
/// let a = unique_session("alice");
/// let b = unique_session("alice");
/// assert_ne!(a, b);
/// assert!(a.starts_with("alice-"));
/// ```
pub fn unique_session(prefix: &str) -> String {
    format!("{}-{}", prefix, Ulid::new())
}

/// Generate a nickname that passes backend validation (2–12 chars) and is
/// unique per call.
///
/// The prefix is truncated to 5 characters and followed by the last 6
/// characters of a fresh ULID.
pub fn unique_nickname(prefix: &str) -> String {
    let head: String = prefix.chars().take(5).collect();
    let ulid = Ulid::new().to_string();
    let tail = &ulid[ulid.len() - 6..];
    format!("{head}_{tail}")
}
