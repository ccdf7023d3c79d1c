//! Logging for integration test binaries.
//!
//! Same precedence as the crate's unit tests: `TEST_LOG`, then `RUST_LOG`,
//! then `"warn"`.
//!
//! ```bash
//! TEST_LOG=debug cargo test --test game_flow_tests
//! ```

#[ctor::ctor]
fn _auto_init_for_integration_tests() {
    backend_test_support::logging::init();
}
