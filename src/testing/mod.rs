//! Shared test fixtures
//!
//! Compiled for unit tests and, behind the `testing` feature, for the
//! integration tests in `tests/`.

pub mod fixtures;

pub use fixtures::{
    build_test_services, create_test_settings, seeded_user_store, test_provider,
    TEST_AUTHREQ_SECRET, TEST_TOKEN_SECRET,
};
