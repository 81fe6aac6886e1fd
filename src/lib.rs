// Library exports for the demo binary and integration tests

pub mod config;
pub mod engine;
pub mod playback;
pub mod time_format;

pub use config::PlayerConfig;

// Test support (unit tests, and integration tests with the test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
