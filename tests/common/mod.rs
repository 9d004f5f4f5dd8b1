//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use camflow::AppConfig;
use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(100)
}

/// Config with a short poll interval so shutdown is quick.
pub fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.device.poll_interval_ms = 1;
    config
}

/// Assert two durations are within `epsilon` of each other
pub fn assert_duration_near(a: Duration, b: Duration, epsilon: Duration) {
    let diff = if a > b { a - b } else { b - a };
    assert!(
        diff <= epsilon,
        "Expected {:?} to be within {:?} of {:?}",
        a,
        epsilon,
        b
    );
}
