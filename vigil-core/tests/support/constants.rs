//! Shared constants for core integration tests.

use std::time::Duration;

/// Upper bound for waits in tests that run on the real clock.
pub const REAL_TIME_GUARD: Duration = Duration::from_secs(10);

/// Credential used wherever a test needs to prove it never leaks.
pub const SECRET_CREDENTIAL: &str = "vigil_tok_7Hq2ZpL9sXw4";
