//! Production environment: system clock and OS randomness.

use crate::env::Environment;

/// Production environment using `std::time::Instant` and getrandom.
///
/// # Panics
///
/// `random_bytes` panics if the OS RNG fails. Connection IDs are drawn from
/// it, and a relay that cannot mint unpredictable IDs lets clients guess
/// each other's routing keys.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
