//! Environment abstraction for deterministic testing.
//!
//! The driver never reads the clock or the OS RNG directly. Production wires
//! in [`crate::SystemEnv`]; the simulation harness wires in virtual time and a
//! seeded RNG so a failing run can be replayed from its seed.

use std::time::Duration;

/// Time and randomness available to the relay.
///
/// # Invariants
///
/// - `now()` never goes backwards within one execution context.
/// - Given the same seed, a simulated `random_bytes()` produces the same
///   sequence.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Instant type used by this environment.
    ///
    /// Production uses `std::time::Instant`, simulation uses virtual time.
    type Instant: Copy + Ord + Send + Sync + std::fmt::Debug + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Fill the buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Random `u64`, used for connection IDs.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
