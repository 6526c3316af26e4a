//! Environment abstraction for deterministic testing.
//!
//! Decouples room logic from system resources (time, randomness). Every
//! domain timestamp is a store-assigned wall-clock value in milliseconds, so
//! the trait deals in epoch milliseconds rather than opaque instants.
//! Production uses `SystemEnv` (in `alcove-store`); tests use the seeded
//! `SimEnv` from `alcove-harness`.

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now_ms()` never goes backwards within a single execution context
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Given the same seed, simulation implementations produce the same byte
///   sequence
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current wall-clock time as milliseconds since the Unix epoch.
    ///
    /// # Invariants
    ///
    /// Subsequent calls must return values >= previous calls.
    fn now_ms(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random `u128`.
    ///
    /// Useful for participant ids.
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }
}
