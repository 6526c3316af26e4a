//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` is the production implementation of the Environment trait
//! using the real wall clock and cryptographic RNG. Production behavior
//! is non-deterministic; tests use the seeded `SimEnv` from
//! `alcove-harness` instead.

use alcove_core::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// Uses `std::time::SystemTime` for the wall clock and getrandom for
/// randomness (OS-level, e.g. /dev/urandom on Linux). Suitable for
/// generating room codes and participant ids.
///
/// # Panics
///
/// Panics if the OS RNG fails. This is intentional - a service without
/// functioning cryptographic randomness cannot hand out unguessable
/// room codes, and RNG failure indicates OS-level issues.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::disallowed_methods)]
    #[allow(clippy::expect_used)]
    fn now_ms(&self) -> u64 {
        let elapsed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)");
        u64::try_from(elapsed.as_millis())
            .expect("invariant: milliseconds since 1970 fit in u64 until the year 584556019")
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - codes would become guessable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_env_time_advances() {
        let env = SystemEnv::new();

        let t1 = env.now_ms();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let t2 = env.now_ms();

        assert!(t2 > t1, "Time should advance");
    }

    #[test]
    fn system_env_random_bytes_are_random() {
        let env = SystemEnv::new();

        let mut bytes1 = [0u8; 32];
        let mut bytes2 = [0u8; 32];

        env.random_bytes(&mut bytes1);
        env.random_bytes(&mut bytes2);

        // Extremely unlikely to be equal if random
        assert_ne!(bytes1, bytes2, "Random bytes should differ");
    }

    #[test]
    fn system_env_random_u128_is_nonzero() {
        let env = SystemEnv::new();

        // 2^-128 odds of a false failure
        assert_ne!(env.random_u128(), 0);
    }
}
