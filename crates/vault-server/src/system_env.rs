//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` is the production implementation of the Environment trait using
//! the system clock and the OS cryptographic RNG. Nothing about it is
//! reproducible; tests use [`vault_core::SeededEnv`] instead.

use vault_core::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// # Security
///
/// The RNG uses getrandom which provides OS-level cryptographic randomness
/// (e.g., /dev/urandom on Linux, `BCryptGenRandom` on Windows). Keypair
/// secrets, nonces and entity ids all come from here.
///
/// # Panics
///
/// Panics if the OS RNG fails. A vault without functioning cryptographic
/// randomness cannot generate keys or nonces, and continuing would reuse
/// nonces under long-lived keys.
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
    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - vault cannot operate securely");
    }

    #[allow(clippy::disallowed_methods)]
    #[allow(clippy::expect_used)]
    fn wall_clock_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)")
            .as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_env_random_bytes_are_random() {
        let env = SystemEnv::new();

        let bytes1: [u8; 32] = env.random_array();
        let bytes2: [u8; 32] = env.random_array();

        // Extremely unlikely to be equal if random
        assert_ne!(bytes1, bytes2, "Random bytes should differ");
    }

    #[test]
    fn system_env_clock_is_past_2020() {
        assert!(SystemEnv::new().wall_clock_secs() > 1_577_836_800);
    }
}
