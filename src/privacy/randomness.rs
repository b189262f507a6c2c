//! Secret generation for salts.
//!
//! Three tiers, tried in order:
//! 1. the operating system CSPRNG,
//! 2. a userspace CSPRNG seeded once from the OS when the provider was built,
//! 3. a clock-seeded, non-cryptographic shuffle digested with SHA-256.
//!
//! Tier 3 is good enough for the obfuscation salt only. Do not use its output
//! where an attacker must not be able to predict the value (anti-forgery
//! tokens, API keys).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::{OsRng, SmallRng, StdRng};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use std::sync::Mutex;

pub const SECRET_BYTES: usize = 32;

const FALLBACK_ALPHABET: &str =
    "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ~!@#$%^&*(-_=+{}[]:;,./<>?|";
const FALLBACK_PICKS: usize = 384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyTier {
    Os,
    Seeded,
    Fallback,
}

impl EntropyTier {
    pub fn is_cryptographic(&self) -> bool {
        !matches!(self, EntropyTier::Fallback)
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedSecret {
    pub value: String,
    pub tier: EntropyTier,
}

/// A source of random bytes that may be unavailable at runtime.
pub trait ByteSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<(), String>;
}

pub struct OsSource;

impl ByteSource for OsSource {
    fn fill(&self, buf: &mut [u8]) -> Result<(), String> {
        OsRng.try_fill_bytes(buf).map_err(|e| e.to_string())
    }
}

/// ChaCha-based generator seeded from the OS at construction time.
/// The seed is never refreshed.
pub struct SeededSource {
    rng: Mutex<StdRng>,
}

impl SeededSource {
    pub fn from_os() -> Result<Self, String> {
        let rng = StdRng::from_rng(OsRng).map_err(|e| e.to_string())?;
        Ok(Self {
            rng: Mutex::new(rng),
        })
    }
}

impl ByteSource for SeededSource {
    fn fill(&self, buf: &mut [u8]) -> Result<(), String> {
        let mut rng = self.rng.lock().map_err(|e| e.to_string())?;
        rng.try_fill_bytes(buf).map_err(|e| e.to_string())
    }
}

pub struct RandomnessProvider {
    primary: Option<Box<dyn ByteSource>>,
    secondary: Option<Box<dyn ByteSource>>,
    // Seeded once per provider; every fallback secret continues the same stream
    fallback: Mutex<SmallRng>,
}

impl Default for RandomnessProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomnessProvider {
    pub fn new() -> Self {
        let secondary = match SeededSource::from_os() {
            Ok(source) => Some(Box::new(source) as Box<dyn ByteSource>),
            Err(e) => {
                tracing::warn!("[Randomness] Seeded generator unavailable: {}", e);
                None
            }
        };
        Self::with_sources(Some(Box::new(OsSource)), secondary)
    }

    /// Build a provider from explicit sources; `None` marks a tier as missing.
    pub fn with_sources(
        primary: Option<Box<dyn ByteSource>>,
        secondary: Option<Box<dyn ByteSource>>,
    ) -> Self {
        Self {
            primary,
            secondary,
            fallback: Mutex::new(clock_seeded_rng()),
        }
    }

    /// 256 bits of randomness, base64 encoded (44 characters).
    pub fn generate_secret(&self) -> GeneratedSecret {
        let mut raw = [0u8; SECRET_BYTES];

        if let Some(source) = &self.primary {
            match source.fill(&mut raw) {
                Ok(()) => return encode(&raw, EntropyTier::Os),
                Err(e) => tracing::debug!("[Randomness] OS source failed: {}", e),
            }
        }

        if let Some(source) = &self.secondary {
            match source.fill(&mut raw) {
                Ok(()) => {
                    tracing::debug!("[Randomness] Using seeded generator");
                    return encode(&raw, EntropyTier::Seeded);
                }
                Err(e) => tracing::debug!("[Randomness] Seeded source failed: {}", e),
            }
        }

        tracing::warn!(
            "[Randomness] No cryptographic source available; salt generated with the non-cryptographic fallback"
        );
        encode(&self.fallback_bytes(), EntropyTier::Fallback)
    }

    fn fallback_bytes(&self) -> [u8; SECRET_BYTES] {
        let mut rng = self
            .fallback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut alphabet: Vec<char> = FALLBACK_ALPHABET.chars().collect();
        alphabet.shuffle(&mut *rng);

        let picks: String = (0..FALLBACK_PICKS)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
            .collect();

        Sha256::digest(picks.as_bytes()).into()
    }
}

fn encode(raw: &[u8], tier: EntropyTier) -> GeneratedSecret {
    GeneratedSecret {
        value: STANDARD.encode(raw),
        tier,
    }
}

fn clock_seeded_rng() -> SmallRng {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    SmallRng::seed_from_u64(nanos ^ u64::from(std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl ByteSource for Broken {
        fn fill(&self, _buf: &mut [u8]) -> Result<(), String> {
            Err("unavailable".to_string())
        }
    }

    struct Fixed(u8);

    impl ByteSource for Fixed {
        fn fill(&self, buf: &mut [u8]) -> Result<(), String> {
            buf.fill(self.0);
            Ok(())
        }
    }

    #[test]
    fn test_default_provider_uses_os_tier() {
        let secret = RandomnessProvider::new().generate_secret();
        assert_eq!(secret.tier, EntropyTier::Os);
        assert_eq!(secret.value.len(), 44);
        assert_eq!(STANDARD.decode(&secret.value).expect("base64").len(), SECRET_BYTES);
    }

    #[test]
    fn test_secrets_differ() {
        let provider = RandomnessProvider::new();
        assert_ne!(provider.generate_secret().value, provider.generate_secret().value);
    }

    #[test]
    fn test_falls_back_to_secondary() {
        let provider =
            RandomnessProvider::with_sources(Some(Box::new(Broken)), Some(Box::new(Fixed(7))));
        let secret = provider.generate_secret();
        assert_eq!(secret.tier, EntropyTier::Seeded);
        assert_eq!(secret.value, STANDARD.encode([7u8; SECRET_BYTES]));
    }

    #[test]
    fn test_last_resort_fallback() {
        let provider = RandomnessProvider::with_sources(None, Some(Box::new(Broken)));
        let secret = provider.generate_secret();
        assert_eq!(secret.tier, EntropyTier::Fallback);
        assert!(!secret.tier.is_cryptographic());
        assert_eq!(secret.value.len(), 44);
    }

    #[test]
    fn test_fallback_secrets_differ_back_to_back() {
        let provider = RandomnessProvider::with_sources(None, None);
        let first = provider.generate_secret();
        let second = provider.generate_secret();
        assert_eq!(first.tier, EntropyTier::Fallback);
        assert_ne!(first.value, second.value);
    }
}
