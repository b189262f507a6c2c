use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::modules::kv_store::{self, KvStore, SALT_PAIR_KEY};
use crate::privacy::randomness::RandomnessProvider;

pub const MIN_CUSTOM_SALT_LEN: usize = 18;

/// The two secrets mixed into an obfuscated hash.
/// Persisted as a two-element JSON array.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[String; 2]", into = "[String; 2]")]
pub struct SaltPair {
    pub first: String,
    pub second: String,
}

impl SaltPair {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    fn is_usable(&self) -> bool {
        !self.first.is_empty() && !self.second.is_empty()
    }
}

impl From<[String; 2]> for SaltPair {
    fn from([first, second]: [String; 2]) -> Self {
        Self { first, second }
    }
}

impl From<SaltPair> for [String; 2] {
    fn from(pair: SaltPair) -> Self {
        [pair.first, pair.second]
    }
}

// Salts must never end up in logs.
impl std::fmt::Debug for SaltPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaltPair")
            .field("first", &"<redacted>")
            .field("second", &"<redacted>")
            .finish()
    }
}

/// Result of `SaltManager::get_or_create`, which writes to the store on first use.
#[derive(Debug, Clone)]
pub enum SaltLookup {
    Existing(SaltPair),
    Created(SaltPair),
}

impl SaltLookup {
    pub fn was_created(&self) -> bool {
        matches!(self, SaltLookup::Created(_))
    }

    pub fn pair(&self) -> &SaltPair {
        match self {
            SaltLookup::Existing(pair) | SaltLookup::Created(pair) => pair,
        }
    }

    pub fn into_pair(self) -> SaltPair {
        match self {
            SaltLookup::Existing(pair) | SaltLookup::Created(pair) => pair,
        }
    }
}

#[derive(Clone)]
pub struct SaltManager {
    store: Arc<dyn KvStore>,
    randomness: Arc<RandomnessProvider>,
}

impl SaltManager {
    pub fn new(store: Arc<dyn KvStore>, randomness: Arc<RandomnessProvider>) -> Self {
        Self { store, randomness }
    }

    /// Pure read of the persisted pair.
    pub fn peek(&self) -> Option<SaltPair> {
        match kv_store::get_json::<SaltPair>(self.store.as_ref(), SALT_PAIR_KEY) {
            Ok(Some(pair)) if pair.is_usable() => Some(pair),
            Ok(Some(_)) => {
                tracing::warn!("[SaltManager] Stored salt pair has an empty slot; ignoring it");
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("[SaltManager] Stored salt pair unreadable: {}", e);
                None
            }
        }
    }

    /// Return the persisted pair, generating and persisting a fresh one if none exists.
    ///
    /// Concurrent first calls may each persist a pair; the last write wins.
    pub fn get_or_create(&self) -> SaltLookup {
        if let Some(pair) = self.peek() {
            return SaltLookup::Existing(pair);
        }

        let first = self.randomness.generate_secret();
        let second = self.randomness.generate_secret();
        let pair = SaltPair::new(first.value, second.value);

        if !(first.tier.is_cryptographic() && second.tier.is_cryptographic()) {
            tracing::warn!("[SaltManager] New salt pair uses non-cryptographic randomness");
        }
        match kv_store::set_json(self.store.as_ref(), SALT_PAIR_KEY, &pair) {
            Ok(()) => tracing::info!(
                "[SaltManager] Generated new salt pair (tiers: {:?}/{:?})",
                first.tier,
                second.tier
            ),
            Err(e) => tracing::error!("[SaltManager] Failed to persist new salt pair: {}", e),
        }
        SaltLookup::Created(pair)
    }

    /// Drop the persisted pair; the next `get_or_create` makes a new one.
    pub fn regenerate(&self) -> Result<(), String> {
        self.store
            .delete(SALT_PAIR_KEY)
            .map_err(|e| format!("Failed to delete salt pair: {}", e))?;
        tracing::info!("[SaltManager] Salt pair cleared; will regenerate on next use");
        Ok(())
    }

    /// Replace the pair with operator-supplied salts.
    ///
    /// Slots are trimmed; an empty slot counts as not supplied. The pair is
    /// only written when both slots are valid.
    pub fn set_custom(&self, first: &str, second: &str) -> Vec<String> {
        let mut errors = Vec::new();
        let mut accepted = Vec::with_capacity(2);

        for (slot, label) in [(first.trim(), "First"), (second.trim(), "Second")] {
            if slot.is_empty() {
                continue;
            }
            if slot.chars().count() >= MIN_CUSTOM_SALT_LEN {
                accepted.push(slot.to_string());
            } else {
                errors.push(format!(
                    "{} custom salt is too short. It must be at least {} characters long.",
                    label, MIN_CUSTOM_SALT_LEN
                ));
            }
        }

        match <[String; 2]>::try_from(accepted) {
            Ok(pair) => {
                let pair = SaltPair::from(pair);
                match kv_store::set_json(self.store.as_ref(), SALT_PAIR_KEY, &pair) {
                    Ok(()) => tracing::info!("[SaltManager] Custom salt pair saved"),
                    Err(e) => errors.push(format!("Failed to save custom salts: {}", e)),
                }
            }
            Err(accepted) if accepted.len() == 1 => errors.push(format!(
                "If using custom salts, you need two custom salts, each at least {} characters long.",
                MIN_CUSTOM_SALT_LEN
            )),
            Err(_) => {}
        }
        errors
    }
}
