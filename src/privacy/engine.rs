use md5::Md5;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

use crate::modules::kv_store::KvStore;
use crate::privacy::canonical::{self, DomainEncoder, UNKNOWN_ADDRESS};
use crate::privacy::randomness::RandomnessProvider;
use crate::privacy::salt::{SaltManager, SaltPair};
use crate::privacy::whitelist::WhiteList;

/// Offset of the 32 characters kept from the second SHA-256 stage.
const OBFUSCATED_SLICE: std::ops::Range<usize> = 4..36;

/// A 32 character lowercase hex identity, shaped like an MD5 digest either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityHash {
    hex: String,
    obfuscated: bool,
}

impl IdentityHash {
    pub fn as_str(&self) -> &str {
        &self.hex
    }

    /// False when a white-list match (or the placeholder address) kept the legacy hash.
    pub fn is_obfuscated(&self) -> bool {
        self.obfuscated
    }

    pub fn into_string(self) -> String {
        self.hex
    }
}

impl fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

/// Decides, per address, between the legacy MD5 identity and a salted one.
#[derive(Clone)]
pub struct ObfuscationEngine {
    domains: WhiteList,
    addresses: WhiteList,
    salts: SaltManager,
    encoder: Arc<dyn DomainEncoder>,
}

impl ObfuscationEngine {
    pub fn new(
        store: Arc<dyn KvStore>,
        encoder: Arc<dyn DomainEncoder>,
        randomness: Arc<RandomnessProvider>,
    ) -> Self {
        Self {
            domains: WhiteList::domains(store.clone(), encoder.clone()),
            addresses: WhiteList::addresses(store.clone(), encoder.clone()),
            salts: SaltManager::new(store, randomness),
            encoder,
        }
    }

    pub fn domains(&self) -> &WhiteList {
        &self.domains
    }

    pub fn addresses(&self) -> &WhiteList {
        &self.addresses
    }

    pub fn salts(&self) -> &SaltManager {
        &self.salts
    }

    pub fn encoder(&self) -> &dyn DomainEncoder {
        self.encoder.as_ref()
    }

    /// Identity hash to publish for `raw_email`. Never fails: malformed
    /// input is treated as the placeholder address.
    pub fn compute_identity_hash(&self, raw_email: &str) -> IdentityHash {
        let mut email = canonical::normalize(raw_email);
        let mut candidate = canonical::canonicalize_address(raw_email, self.encoder.as_ref());
        if !canonical::is_valid_email(&candidate) {
            tracing::debug!("[Engine] Malformed address, using placeholder");
            email = UNKNOWN_ADDRESS.to_string();
            candidate = UNKNOWN_ADDRESS.to_string();
        }

        if self.is_trusted(&candidate) {
            tracing::debug!(
                "[Engine] {} is white-listed; keeping legacy hash",
                canonical::mask_email(&candidate)
            );
            return IdentityHash {
                hex: legacy_hash(&email),
                obfuscated: false,
            };
        }

        let salts = self.salts.get_or_create();
        if salts.was_created() {
            tracing::info!("[Engine] Salt pair created on first obfuscation");
        }
        IdentityHash {
            hex: obfuscated_hash(salts.pair(), &email),
            obfuscated: true,
        }
    }

    fn is_trusted(&self, candidate: &str) -> bool {
        let domain = match canonical::domain_of(candidate) {
            Some(d) => d,
            None => return false,
        };

        let mut matches = 0usize;
        for entry in self.domains.entries() {
            let trusted = canonical::normalize(&entry);
            if !canonical::is_valid_domain(&trusted) {
                continue;
            }
            if domain_matches(domain, &trusted) {
                matches += 1;
            }
        }

        if matches == 0 {
            if candidate.eq_ignore_ascii_case(UNKNOWN_ADDRESS) {
                matches += 1;
            }
            if self.addresses.contains(candidate) {
                matches += 1;
            }
        }

        matches > 0
    }
}

/// True when `candidate` is `trusted` itself or any subdomain of it.
pub fn domain_matches(candidate: &str, trusted: &str) -> bool {
    if candidate.eq_ignore_ascii_case(trusted) {
        return true;
    }
    let candidate = candidate.to_ascii_lowercase();
    let suffix = format!(".{}", trusted.to_ascii_lowercase());
    candidate.ends_with(&suffix)
}

/// Plain MD5 hex digest, the format the avatar service expects.
pub fn legacy_hash(email: &str) -> String {
    format!("{:x}", Md5::digest(email.as_bytes()))
}

/// `SHA256(second ++ SHA256(first ++ email))`, hex, characters 4..36.
pub fn obfuscated_hash(salts: &SaltPair, email: &str) -> String {
    let stage1 = sha256_hex(&format!("{}{}", salts.first, email));
    let stage2 = sha256_hex(&format!("{}{}", salts.second, stage1));
    stage2[OBFUSCATED_SLICE].to_string()
}

fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::kv_store::{MemoryStore, SALT_PAIR_KEY};
    use crate::privacy::canonical::IdnaEncoder;

    const SALT_A: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
    const SALT_B: &str = "BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB=";

    fn engine() -> (Arc<MemoryStore>, ObfuscationEngine) {
        let store = Arc::new(MemoryStore::new());
        let engine = ObfuscationEngine::new(
            store.clone(),
            Arc::new(IdnaEncoder),
            Arc::new(RandomnessProvider::new()),
        );
        (store, engine)
    }

    fn fixed_salts(engine: &ObfuscationEngine) {
        assert!(engine.salts().set_custom(SALT_A, SALT_B).is_empty());
    }

    fn independent(salt0: &str, salt1: &str, email: &str) -> String {
        let mut h = Sha256::new();
        h.update(salt0.as_bytes());
        h.update(email.as_bytes());
        let stage1: String = h.finalize().iter().map(|b| format!("{:02x}", b)).collect();
        let mut h = Sha256::new();
        h.update(salt1.as_bytes());
        h.update(stage1.as_bytes());
        let stage2: String = h.finalize().iter().map(|b| format!("{:02x}", b)).collect();
        stage2[4..36].to_string()
    }

    #[test]
    fn test_legacy_hash_matches_known_md5() {
        assert_eq!(legacy_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            legacy_hash("myemailaddress@example.com"),
            "0bc83cb571cd1c50ba6f3e8a78ef1346"
        );
    }

    #[test]
    fn test_obfuscated_vector_matches_independent_computation() {
        let (_, engine) = engine();
        fixed_salts(&engine);
        let hash = engine.compute_identity_hash("alice@example.org");
        assert!(hash.is_obfuscated());
        assert_eq!(hash.as_str(), independent(SALT_A, SALT_B, "alice@example.org"));
        assert_eq!(hash.as_str().len(), 32);
        assert!(hash.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(hash.as_str(), legacy_hash("alice@example.org"));
    }

    #[test]
    fn test_obfuscation_uses_trimmed_lowercase_input() {
        let (_, engine) = engine();
        fixed_salts(&engine);
        assert_eq!(
            engine.compute_identity_hash("  Alice@Example.ORG "),
            engine.compute_identity_hash("alice@example.org")
        );
    }

    #[test]
    fn test_idempotent_without_mutation() {
        let (_, engine) = engine();
        let a = engine.compute_identity_hash("carol@example.net");
        let b = engine.compute_identity_hash("carol@example.net");
        assert_eq!(a, b);
    }

    #[test]
    fn test_salt_created_lazily_once() {
        let (store, engine) = engine();
        assert!(engine.salts().peek().is_none());
        let hash = engine.compute_identity_hash("dave@example.net");
        assert_eq!(store.write_count(), 1);
        assert!(store.get(SALT_PAIR_KEY).expect("get").is_some());
        let pair = engine.salts().peek().expect("persisted");
        assert_eq!(hash.as_str(), obfuscated_hash(&pair, "dave@example.net"));

        engine.compute_identity_hash("erin@example.net");
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_whitelisted_subdomain_keeps_legacy_hash() {
        let (store, engine) = engine();
        engine.domains().add("example.com");
        let writes = store.write_count();
        let hash = engine.compute_identity_hash("User@Mail.Example.com");
        assert!(!hash.is_obfuscated());
        assert_eq!(hash.as_str(), legacy_hash("user@mail.example.com"));
        // trusted users never trigger salt creation
        assert_eq!(store.write_count(), writes);
    }

    #[test]
    fn test_whitelisted_exact_domain() {
        let (_, engine) = engine();
        engine.domains().add("example.com");
        let hash = engine.compute_identity_hash("bob@example.com");
        assert_eq!(hash.as_str(), legacy_hash("bob@example.com"));
    }

    #[test]
    fn test_lookalike_domain_is_not_trusted() {
        let (_, engine) = engine();
        engine.domains().add("example.com");
        assert!(engine.compute_identity_hash("eve@badexample.com").is_obfuscated());
        assert!(engine.compute_identity_hash("eve@example.com.evil.org").is_obfuscated());
    }

    #[test]
    fn test_percent_escaped_domain_is_not_matched() {
        let (_, engine) = engine();
        engine.domains().add("example.com");
        let hash = engine.compute_identity_hash("bob@ex%61mple.com");
        // malformed, so hashed as the placeholder rather than bob@example.com
        assert_eq!(hash.as_str(), legacy_hash(UNKNOWN_ADDRESS));
        assert_ne!(hash.as_str(), legacy_hash("bob@example.com"));
    }

    #[test]
    fn test_whitelisted_address() {
        let (_, engine) = engine();
        engine.addresses().add("Friend@Example.org");
        let hash = engine.compute_identity_hash(" friend@example.ORG");
        assert!(!hash.is_obfuscated());
        assert_eq!(hash.as_str(), legacy_hash("friend@example.org"));
        assert!(engine.compute_identity_hash("stranger@example.org").is_obfuscated());
    }

    #[test]
    fn test_idn_domain_whitelist_matches_unicode_input() {
        let (_, engine) = engine();
        engine.domains().add("bücher.example");
        let hash = engine.compute_identity_hash("Leser@BÜCHER.example");
        assert!(!hash.is_obfuscated());
        assert_eq!(hash.as_str(), legacy_hash("leser@bücher.example"));
    }

    #[test]
    fn test_malformed_input_uses_placeholder() {
        let (store, engine) = engine();
        for raw in ["", "not-an-address", "a@b@example.com", "   "] {
            let hash = engine.compute_identity_hash(raw);
            assert!(!hash.is_obfuscated());
            assert_eq!(hash.as_str(), legacy_hash(UNKNOWN_ADDRESS));
        }
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_placeholder_address_is_trusted() {
        let (_, engine) = engine();
        let hash = engine.compute_identity_hash("Unknown@Gravatar.com");
        assert!(!hash.is_obfuscated());
        assert_eq!(hash.as_str(), legacy_hash(UNKNOWN_ADDRESS));
    }

    #[test]
    fn test_invalid_stored_domain_is_skipped() {
        let (store, engine) = engine();
        store
            .set(
                crate::modules::kv_store::DOMAIN_WHITELIST_KEY,
                r#"["not a domain","com"]"#,
            )
            .expect("set");
        assert!(engine.compute_identity_hash("x@example.com").is_obfuscated());
    }

    #[test]
    fn test_domain_matches() {
        assert!(domain_matches("example.com", "example.com"));
        assert!(domain_matches("a.b.example.com", "example.com"));
        assert!(domain_matches("Mail.EXAMPLE.com", "example.com"));
        assert!(!domain_matches("notexample.com", "example.com"));
        assert!(!domain_matches("example.org", "example.com"));
    }

    #[test]
    fn test_salt_change_changes_hash() {
        let (_, engine) = engine();
        fixed_salts(&engine);
        let before = engine.compute_identity_hash("alice@example.org");
        engine.salts().regenerate().expect("regenerate");
        let after = engine.compute_identity_hash("alice@example.org");
        assert_ne!(before, after);
    }
}
