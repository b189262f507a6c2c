use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::modules::kv_store::{self, KvStore, ADDRESS_WHITELIST_KEY, DOMAIN_WHITELIST_KEY};
use crate::privacy::canonical::{self, DomainEncoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhiteListKind {
    Domains,
    Addresses,
}

impl WhiteListKind {
    pub fn store_key(&self) -> &'static str {
        match self {
            WhiteListKind::Domains => DOMAIN_WHITELIST_KEY,
            WhiteListKind::Addresses => ADDRESS_WHITELIST_KEY,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "domains" => Some(WhiteListKind::Domains),
            "addresses" => Some(WhiteListKind::Addresses),
            _ => None,
        }
    }
}

/// Typed view over one white-list collection in the store.
///
/// Entries are kept in canonical form with no duplicates. Nothing is written
/// back unless the collection actually grew (add) or shrank (remove).
#[derive(Clone)]
pub struct WhiteList {
    store: Arc<dyn KvStore>,
    kind: WhiteListKind,
    encoder: Arc<dyn DomainEncoder>,
}

impl WhiteList {
    pub fn new(store: Arc<dyn KvStore>, kind: WhiteListKind, encoder: Arc<dyn DomainEncoder>) -> Self {
        Self { store, kind, encoder }
    }

    pub fn domains(store: Arc<dyn KvStore>, encoder: Arc<dyn DomainEncoder>) -> Self {
        Self::new(store, WhiteListKind::Domains, encoder)
    }

    pub fn addresses(store: Arc<dyn KvStore>, encoder: Arc<dyn DomainEncoder>) -> Self {
        Self::new(store, WhiteListKind::Addresses, encoder)
    }

    /// Stored entries in persisted order. A missing or unreadable key is an empty list.
    pub fn entries(&self) -> Vec<String> {
        match kv_store::get_json::<Vec<String>>(self.store.as_ref(), self.kind.store_key()) {
            Ok(Some(entries)) => entries,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("[WhiteList] Failed to read {:?}: {}", self.kind, e);
                Vec::new()
            }
        }
    }

    /// Stored entries sorted for display.
    pub fn list(&self) -> Vec<String> {
        let mut entries = self.entries();
        entries.sort();
        entries
    }

    pub fn contains(&self, entry: &str) -> bool {
        let wanted = canonical::normalize(entry);
        self.entries()
            .iter()
            .any(|e| canonical::normalize(e) == wanted)
    }

    /// Add `;`-separated entries. Returns one message per rejected entry.
    pub fn add(&self, input: &str) -> Vec<String> {
        let mut errors = Vec::new();
        let mut entries = self.entries();
        let stored = entries.len();
        let mut seen = HashSet::new();
        entries.retain(|e| seen.insert(e.clone()));
        let before = entries.len();

        for raw in input.split(';') {
            if raw.trim().is_empty() {
                continue;
            }
            match self.validate(raw) {
                Ok(entry) => {
                    if !entries.contains(&entry) {
                        entries.push(entry);
                    }
                }
                Err(message) => errors.push(message),
            }
        }

        if entries.len() > before || before < stored {
            tracing::info!(
                "[WhiteList] {:?}: {} -> {} entries",
                self.kind,
                before,
                entries.len()
            );
            if let Err(e) = self.persist(&entries) {
                errors.push(e);
            }
        }
        errors
    }

    /// Remove `;`-separated entries. Removal only trims and lower-cases.
    pub fn remove(&self, input: &str) {
        let targets: Vec<String> = input
            .split(';')
            .map(canonical::normalize)
            .filter(|e| !e.is_empty())
            .collect();
        if let Err(e) = self.remove_entries(&targets) {
            tracing::error!("[WhiteList] {}", e);
        }
    }

    /// Remove an explicit list of entries, as selected in the admin view.
    pub fn remove_entries(&self, targets: &[String]) -> Result<usize, String> {
        let targets: Vec<String> = targets.iter().map(|t| canonical::normalize(t)).collect();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|e| !targets.contains(e));
        let removed = before - entries.len();

        if removed > 0 {
            tracing::info!(
                "[WhiteList] {:?}: {} -> {} entries",
                self.kind,
                before,
                entries.len()
            );
            self.persist(&entries)?;
        }
        Ok(removed)
    }

    fn validate(&self, raw: &str) -> Result<String, String> {
        match self.kind {
            WhiteListKind::Domains => {
                let domain = canonical::canonicalize_domain(raw, self.encoder.as_ref());
                if canonical::is_valid_domain(&domain) {
                    Ok(domain)
                } else {
                    Err(format!("The domain {} is not a valid domain name.", domain))
                }
            }
            WhiteListKind::Addresses => {
                let address = canonical::canonicalize_address(raw, self.encoder.as_ref());
                if canonical::is_valid_email(&address) {
                    Ok(address)
                } else {
                    Err(format!(
                        "The e-mail address {} is not a valid e-mail address.",
                        canonical::normalize(raw)
                    ))
                }
            }
        }
    }

    fn persist(&self, entries: &[String]) -> Result<(), String> {
        kv_store::set_json(self.store.as_ref(), self.kind.store_key(), entries)
            .map_err(|e| format!("Failed to save {:?} white-list: {}", self.kind, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::kv_store::MemoryStore;
    use crate::privacy::canonical::IdnaEncoder;

    fn fixture() -> (Arc<MemoryStore>, WhiteList, WhiteList) {
        let store = Arc::new(MemoryStore::new());
        let encoder: Arc<dyn DomainEncoder> = Arc::new(IdnaEncoder);
        let domains = WhiteList::domains(store.clone(), encoder.clone());
        let addresses = WhiteList::addresses(store.clone(), encoder);
        (store, domains, addresses)
    }

    #[test]
    fn test_empty_list_when_key_absent() {
        let (_, domains, addresses) = fixture();
        assert!(domains.list().is_empty());
        assert!(addresses.list().is_empty());
    }

    #[test]
    fn test_add_deduplicates_by_canonical_form() {
        let (store, domains, _) = fixture();
        assert!(domains.add("Example.COM").is_empty());
        assert!(domains.add("example.com").is_empty());
        assert_eq!(domains.list(), vec!["example.com".to_string()]);
        // second add did not grow the list, so only one write happened
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_add_batch_collects_errors_and_keeps_valid_entries() {
        let (_, domains, _) = fixture();
        let errors = domains.add("good.org; bad domain ;Bücher.example;;");
        assert_eq!(errors, vec!["The domain bad domain is not a valid domain name.".to_string()]);
        assert_eq!(
            domains.list(),
            vec!["good.org".to_string(), "xn--bcher-kva.example".to_string()]
        );
    }

    #[test]
    fn test_add_addresses() {
        let (_, _, addresses) = fixture();
        let errors = addresses.add("Bob@Bücher.Example;not-an-address");
        assert_eq!(
            errors,
            vec!["The e-mail address not-an-address is not a valid e-mail address.".to_string()]
        );
        assert_eq!(addresses.list(), vec!["bob@xn--bcher-kva.example".to_string()]);
        assert!(addresses.contains(" BOB@xn--bcher-kva.example"));
    }

    #[test]
    fn test_percent_encoded_domain_is_rejected() {
        let (store, domains, addresses) = fixture();
        assert_eq!(
            domains.add("ex%2emple.com"),
            vec!["The domain ex%2emple.com is not a valid domain name.".to_string()]
        );
        assert_eq!(addresses.add("bob@ex%61mple.com").len(), 1);
        assert!(domains.list().is_empty());
        assert!(addresses.list().is_empty());
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_add_collapses_duplicates_already_stored() {
        let (store, domains, _) = fixture();
        kv_store::set_json(
            store.as_ref(),
            DOMAIN_WHITELIST_KEY,
            &vec!["example.com".to_string(), "example.com".to_string()],
        )
        .expect("seed");
        let writes = store.write_count();

        assert!(domains.add("example.com").is_empty());
        assert_eq!(domains.entries(), vec!["example.com".to_string()]);
        assert_eq!(store.write_count(), writes + 1);
    }

    #[test]
    fn test_all_invalid_does_not_persist() {
        let (store, domains, _) = fixture();
        assert_eq!(domains.add("nope").len(), 1);
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_remove_missing_entry_is_noop() {
        let (store, domains, _) = fixture();
        domains.add("example.com");
        let writes = store.write_count();
        domains.remove("other.org");
        assert_eq!(store.write_count(), writes);
        assert_eq!(domains.list(), vec!["example.com".to_string()]);
    }

    #[test]
    fn test_remove_normalizes_and_persists() {
        let (_, domains, _) = fixture();
        domains.add("example.com;example.net");
        domains.remove(" EXAMPLE.com ; ");
        assert_eq!(domains.list(), vec!["example.net".to_string()]);
    }

    #[test]
    fn test_remove_entries_reports_count() {
        let (_, _, addresses) = fixture();
        addresses.add("a@example.com;b@example.com");
        let removed = addresses
            .remove_entries(&["a@example.com".to_string(), "zzz@example.com".to_string()])
            .expect("remove");
        assert_eq!(removed, 1);
        assert_eq!(addresses.list(), vec!["b@example.com".to_string()]);
    }

    #[test]
    fn test_lists_are_independent() {
        let (_, domains, addresses) = fixture();
        domains.add("example.com");
        assert!(addresses.list().is_empty());
    }
}
