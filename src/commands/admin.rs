use serde::{Deserialize, Serialize};

use crate::privacy::canonical;
use crate::privacy::engine::ObfuscationEngine;
use crate::privacy::whitelist::{WhiteList, WhiteListKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhiteListEntry {
    /// Stored (ASCII) form, used for removal
    pub value: String,
    /// Unicode form for display
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhiteListView {
    pub kind: WhiteListKind,
    pub entries: Vec<WhiteListEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminOutcome {
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaltView {
    pub first: String,
    pub second: String,
    pub created: bool,
}

fn list_for(engine: &ObfuscationEngine, kind: WhiteListKind) -> &WhiteList {
    match kind {
        WhiteListKind::Domains => engine.domains(),
        WhiteListKind::Addresses => engine.addresses(),
    }
}

/// 获取白名单
pub fn list_whitelist(engine: &ObfuscationEngine, kind: WhiteListKind) -> WhiteListView {
    let entries = list_for(engine, kind)
        .list()
        .into_iter()
        .map(|value| {
            let label = match kind {
                WhiteListKind::Domains => canonical::decanonicalize_domain(&value, engine.encoder()),
                WhiteListKind::Addresses => {
                    canonical::decanonicalize_address(&value, engine.encoder())
                }
            };
            WhiteListEntry { value, label }
        })
        .collect();
    WhiteListView { kind, entries }
}

/// 添加白名单条目 (`;` 分隔)
pub fn add_to_whitelist(
    engine: &ObfuscationEngine,
    kind: WhiteListKind,
    input: &str,
) -> Result<AdminOutcome, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("Nothing to add".to_string());
    }
    let errors = list_for(engine, kind).add(input);
    if !errors.is_empty() {
        tracing::warn!("[Admin] {:?} add rejected {} entr(y/ies)", kind, errors.len());
    }
    Ok(AdminOutcome {
        errors,
        removed: None,
    })
}

/// 移除白名单条目
pub fn remove_from_whitelist(
    engine: &ObfuscationEngine,
    kind: WhiteListKind,
    entries: &[String],
) -> Result<AdminOutcome, String> {
    let removed = list_for(engine, kind).remove_entries(entries)?;
    Ok(AdminOutcome {
        errors: Vec::new(),
        removed: Some(removed),
    })
}

/// Current salts, generating them if none exist yet (as the admin view always did).
pub fn get_salts(engine: &ObfuscationEngine) -> SaltView {
    let lookup = engine.salts().get_or_create();
    let created = lookup.was_created();
    let pair = lookup.into_pair();
    SaltView {
        first: pair.first,
        second: pair.second,
        created,
    }
}

pub fn regenerate_salts(engine: &ObfuscationEngine) -> Result<AdminOutcome, String> {
    engine.salts().regenerate()?;
    Ok(AdminOutcome::default())
}

pub fn set_custom_salts(
    engine: &ObfuscationEngine,
    first: &str,
    second: &str,
) -> Result<AdminOutcome, String> {
    let errors = engine.salts().set_custom(first, second);
    Ok(AdminOutcome {
        errors,
        removed: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::kv_store::MemoryStore;
    use crate::privacy::canonical::IdnaEncoder;
    use crate::privacy::randomness::RandomnessProvider;
    use std::sync::Arc;

    fn engine() -> ObfuscationEngine {
        ObfuscationEngine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(IdnaEncoder),
            Arc::new(RandomnessProvider::new()),
        )
    }

    #[test]
    fn test_list_shows_display_labels() {
        let engine = engine();
        add_to_whitelist(&engine, WhiteListKind::Domains, "bücher.example").expect("add");
        let view = list_whitelist(&engine, WhiteListKind::Domains);
        assert_eq!(view.entries.len(), 1);
        assert_eq!(view.entries[0].value, "xn--bcher-kva.example");
        assert_eq!(view.entries[0].label, "bücher.example");
    }

    #[test]
    fn test_add_empty_input_is_rejected() {
        let engine = engine();
        assert!(add_to_whitelist(&engine, WhiteListKind::Addresses, "  ").is_err());
    }

    #[test]
    fn test_remove_reports_count() {
        let engine = engine();
        add_to_whitelist(&engine, WhiteListKind::Addresses, "a@example.com;b@example.com")
            .expect("add");
        let outcome = remove_from_whitelist(
            &engine,
            WhiteListKind::Addresses,
            &["A@example.com".to_string()],
        )
        .expect("remove");
        assert_eq!(outcome.removed, Some(1));
        assert_eq!(list_whitelist(&engine, WhiteListKind::Addresses).entries.len(), 1);
    }

    #[test]
    fn test_salt_view_creates_then_reuses() {
        let engine = engine();
        let first = get_salts(&engine);
        assert!(first.created);
        let second = get_salts(&engine);
        assert!(!second.created);
        assert_eq!(first.first, second.first);
    }

    #[test]
    fn test_custom_salts_errors_are_returned() {
        let engine = engine();
        let outcome = set_custom_salts(&engine, "short", "alsoshort").expect("set");
        assert_eq!(outcome.errors.len(), 2);
    }
}
