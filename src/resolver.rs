//! Alias to entity-id resolution
//!
//! Translates a user-supplied alias (friendly name, registry alias, or raw
//! entity id) into concrete entity ids using the entity cache.

use crate::cache::EntityCache;

/// Outcome of resolving one alias
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// First match in cache order, if any
    pub primary: Option<String>,
    /// Every match, first-seen order, deduplicated. More than one entry
    /// means the caller should warn that the first was picked.
    pub all_matches: Vec<String>,
}

impl Resolution {
    fn none() -> Self {
        Self {
            primary: None,
            all_matches: Vec::new(),
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        self.all_matches.len() > 1
    }
}

/// Resolve an alias or entity id against the cache.
///
/// An input containing a dot is treated as an already-qualified entity id and
/// returned as-is without touching the cache. Otherwise every cached entity is
/// scanned once, matching case-insensitively on friendly name, registry
/// aliases, and the id suffix after the last dot. First-seen-in-cache order
/// decides the primary match; the cache preserves upstream fetch order, so
/// resolution is deterministic.
///
/// An uninitialized cache resolves to no match rather than an error.
pub fn resolve(cache: &EntityCache, alias_or_id: &str) -> Resolution {
    if alias_or_id.contains('.') {
        log::debug!("Treating '{alias_or_id}' as entity_id");
        return Resolution {
            primary: Some(alias_or_id.to_string()),
            all_matches: vec![alias_or_id.to_string()],
        };
    }

    let Some(entities) = cache.entities() else {
        log::warn!("Entity cache not initialized, cannot resolve alias");
        return Resolution::none();
    };

    let alias_lower = alias_or_id.to_lowercase();
    let suffix = format!(".{alias_lower}");
    let mut matches: Vec<String> = Vec::new();

    for state in entities.iter() {
        let matched = state
            .friendly_name()
            .is_some_and(|name| name.to_lowercase() == alias_lower)
            || state
                .aliases()
                .iter()
                .any(|a| a.to_lowercase() == alias_lower)
            || state.entity_id.to_lowercase().ends_with(&suffix);

        if matched && !matches.contains(&state.entity_id) {
            log::debug!("Matched entity {} for alias '{alias_or_id}'", state.entity_id);
            matches.push(state.entity_id.clone());
        }
    }

    if matches.is_empty() {
        log::debug!("No entity found for alias: {alias_or_id}");
        return Resolution::none();
    }

    Resolution {
        primary: Some(matches[0].clone()),
        all_matches: matches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::EntityState;
    use crate::cache::CacheSnapshot;
    use serde_json::json;
    use std::sync::Arc;

    fn cache_with(states: Vec<EntityState>) -> EntityCache {
        let cache = EntityCache::new();
        cache.install(CacheSnapshot {
            entities: Arc::new(states),
            ..Default::default()
        });
        cache
    }

    fn entity(entity_id: &str, attributes: serde_json::Value) -> EntityState {
        EntityState {
            entity_id: entity_id.to_string(),
            state: "on".to_string(),
            attributes,
        }
    }

    #[test]
    fn test_dotted_input_bypasses_cache() {
        // no cache lookup at all, even on an empty cache
        let cache = EntityCache::new();
        let res = resolve(&cache, "switch.anything");
        assert_eq!(res.primary.as_deref(), Some("switch.anything"));
        assert_eq!(res.all_matches, vec!["switch.anything"]);
    }

    #[test]
    fn test_uninitialized_cache_resolves_to_nothing() {
        let cache = EntityCache::new();
        let res = resolve(&cache, "living room");
        assert!(res.primary.is_none());
        assert!(res.all_matches.is_empty());
    }

    #[test]
    fn test_friendly_name_match_case_insensitive() {
        let cache = cache_with(vec![entity(
            "light.living_room",
            json!({"friendly_name": "Living Room"}),
        )]);
        let res = resolve(&cache, "living room");
        assert_eq!(res.primary.as_deref(), Some("light.living_room"));
    }

    #[test]
    fn test_alias_attribute_match() {
        let cache = cache_with(vec![entity(
            "light.desk",
            json!({"friendly_name": "Desk", "aliases": ["lamp", "Desk Lamp"]}),
        )]);
        assert_eq!(
            resolve(&cache, "desk lamp").primary.as_deref(),
            Some("light.desk")
        );
        // single-string alias key
        let cache = cache_with(vec![entity("light.desk", json!({"alias": "lampy"}))]);
        assert_eq!(
            resolve(&cache, "LAMPY").primary.as_deref(),
            Some("light.desk")
        );
    }

    #[test]
    fn test_entity_id_suffix_match() {
        let cache = cache_with(vec![entity("light.living_room", json!({}))]);
        assert_eq!(
            resolve(&cache, "living_room").primary.as_deref(),
            Some("light.living_room")
        );
    }

    #[test]
    fn test_duplicate_names_first_inserted_wins() {
        let cache = cache_with(vec![
            entity("light.living_room", json!({"friendly_name": "Living Room"})),
            entity("light.bedroom", json!({"friendly_name": "Living Room"})),
        ]);
        let res = resolve(&cache, "Living Room");
        assert_eq!(res.primary.as_deref(), Some("light.living_room"));
        assert_eq!(res.all_matches.len(), 2);
        assert!(res.is_ambiguous());
    }

    #[test]
    fn test_matches_deduplicated() {
        // friendly name and id suffix both hit the same entity
        let cache = cache_with(vec![entity(
            "light.lamp",
            json!({"friendly_name": "lamp"}),
        )]);
        let res = resolve(&cache, "lamp");
        assert_eq!(res.all_matches, vec!["light.lamp"]);
        assert!(!res.is_ambiguous());
    }

    #[test]
    fn test_no_match() {
        let cache = cache_with(vec![entity("light.desk", json!({}))]);
        let res = resolve(&cache, "garage");
        assert!(res.primary.is_none());
        assert!(res.all_matches.is_empty());
    }
}
