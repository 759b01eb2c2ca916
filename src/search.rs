//! Entity search for the `/search` command
//!
//! Substring matches on entity id, friendly name and aliases come first,
//! in cache order. When nothing matches literally, a skim-scored fuzzy pass
//! over the same fields catches typos. Results are capped so a broad query
//! cannot flood a chat group.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::cache::EntityCache;

/// Maximum hits returned to the chat
pub const MAX_RESULTS: usize = 20;

/// Minimum skim score for a fuzzy hit to count
const MIN_FUZZY_SCORE: i64 = 50;

/// One search hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub entity_id: String,
    /// Falls back to the entity id when the entity has no friendly name
    pub friendly_name: String,
}

/// Search outcome, with a flag telling the caller the list was cut short
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub truncated: bool,
}

/// Search cached entities for `query`.
///
/// An uninitialized cache yields no hits.
pub fn search_entities(cache: &EntityCache, query: &str) -> SearchResults {
    let Some(entities) = cache.entities() else {
        return SearchResults {
            hits: Vec::new(),
            truncated: false,
        };
    };

    let query_lower = query.to_lowercase();
    let mut hits: Vec<SearchHit> = Vec::new();
    let mut truncated = false;

    for state in entities.iter() {
        let friendly = state
            .friendly_name()
            .unwrap_or(&state.entity_id)
            .to_string();

        let matched = state.entity_id.to_lowercase().contains(&query_lower)
            || friendly.to_lowercase().contains(&query_lower)
            || state
                .aliases()
                .iter()
                .any(|a| a.to_lowercase().contains(&query_lower));

        if matched {
            if hits.len() == MAX_RESULTS {
                truncated = true;
                break;
            }
            hits.push(SearchHit {
                entity_id: state.entity_id.clone(),
                friendly_name: friendly,
            });
        }
    }

    if !hits.is_empty() {
        return SearchResults { hits, truncated };
    }

    // No literal hit anywhere, fall back to typo-tolerant scoring
    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, SearchHit)> = Vec::new();

    for state in entities.iter() {
        let friendly = state
            .friendly_name()
            .unwrap_or(&state.entity_id)
            .to_string();

        let score = [state.entity_id.as_str(), friendly.as_str()]
            .iter()
            .filter_map(|field| matcher.fuzzy_match(field, query))
            .max();

        if let Some(score) = score {
            if score >= MIN_FUZZY_SCORE {
                scored.push((
                    score,
                    SearchHit {
                        entity_id: state.entity_id.clone(),
                        friendly_name: friendly,
                    },
                ));
            }
        }
    }

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    let truncated = scored.len() > MAX_RESULTS;
    scored.truncate(MAX_RESULTS);

    SearchResults {
        hits: scored.into_iter().map(|(_, hit)| hit).collect(),
        truncated,
    }
}
