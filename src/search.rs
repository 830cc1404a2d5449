use crate::cache::DropCache;
use crate::drops::NpcDropData;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

static ID_LEVEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+)\s+(?:lvl|level)?\s*(\d+)$").unwrap());
static NAME_LVL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.*)\s+(?:lvl|level)\s*(\d+)$").unwrap());
static LVL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:lvl|level)\s*(\d+)\s+(.*)$").unwrap());
static NAME_NUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.*\D)\s+(\d+)$").unwrap());
static NUM_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\s+(\D.*)$").unwrap());
static PURE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

const NAME_FETCH_LIMIT: usize = 10;

#[derive(Debug, Default, PartialEq, Eq)]
struct ParsedQuery {
    npc_id: Option<i32>,
    level: Option<i32>,
    name: Option<String>,
}

/// Break a free-text query into id, level and name-fragment parts. First
/// matching pattern wins; anything unmatched is a plain name.
fn parse(query: &str) -> Option<ParsedQuery> {
    let s = query.trim();
    if s.is_empty() {
        return None;
    }

    if PURE_ID.is_match(s) {
        return Some(ParsedQuery {
            npc_id: s.parse().ok(),
            ..Default::default()
        });
    }

    if let Some(caps) = ID_LEVEL.captures(s) {
        return Some(ParsedQuery {
            npc_id: caps[1].parse().ok(),
            level: caps[2].parse().ok(),
            name: None,
        });
    }

    if let Some(caps) = NAME_LVL.captures(s) {
        return Some(ParsedQuery {
            npc_id: None,
            level: caps[2].parse().ok(),
            name: Some(caps[1].trim().to_string()),
        });
    }

    if let Some(caps) = LVL_NAME.captures(s) {
        return Some(ParsedQuery {
            npc_id: None,
            level: caps[1].parse().ok(),
            name: Some(caps[2].trim().to_string()),
        });
    }

    // trailing number reads as a level
    if let Some(caps) = NAME_NUM.captures(s) {
        return Some(ParsedQuery {
            npc_id: None,
            level: caps[2].parse().ok(),
            name: Some(caps[1].trim().to_string()),
        });
    }

    // leading number reads as a level
    if let Some(caps) = NUM_NAME.captures(s) {
        return Some(ParsedQuery {
            npc_id: None,
            level: caps[1].parse().ok(),
            name: Some(caps[2].trim().to_string()),
        });
    }

    Some(ParsedQuery {
        npc_id: None,
        level: None,
        name: Some(s.to_string()),
    })
}

/// Fuzzy search over NPC drop data. Candidate titles come from the wiki
/// search endpoint, misses fall through the cache to a page fetch, results
/// without drop tables are discarded and candidate lookups run in parallel.
pub struct NpcSearchService {
    cache: Arc<DropCache>,
}

impl NpcSearchService {
    pub fn new(cache: Arc<DropCache>) -> Self {
        Self { cache }
    }

    /// Search by partial name, level or id, best match first. Individual
    /// candidate failures never abort the overall search.
    pub async fn search(&self, query: &str) -> Vec<Arc<NpcDropData>> {
        let Some(pq) = parse(query) else {
            return Vec::new();
        };

        // name only: rank all candidates by edit distance
        if pq.npc_id.is_none() && pq.level.is_none() {
            if let Some(name) = pq.name.as_deref() {
                let titles = match self.cache.search_names(name).await {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!("Name search failed for {:?}: {}", name, e);
                        Vec::new()
                    }
                };
                let fetched = self.fetch_all(titles, 0).await;
                return rank_by_distance(dedupe_by_id(fetched), name);
            }
        }

        // id only: a single direct lookup
        if let (Some(id), None) = (pq.npc_id, pq.name.as_ref()) {
            let level = pq.level.unwrap_or(0);
            return match self.cache.get(id, "", level).await {
                Ok(Some(data)) if !data.sections.is_empty() => vec![data],
                Ok(_) => Vec::new(),
                Err(e) => {
                    tracing::warn!("Lookup failed for id {}: {}", id, e);
                    Vec::new()
                }
            };
        }

        // mixed or partial: candidate fetch plus exact id/level filters
        let name_filter = pq.name.clone().unwrap_or_default();
        let level_filter = pq.level.unwrap_or(-1);

        let candidates = self
            .cache
            .search_names(&name_filter)
            .await
            .unwrap_or_default();
        let mut all = self.fetch_all(candidates, level_filter.max(0)).await;

        if let Some(id) = pq.npc_id {
            all.retain(|d| d.npc_id == id);
        }

        let mut deduped = dedupe_by_id(all);
        deduped.retain(|d| level_filter < 0 || d.level == level_filter);
        rank_by_distance(deduped, &name_filter)
    }

    /// Fetch drop data for candidate titles concurrently. Each failure is
    /// converted to "no candidate"; the gather waits for every fetch.
    async fn fetch_all(&self, names: Vec<String>, level: i32) -> Vec<Arc<NpcDropData>> {
        let lookups: Vec<_> = names
            .into_iter()
            .take(NAME_FETCH_LIMIT)
            .map(|name| {
                let cache = Arc::clone(&self.cache);
                async move { cache.get(0, &name, level).await }
            })
            .collect();

        futures::future::join_all(lookups)
            .await
            .into_iter()
            .filter_map(|outcome| match outcome {
                Ok(data) => data,
                Err(e) => {
                    tracing::debug!("Candidate fetch failed: {}", e);
                    None
                }
            })
            .filter(|d| !d.sections.is_empty())
            .collect()
    }
}

/// Keep the first occurrence per NPC id, in insertion order.
fn dedupe_by_id(list: Vec<Arc<NpcDropData>>) -> Vec<Arc<NpcDropData>> {
    let mut seen = HashSet::new();
    list.into_iter().filter(|d| seen.insert(d.npc_id)).collect()
}

fn rank_by_distance(mut list: Vec<Arc<NpcDropData>>, query_name: &str) -> Vec<Arc<NpcDropData>> {
    let key = query_name.to_lowercase();
    list.sort_by_key(|d| strsim::levenshtein(&d.name.to_lowercase(), &key));
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drops::{DropItem, DropTableSection};

    fn record(npc_id: i32, name: &str, level: i32) -> Arc<NpcDropData> {
        Arc::new(NpcDropData {
            npc_id,
            name: name.to_string(),
            level,
            sections: vec![DropTableSection {
                header: "Drops".to_string(),
                items: vec![DropItem::new(526, "Bones", "Always")],
            }],
        })
    }

    #[test]
    fn test_parse_pure_id() {
        let pq = parse("725").unwrap();
        assert_eq!(pq.npc_id, Some(725));
        assert_eq!(pq.level, None);
        assert_eq!(pq.name, None);
    }

    #[test]
    fn test_parse_id_and_level() {
        let pq = parse("2042 lvl 725").unwrap();
        assert_eq!(pq.npc_id, Some(2042));
        assert_eq!(pq.level, Some(725));

        let pq = parse("2042 725").unwrap();
        assert_eq!(pq.npc_id, Some(2042));
        assert_eq!(pq.level, Some(725));
    }

    #[test]
    fn test_parse_name_then_lvl_keyword() {
        let pq = parse("Vorkath level 392").unwrap();
        assert_eq!(pq.name.as_deref(), Some("Vorkath"));
        assert_eq!(pq.level, Some(392));
    }

    #[test]
    fn test_parse_lvl_keyword_then_name() {
        let pq = parse("lvl 200 Vorkath").unwrap();
        assert_eq!(pq.level, Some(200));
        assert_eq!(pq.name.as_deref(), Some("Vorkath"));
    }

    #[test]
    fn test_parse_trailing_number_is_level() {
        let pq = parse("Zulrah 725").unwrap();
        assert_eq!(pq.name.as_deref(), Some("Zulrah"));
        assert_eq!(pq.level, Some(725));
    }

    #[test]
    fn test_parse_leading_number_is_level() {
        let pq = parse("3 Goblin").unwrap();
        assert_eq!(pq.level, Some(3));
        assert_eq!(pq.name.as_deref(), Some("Goblin"));
    }

    #[test]
    fn test_parse_plain_name() {
        let pq = parse("  King Black Dragon ").unwrap();
        assert_eq!(pq.name.as_deref(), Some("King Black Dragon"));
        assert_eq!(pq.npc_id, None);
        assert_eq!(pq.level, None);
    }

    #[test]
    fn test_parse_empty_query() {
        assert!(parse("").is_none());
        assert!(parse("   ").is_none());
    }

    #[test]
    fn test_dedupe_by_id_first_wins() {
        let list = vec![record(1, "Goblin", 2), record(2, "Imp", 7), record(1, "Goblin copy", 2)];
        let out = dedupe_by_id(list);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "Goblin");
        assert_eq!(out[1].name, "Imp");
    }

    #[test]
    fn test_rank_by_distance_orders_closest_first() {
        let list = vec![record(1, "Zulrah the snake", 725), record(2, "Zulrah", 725)];
        let out = rank_by_distance(list, "zulrah");
        assert_eq!(out[0].name, "Zulrah");
    }

    #[test]
    fn test_levenshtein_sanity() {
        assert_eq!(strsim::levenshtein("abc", "abd"), 1);
        assert_eq!(strsim::levenshtein("x", "x"), 0);
    }
}
