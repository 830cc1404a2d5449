use crate::error::FetchError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tokio::sync::{mpsc, oneshot};

static PAREN_GROUPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]*\)").unwrap());

static GLOBAL_INDEX: OnceLock<ItemIdIndex> = OnceLock::new();

/// Immutable mapping of normalized item name -> candidate item ids, loaded
/// once per process from the bundled `data/items.json` resource. Keys use the
/// wiki's "Foo#Bar" disambiguator convention alongside plain names.
#[derive(Debug, Default)]
pub struct ItemIdIndex {
    index: HashMap<String, Vec<i32>>,
}

impl ItemIdIndex {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let raw: HashMap<String, Vec<i32>> = serde_json::from_str(json)?;
        let mut index = HashMap::with_capacity(raw.len());
        for (key, ids) in raw {
            if ids.is_empty() {
                continue;
            }
            index.insert(normalize(&key), ids);
        }
        Ok(Self { index })
    }

    fn load_bundled() -> Self {
        let json = include_str!("../data/items.json");
        match Self::from_json(json) {
            Ok(idx) => {
                tracing::info!("Loaded {} item-name keys from items.json", idx.len());
                idx
            }
            Err(e) => {
                tracing::error!("Failed to load bundled items.json: {}", e);
                Self::default()
            }
        }
    }

    /// Installs the bundled index as the process-wide instance. Idempotent;
    /// reads through [`ItemIdIndex::global`] are lock-free afterwards.
    pub fn init() {
        let _ = Self::global();
    }

    pub fn global() -> &'static ItemIdIndex {
        GLOBAL_INDEX.get_or_init(Self::load_bundled)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns candidate ids for an item name, trying several key variations:
    /// the exact normalized key, the "foo (bar)" -> "foo#(bar)" rewrite, the
    /// base name before a '#' disambiguator, and finally the name with all
    /// parenthetical groups stripped.
    pub fn find_ids_flex(&self, item_name: &str) -> &[i32] {
        if item_name.is_empty() {
            return &[];
        }
        let n = normalize(item_name);

        if let Some(ids) = self.index.get(&n) {
            return ids;
        }

        let hash_variant = to_hash_variant(&n);
        if hash_variant != n {
            if let Some(ids) = self.index.get(&hash_variant) {
                return ids;
            }
        }

        if let Some(hash) = n.find('#') {
            if hash > 0 {
                if let Some(ids) = self.index.get(n[..hash].trim()) {
                    return ids;
                }
            }
        }

        let paren_stripped = PAREN_GROUPS.replace_all(&n, "");
        let paren_stripped = paren_stripped.trim();
        if paren_stripped != n {
            if let Some(ids) = self.index.get(paren_stripped) {
                return ids;
            }
        }

        &[]
    }
}

fn normalize(s: &str) -> String {
    s.to_lowercase().replace('\u{00a0}', " ").trim().to_string()
}

/// Convert "foo (bar)" to "foo#(bar)" for keys that use hash disambiguators,
/// e.g. "adamant dagger (p++)" -> "adamant dagger#(p++)".
fn to_hash_variant(s: &str) -> String {
    if let Some(i) = s.find('(') {
        if i > 0 && s.ends_with(')') {
            return format!("{}#{}", s[..i].trim(), &s[i..]);
        }
    }
    s.to_string()
}

/// A tradeable item as the external catalog reports it.
#[derive(Debug, Clone)]
pub struct CatalogItem {
    pub id: i32,
    pub name: String,
}

/// The external item catalog. Canonicalization collapses noted/placeholder
/// variants to one representative id; search is restricted to tradeables.
///
/// Implementations are owned by a single resolver thread ([`ItemResolver`])
/// and are never called from anywhere else, so they need `Send` but not
/// `Sync`.
pub trait ItemCatalog: Send {
    fn canonicalize(&self, id: i32) -> i32;
    fn search_tradeable(&self, query: &str) -> Vec<CatalogItem>;
}

/// Catalog that canonicalizes to itself and finds nothing. Lets the CLI run
/// with the bundled index alone.
pub struct NullCatalog;

impl ItemCatalog for NullCatalog {
    fn canonicalize(&self, id: i32) -> i32 {
        id
    }

    fn search_tradeable(&self, _query: &str) -> Vec<CatalogItem> {
        Vec::new()
    }
}

/// Picks the most suitable id from a candidate set, preferring ids that are
/// already canonical (not noted/placeholder variants). Falls back to the
/// canonicalized first candidate, then the first candidate verbatim.
pub fn pick_best_id(catalog: &dyn ItemCatalog, candidates: &[i32]) -> i32 {
    let Some(&fallback) = candidates.first() else {
        return 0;
    };

    let mut first_canonical = 0;
    for &id in candidates {
        let canon = catalog.canonicalize(id);
        if first_canonical == 0 {
            first_canonical = canon;
        }
        if canon == id {
            return id;
        }
    }

    if first_canonical != 0 {
        first_canonical
    } else {
        fallback
    }
}

/// Resolve an item display name to a canonical id: the static index first
/// (handles non-tradeables), then the catalog's tradeable search. Returns 0
/// for empty names, known non-items and anything unresolved.
pub fn resolve_item_id(index: &ItemIdIndex, catalog: &dyn ItemCatalog, item_name: &str) -> i32 {
    if item_name.is_empty() {
        return 0;
    }
    let lower = item_name.trim().to_lowercase();
    if lower == "nothing" || lower == "unknown" {
        return 0;
    }

    let candidates = index.find_ids_flex(item_name);
    if !candidates.is_empty() {
        let best = pick_best_id(catalog, candidates);
        if best > 0 {
            return catalog.canonicalize(best);
        }
    }

    for item in catalog.search_tradeable(item_name) {
        if item.name.eq_ignore_ascii_case(item_name) {
            return catalog.canonicalize(item.id);
        }
    }

    0
}

struct ResolveJob {
    names: Vec<String>,
    reply: oneshot::Sender<Vec<i32>>,
}

/// Owner execution context for the item catalog. One named thread owns the
/// catalog; fetch pipelines hand it a batch of item names and await the ids.
/// Dropping the last handle closes the channel and the thread exits.
#[derive(Clone)]
pub struct ItemResolver {
    tx: mpsc::UnboundedSender<ResolveJob>,
}

impl ItemResolver {
    pub fn spawn(catalog: Box<dyn ItemCatalog>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ResolveJob>();
        std::thread::Builder::new()
            .name("item-resolver".to_string())
            .spawn(move || {
                let index = ItemIdIndex::global();
                while let Some(job) = rx.blocking_recv() {
                    let ids = job
                        .names
                        .iter()
                        .map(|name| resolve_item_id(index, &*catalog, name))
                        .collect();
                    // receiver may have given up; nothing to do then
                    let _ = job.reply.send(ids);
                }
            })
            .expect("failed to spawn item-resolver thread");
        Self { tx }
    }

    /// Resolve a batch of item names on the owner thread. Ids come back in
    /// input order, 0 for anything unresolved.
    pub async fn resolve_batch(&self, names: Vec<String>) -> Result<Vec<i32>, FetchError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ResolveJob { names, reply })
            .map_err(|_| FetchError::ResolverGone)?;
        rx.await.map_err(|_| FetchError::ResolverGone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_index() -> ItemIdIndex {
        ItemIdIndex::from_json(
            r#"{
                "Bones": [526],
                "Coins": [995],
                "Adamant dagger#(p++)": [5696],
                "Yew logs": [1516, 1515],
                "Grimy ranarr weed": [207],
                "Rune scimitar": [1333]
            }"#,
        )
        .unwrap()
    }

    /// Canonicalizes noted ids (odd test ids map down by one) and answers a
    /// fixed tradeable search.
    struct TestCatalog;

    impl ItemCatalog for TestCatalog {
        fn canonicalize(&self, id: i32) -> i32 {
            // 1516 is the noted form of 1515
            if id == 1516 {
                1515
            } else {
                id
            }
        }

        fn search_tradeable(&self, query: &str) -> Vec<CatalogItem> {
            if query.eq_ignore_ascii_case("abyssal whip") {
                vec![CatalogItem {
                    id: 4151,
                    name: "Abyssal whip".to_string(),
                }]
            } else {
                Vec::new()
            }
        }
    }

    #[test]
    fn test_find_ids_exact() {
        let idx = test_index();
        assert_eq!(idx.find_ids_flex("Bones"), &[526]);
        assert_eq!(idx.find_ids_flex("bones"), &[526]);
    }

    #[test]
    fn test_find_ids_nbsp_normalized() {
        let idx = test_index();
        assert_eq!(idx.find_ids_flex("Grimy\u{00a0}ranarr weed"), &[207]);
    }

    #[test]
    fn test_find_ids_hash_variant() {
        let idx = test_index();
        assert_eq!(idx.find_ids_flex("Adamant dagger (p++)"), &[5696]);
    }

    #[test]
    fn test_find_ids_hash_truncation() {
        let idx = test_index();
        assert_eq!(idx.find_ids_flex("Rune scimitar#Trailblazer"), &[1333]);
    }

    #[test]
    fn test_find_ids_paren_stripped() {
        let idx = test_index();
        assert_eq!(idx.find_ids_flex("Coins (lots)"), &[995]);
    }

    #[test]
    fn test_find_ids_unknown() {
        let idx = test_index();
        assert!(idx.find_ids_flex("Definitely not an item").is_empty());
        assert!(idx.find_ids_flex("").is_empty());
    }

    #[test]
    fn test_pick_best_prefers_already_canonical() {
        // 1516 canonicalizes to 1515, 1515 is already canonical
        assert_eq!(pick_best_id(&TestCatalog, &[1516, 1515]), 1515);
    }

    #[test]
    fn test_pick_best_falls_back_to_first_canonicalized() {
        assert_eq!(pick_best_id(&TestCatalog, &[1516]), 1515);
    }

    #[test]
    fn test_pick_best_empty() {
        assert_eq!(pick_best_id(&TestCatalog, &[]), 0);
    }

    #[test]
    fn test_resolve_skips_non_items() {
        let idx = test_index();
        assert_eq!(resolve_item_id(&idx, &TestCatalog, "Nothing"), 0);
        assert_eq!(resolve_item_id(&idx, &TestCatalog, "UNKNOWN"), 0);
        assert_eq!(resolve_item_id(&idx, &TestCatalog, ""), 0);
    }

    #[test]
    fn test_resolve_via_index() {
        let idx = test_index();
        assert_eq!(resolve_item_id(&idx, &TestCatalog, "Bones"), 526);
        // noted candidate first in the index entry, canonical id wins
        assert_eq!(resolve_item_id(&idx, &TestCatalog, "Yew logs"), 1515);
    }

    #[test]
    fn test_resolve_via_catalog_search_fallback() {
        let idx = test_index();
        assert_eq!(resolve_item_id(&idx, &TestCatalog, "Abyssal whip"), 4151);
    }

    #[test]
    fn test_resolve_unknown_is_zero() {
        let idx = test_index();
        assert_eq!(resolve_item_id(&idx, &TestCatalog, "Imaginary sword"), 0);
    }

    #[test]
    fn test_bundled_index_loads() {
        assert!(!ItemIdIndex::global().is_empty());
    }

    #[tokio::test]
    async fn test_resolver_batch_roundtrip() {
        let resolver = ItemResolver::spawn(Box::new(NullCatalog));
        let ids = resolver
            .resolve_batch(vec!["Bones".to_string(), "Nothing".to_string()])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], 526);
        assert_eq!(ids[1], 0);
    }
}
