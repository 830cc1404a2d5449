use crate::rarity;
use serde::{Deserialize, Serialize};

/// One row of a drop table. `item_id` is 0 until (or unless) the name
/// resolves against the item index; unresolved items are filtered out by
/// [`dedupe_and_sort`], never treated as fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropItem {
    pub item_id: i32,
    pub name: String,
    pub rarity: String,
}

impl DropItem {
    pub fn new(item_id: i32, name: impl Into<String>, rarity: impl Into<String>) -> Self {
        Self {
            item_id,
            name: name.into(),
            rarity: rarity.into(),
        }
    }

    /// Normalized "1/N" rendering of the raw rarity text.
    pub fn one_over_rarity(&self) -> String {
        rarity::normalize(&self.rarity)
    }

    /// Numeric denominator used for most-common-first ordering.
    pub fn rarity_value(&self) -> f64 {
        rarity::sort_key(&self.rarity)
    }
}

/// A named drop-table block as it appears on the page, e.g. "Drops" or
/// "Rare drop table".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropTableSection {
    pub header: String,
    pub items: Vec<DropItem>,
}

/// Resolved drop data for one creature. A record with no sections means "no
/// drop table" and is never constructed; fetches surface that case as `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpcDropData {
    pub npc_id: i32,
    pub name: String,
    pub level: i32,
    pub sections: Vec<DropTableSection>,
}

impl NpcDropData {
    /// All items across every section, in page order.
    pub fn all_items(&self) -> impl Iterator<Item = &DropItem> {
        self.sections.iter().flat_map(|s| s.items.iter())
    }
}

/// Deduplicates drops by item id and optionally sorts them by rarity.
///
/// Items with id <= 0 (unresolved) are dropped. The first occurrence per id
/// wins, in insertion order. With `sort_by_rarity` the result runs from most
/// common to rarest, ties broken by ascending item id; without it the result
/// is ordered by item id alone.
pub fn dedupe_and_sort(drops: &[DropItem], sort_by_rarity: bool) -> Vec<DropItem> {
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<DropItem> = drops
        .iter()
        .filter(|d| d.item_id > 0)
        .filter(|d| seen.insert(d.item_id))
        .cloned()
        .collect();

    if sort_by_rarity {
        out.sort_by(|a, b| {
            a.rarity_value()
                .total_cmp(&b.rarity_value())
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
    } else {
        out.sort_by_key(|d| d.item_id);
    }
    out
}
