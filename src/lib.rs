//! Wiki-backed NPC drop table lookup.
//!
//! A request for a creature enters [`cache::DropCache::get`]; on a miss
//! [`wiki::DropFetcher`] fetches and parses the wiki page, item names are
//! resolved on the [`items::ItemResolver`] owner thread, and the finished
//! record is cached and shared with every concurrent caller.
//! [`search::NpcSearchService`] sits on top and turns free-text queries into
//! ranked results.

pub mod cache;
pub mod drops;
pub mod error;
pub mod items;
pub mod rarity;
pub mod search;
pub mod wiki;

pub use cache::{DropCache, FetchOutcome};
pub use drops::{dedupe_and_sort, DropItem, DropTableSection, NpcDropData};
pub use error::FetchError;
pub use items::{CatalogItem, ItemCatalog, ItemIdIndex, ItemResolver, NullCatalog};
pub use search::NpcSearchService;
pub use wiki::{DropFetcher, DEFAULT_WIKI_BASE};
