use crate::drops::{DropItem, DropTableSection, NpcDropData};
use crate::error::FetchError;
use crate::items::ItemResolver;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const DEFAULT_WIKI_BASE: &str = "https://oldschool.runescape.wiki";

const USER_AGENT: &str = "loot-ledger/0.1.0";
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
// bounded pool for concurrent fetch+parse work
const FETCH_CONCURRENCY: usize = 4;
const SEARCH_LIMIT: usize = 20;

static SEL_DROP_TABLES: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table.item-drops").unwrap());
static SEL_ROWS: Lazy<Selector> = Lazy::new(|| Selector::parse("tbody > tr").unwrap());
static SEL_TD: Lazy<Selector> = Lazy::new(|| Selector::parse("td").unwrap());
static SEL_TH: Lazy<Selector> = Lazy::new(|| Selector::parse("th").unwrap());
static SEL_TR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static SEL_HEADING: Lazy<Selector> = Lazy::new(|| Selector::parse("h1#firstHeading").unwrap());
static SEL_INFOBOX: Lazy<Selector> = Lazy::new(|| Selector::parse("table.infobox").unwrap());
static SEL_CANONICAL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"link[rel="canonical"]"#).unwrap());

/// Retrieves NPC drop information from the wiki and resolves item + NPC ids.
pub struct DropFetcher {
    client: reqwest::Client,
    wiki_base: String,
    resolver: ItemResolver,
    permits: Semaphore,
}

/// Everything extracted from one page in a single pass. The parse is fully
/// synchronous; `scraper::Html` is not `Send` and never crosses an await.
struct ParsedPage {
    name: String,
    level: i32,
    canonical_title: Option<String>,
    sections: Vec<DropTableSection>,
}

impl DropFetcher {
    pub fn new(wiki_base: impl Into<String>, resolver: ItemResolver) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            wiki_base: wiki_base.into(),
            resolver,
            permits: Semaphore::new(FETCH_CONCURRENCY),
        })
    }

    /// Fetch an NPC's drop table. `Ok(None)` means the page exists but has
    /// no drop table; that is a valid outcome, not an error, and must not be
    /// cached as a positive record.
    pub async fn fetch(
        &self,
        npc_id: i32,
        name: &str,
        level: i32,
    ) -> Result<Option<NpcDropData>, FetchError> {
        let url = self.lookup_url(npc_id, name);

        let parsed = {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| FetchError::Http("fetch pool closed".to_string()))?;
            let html = self.fetch_html(&url).await?;
            parse_page(&html, name, level)
        };

        if parsed.sections.is_empty() {
            tracing::debug!("No drop tables on page for {:?} (id {})", name, npc_id);
            return Ok(None);
        }

        let resolved_id = match &parsed.canonical_title {
            Some(title) => self.resolve_page_id(title).await,
            None => 0,
        };

        let mut sections = parsed.sections;
        let names: Vec<String> = sections
            .iter()
            .flat_map(|s| s.items.iter())
            .map(|d| d.name.clone())
            .collect();
        let ids = self.resolver.resolve_batch(names).await?;

        let mut ids = ids.into_iter();
        for section in &mut sections {
            for item in &mut section.items {
                item.item_id = ids.next().unwrap_or(0);
            }
        }

        Ok(Some(NpcDropData {
            npc_id: resolved_id,
            name: parsed.name,
            level: parsed.level,
            sections,
        }))
    }

    /// Query the wiki's opensearch endpoint for page titles matching the
    /// text. Titles come back verbatim, best match first.
    pub async fn search_npc_names(&self, query: &str) -> Result<Vec<String>, FetchError> {
        let url = format!(
            "{}/api.php?action=opensearch&format=json&limit={}&namespace=0&search={}",
            self.wiki_base,
            SEARCH_LIMIT,
            urlencoding::encode(query)
        );

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status {
                status: resp.status().as_u16(),
                url,
            });
        }

        let body: serde_json::Value = resp.json().await?;
        let titles = body
            .get(1)
            .and_then(|v| v.as_array())
            .ok_or_else(|| FetchError::Malformed(url))?;

        Ok(titles
            .iter()
            .filter_map(|t| t.as_str().map(str::to_string))
            .collect())
    }

    /// Resolve the canonical page id for a wiki title. Non-fatal: any
    /// failure degrades to 0 so the fetch still completes.
    async fn resolve_page_id(&self, title: &str) -> i32 {
        let url = format!(
            "{}/api.php?action=query&format=json&prop=info&titles={}",
            self.wiki_base,
            urlencoding::encode(title)
        );

        match self.page_id_query(&url).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("Failed to resolve page id for {}: {}", title, e);
                0
            }
        }
    }

    async fn page_id_query(&self, url: &str) -> Result<i32, FetchError> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        let pages = body
            .get("query")
            .and_then(|q| q.get("pages"))
            .and_then(|p| p.as_object())
            .ok_or_else(|| FetchError::Malformed(url.to_string()))?;

        for page in pages.values() {
            if let Some(id) = page.get("pageid").and_then(|v| v.as_i64()) {
                return Ok(id as i32);
            }
        }

        Err(FetchError::Malformed(url.to_string()))
    }

    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp.text().await?)
    }

    fn lookup_url(&self, npc_id: i32, name: &str) -> String {
        let mut url = format!("{}/w/Special:Lookup?type=npc", self.wiki_base);
        if npc_id > 0 {
            url.push_str(&format!("&id={}", npc_id));
        }
        let encoded = urlencoding::encode(&name.replace(' ', "_")).into_owned();
        if !encoded.is_empty() {
            url.push_str("&name=");
            url.push_str(&encoded);
        }
        url.push_str("#Drops");
        url
    }
}

fn parse_page(html: &str, requested_name: &str, requested_level: i32) -> ParsedPage {
    let doc = Html::parse_document(html);

    let name = doc
        .select(&SEL_HEADING)
        .next()
        .map(|h| element_text(&h))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| requested_name.to_string());

    let level = if requested_level > 0 {
        requested_level
    } else {
        parse_combat_level(&doc)
    };

    let canonical_title = doc
        .select(&SEL_CANONICAL)
        .next()
        .and_then(|link| link.value().attr("href"))
        .and_then(canonical_title_from_href);

    ParsedPage {
        name,
        level,
        canonical_title,
        sections: parse_sections(&doc),
    }
}

/// Extract one `DropTableSection` per drop table. The section header is the
/// nearest preceding h2-h4 sibling; rows need at least 6 cells, with the
/// item name in the second and the raw rarity in the fourth.
fn parse_sections(doc: &Html) -> Vec<DropTableSection> {
    let mut sections = Vec::new();

    for table in doc.select(&SEL_DROP_TABLES) {
        let header = section_header(table);

        let mut items = Vec::new();
        for row in table.select(&SEL_ROWS) {
            let tds: Vec<ElementRef> = row.select(&SEL_TD).collect();
            if tds.len() < 6 {
                continue;
            }
            let name = element_text(&tds[1]).replace("(m)", "").trim().to_string();
            if name.eq_ignore_ascii_case("nothing") {
                continue;
            }
            let rarity = element_text(&tds[3]);
            items.push(DropItem::new(0, name, rarity));
        }

        if !items.is_empty() {
            sections.push(DropTableSection { header, items });
        }
    }

    sections
}

fn section_header(table: ElementRef) -> String {
    for sibling in table.prev_siblings() {
        if let Some(el) = ElementRef::wrap(sibling) {
            if matches!(el.value().name(), "h2" | "h3" | "h4") {
                return element_text(&el);
            }
        }
    }
    "Drops".to_string()
}

fn parse_combat_level(doc: &Html) -> i32 {
    let Some(infobox) = doc.select(&SEL_INFOBOX).next() else {
        return 0;
    };

    for row in infobox.select(&SEL_TR) {
        let (Some(th), Some(td)) = (
            row.select(&SEL_TH).next(),
            row.select(&SEL_TD).next(),
        ) else {
            continue;
        };
        if !element_text(&th).to_lowercase().contains("combat level") {
            continue;
        }
        let value = element_text(&td);
        for part in value.split(|c: char| !c.is_ascii_digit()) {
            if part.is_empty() {
                continue;
            }
            if let Ok(level) = part.parse() {
                return level;
            }
        }
    }

    0
}

/// The canonical link ends in the page title; percent-decode it and restore
/// the wiki's underscore convention.
fn canonical_title_from_href(href: &str) -> Option<String> {
    let segment = href.rsplit('/').next()?;
    if segment.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(segment).ok()?;
    Some(decoded.replace(' ', "_"))
}

fn element_text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <html><head>
            <link rel="canonical" href="https://wiki.example/w/Giant_rat"/>
        </head><body>
            <h1 id="firstHeading">Giant rat</h1>
            <table class="infobox">
                <tr><th>Combat level</th><td>3, 6, 12</td></tr>
            </table>
            <h2>Drops</h2>
            <table class="item-drops"><tbody>
                <tr>
                    <td>img</td><td>Bones</td><td>1</td><td>Always</td><td>-</td><td>-</td>
                </tr>
                <tr>
                    <td>img</td><td>Nothing</td><td>1</td><td>1/2</td><td>-</td><td>-</td>
                </tr>
                <tr>
                    <td>img</td><td>Coins (m)</td><td>5</td><td>2/128</td><td>-</td><td>-</td>
                </tr>
                <tr>
                    <td>short</td><td>row</td>
                </tr>
            </tbody></table>
            <h3>Rare drop table</h3>
            <table class="item-drops"><tbody>
                <tr>
                    <td>img</td><td>Rune scimitar</td><td>1</td><td>1/1024</td><td>-</td><td>-</td>
                </tr>
            </tbody></table>
        </body></html>
    "##;

    #[test]
    fn test_parse_page_heading_and_level() {
        let parsed = parse_page(PAGE, "requested", 0);
        assert_eq!(parsed.name, "Giant rat");
        assert_eq!(parsed.level, 3);
    }

    #[test]
    fn test_parse_page_caller_level_wins() {
        let parsed = parse_page(PAGE, "requested", 12);
        assert_eq!(parsed.level, 12);
    }

    #[test]
    fn test_parse_page_canonical_title() {
        let parsed = parse_page(PAGE, "", 0);
        assert_eq!(parsed.canonical_title.as_deref(), Some("Giant_rat"));
    }

    #[test]
    fn test_parse_sections_headers_and_rows() {
        let parsed = parse_page(PAGE, "", 0);
        assert_eq!(parsed.sections.len(), 2);
        assert_eq!(parsed.sections[0].header, "Drops");
        assert_eq!(parsed.sections[1].header, "Rare drop table");

        // "Nothing" and the short row are skipped, "(m)" is stripped
        let names: Vec<&str> = parsed.sections[0]
            .items
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["Bones", "Coins"]);
        assert_eq!(parsed.sections[0].items[1].rarity, "2/128");
    }

    #[test]
    fn test_parse_page_without_drop_tables() {
        let html = "<html><body><h1 id=\"firstHeading\">Banker</h1></body></html>";
        let parsed = parse_page(html, "Banker", 0);
        assert!(parsed.sections.is_empty());
        assert_eq!(parsed.level, 0);
    }

    #[test]
    fn test_parse_page_falls_back_to_requested_name() {
        let html = "<html><body><p>no heading</p></body></html>";
        let parsed = parse_page(html, "Zulrah", 0);
        assert_eq!(parsed.name, "Zulrah");
    }

    #[test]
    fn test_header_defaults_when_no_preceding_heading() {
        let html = r#"<html><body>
            <table class="item-drops"><tbody>
                <tr><td>i</td><td>Bones</td><td>1</td><td>Always</td><td>-</td><td>-</td></tr>
            </tbody></table>
        </body></html>"#;
        let parsed = parse_page(html, "", 0);
        assert_eq!(parsed.sections[0].header, "Drops");
    }

    #[test]
    fn test_canonical_title_decodes_percent_escapes() {
        assert_eq!(
            canonical_title_from_href("https://wiki.example/w/King%27s_messenger").as_deref(),
            Some("King's_messenger")
        );
        assert_eq!(canonical_title_from_href("https://wiki.example/w/"), None);
    }
}
