use anyhow::Result;
use clap::{Parser, Subcommand};
use loot_ledger::{
    dedupe_and_sort, DropCache, DropFetcher, ItemIdIndex, ItemResolver, NpcDropData,
    NpcSearchService, NullCatalog, DEFAULT_WIKI_BASE,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loot-ledger")]
#[command(about = "Look up NPC drop tables from the wiki, with fuzzy NPC search")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Wiki base URL
    #[arg(long, global = true, default_value = DEFAULT_WIKI_BASE)]
    wiki_base: String,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuzzy-search NPCs by name, level and/or id (e.g. "Zulrah 725", "lvl 2 goblin")
    Search {
        /// Search query
        query: String,

        /// Number of results (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch one NPC's drop tables by numeric id or exact name
    Drops {
        /// NPC id or name
        target: String,

        /// Combat level hint for ambiguous names
        #[arg(short, long, default_value = "0")]
        level: i32,

        /// Merge all sections into one deduplicated list
        #[arg(long)]
        flat: bool,

        /// With --flat, order by item id instead of rarity
        #[arg(long)]
        no_sort: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List wiki page titles matching a query
    Names {
        /// Search query
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("loot_ledger=debug,info")
    } else {
        EnvFilter::new("loot_ledger=info,warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    ItemIdIndex::init();
    let resolver = ItemResolver::spawn(Box::new(NullCatalog));
    let fetcher = Arc::new(DropFetcher::new(cli.wiki_base, resolver)?);
    let cache = Arc::new(DropCache::new(fetcher));

    match cli.command {
        Commands::Search { query, limit, json } => {
            let service = NpcSearchService::new(Arc::clone(&cache));
            let results = service.search(&query).await;
            let results: Vec<_> = results.into_iter().take(limit).collect();

            if json {
                let records: Vec<&NpcDropData> = results.iter().map(|r| r.as_ref()).collect();
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if results.is_empty() {
                println!("No NPCs with drop tables matched {:?}.", query);
            } else {
                for (i, r) in results.iter().enumerate() {
                    let items: usize = r.sections.iter().map(|s| s.items.len()).sum();
                    println!(
                        "{}. {} (level {}, id {}) - {} section(s), {} drop(s)",
                        i + 1,
                        r.name,
                        r.level,
                        r.npc_id,
                        r.sections.len(),
                        items
                    );
                }
            }
        }
        Commands::Drops {
            target,
            level,
            flat,
            no_sort,
            json,
        } => {
            let (id, name) = match target.parse::<i32>() {
                Ok(id) => (id, String::new()),
                Err(_) => (0, target.clone()),
            };

            match cache.get(id, &name, level).await? {
                None => {
                    eprintln!("No drop table found for {:?}.", target);
                    std::process::exit(1);
                }
                Some(data) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(data.as_ref())?);
                    } else {
                        print_drops(&data, flat, !no_sort);
                    }
                }
            }
        }
        Commands::Names { query } => {
            let names = cache.search_names(&query).await?;
            if names.is_empty() {
                println!("No titles matched {:?}.", query);
            } else {
                for name in names {
                    println!("{}", name);
                }
            }
        }
    }

    Ok(())
}

fn print_drops(data: &NpcDropData, flat: bool, sort_by_rarity: bool) {
    println!("{} (level {}, id {})", data.name, data.level, data.npc_id);

    if flat {
        let all: Vec<_> = data.all_items().cloned().collect();
        for item in dedupe_and_sort(&all, sort_by_rarity) {
            println!("  {:<40} {}", item.name, item.one_over_rarity());
        }
        return;
    }

    for section in &data.sections {
        println!("\n{}", section.header);
        for item in &section.items {
            let marker = if item.item_id > 0 { ' ' } else { '?' };
            println!("{} {:<40} {}", marker, item.name, item.one_over_rarity());
        }
    }
}
