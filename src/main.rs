use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use repair_scout::config::{LogFormat, LoggingConfig};
use repair_scout::enrich::ImageEnricher;
use repair_scout::http::Fetchers;
use repair_scout::models::{Favorite, Offer, ToggleFavoriteRequest};
use repair_scout::scrapers::marketplace_scrapers;
use repair_scout::{
    AppConfig, FavoriteFilter, FavoritesService, PartType, SearchCategory, SearchQuery,
    SearchResponse, SearchService, SearchSettings, Source, SqliteStore, Store,
};

#[derive(Parser)]
#[command(name = "repair-scout")]
#[command(about = "Find phone repair parts across leboncoin, eBay and AliExpress", long_about = None)]
struct Cli {
    /// SQLite database path (overrides DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search every marketplace for a part
    Search {
        #[arg(long)]
        brand: String,
        #[arg(long)]
        model: String,
        /// replacement_screen or phone_without_screen
        #[arg(long, default_value = "replacement_screen")]
        part_type: PartType,
        /// mobile_phone_parts or auto
        #[arg(long, default_value = "mobile_phone_parts")]
        category: SearchCategory,
        /// Price ceiling in euros
        #[arg(long)]
        max_price: Option<f64>,
        /// Restrict to these sources (repeatable)
        #[arg(long = "source")]
        sources: Vec<Source>,
        /// Ignore the search cache
        #[arg(long)]
        force_refresh: bool,
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
    /// Manage saved offers
    Favorites {
        #[command(subcommand)]
        command: FavoriteCommands,
    },
}

#[derive(Subcommand)]
enum FavoriteCommands {
    /// List saved offers, newest first
    List {
        #[arg(long)]
        source: Option<Source>,
        /// Substring of the offer title
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        max_price: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Save an offer, or remove it when already saved
    Toggle {
        #[arg(long)]
        source: Source,
        #[arg(long)]
        offer_id: String,
        /// JSON file holding the offer to save
        #[arg(long)]
        offer_file: Option<PathBuf>,
    },
    /// Delete a favorite by id
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    init_tracing(&config.logging);

    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&config.db_path)
            .with_context(|| format!("Failed to open database {}", config.db_path.display()))?,
    );

    match cli.command {
        Commands::Search {
            brand,
            model,
            part_type,
            category,
            max_price,
            sources,
            force_refresh,
            json,
        } => {
            let mut query = SearchQuery::new(brand, model, part_type);
            query.category = category;
            query.max_price_eur = max_price;
            query.force_refresh = force_refresh;
            if !sources.is_empty() {
                query.sources = sources;
            }

            let service = search_service(&config, store)?;
            let response = service.search(&query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_search(&response);
            }
        }
        Commands::Favorites { command } => {
            let favorites = FavoritesService::new(store);
            run_favorites(&favorites, command).await?;
        }
    }

    Ok(())
}

fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn search_service(config: &AppConfig, store: Arc<dyn Store>) -> Result<SearchService> {
    let fetchers = Fetchers::new()?;
    let scrapers = marketplace_scrapers(&fetchers, config.variants.clone());
    let images = ImageEnricher::new(fetchers.bot.clone(), config.images.clone());

    let settings = SearchSettings {
        cache_ttl: config.cache_ttl,
        scraper_timeout: config.scraper_timeout,
        workers: config.search_workers,
    };
    Ok(SearchService::new(store, scrapers, settings).with_image_enricher(Arc::new(images)))
}

async fn run_favorites(favorites: &FavoritesService, command: FavoriteCommands) -> Result<()> {
    match command {
        FavoriteCommands::List {
            source,
            model,
            max_price,
            json,
        } => {
            let filter = FavoriteFilter {
                source,
                model,
                max_price_eur: max_price,
            };
            let found = favorites.list(&filter)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&found)?);
            } else {
                print_favorites(&found);
            }
        }
        FavoriteCommands::Toggle {
            source,
            offer_id,
            offer_file,
        } => {
            let offer = match offer_file {
                Some(path) => {
                    let raw = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    Some(serde_json::from_str::<Offer>(&raw).context("Invalid offer JSON")?)
                }
                None => None,
            };
            let request = ToggleFavoriteRequest {
                source,
                source_offer_id: offer_id,
                offer,
            };
            let outcome = favorites.toggle(&request)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        FavoriteCommands::Delete { id } => {
            if !favorites.delete(id)? {
                bail!("Favorite {} not found", id);
            }
            info!("🗑️  Deleted favorite {}", id);
        }
    }
    Ok(())
}

fn print_search(response: &SearchResponse) {
    info!(
        "🔧 {} offers ({})",
        response.offers.len(),
        if response.cached { "cached" } else { "fresh" }
    );

    for (i, offer) in response.offers.iter().enumerate() {
        print_offer(i + 1, offer);
    }

    for (source, error) in &response.provider_errors {
        println!("⚠️  {}: {}", source, error);
    }
}

fn print_favorites(favorites: &[Favorite]) {
    info!("⭐ {} favorites", favorites.len());
    for favorite in favorites {
        print_offer(favorite.favorite_id as usize, &favorite.offer);
        println!("   Saved: {}", favorite.created_at.format("%Y-%m-%d %H:%M"));
        println!();
    }
}

fn print_offer(n: usize, offer: &Offer) {
    if offer.price_unknown {
        println!("{}. {} (price unknown)", n, offer.title);
    } else {
        println!("{}. {} ({:.2} €)", n, offer.title, offer.total_eur);
    }
    println!("   {} | item {:.2} € + shipping {:.2} €", offer.source, offer.price_eur, offer.shipping_eur);
    if let Some(condition) = &offer.condition_text {
        println!("   {}", condition);
    }
    if let Some(location) = &offer.location {
        println!("   Location: {}", location);
    }
    if offer.is_recently_added {
        println!("   Recently added");
    }
    println!("   URL: {}", offer.url);
    println!();
}
