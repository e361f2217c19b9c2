use anyhow::Context;
use clap::{Parser, Subcommand};
use musea::service::ChangeFeedPage;
use musea::{Catalogue, ChangeFeedOptions, SearchFilters, SearchOptions, Settings};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "musea")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query planning and retrieval over a cultural-heritage linked-data catalogue")]
struct Cli {
    /// Path to a musea.toml (defaults to ./musea.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Config,

    /// Structured search over the catalogue
    Search {
        /// Free-text query (title filter)
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        creator: Option<String>,
        #[arg(long)]
        object_number: Option<String>,
        #[arg(long = "type")]
        object_type: Option<String>,
        #[arg(long)]
        material: Option<String>,
        #[arg(long)]
        technique: Option<String>,
        /// Year or wildcard pattern, e.g. 1642 or 16*
        #[arg(long)]
        creation_date: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        depicted_person: Option<String>,
        #[arg(long)]
        depicted_place: Option<String>,
        #[arg(long)]
        production_place: Option<String>,
        #[arg(long)]
        birth_place: Option<String>,
        #[arg(long)]
        death_place: Option<String>,
        #[arg(long)]
        profession: Option<String>,
        #[arg(long)]
        collection_set: Option<String>,
        #[arg(long)]
        production_role: Option<String>,
        #[arg(long)]
        iconclass: Option<String>,
        #[arg(long)]
        license: Option<String>,
        #[arg(long)]
        inscription: Option<String>,
        #[arg(long)]
        provenance: Option<String>,
        #[arg(long)]
        credit_line: Option<String>,
        #[arg(long)]
        narrative: Option<String>,
        #[arg(long)]
        near_place: Option<String>,
        #[arg(long)]
        near_lat: Option<f64>,
        #[arg(long)]
        near_lon: Option<f64>,
        /// Search radius in km (0.1 - 500, default 25)
        #[arg(long)]
        radius: Option<f64>,
        #[arg(long)]
        min_height: Option<f64>,
        #[arg(long)]
        max_height: Option<f64>,
        #[arg(long)]
        min_width: Option<f64>,
        #[arg(long)]
        max_width: Option<f64>,
        #[arg(long)]
        image_available: Option<bool>,
        #[arg(long)]
        page_token: Option<String>,
        /// Maximum results (1-100, default 25)
        #[arg(long)]
        max_results: Option<usize>,
        /// Return only the count and object numbers
        #[arg(long)]
        compact: bool,
    },

    /// Semantic similarity search
    Semantic {
        query: String,
        #[arg(long = "type")]
        object_type: Option<String>,
        #[arg(long)]
        material: Option<String>,
        #[arg(long)]
        technique: Option<String>,
        #[arg(long)]
        creation_date: Option<String>,
        #[arg(long)]
        creator: Option<String>,
        #[arg(long, default_value_t = 25)]
        max_results: usize,
    },

    /// Resolve the full Linked Art detail record
    Detail {
        /// Object number (e.g. SK-C-5) or LOD URI
        id: String,
    },

    /// Normalised bibliography for an artwork
    Bibliography {
        object_number: String,
        /// Return all entries instead of the count
        #[arg(long)]
        full: bool,
        /// Maximum entries (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },

    /// IIIF image descriptor for an artwork
    Image { object_number: String },

    /// Iconclass notation index
    Iconclass {
        #[command(subcommand)]
        command: IconclassCommands,
    },

    /// Incremental change feed (OAI-PMH)
    Changes {
        /// ISO date or datetime lower bound
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        until: Option<String>,
        #[arg(long)]
        set: Option<String>,
        /// Headers only, skipping record parsing
        #[arg(long)]
        identifiers_only: bool,
        #[arg(long)]
        resumption_token: Option<String>,
    },

    /// List the harvest sets the change feed offers
    Sets,
}

#[derive(Subcommand)]
enum IconclassCommands {
    /// Full-text search over notation texts and keywords
    Search {
        query: String,
        #[arg(long, default_value = "en")]
        lang: String,
        #[arg(long, default_value_t = 10)]
        max_results: usize,
        /// Restrict to notations borne by catalogued artworks
        #[arg(long)]
        only_with_artworks: bool,
    },
    /// Resolve a notation and its direct children
    Browse {
        notation: String,
        #[arg(long, default_value = "en")]
        lang: String,
    },
    /// Semantic similarity over notation embeddings
    Semantic {
        query: String,
        #[arg(long, default_value = "en")]
        lang: String,
        #[arg(long, default_value_t = 10)]
        max_results: usize,
        #[arg(long)]
        only_with_artworks: bool,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct EntriesResponse<T: Serialize> {
    entries: Vec<T>,
    warnings: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { force } = &cli.command {
        let path = Settings::init_config_file(*force)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        eprintln!("Created configuration at {}", path.display());
        return Ok(());
    }

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("failed to load configuration")?;
    musea::logging::init_with_config(&settings.logging);

    if let Commands::Config = &cli.command {
        println!("{}", toml::to_string_pretty(&settings)?);
        return Ok(());
    }

    let catalogue = Catalogue::new(settings)?;

    match cli.command {
        Commands::Init { .. } | Commands::Config => unreachable!("handled above"),

        Commands::Search {
            query,
            title,
            creator,
            object_number,
            object_type,
            material,
            technique,
            creation_date,
            description,
            subject,
            depicted_person,
            depicted_place,
            production_place,
            birth_place,
            death_place,
            profession,
            collection_set,
            production_role,
            iconclass,
            license,
            inscription,
            provenance,
            credit_line,
            narrative,
            near_place,
            near_lat,
            near_lon,
            radius,
            min_height,
            max_height,
            min_width,
            max_width,
            image_available,
            page_token,
            max_results,
            compact,
        } => {
            let options = SearchOptions {
                filters: SearchFilters {
                    title,
                    creator,
                    object_type,
                    material,
                    technique,
                    creation_date,
                    subject,
                    depicted_person,
                    depicted_place,
                    production_place,
                    birth_place,
                    death_place,
                    profession,
                    collection_set,
                    production_role,
                    iconclass,
                    license,
                    inscription,
                    provenance,
                    credit_line,
                    narrative,
                    near_place,
                    near_lat,
                    near_lon,
                    near_place_radius: radius,
                    min_height,
                    max_height,
                    min_width,
                    max_width,
                    max_results,
                },
                query,
                object_number,
                description,
                image_available,
                page_token,
                compact,
            };
            let response = catalogue.search(options).await?;
            print_json(&response)?;
        }

        Commands::Semantic {
            query,
            object_type,
            material,
            technique,
            creation_date,
            creator,
            max_results,
        } => {
            let filters = SearchFilters {
                object_type,
                material,
                technique,
                creation_date,
                creator,
                ..Default::default()
            };
            let filters = if filters.is_empty() { None } else { Some(filters) };
            let response = catalogue.semantic_search(&query, filters, max_results).await?;
            print_json(&response)?;
        }

        Commands::Detail { id } => {
            let detail = catalogue.artwork_detail(&id).await?;
            print_json(&detail)?;
        }

        Commands::Bibliography {
            object_number,
            full,
            limit,
        } => {
            let outcome = catalogue.bibliography(&object_number, full, limit).await?;
            print_json(&outcome)?;
        }

        Commands::Image { object_number } => {
            let info = catalogue.image_info(&object_number).await?;
            print_json(&info)?;
        }

        Commands::Iconclass { command } => match command {
            IconclassCommands::Search {
                query,
                lang,
                max_results,
                only_with_artworks,
            } => {
                let (entries, warnings) = catalogue
                    .iconclass_search(&query, &lang, max_results, only_with_artworks)
                    .await?;
                print_json(&EntriesResponse { entries, warnings })?;
            }
            IconclassCommands::Browse { notation, lang } => {
                let outcome = catalogue.iconclass_browse(&notation, &lang).await?;
                print_json(&outcome)?;
            }
            IconclassCommands::Semantic {
                query,
                lang,
                max_results,
                only_with_artworks,
            } => {
                let (entries, warnings) = catalogue
                    .iconclass_semantic(&query, &lang, max_results, only_with_artworks)
                    .await?;
                print_json(&EntriesResponse { entries, warnings })?;
            }
        },

        Commands::Changes {
            from,
            until,
            set,
            identifiers_only,
            resumption_token,
        } => {
            let page = catalogue
                .change_feed(ChangeFeedOptions {
                    from,
                    until,
                    set,
                    identifiers_only,
                    resumption_token,
                })
                .await?;
            match page {
                ChangeFeedPage::Records(records) => print_json(&records)?,
                ChangeFeedPage::Identifiers(headers) => print_json(&headers)?,
            }
        }

        Commands::Sets => {
            let sets = catalogue.list_sets().await?;
            print_json(&sets)?;
        }
    }

    Ok(())
}
