use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::{error, info};

use entity_enrich::app::{run_enrichment, run_import};
use entity_enrich::config::{DatasetConfig, Settings};
use entity_enrich::domain::Entity;
use entity_enrich::infra::resolver_store::ResolverStore;
use entity_enrich::logging;
use entity_enrich::pipeline::processing::cleaning::{CleanOptions, Cleaner};
use entity_enrich::pipeline::processing::resolver::{Judgement, Resolver};

#[derive(Parser)]
#[command(name = "entity_enrich")]
#[command(about = "Entity enrichment and property cleaning pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich a dataset against its configured reference
    Enrich {
        /// Dataset descriptor (TOML)
        dataset: PathBuf,
    },
    /// Clean raw NDJSON records into a dataset's store
    Import {
        /// Dataset descriptor (TOML)
        dataset: PathBuf,
        /// Raw records, one JSON entity per line
        input: PathBuf,
    },
    /// Record a match judgement between two entity IDs
    Decide {
        left: String,
        right: String,
        /// positive, negative or unsure
        judgement: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Clean a single value and show the result
    Clean {
        #[arg(long)]
        schema: String,
        #[arg(long)]
        prop: String,
        #[arg(long)]
        value: String,
        #[arg(long)]
        fuzzy: bool,
        /// strftime format for date values
        #[arg(long)]
        format: Option<String>,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::Enrich { dataset } => {
            let dataset = DatasetConfig::load(&dataset)?;
            println!("🔎 Enriching {}...", dataset.name);
            match run_enrichment(&settings, &dataset) {
                Ok(summary) => {
                    println!("\n📊 Enrichment results for {}:", dataset.name);
                    println!("   Entities: {}", summary.entities);
                    println!("   Candidates: {}", summary.candidates);
                    println!("   External: {}", summary.externals);
                    println!("   Primary: {}", summary.primaries);
                    println!("   Negative: {}", summary.negatives);
                    println!("   Cut off: {}", summary.cutoff_skipped);
                    println!("   Errors: {}", summary.errors);
                }
                Err(e) => {
                    error!("Enrichment failed: {}", e);
                    bail!("enrichment of {} failed: {}", dataset.name, e);
                }
            }
        }
        Commands::Import { dataset, input } => {
            let dataset = DatasetConfig::load(&dataset)?;
            let file = File::open(&input)
                .with_context(|| format!("cannot open {}", input.display()))?;
            println!("📥 Importing {} into {}...", input.display(), dataset.name);
            let summary = run_import(&settings, &dataset, BufReader::new(file))?;
            println!("✅ Imported {} entities from {} records", summary.entities, summary.records);
            if summary.rejected > 0 || summary.identifier_fallbacks > 0 {
                println!(
                    "⚠️  {} values rejected, {} identifiers unvalidated, {} over length",
                    summary.rejected, summary.identifier_fallbacks, summary.length_exceeded
                );
            }
        }
        Commands::Decide {
            left,
            right,
            judgement,
            user,
        } => {
            let judgement: Judgement = judgement.parse()?;
            let mut resolver = ResolverStore::open(&settings.resolver_path)?;
            resolver.decide(&left, &right, judgement, user.as_deref())?;
            resolver.save()?;
            info!(%left, %right, %judgement, "Judgement recorded");
            println!("✅ {} <> {}: {}", left, right, judgement);
        }
        Commands::Clean {
            schema,
            prop,
            value,
            fuzzy,
            format,
        } => {
            let entity = Entity::new(&schema)?;
            let property = entity.property(&prop)?;
            let options = CleanOptions {
                fuzzy,
                format: format.as_deref(),
                ..CleanOptions::default()
            };
            let cleaned = Cleaner::default().clean(&entity, property, Some(value.as_str()), options);
            if cleaned.values.is_empty() {
                println!("❌ rejected");
            }
            for (target, value) in &cleaned.values {
                println!("{} = {}", target.qname(), value);
            }
            for issue in &cleaned.issues {
                println!("⚠️  {:?}: {}", issue.kind, issue.value);
            }
        }
    }

    Ok(())
}
