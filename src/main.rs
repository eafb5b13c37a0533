use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, info_span, warn};

use factbook_scraper::config::{Config, DEFAULT_CONFIG_PATH};
use factbook_scraper::logging::init_logging;
use factbook_scraper::observability::metrics;
use factbook_scraper::pipeline::export::export_to_file;
use factbook_scraper::pipeline::ingestion::{
    fetch_category_mapping, scrape_countries, HttpPageFetcher, SCRAPE_REPORT_FILE,
};
use factbook_scraper::pipeline::processing::catalog::{build_catalog, MultiValueReport};
use factbook_scraper::pipeline::processing::enrich::CategoryMapping;
use factbook_scraper::pipeline::processing::flatten::ExportFilter;
use factbook_scraper::pipeline::storage::SnapshotStore;
use factbook_scraper::pipeline::Refiner;

#[derive(Parser)]
#[command(name = "factbook_scraper")]
#[command(about = "World Factbook country-fact scraper and refinement pipeline")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Write Prometheus-format metrics to this file when the command finishes
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and parse country pages into a snapshot's raw/ directory
    Scrape {
        /// Country slugs (comma-separated), e.g. france,spain
        #[arg(long, value_delimiter = ',', required = true)]
        countries: Vec<String>,
        /// Snapshot name (defaults to today's date)
        #[arg(long)]
        snapshot: Option<String>,
    },
    /// Fetch the category JSON and save the database id → category mapping
    Categories {
        /// Category JSON URL (defaults to the configured one)
        #[arg(long)]
        url: Option<String>,
    },
    /// Refine raw records: split, classify, categorize and date values
    Refine {
        /// Snapshot name (defaults to the latest)
        #[arg(long)]
        snapshot: Option<String>,
    },
    /// Build the field coverage catalog from refined records
    Catalog {
        #[arg(long)]
        snapshot: Option<String>,
    },
    /// Flatten refined records into NDJSON rows
    Export {
        #[arg(long)]
        snapshot: Option<String>,
        /// Only these country slugs (comma-separated)
        #[arg(long, value_delimiter = ',')]
        countries: Vec<String>,
        /// Only these categories (comma-separated)
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,
        /// Output file (defaults to <snapshot>/export/rows.ndjson)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    let _guard = init_logging(&config.logging);
    if cli.metrics_out.is_some() {
        metrics::init();
    }

    let store = SnapshotStore::new(&config.paths.snapshots_dir);

    match cli.command {
        Commands::Scrape {
            countries,
            snapshot,
        } => {
            println!("🌍 Scraping {} countries...", countries.len());
            let snapshot = match snapshot {
                Some(name) => store.create(&name)?,
                None => store.create_today()?,
            };
            let fetcher = HttpPageFetcher::new(&config.scraping)?;
            let report = scrape_countries(&fetcher, &config.base_url, &countries, &snapshot);

            println!("\n📊 Scrape Results ({}):", snapshot.name());
            println!("   Requested: {}", report.requested);
            println!("   Saved: {}", report.saved.len());
            println!("   Failed: {}", report.failed.len());
            println!("   Success rate: {:.1}%", report.success_rate * 100.0);
            println!("   Fields scraped: {}", report.total_fields_scraped);
            println!("   Duration: {:.1}s", report.duration_seconds);
            for entry in report.countries.iter().filter(|c| c.error.is_some()) {
                println!("   - {}: {}", entry.country_slug, entry.error.as_deref().unwrap_or_default());
            }
            println!(
                "   Report: {}",
                snapshot.analysis_dir().join(SCRAPE_REPORT_FILE).display()
            );
        }
        Commands::Categories { url } => {
            let url = url.unwrap_or_else(|| config.category_mapping_url.clone());
            println!("🗂️  Fetching category mapping from {}", url);

            let fetcher = HttpPageFetcher::new(&config.scraping)?;
            let (mapping, categories) = fetch_category_mapping(&fetcher, &url)?;
            if mapping.is_empty() {
                warn!(url = %url, "Category payload produced an empty mapping");
            }
            mapping.save(&config.paths.category_mapping, &url, categories)?;

            println!("   Categories: {}", categories);
            println!("   Fields mapped: {}", mapping.len());
            println!("   Saved to: {}", config.paths.category_mapping.display());
        }
        Commands::Refine { snapshot } => {
            let snapshot = store.resolve(snapshot.as_deref())?;
            let span = info_span!("refine", snapshot = snapshot.name());
            let _enter = span.enter();
            println!("🔨 Refining snapshot {}...", snapshot.name());

            let mapping = CategoryMapping::load(&config.paths.category_mapping)?;
            let refiner = Refiner::from_config(&config.refine, mapping)?;

            let loaded = snapshot.load_raw()?;
            let mut report = refiner.run_batch(&loaded.records, |record| {
                snapshot.save_refined(record).map(|_| ())
            });
            report.total += loaded.failed.len();
            report.failed.extend(loaded.failed);

            let analysis =
                MultiValueReport::analyze(loaded.records.iter().map(|r| r.fields.as_slice()))
                    .with_snapshot_date(snapshot.name());
            snapshot.save_analysis("multi_value_report.json", &analysis)?;
            snapshot.save_analysis("refine_report.json", &report)?;

            println!("\n📊 Refine Results:");
            println!("   Total records: {}", report.total);
            println!("   Refined: {}", report.successful);
            println!("   Failed: {}", report.failed.len());
            println!("   With validation issues: {}", report.invalid.len());
            println!("   Fields: {}", report.totals.total_fields);
            println!("   Multi-valued fields: {}", report.totals.multi_valued_fields);
            println!("   Category coverage: {:.1}%", report.category_coverage_percentage());
            println!("   Values with years: {}", report.totals.values_with_years);
            if !report.failed.is_empty() {
                println!("\n⚠️  Failed records:");
                for slug in &report.failed {
                    println!("   - {}", slug);
                }
            }
        }
        Commands::Catalog { snapshot } => {
            let snapshot = store.resolve(snapshot.as_deref())?;
            println!("📚 Building field catalog for {}...", snapshot.name());

            let loaded = snapshot.load_refined()?;
            if loaded.records.is_empty() {
                anyhow::bail!("no refined records in snapshot {}; run `refine` first", snapshot.name());
            }
            let total = loaded.records.len();
            let catalog = build_catalog(loaded.records.iter().map(|r| r.fields.as_slice()), total);
            metrics::catalog::records_observed(total);
            metrics::catalog::fields_catalogued(catalog.fields.len());
            let path = snapshot.save_analysis("field_catalog.json", &catalog)?;

            let dist = &catalog.summary.coverage_distribution;
            println!("\n📊 Catalog Results:");
            println!("   Records analyzed: {}", total);
            println!("   Unique fields: {}", catalog.fields.len());
            println!("   Universal (100%): {} fields", dist.universal_fields);
            println!("   Common (50-99%): {} fields", dist.common_fields);
            println!("   Rare (<50%): {} fields", dist.rare_fields);
            for (category, rollup) in &catalog.summary.by_category {
                println!(
                    "   {}: {} fields, avg coverage {:.1}%",
                    category, rollup.field_count, rollup.avg_coverage
                );
            }
            println!("   Saved to: {}", path.display());
        }
        Commands::Export {
            snapshot,
            countries,
            categories,
            output,
        } => {
            let snapshot = store.resolve(snapshot.as_deref())?;
            let output = output.unwrap_or_else(|| snapshot.path().join("export").join("rows.ndjson"));
            println!("📤 Exporting snapshot {}...", snapshot.name());

            let loaded = snapshot.load_refined()?;
            let filter = ExportFilter {
                countries,
                categories,
            };
            let summary = export_to_file(&loaded.records, &filter, &output)
                .with_context(|| format!("Failed to write {}", output.display()))?;

            println!("\n📊 Export Results:");
            println!("   Records: {}", summary.records);
            println!("   Rows: {}", summary.rows);
            println!("   Output file: {}", output.display());
        }
    }

    if let Some(path) = &cli.metrics_out {
        metrics::write_to(path)?;
    }
    info!("Done");
    Ok(())
}
