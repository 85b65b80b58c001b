use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use digikey_catalog_archiver::{archiver, catalog, fetcher, parser};

#[derive(Parser)]
#[command(name = "digikey-catalog", about = "Digi-Key catalog constructor")]
struct Cli {
    /// Saved product-listing page (https://www.digikey.com/products/en,
    /// saved from a browser)
    #[arg(long, default_value = "misc/www.digikey.com_products_en.html")]
    products_html: PathBuf,

    /// Catalog output root
    #[arg(long, default_value = "root")]
    root_dir: PathBuf,

    /// CSV sample cache directory
    #[arg(long, default_value = "csvs")]
    csvs_dir: PathBuf,

    /// Skip the per-table CSV sample downloads
    #[arg(long)]
    skip_downloads: bool,

    /// Seconds to wait between consecutive CSV downloads
    #[arg(long, default_value_t = 60)]
    pacing: u64,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let html = fs::read_to_string(&cli.products_html)
        .with_context(|| format!("reading '{}'", cli.products_html.display()))?;

    let hrefs_table = parser::extract_matches(&html)?;
    info!("{} distinct href keys extracted", hrefs_table.len());

    let mut catalog = catalog::build("Digi-Key", &hrefs_table)?;
    catalog::verify(&catalog, &hrefs_table)?;
    catalog::reorganize(&mut catalog);
    info!(
        "catalog holds {} directories and {} tables",
        catalog.all_directories().len(),
        catalog.all_tables().len(),
    );

    if !cli.skip_downloads {
        let sample_fetcher =
            fetcher::SampleFetcher::with_pacing(Duration::from_secs(cli.pacing))?;
        let downloads = fetcher::download_samples(&sample_fetcher, &catalog, &cli.csvs_dir)?;
        println!("{downloads} CSV samples downloaded.");
    }

    archiver::clear_root(&cli.root_dir)?;
    archiver::save_markup(&catalog, &cli.root_dir)?;
    archiver::save_snapshot(&catalog, &cli.root_dir.join("catalog.json"))?;
    println!("Catalog archived successfully.");
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
