use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::redirect;
use tracing::{debug, info};

use crate::models::{Catalog, Table};

/// Endpoint serving an example CSV listing per category table.
pub const CSV_DOWNLOAD_URL: &str = "https://www.digikey.com/product-search/download.csv";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3";

/// Default delay between consecutive downloads. The remote service has
/// informal rate expectations; one fetch completes before the next begins.
pub const DEFAULT_PACING: Duration = Duration::from_secs(60);

pub struct SampleFetcher {
    client: Client,
    pacing: Duration,
}

impl SampleFetcher {
    pub fn new() -> Result<Self> {
        Self::with_pacing(DEFAULT_PACING)
    }

    pub fn with_pacing(pacing: Duration) -> Result<Self> {
        let redirect_policy = redirect::Policy::custom(|attempt| {
            if attempt.previous().len() > 10 {
                attempt.error("Too many redirects (>10)")
            } else {
                attempt.follow()
            }
        });

        let client = Client::builder().redirect(redirect_policy).build()?;

        Ok(SampleFetcher { client, pacing })
    }

    /// Download one sample CSV for `table` into `destination`.
    ///
    /// Idempotent: an existing destination file is left alone and the
    /// running count comes back unchanged. From the second download onward
    /// the pacing delay is applied before the request. The response body is
    /// written verbatim; CSV content is never inspected here.
    pub fn fetch_sample(&self, table: &Table, destination: &Path, downloads: u32) -> Result<u32> {
        if destination.exists() {
            debug!("'{}' already cached", destination.display());
            return Ok(downloads);
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
        }

        if downloads >= 1 {
            info!("waiting {}s before the next download", self.pacing.as_secs());
            thread::sleep(self.pacing);
        }

        let nonce_param = format!("ffe{:05x}", table.nonce);
        let params = [
            ("FV", nonce_param.as_str()),
            ("quantity", "0"),
            ("ColumnSort", "0"),
            ("page", "1"),
            ("pageSize", "500"),
        ];

        info!("downloading sample for '{}' ({})", table.name, table.base);
        let body = self
            .client
            .get(CSV_DOWNLOAD_URL)
            .query(&params)
            .header("User-Agent", USER_AGENT)
            .send()?
            .error_for_status()?
            .bytes()?;

        fs::write(destination, &body)
            .with_context(|| format!("writing '{}'", destination.display()))?;
        Ok(downloads + 1)
    }
}

/// Fetch one sample CSV per table in the finished catalog, sequentially,
/// at `<csvs_dir>/<base>.csv`. Returns how many files were downloaded.
pub fn download_samples(
    fetcher: &SampleFetcher,
    catalog: &Catalog,
    csvs_dir: &Path,
) -> Result<u32> {
    let mut downloads = 0;
    for table in catalog.all_tables() {
        let destination = csvs_dir.join(format!("{}.csv", table.base));
        downloads = fetcher.fetch_sample(table, &destination, downloads)?;
    }
    Ok(downloads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Directory, Node};

    #[test]
    fn existing_destination_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("audio-products-accessories.csv");
        fs::write(&destination, "cached").unwrap();

        let fetcher = SampleFetcher::with_pacing(Duration::ZERO).unwrap();
        let table = Table::new("Accessories", "audio-products-accessories", 159, "h", "u");
        let downloads = fetcher.fetch_sample(&table, &destination, 3).unwrap();

        assert_eq!(downloads, 3);
        assert_eq!(fs::read_to_string(&destination).unwrap(), "cached");
    }

    #[test]
    fn fully_cached_catalog_downloads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "x").unwrap();
        fs::write(dir.path().join("b.csv"), "y").unwrap();

        let mut directory = Directory::new("Audio", 10, "u");
        directory.push(Node::Table(Table::new("A", "a", 1, "h", "u")));
        directory.push(Node::Table(Table::new("B", "b", 2, "h", "u")));
        let mut catalog = Catalog::new("Digi-Key");
        catalog.directories.push(directory);

        let fetcher = SampleFetcher::with_pacing(Duration::ZERO).unwrap();
        let downloads = download_samples(&fetcher, &catalog, dir.path()).unwrap();
        assert_eq!(downloads, 0);
    }

    #[test]
    fn nonce_renders_as_a_five_digit_hex_token() {
        assert_eq!(format!("ffe{:05x}", 159i64), "ffe0009f");
    }
}
