use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Public archive that serves the full bhavcopy with delivery data.
pub const DEFAULT_ARCHIVE_URL: &str = "https://archives.nseindia.com/products/content";

/// The archive rejects requests without a browser-like agent.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) bhavcopy-screener/0.1";

/// Source of raw bhavcopy files, one per trading date.
///
/// `Ok(None)` means the request went through but no file exists for that
/// date (weekend, holiday, not yet published). `Err` means the source could
/// not be reached at all.
pub trait FileFetcher {
    fn fetch(&self, date: NaiveDate) -> Result<Option<Vec<u8>>, TransportError>;
}

impl<F: FileFetcher + ?Sized> FileFetcher for &F {
    fn fetch(&self, date: NaiveDate) -> Result<Option<Vec<u8>>, TransportError> {
        (**self).fetch(date)
    }
}

impl<F: FileFetcher + ?Sized> FileFetcher for Box<F> {
    fn fetch(&self, date: NaiveDate) -> Result<Option<Vec<u8>>, TransportError> {
        (**self).fetch(date)
    }
}

/// Failures reaching a [`FileFetcher`]'s source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// HTTP client creation failed
    #[error("client creation error: {0}")]
    ClientCreation(String),
    /// Connection, DNS or timeout failure
    #[error("network error: {0}")]
    Network(String),
    /// The server answered with a status other than success or 404
    #[error("HTTP {status}: {reason}")]
    Http { status: u16, reason: String },
    /// Local file cache could not be read or written
    #[error("cache I/O error: {0}")]
    Io(String),
}

/// File name the exchange publishes for `date`, reused as the cache key.
pub fn archive_file_name(date: NaiveDate) -> String {
    format!("sec_bhavdata_full_{}.csv", date.format("%d%m%Y"))
}

/// Date-stamped name under which fetched bytes are cached on disk.
pub fn cache_file_name(date: NaiveDate) -> String {
    format!("sec_bhavdata_full_{}.csv", date.format("%Y%m%d"))
}

/// Configuration for [`NseArchiveFetcher`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Directory URL the daily files live under
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    pub timeout_seconds: u64,
    /// Rate limit: requests per second (default: 1.0)
    pub requests_per_second: f64,
    pub user_agent: String,
    /// Where fetched files are cached; no caching when unset
    pub cache_dir: Option<PathBuf>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        FetcherConfig {
            base_url: DEFAULT_ARCHIVE_URL.to_string(),
            timeout_seconds: 30,
            requests_per_second: 1.0,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache_dir: None,
        }
    }
}

/// Downloads daily bhavcopy files from the exchange archive over HTTP.
#[derive(Debug)]
pub struct NseArchiveFetcher {
    client: Client,
    config: FetcherConfig,
    last_request: Mutex<Option<Instant>>,
}

impl NseArchiveFetcher {
    /// Creates a fetcher with default configuration.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(FetcherConfig::default())
    }

    /// Creates a fetcher with custom configuration.
    ///
    /// # Errors
    /// Returns `TransportError::ClientCreation` if the HTTP client cannot be built.
    pub fn with_config(config: FetcherConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::ClientCreation(e.to_string()))?;

        Ok(NseArchiveFetcher {
            client,
            config,
            last_request: Mutex::new(None),
        })
    }

    /// Full URL of the file for `date`.
    pub fn url_for(&self, date: NaiveDate) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            archive_file_name(date)
        )
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Sleeps until the configured request rate allows another request.
    fn throttle(&self) {
        if self.config.requests_per_second <= 0.0 {
            return;
        }
        let min_interval = Duration::from_secs_f64(1.0 / self.config.requests_per_second);
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < min_interval {
                std::thread::sleep(min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

impl FileFetcher for NseArchiveFetcher {
    fn fetch(&self, date: NaiveDate) -> Result<Option<Vec<u8>>, TransportError> {
        self.throttle();
        let url = self.url_for(date);
        debug!(%url, "requesting bhavcopy");

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown error").to_string(),
            });
        }

        let bytes = response
            .bytes()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Some(bytes.to_vec()))
    }
}

/// Serves files already present in a directory, named by [`cache_file_name`].
#[derive(Debug, Clone)]
pub struct LocalDirFetcher {
    dir: PathBuf,
}

impl LocalDirFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        LocalDirFetcher { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(cache_file_name(date))
    }
}

impl FileFetcher for LocalDirFetcher {
    fn fetch(&self, date: NaiveDate) -> Result<Option<Vec<u8>>, TransportError> {
        let path = self.path_for(date);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TransportError::Io(format!("{}: {}", path.display(), e))),
        }
    }
}

/// Wraps another fetcher and keeps every non-empty file it returns on disk,
/// so re-runs over the same window do not hit the network again.
///
/// The cache is best effort: an unreadable or unwritable cache directory is
/// logged and the inner fetcher's answer is returned unchanged.
#[derive(Debug)]
pub struct CachingFetcher<F> {
    cache: LocalDirFetcher,
    inner: F,
}

impl<F: FileFetcher> CachingFetcher<F> {
    pub fn new(cache_dir: impl Into<PathBuf>, inner: F) -> Self {
        CachingFetcher {
            cache: LocalDirFetcher::new(cache_dir),
            inner,
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    fn store(&self, date: NaiveDate, bytes: &[u8]) -> Result<(), TransportError> {
        let dir = self.cache.dir();
        fs::create_dir_all(dir)
            .map_err(|e| TransportError::Io(format!("{}: {}", dir.display(), e)))?;

        let path = self.cache.path_for(date);
        let tmp_path = path.with_extension("csv.tmp");
        fs::write(&tmp_path, bytes)
            .map_err(|e| TransportError::Io(format!("{}: {}", tmp_path.display(), e)))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            TransportError::Io(format!("{}: {}", path.display(), e))
        })
    }
}

impl<F: FileFetcher> FileFetcher for CachingFetcher<F> {
    fn fetch(&self, date: NaiveDate) -> Result<Option<Vec<u8>>, TransportError> {
        match self.cache.fetch(date) {
            Ok(Some(bytes)) if !bytes.is_empty() => {
                debug!(%date, "bhavcopy served from cache");
                return Ok(Some(bytes));
            }
            Ok(_) => {}
            Err(error) => warn!(%date, %error, "cache read failed, fetching from source"),
        }

        let fetched = self.inner.fetch(date)?;
        if let Some(bytes) = &fetched {
            if !bytes.is_empty() {
                if let Err(error) = self.store(date, bytes) {
                    warn!(%date, %error, "cache write failed");
                }
            }
        }
        Ok(fetched)
    }
}
