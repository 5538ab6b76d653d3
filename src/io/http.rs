//! HTTP transport, retry policy and streaming downloads
//!
//! Every remote collaborator (ASF search, ESA orbit listings, USGS tiles) is
//! reached through the [`Transport`] trait so stages can be exercised
//! against in-process fakes.

use crate::config::Credentials;
use crate::types::{FetchError, FetchResult};
use reqwest::blocking::Client;
use reqwest::header::LOCATION;
use reqwest::Url;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Earthdata login host; credentials are only ever sent here
pub const EARTHDATA_HOST: &str = "urs.earthdata.nasa.gov";

const MAX_REDIRECTS: usize = 10;
const LISTING_TIMEOUT: Duration = Duration::from_secs(60);
const COPY_CHUNK_SIZE: usize = 64 * 1024;
const PROGRESS_STEP_PERCENT: u64 = 5;

/// An open response body
pub struct Download {
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl Download {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            content_length: Some(bytes.len() as u64),
            body: Box::new(std::io::Cursor::new(bytes)),
        }
    }

    pub fn into_bytes(mut self) -> FetchResult<Vec<u8>> {
        let mut buffer = Vec::with_capacity(self.content_length.unwrap_or(0) as usize);
        self.body.read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

/// Minimal remote interface used by all pipeline stages
pub trait Transport: Send + Sync {
    /// Open a byte stream for `url`
    fn get(&self, url: &str) -> FetchResult<Download>;

    /// Fetch `url` as UTF-8 text
    fn get_text(&self, url: &str) -> FetchResult<String> {
        let bytes = self.get(url)?.into_bytes()?;
        String::from_utf8(bytes).map_err(|e| FetchError::Parse(format!("Invalid UTF-8 from {}: {}", url, e)))
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &str) -> FetchResult<Download> {
        (**self).get(url)
    }

    fn get_text(&self, url: &str) -> FetchResult<String> {
        (**self).get_text(url)
    }
}

/// Bounded retry with a fixed or growing delay between attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// Multiplier applied to the delay after each failed attempt (1.0 = fixed)
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
            backoff: 1.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: 1.0,
        }
    }

    pub fn with_backoff(mut self, factor: f64) -> Self {
        self.backoff = factor.max(1.0);
        self
    }

    /// Delay before attempt `attempt + 1`, where `attempt` is 1-indexed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff.powi(attempt.saturating_sub(1) as i32);
        self.delay.mul_f64(factor)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// The closure receives the 1-indexed attempt number.
    pub fn run<T, F>(&self, what: &str, operation: F) -> FetchResult<T>
    where
        F: FnMut(u32) -> FetchResult<T>,
    {
        self.run_expecting(what, |_| false, operation)
    }

    /// Like [`RetryPolicy::run`], but permanent errors matching `expected` are
    /// handed back quietly for the caller to interpret.
    pub fn run_expecting<T, F, E>(&self, what: &str, expected: E, mut operation: F) -> FetchResult<T>
    where
        F: FnMut(u32) -> FetchResult<T>,
        E: Fn(&FetchError) -> bool,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => {
                    if expected(&e) {
                        log::debug!("{}: {}", what, e);
                    } else {
                        log::error!("{} failed permanently: {}", what, e);
                    }
                    return Err(e);
                }
                Err(e) if attempt >= self.max_attempts => {
                    log::error!("{} failed after {} attempts: {}", what, attempt, e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    log::warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:.1}s",
                        what,
                        attempt,
                        self.max_attempts,
                        e,
                        delay.as_secs_f64()
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Blocking HTTP transport with Earthdata login support
pub struct HttpTransport {
    client: Client,
    credentials: Option<Credentials>,
    download_timeout: Duration,
    text_timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration, credentials: Option<Credentials>) -> FetchResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("sarfetch/", env!("CARGO_PKG_VERSION")))
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| FetchError::Processing(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            credentials,
            download_timeout: timeout,
            text_timeout: timeout.min(LISTING_TIMEOUT),
        })
    }

    /// Follow redirects by hand so the login is attached only for the
    /// Earthdata host and never leaks to data or CDN hosts
    fn send(&self, url: &str, timeout: Duration) -> FetchResult<reqwest::blocking::Response> {
        let mut current = Url::parse(url).map_err(|e| FetchError::Parse(format!("Invalid URL {}: {}", url, e)))?;

        for hop in 0..=MAX_REDIRECTS {
            let mut request = self.client.get(current.clone()).timeout(timeout);
            if let Some(credentials) = &self.credentials {
                if current.host_str() == Some(EARTHDATA_HOST) {
                    request = request.basic_auth(&credentials.username, Some(&credentials.password));
                }
            }

            let response = request.send().map_err(|e| FetchError::Network {
                url: current.to_string(),
                message: e.to_string(),
            })?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| FetchError::Network {
                        url: current.to_string(),
                        message: format!("redirect {} without Location header", status),
                    })?;
                let next = current
                    .join(location)
                    .map_err(|e| FetchError::Parse(format!("Bad redirect target {}: {}", location, e)))?;
                log::debug!("Redirect {} -> {} (hop {})", current, next, hop + 1);
                current = next;
                continue;
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                log::error!(
                    "Authentication rejected by {}. Check the username and password in the [Credentials] section.",
                    current.host_str().unwrap_or("server")
                );
            }

            if !status.is_success() {
                return Err(FetchError::Http {
                    status: status.as_u16(),
                    url: current.to_string(),
                });
            }

            return Ok(response);
        }

        Err(FetchError::Network {
            url: url.to_string(),
            message: format!("more than {} redirects", MAX_REDIRECTS),
        })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> FetchResult<Download> {
        let response = self.send(url, self.download_timeout)?;
        Ok(Download {
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }

    fn get_text(&self, url: &str) -> FetchResult<String> {
        self.send(url, self.text_timeout)?.text().map_err(|e| FetchError::Network {
            url: url.to_string(),
            message: format!("failed to read response body: {}", e),
        })
    }
}

/// Path of the in-progress file for `target`
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    target.with_file_name(name)
}

/// Stream a response body to `target`, logging progress every few percent.
///
/// Data lands in a `.part` file that is renamed only once the body has been
/// read completely, so an interrupted run never leaves a truncated target.
pub fn stream_to_file(download: Download, target: &Path, label: &str) -> FetchResult<u64> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let part = partial_path(target);
    let total = download.content_length.filter(|n| *n > 0);
    let mut body = download.body;
    let mut writer = BufWriter::new(File::create(&part)?);
    let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
    let mut written: u64 = 0;
    let mut next_report = PROGRESS_STEP_PERCENT;

    loop {
        let n = match body.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(FetchError::Network {
                    url: label.to_string(),
                    message: format!("stream interrupted after {} bytes: {}", written, e),
                })
            }
        };
        writer.write_all(&buffer[..n])?;
        written += n as u64;

        if let Some(total) = total {
            let percent = written * 100 / total;
            if percent >= next_report {
                log::info!("{} progress: {}% ({} / {} bytes)", label, percent.min(100), written, total);
                next_report = (percent / PROGRESS_STEP_PERCENT + 1) * PROGRESS_STEP_PERCENT;
            }
        }
    }

    writer.flush()?;
    drop(writer);

    if let Some(total) = total {
        if written != total {
            let _ = fs::remove_file(&part);
            return Err(FetchError::Network {
                url: label.to_string(),
                message: format!("incomplete body: got {} of {} bytes", written, total),
            });
        }
    }

    fs::rename(&part, target)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retry_stops_on_permanent_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let result: FetchResult<()> = policy.run("lookup", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Http {
                status: 404,
                url: "https://example.invalid/x".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expected_error_is_returned_without_retry() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let result: FetchResult<()> = policy.run_expecting("listing", FetchError::is_not_found, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Http {
                status: 404,
                url: "https://example.invalid/POEORB/".to_string(),
            })
        });
        assert!(matches!(result, Err(ref e) if e.is_not_found()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Transient errors are still retried
        calls.store(0, Ordering::SeqCst);
        let result: FetchResult<()> = policy.run_expecting("listing", FetchError::is_not_found, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Http {
                status: 503,
                url: "https://example.invalid/POEORB/".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_retry_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let result: FetchResult<()> = policy.run("lookup", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Network {
                url: "https://example.invalid".to_string(),
                message: "connection reset".to_string(),
            })
        });
        assert!(matches!(result, Err(FetchError::Network { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_grows_delay() {
        let policy = RetryPolicy::new(4, Duration::from_secs(2)).with_backoff(2.0);
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
    }

    #[test]
    fn test_stream_to_file_rejects_short_body() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("scene.zip");
        let download = Download {
            content_length: Some(10),
            body: Box::new(std::io::Cursor::new(vec![1u8; 4])),
        };
        assert!(stream_to_file(download, &target, "scene.zip").is_err());
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        let part = partial_path(Path::new("/data/slc/scene.zip"));
        assert_eq!(part, PathBuf::from("/data/slc/scene.zip.part"));
    }
}
