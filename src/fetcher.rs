//! Resilient document download: identity rotation, backoff, 403 patience,
//! content sniffing, and guaranteed cleanup of partial files.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use log::{info, warn};
use ureq::Agent;
use url::Url;

use crate::net;
use crate::session::Session;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);
const FORBIDDEN_WAIT: Duration = Duration::from_secs(5);
const BACKOFF_UNIT: Duration = Duration::from_secs(1);
const MIN_DOCUMENT_BYTES: u64 = 1000;
const MAX_DOCUMENT_BYTES: u64 = 512 * 1024 * 1024;
const SNIFF_BYTES: usize = 1024;

/// Identity strings rotated across attempts; some hosts block one agent but
/// not another.
const IDENTITY_POOL: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// HTTP 403; usually a subscription or anti-automation wall.
    Forbidden,
    /// Body below the minimum plausible document size; the partial file has
    /// been deleted.
    Corrupt { bytes: u64 },
    /// Timeout, transport error, or any other HTTP failure.
    Transport(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Forbidden => write!(f, "access forbidden (403)"),
            FetchFailure::Corrupt { bytes } => {
                write!(f, "download too small to be a document ({bytes} bytes)")
            }
            FetchFailure::Transport(msg) => write!(f, "{msg}"),
        }
    }
}

/// Result of one download, consumed immediately by the batch loop.
#[derive(Debug)]
pub struct FetchOutcome {
    pub bytes: u64,
    pub failure: Option<FetchFailure>,
}

impl FetchOutcome {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

pub struct Fetcher {
    agent: Agent,
    insecure: Agent,
    max_attempts: u32,
    forbidden_wait: Duration,
    backoff_unit: Duration,
}

impl Fetcher {
    pub fn new(max_attempts: u32) -> Fetcher {
        Fetcher::with_timings(max_attempts, FORBIDDEN_WAIT, BACKOFF_UNIT)
    }

    fn with_timings(max_attempts: u32, forbidden_wait: Duration, backoff_unit: Duration) -> Fetcher {
        Fetcher {
            agent: net::build_agent(FETCH_TIMEOUT, true),
            insecure: net::build_agent(FETCH_TIMEOUT, false),
            max_attempts,
            forbidden_wait,
            backoff_unit,
        }
    }

    /// Download `url` to `dest`. A failed terminal outcome never leaves a
    /// partial file on disk.
    pub fn download(&self, url: &Url, dest: &Path, session: Option<&Session>) -> FetchOutcome {
        let mut last = FetchFailure::Transport("no attempts made".to_string());
        for attempt in 0..self.max_attempts {
            info!("downloading (attempt {}): {url}", attempt + 1);
            match self.attempt(url, dest, session, attempt) {
                Ok(bytes) => {
                    info!("saved {} ({bytes} bytes)", dest.display());
                    return FetchOutcome {
                        bytes,
                        failure: None,
                    };
                }
                Err(failure) => {
                    let _ = fs::remove_file(dest);
                    let more = attempt + 1 < self.max_attempts;
                    match &failure {
                        FetchFailure::Forbidden => {
                            warn!("access forbidden (403) for {url} - may require subscription access");
                            if more {
                                thread::sleep(self.forbidden_wait);
                            }
                        }
                        FetchFailure::Corrupt { bytes } => {
                            warn!("downloaded file too small ({bytes} bytes), discarded");
                        }
                        FetchFailure::Transport(msg) => {
                            warn!("download attempt {} failed: {msg}", attempt + 1);
                            if more {
                                thread::sleep(self.backoff_unit * 2u32.pow(attempt));
                            }
                        }
                    }
                    last = failure;
                }
            }
        }
        let _ = fs::remove_file(dest);
        FetchOutcome {
            bytes: 0,
            failure: Some(last),
        }
    }

    fn attempt(
        &self,
        url: &Url,
        dest: &Path,
        session: Option<&Session>,
        attempt: u32,
    ) -> Result<u64, FetchFailure> {
        let identity = IDENTITY_POOL[attempt as usize % IDENTITY_POOL.len()];
        let mut res = self.request(url, session, identity).map_err(classify)?;

        let content_type = res
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut reader = res.body_mut().with_config().limit(MAX_DOCUMENT_BYTES).reader();

        // Sniff the head before committing anything to disk.
        let mut head = [0u8; SNIFF_BYTES];
        let mut filled = 0;
        loop {
            match reader.read(&mut head[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) => return Err(FetchFailure::Transport(err.to_string())),
            }
            if filled >= 5 {
                break;
            }
        }
        let looks_like_document = content_type.contains("pdf")
            || url.path().to_ascii_lowercase().ends_with(".pdf")
            || head[..filled].starts_with(b"%PDF");
        if !looks_like_document {
            warn!("response may not be a document: {url} (content-type {content_type:?})");
        }

        let mut file =
            File::create(dest).map_err(|err| FetchFailure::Transport(err.to_string()))?;
        file.write_all(&head[..filled])
            .map_err(|err| FetchFailure::Transport(err.to_string()))?;
        let copied = io::copy(&mut reader, &mut file)
            .map_err(|err| FetchFailure::Transport(err.to_string()))?;
        drop(file);

        let total = filled as u64 + copied;
        if total < MIN_DOCUMENT_BYTES {
            return Err(FetchFailure::Corrupt { bytes: total });
        }
        Ok(total)
    }

    fn request(
        &self,
        url: &Url,
        session: Option<&Session>,
        identity: &str,
    ) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
        let agent = match session {
            Some(s) if s.applies_to(url) => s.agent(),
            _ => &self.agent,
        };
        let call = |agent: &Agent| {
            agent
                .get(url.as_str())
                .header("User-Agent", identity)
                .header("Accept", "application/pdf,application/octet-stream,*/*")
                .header("Accept-Language", "en-US,en;q=0.9")
                .header("Referer", url.as_str())
                .call()
        };
        match call(agent) {
            Err(err) if net::is_certificate_error(&err) => {
                warn!("certificate validation failed for {url}, retrying without verification");
                call(&self.insecure)
            }
            other => other,
        }
    }
}

fn classify(err: ureq::Error) -> FetchFailure {
    match err {
        ureq::Error::StatusCode(403) => FetchFailure::Forbidden,
        other => FetchFailure::Transport(other.to_string()),
    }
}
