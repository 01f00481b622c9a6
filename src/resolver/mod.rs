//! Turns a normalized identifier into a best-guess document URL.
//!
//! The identifier is pushed through the public resolver, redirects are
//! followed to the publisher's landing page, and the page is inspected by a
//! prioritised set of candidate strategies. Resolution failure is an expected
//! outcome here, not an error.

use std::time::Duration;

use anyhow::Context;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use ureq::{Agent, ResponseExt};
use url::Url;

use crate::identifier::Identifier;
use crate::net;

pub mod page;
pub mod publishers;

use self::page::Page;

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);
const LANDING_BODY_LIMIT: u64 = 10 * 1024 * 1024;

/// Where a candidate URL was discovered; doubles as its confidence rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    MetaTag,
    PublisherPattern,
    AnchorHeuristic,
}

/// A possible document location found on a landing page. Transient; never
/// persisted.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub url: String,
    pub source: Strategy,
}

enum Landing {
    /// The redirect chain ended on the document itself.
    Document(Url),
    /// A landing page to inspect, with its final URL for absolutising links.
    Page(Url, String),
}

pub struct Resolver {
    agent: Agent,
    insecure: Agent,
}

impl Resolver {
    pub fn new() -> Resolver {
        Resolver {
            agent: net::build_agent(RESOLVE_TIMEOUT, true),
            insecure: net::build_agent(RESOLVE_TIMEOUT, false),
        }
    }

    /// Resolve an identifier to a document URL. Returns the landing page
    /// itself when no better candidate is found (it may be the document), and
    /// `None` when the identifier cannot be resolved at all.
    pub fn resolve(&self, id: &Identifier) -> Option<Url> {
        let Some(target) = id.resolver_url() else {
            warn!("cannot build a resolver URL for identifier {:?}", id.as_str());
            return None;
        };
        info!("resolving identifier {} via {target}", id.as_str());
        match self.fetch_landing(&target) {
            Ok(Landing::Document(url)) => {
                info!("identifier resolved directly to a document: {url}");
                Some(url)
            }
            Ok(Landing::Page(url, html)) => {
                let page = page::parse(&html);
                match select_candidate(&page, &url) {
                    Some(found) => {
                        info!("found document candidate: {found}");
                        Some(found)
                    }
                    None => {
                        warn!("no document link found on {url}, falling back to the landing page");
                        Some(url)
                    }
                }
            }
            Err(err) => {
                warn!("failed to resolve {}: {err:#}", id.as_str());
                None
            }
        }
    }

    /// Simplified resolution through an alternative resolver authority:
    /// either the redirect chain ends on a document, or the first `.pdf`
    /// href found in the body is taken.
    pub fn resolve_via(&self, target: &Url) -> Option<Url> {
        static HREF_PDF_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r#"(?i)href\s*=\s*["']([^"']*\.pdf[^"']*)["']"#).unwrap());
        match self.fetch_landing(target) {
            Ok(Landing::Document(url)) => Some(url),
            Ok(Landing::Page(url, html)) => {
                if let Some(caps) = HREF_PDF_RE.captures(&html)
                    && let Ok(absolute) = absolutise(&url, &caps[1])
                {
                    return Some(absolute);
                }
                Some(url)
            }
            Err(err) => {
                warn!("alternative resolver {target} failed: {err:#}");
                None
            }
        }
    }

    fn fetch_landing(&self, url: &Url) -> anyhow::Result<Landing> {
        match self.try_get(&self.agent, url) {
            Err(err) if net::is_certificate_error(&err) => {
                warn!("certificate validation failed for {url}, retrying without verification");
                self.try_get(&self.insecure, url)
                    .with_context(|| format!("insecure retry failed for {url}"))
            }
            other => other.with_context(|| format!("request failed for {url}")),
        }
    }

    fn try_get(&self, agent: &Agent, url: &Url) -> Result<Landing, ureq::Error> {
        let mut res = agent
            .get(url.as_str())
            .header("User-Agent", net::BROWSER_UA)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.5")
            .call()?;
        let final_url = Url::parse(&res.get_uri().to_string()).unwrap_or_else(|_| url.clone());
        if final_url.path().to_ascii_lowercase().ends_with(".pdf") {
            return Ok(Landing::Document(final_url));
        }
        let bytes = res
            .body_mut()
            .with_config()
            .limit(LANDING_BODY_LIMIT)
            .read_to_vec()?;
        Ok(Landing::Page(
            final_url,
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    }
}

type StrategyFn = fn(&Page, &Url) -> Vec<Candidate>;

/// Candidate strategies in priority order. Results are pooled in this order
/// and the first candidate surviving the URL-shape filter wins, so earlier
/// strategies outrank later ones.
static STRATEGIES: &[StrategyFn] = &[meta_candidates, publishers::candidates, anchor_candidates];

pub fn select_candidate(page: &Page, landing: &Url) -> Option<Url> {
    let pool: Vec<Candidate> = STRATEGIES.iter().flat_map(|s| s(page, landing)).collect();
    for candidate in pool {
        let Ok(absolute) = absolutise(landing, &candidate.url) else {
            continue;
        };
        if is_likely_document_url(absolute.as_str()) {
            debug!("accepted candidate from {:?}: {absolute}", candidate.source);
            return Some(absolute);
        }
    }
    None
}

/// A dedicated citation metadata tag naming the document outranks everything;
/// failing that, any metadata value carrying a document-extension token.
fn meta_candidates(page: &Page, _landing: &Url) -> Vec<Candidate> {
    if let Some(tag) = page
        .meta
        .iter()
        .find(|m| m.name.as_deref() == Some("citation_pdf_url"))
        && !tag.content.trim().is_empty()
    {
        return vec![Candidate {
            url: tag.content.trim().to_string(),
            source: Strategy::MetaTag,
        }];
    }
    page.meta
        .iter()
        .filter(|m| m.content.to_ascii_lowercase().contains(".pdf"))
        .map(|m| Candidate {
            url: m.content.trim().to_string(),
            source: Strategy::MetaTag,
        })
        .collect()
}

const TEXT_TOKENS: [&str; 3] = ["pdf", "download", "full text"];
const HREF_TOKENS: [&str; 3] = [".pdf", "pdf", "download"];

fn anchor_candidates(page: &Page, _landing: &Url) -> Vec<Candidate> {
    page.anchors
        .iter()
        .filter(|a| {
            let text = a.text.to_lowercase();
            let href = a.href.to_ascii_lowercase();
            TEXT_TOKENS.iter().any(|t| text.contains(t))
                || HREF_TOKENS.iter().any(|t| href.contains(t))
        })
        .map(|a| Candidate {
            url: a.href.clone(),
            source: Strategy::AnchorHeuristic,
        })
        .collect()
}

/// URL-shape validator shared by all strategies and by the catalog, which
/// only records URLs that plausibly point at a document.
pub fn is_likely_document_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.ends_with(".pdf")
        || ["pdf", "download", "filetype=pdf", "content-type=application/pdf"]
            .iter()
            .any(|token| lower.contains(token))
}

fn absolutise(base: &Url, candidate: &str) -> anyhow::Result<Url> {
    if let Ok(url) = Url::parse(candidate) {
        return Ok(url);
    }
    if candidate.starts_with("//") {
        return Url::parse(&format!("{}:{}", base.scheme(), candidate)).map_err(Into::into);
    }
    base.join(candidate).map_err(Into::into)
}
