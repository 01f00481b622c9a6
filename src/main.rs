use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use once_cell::sync::Lazy;
use owo_colors::OwoColorize;
use regex::Regex;
use simple_logger::SimpleLogger;
use url::Url;

use crate::{
    catalog::{Catalog, NewRecord},
    cli::Cli,
    fetcher::{FetchFailure, Fetcher},
    identifier::Identifier,
    input::Row,
    report::FailedRow,
    resolver::Resolver,
    session::{LoginOutcome, Session},
};

mod catalog;
mod cli;
mod fetcher;
mod identifier;
mod input;
mod net;
mod report;
mod resolver;
mod session;

/// Politeness pause between rows that touched the network.
const ROW_PAUSE: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    SimpleLogger::new().with_level(args.log_level).init()?;
    run(&args)
}

fn run(args: &Cli) -> anyhow::Result<()> {
    let rows = input::read_rows(&args.input)?;
    info!("read {} rows from {}", rows.len(), args.input.display());

    let session = establish_session(args);

    let update_catalog = if args.update_catalog {
        true
    } else if args.no_catalog {
        false
    } else {
        cli::confirm("Update the publication catalog?")
    };
    let mut catalog = if update_catalog {
        if let Some(parent) = args.catalog.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("could not create catalog directory {}", parent.display())
            })?;
        }
        let loaded = Catalog::load(&args.catalog)?;
        info!("catalog holds {} year groups", loaded.groups().len());
        Some(loaded)
    } else {
        None
    };

    fs::create_dir_all(&args.output)
        .with_context(|| format!("could not create output directory {}", args.output.display()))?;

    let resolver = Resolver::new();
    let fetcher = Fetcher::new(args.max_attempts);
    let mut blocked: HashSet<String> = HashSet::new();
    let mut merges = MergeCounts::default();
    let mut succeeded = 0usize;
    let mut failed: Vec<FailedRow> = Vec::new();

    let bar = ProgressBar::new(rows.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("[{bar:30}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=> "),
    );
    for row in &rows {
        let (outcome, touched_network) = process_row(
            row,
            &resolver,
            &fetcher,
            session.as_ref(),
            &mut catalog,
            &mut blocked,
            &mut merges,
            &args.output,
        );
        match outcome {
            RowOutcome::Completed => succeeded += 1,
            RowOutcome::Failed(reason) => {
                warn!("row failed ({}): {reason}", display_title(row));
                failed.push(FailedRow {
                    title: fallback(&row.title, "Missing Title"),
                    author: fallback(&row.first_author, "Missing Author"),
                    identifier: fallback(&row.doi, "Missing Identifier"),
                    reason,
                });
            }
        }
        bar.inc(1);
        if touched_network {
            thread::sleep(ROW_PAUSE);
        }
    }
    bar.finish_and_clear();

    if let Some(catalog) = catalog.as_mut() {
        if merges.inserted > 0 {
            let backup = catalog
                .save(&args.catalog)
                .context("failed to persist the publication catalog")?;
            if let Some(backup) = backup {
                info!("previous catalog preserved as {}", backup.display());
            }
            info!(
                "catalog updated: {} added, {} duplicates skipped",
                merges.inserted, merges.duplicates
            );
        } else {
            info!("no new catalog entries");
        }
    }

    match report::write_report(&args.output, succeeded, &failed) {
        Ok(path) => info!("report written to {}", path.display()),
        Err(err) => warn!("could not write the download report: {err:#}"),
    }

    eprintln!(
        "{} {}  {} {}",
        "✓".green(),
        succeeded,
        "✗".red(),
        failed.len()
    );
    info!("documents saved in {}", args.output.display());
    Ok(())
}

#[derive(Debug)]
enum RowOutcome {
    /// Downloaded now, or already present on disk.
    Completed,
    Failed(String),
}

#[derive(Debug, Default)]
struct MergeCounts {
    inserted: usize,
    duplicates: usize,
}

#[allow(clippy::too_many_arguments)]
fn process_row(
    row: &Row,
    resolver: &Resolver,
    fetcher: &Fetcher,
    session: Option<&Session>,
    catalog: &mut Option<Catalog>,
    blocked: &mut HashSet<String>,
    merges: &mut MergeCounts,
    output: &Path,
) -> (RowOutcome, bool) {
    if row.title.is_empty() || row.doi.is_empty() {
        return (
            RowOutcome::Failed("missing title or identifier".to_string()),
            false,
        );
    }

    let dest = output.join(document_file_name(&row.year, &row.first_author, &row.title));
    let already_present = dest.exists();
    if already_present && catalog.is_none() {
        info!("already downloaded, skipping: {}", dest.display());
        return (RowOutcome::Completed, false);
    }

    info!("processing: {}", display_title(row));
    let id = Identifier::normalize(&row.doi);
    if !id.is_canonical() {
        warn!("identifier does not start with \"10.\": {}", id.as_str());
    }
    let resolved = resolver.resolve(&id).or_else(|| {
        id.fallback_resolver_urls().into_iter().find_map(|alt| {
            info!("trying alternative resolver: {alt}");
            resolver.resolve_via(&alt)
        })
    });

    if let Some(catalog) = catalog.as_mut() {
        let record_url = resolved
            .as_ref()
            .map(Url::as_str)
            .filter(|u| resolver::is_likely_document_url(u));
        let record = NewRecord {
            title: &row.title,
            first_author: &row.first_author,
            year: &row.year,
            url: record_url,
        };
        if catalog.insert(&record) {
            merges.inserted += 1;
        } else {
            merges.duplicates += 1;
        }
    }

    if already_present {
        info!("already downloaded, skipping: {}", dest.display());
        return (RowOutcome::Completed, true);
    }

    let Some(url) = resolved else {
        return (
            RowOutcome::Failed("could not resolve identifier to a document location".to_string()),
            true,
        );
    };

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if blocked.contains(&host) {
        return (
            RowOutcome::Failed(format!("{host} refused access earlier in this run")),
            true,
        );
    }

    let outcome = fetcher.download(&url, &dest, session);
    if outcome.success() {
        info!("downloaded {} ({} bytes)", dest.display(), outcome.bytes);
        return (RowOutcome::Completed, true);
    }
    let failure = outcome
        .failure
        .unwrap_or(FetchFailure::Transport("download failed".to_string()));
    match failure {
        FetchFailure::Forbidden => {
            blocked.insert(host.clone());
            let label = session::subscription_name(&host)
                .map(|name| format!(" ({name} subscription)"))
                .unwrap_or_default();
            (
                RowOutcome::Failed(format!("access forbidden{label}")),
                true,
            )
        }
        other => (RowOutcome::Failed(other.to_string()), true),
    }
}

fn establish_session(args: &Cli) -> Option<Session> {
    if args.no_auth {
        return None;
    }
    let credentials = cli::ask_credentials()?;
    match Session::establish(&credentials.username, &credentials.password) {
        Ok((session, LoginOutcome::Authenticated)) => {
            info!("authentication succeeded");
            Some(session)
        }
        Ok((session, LoginOutcome::Ambiguous)) => {
            warn!("authentication outcome unclear, continuing optimistically");
            Some(session)
        }
        Ok((_, LoginOutcome::Rejected)) => {
            error!("authentication rejected, continuing without a session");
            None
        }
        Err(err) => {
            error!("authentication failed: {err:#}, continuing without a session");
            None
        }
    }
}

/// `<year>-<author>-<title>.pdf` with each component sanitized for the
/// filesystem; empty components are dropped.
fn document_file_name(year: &str, author: &str, title: &str) -> String {
    let joined = [year, author, title]
        .iter()
        .filter(|part| !part.trim().is_empty())
        .map(|part| sanitize_component(part))
        .collect::<Vec<_>>()
        .join("-");
    format!("{joined}.pdf")
}

const COMPONENT_LIMIT: usize = 200;

fn sanitize_component(text: &str) -> String {
    static FORBIDDEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());
    let cleaned = FORBIDDEN_RE.replace_all(text, "");
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > COMPONENT_LIMIT {
        let truncated: String = collapsed.chars().take(COMPONENT_LIMIT).collect();
        format!("{truncated}...")
    } else {
        collapsed
    }
}

fn display_title(row: &Row) -> String {
    let mut title = row.title.chars().take(50).collect::<String>();
    if title.len() < row.title.len() {
        title.push_str("...");
    }
    fallback(&title, "Missing Title")
}

fn fallback(value: &str, replacement: &str) -> String {
    if value.trim().is_empty() {
        replacement.to_string()
    } else {
        value.to_string()
    }
}
