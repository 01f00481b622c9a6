use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;

use crate::fetcher;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// CSV table of publications to process (Title, First Author,
    /// Publication Year, DOI)
    #[arg(short, long, value_name = "FILE", default_value = "pubs.csv")]
    pub input: PathBuf,

    /// Directory the downloaded documents are written to
    #[arg(short, long, value_name = "DIR", default_value = "publications")]
    pub output: PathBuf,

    /// Grouped publication catalog to update
    #[arg(
        long,
        value_name = "FILE",
        default_value = "assets/html/publications.json"
    )]
    pub catalog: PathBuf,

    /// Update the catalog without asking
    #[arg(long, conflicts_with = "no_catalog")]
    pub update_catalog: bool,

    /// Skip the catalog update without asking
    #[arg(long)]
    pub no_catalog: bool,

    /// Skip the subscription authentication prompt
    #[arg(long)]
    pub no_auth: bool,

    /// Maximum download attempts per document
    #[arg(long, value_name = "N", default_value_t = fetcher::DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: log::LevelFilter,
}

/// Interactive yes/no question on stderr. Anything but an explicit yes
/// (including EOF in non-interactive runs) counts as no.
pub fn confirm(question: &str) -> bool {
    match prompt(&format!("{question} (y/n): ")) {
        Some(answer) => matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"),
        None => false,
    }
}

#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Ask whether to authenticate and collect credentials when wanted. Empty
/// input cancels authentication rather than submitting blank credentials.
pub fn ask_credentials() -> Option<Credentials> {
    if !confirm("Do you have subscription credentials?") {
        return None;
    }
    let username = prompt("Username: ")?;
    let password = prompt("Password: ")?;
    if username.is_empty() || password.is_empty() {
        eprintln!("Username or password is empty. Continuing without authentication.");
        return None;
    }
    Some(Credentials { username, password })
}

fn prompt(label: &str) -> Option<String> {
    eprint!("{label}");
    let _ = io::stderr().flush();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}
