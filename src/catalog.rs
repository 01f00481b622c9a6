//! Grouped, deduplicated publication catalog.
//!
//! The catalog file is the single source of truth for the publication list;
//! this module is the only code that mutates or serializes it. Updates go
//! through load -> merge in memory -> backup-then-overwrite.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Years below this cutoff (and unparseable years) share the catch-all group.
pub const YEAR_CUTOFF: i32 = 2022;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearKey {
    Year(i32),
    Older,
}

impl fmt::Display for YearKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearKey::Year(year) => write!(f, "{year}"),
            YearKey::Older => write!(f, "older"),
        }
    }
}

impl Serialize for YearKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            YearKey::Year(year) => serializer.serialize_i32(*year),
            YearKey::Older => serializer.serialize_str("older"),
        }
    }
}

impl<'de> Deserialize<'de> for YearKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl Visitor<'_> for KeyVisitor {
            type Value = YearKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "an integer year or the string \"older\"")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<YearKey, E> {
                Ok(YearKey::Year(v as i32))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<YearKey, E> {
                Ok(YearKey::Year(v as i32))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<YearKey, E> {
                if v == "older" {
                    Ok(YearKey::Older)
                } else {
                    v.parse()
                        .map(YearKey::Year)
                        .map_err(|_| E::custom(format!("unexpected year key {v:?}")))
                }
            }
        }

        deserializer.deserialize_any(KeyVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub id: String,
    pub title: String,
    /// Resolved document URL, or empty when resolution produced nothing usable.
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearGroup {
    pub year: YearKey,
    pub publications: Vec<PublicationRecord>,
}

/// Fields of a record about to be merged; everything else is derived.
#[derive(Debug)]
pub struct NewRecord<'a> {
    pub title: &'a str,
    pub first_author: &'a str,
    pub year: &'a str,
    pub url: Option<&'a str>,
}

#[derive(Debug, Default)]
pub struct Catalog {
    groups: Vec<YearGroup>,
}

impl Catalog {
    /// Load the catalog, starting empty when the file does not exist yet.
    pub fn load(path: &Path) -> anyhow::Result<Catalog> {
        if !path.exists() {
            info!("catalog {} not found, starting a new one", path.display());
            return Ok(Catalog::default());
        }
        let body = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        let groups = serde_json::from_str(&body)
            .with_context(|| format!("failed to parse catalog {}", path.display()))?;
        Ok(Catalog { groups })
    }

    /// Merge one record. Returns false when a case-insensitive title match
    /// already exists anywhere in the catalog.
    pub fn insert(&mut self, record: &NewRecord<'_>) -> bool {
        let title_lower = record.title.to_lowercase();
        let duplicate = self
            .groups
            .iter()
            .flat_map(|g| &g.publications)
            .any(|p| p.title.to_lowercase() == title_lower);
        if duplicate {
            info!("duplicate publication skipped: {}", record.title);
            return false;
        }

        let key = categorize_year(record.year);
        let index = match self.groups.iter().position(|g| g.year == key) {
            Some(index) => index,
            None => {
                self.groups.push(YearGroup {
                    year: key,
                    publications: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        self.groups[index].publications.push(PublicationRecord {
            id: publication_id(record.year, record.first_author, record.title),
            title: record.title.to_string(),
            url: record.url.unwrap_or_default().to_string(),
            kind: "journal".to_string(),
            status: "published".to_string(),
        });
        info!("added publication: {} ({key})", record.title);
        true
    }

    /// Persist the catalog: back up any existing file under a timestamped
    /// name, then write the groups sorted newest-first with the catch-all
    /// group last.
    pub fn save(&mut self, path: &Path) -> anyhow::Result<Option<PathBuf>> {
        self.groups.sort_by_key(|g| sort_rank(g.year));

        let mut backup = None;
        if path.exists() {
            let stamp = Local::now().format("%Y%m%d_%H%M%S");
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("catalog");
            let backup_path = path.with_file_name(format!("{name}.backup.{stamp}"));
            fs::rename(path, &backup_path).with_context(|| {
                format!("failed to back up catalog to {}", backup_path.display())
            })?;
            backup = Some(backup_path);
        }

        let body =
            serde_json::to_string_pretty(&self.groups).context("failed to serialize catalog")?;
        fs::write(path, body)
            .with_context(|| format!("failed to write catalog {}", path.display()))?;
        Ok(backup)
    }

    pub fn groups(&self) -> &[YearGroup] {
        &self.groups
    }
}

/// Numeric years at or above the cutoff keep their own group; everything
/// else, including unparseable years, lands in the catch-all.
pub fn categorize_year(raw: &str) -> YearKey {
    match raw.trim().parse::<i32>() {
        Ok(year) if year >= YEAR_CUTOFF => YearKey::Year(year),
        _ => YearKey::Older,
    }
}

static SEPARATOR_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").unwrap());

/// Stable catalog identifier: year, alphabetic-only author surname (max 15
/// chars), and the first five alphanumeric title words, lowercased and
/// underscore-joined with separator runs collapsed.
pub fn publication_id(year: &str, first_author: &str, title: &str) -> String {
    let author: String = first_author
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(15)
        .collect();
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().take(5).collect();
    let id = format!("{}_{}_{}", year.trim(), author, words.join("_")).to_lowercase();
    SEPARATOR_RUN_RE.replace_all(&id, "_").into_owned()
}

fn sort_rank(key: YearKey) -> (u8, i64) {
    match key {
        YearKey::Year(year) => (0, -(year as i64)),
        YearKey::Older => (1, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record<'a>(title: &'a str, year: &'a str) -> NewRecord<'a> {
        NewRecord {
            title,
            first_author: "Smith",
            year,
            url: None,
        }
    }

    #[test]
    fn identifier_derivation_matches_the_documented_shape() {
        assert_eq!(
            publication_id("2023", "O'Brien-Smith", "Deep Learning for Chest X-Ray Analysis: a survey"),
            "2023_obriensmith_deep_learning_for_chest_xray"
        );
    }

    #[test]
    fn identifier_collapses_separator_runs() {
        // An empty author would otherwise leave a double underscore behind.
        assert_eq!(publication_id("2023", "123", "A B"), "2023_a_b");
    }

    #[test]
    fn identifier_truncates_author_to_fifteen_letters() {
        let id = publication_id("2022", "Abcdefghijklmnopqrstu", "T");
        assert_eq!(id, "2022_abcdefghijklmno_t");
    }

    #[test]
    fn year_categorization_boundary() {
        assert_eq!(categorize_year("2022"), YearKey::Year(2022));
        assert_eq!(categorize_year("2030"), YearKey::Year(2030));
        assert_eq!(categorize_year("2021"), YearKey::Older);
        assert_eq!(categorize_year("n/a"), YearKey::Older);
        assert_eq!(categorize_year(" 2023 "), YearKey::Year(2023));
    }

    proptest! {
        #[test]
        fn year_categorization_total(raw in "\\PC{0,8}") {
            match categorize_year(&raw) {
                YearKey::Year(y) => prop_assert!(y >= YEAR_CUTOFF),
                YearKey::Older => {}
            }
        }

        #[test]
        fn identifiers_never_contain_separator_runs(
            year in "[0-9]{4}",
            author in "\\PC{0,24}",
            title in "\\PC{0,64}",
        ) {
            let id = publication_id(&year, &author, &title);
            prop_assert!(!id.contains("__"));
            prop_assert_eq!(id.to_lowercase(), id.clone());
        }
    }

    #[test]
    fn case_varied_duplicate_titles_block_insertion() {
        let mut catalog = Catalog::default();
        assert!(catalog.insert(&record("A Study", "2021")));
        assert!(!catalog.insert(&record("a STUDY", "2023")));
        // The first insertion landed in the catch-all group.
        assert_eq!(catalog.groups().len(), 1);
        assert_eq!(catalog.groups()[0].year, YearKey::Older);
        assert_eq!(catalog.groups()[0].publications.len(), 1);
    }

    #[test]
    fn insertion_preserves_order_within_a_group() {
        let mut catalog = Catalog::default();
        assert!(catalog.insert(&record("First", "2023")));
        assert!(catalog.insert(&record("Second", "2023")));
        let titles: Vec<&str> = catalog.groups()[0]
            .publications
            .iter()
            .map(|p| p.title.as_str())
            .collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[test]
    fn records_carry_fixed_type_and_status() {
        let mut catalog = Catalog::default();
        let rec = NewRecord {
            title: "A Study",
            first_author: "Smith",
            year: "2024",
            url: Some("https://pub.example/a.pdf"),
        };
        assert!(catalog.insert(&rec));
        let saved = &catalog.groups()[0].publications[0];
        assert_eq!(saved.kind, "journal");
        assert_eq!(saved.status, "published");
        assert_eq!(saved.url, "https://pub.example/a.pdf");
    }

    #[test]
    fn round_trip_through_disk_reproduces_the_catalog() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("publications.json");

        let mut catalog = Catalog::default();
        assert!(catalog.insert(&NewRecord {
            title: "A Study",
            first_author: "Smith",
            year: "2024",
            url: Some("https://pub.example/a.pdf"),
        }));
        catalog.save(&path).expect("save");

        let reloaded = Catalog::load(&path).expect("load");
        assert_eq!(reloaded.groups().len(), 1);
        assert_eq!(reloaded.groups()[0].year, YearKey::Year(2024));
        let rec = &reloaded.groups()[0].publications[0];
        assert_eq!(rec.id, "2024_smith_a_study");
        assert_eq!(rec.title, "A Study");
        assert_eq!(rec.url, "https://pub.example/a.pdf");
    }

    #[test]
    fn save_backs_up_the_previous_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("publications.json");

        let mut catalog = Catalog::default();
        catalog.insert(&record("A Study", "2024"));
        assert_eq!(catalog.save(&path).expect("first save"), None);

        catalog.insert(&record("Another Study", "2023"));
        let backup = catalog.save(&path).expect("second save").expect("backup path");
        assert!(backup.exists());
        let backup_name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(backup_name.starts_with("publications.json.backup."));

        // The backup holds the single-record state from before the overwrite.
        let old = Catalog::load(&backup).expect("load backup");
        assert_eq!(old.groups().iter().map(|g| g.publications.len()).sum::<usize>(), 1);
    }

    #[test]
    fn groups_persist_newest_first_with_the_catch_all_last() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("publications.json");

        let mut catalog = Catalog::default();
        catalog.insert(&record("Old", "1999"));
        catalog.insert(&record("Mid", "2022"));
        catalog.insert(&record("New", "2024"));
        catalog.save(&path).expect("save");

        let body = fs::read_to_string(&path).expect("read");
        let raw: serde_json::Value = serde_json::from_str(&body).expect("json");
        let years: Vec<String> = raw
            .as_array()
            .unwrap()
            .iter()
            .map(|g| g["year"].to_string())
            .collect();
        assert_eq!(years, vec!["2024", "2022", "\"older\""]);
    }

    #[test]
    fn unknown_year_keys_fail_to_parse() {
        let err = serde_json::from_str::<Vec<YearGroup>>(
            r#"[{"year": "sometime", "publications": []}]"#,
        );
        assert!(err.is_err());
    }
}
