use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use url::Url;

const PATH_SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Recognised textual/URL prefixes, stripped exactly once. Case-sensitive on
/// purpose; only these variants occur in practice.
const RECOGNISED_PREFIXES: [&str; 4] = ["https://doi.org/", "http://doi.org/", "doi:", "DOI:"];

const RESOLVER_BASE: &str = "https://doi.org/";

/// A normalized scholarly identifier. Canonical identifiers begin with `10.`;
/// anything else is accepted but flagged, and left to fail downstream instead
/// of aborting the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    value: String,
    canonical: bool,
}

impl Identifier {
    pub fn normalize(raw: &str) -> Identifier {
        let mut s = raw.trim();
        for prefix in RECOGNISED_PREFIXES {
            if let Some(rest) = s.strip_prefix(prefix) {
                s = rest;
                break;
            }
        }
        let value = s.trim().to_string();
        let canonical = value.starts_with("10.");
        Identifier { value, canonical }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn is_canonical(&self) -> bool {
        self.canonical
    }

    /// Primary resolver URL. `None` only for values that cannot form a URL at
    /// all; the caller treats that as a resolution failure for the row.
    pub fn resolver_url(&self) -> Option<Url> {
        self.url_against(RESOLVER_BASE)
    }

    /// Alternative resolver authorities, tried in order when the primary
    /// resolver comes up empty.
    pub fn fallback_resolver_urls(&self) -> Vec<Url> {
        ["https://dx.doi.org/", "http://doi.org/"]
            .iter()
            .filter_map(|base| self.url_against(base))
            .collect()
    }

    fn url_against(&self, base: &str) -> Option<Url> {
        let encoded = utf8_percent_encode(&self.value, PATH_SEGMENT_ENCODE_SET).to_string();
        Url::parse(&format!("{base}{encoded}")).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::Strategy;

    fn doi_core() -> impl Strategy<Value = String> {
        (
            proptest::collection::vec(
                proptest::sample::select(('0'..='9').collect::<Vec<_>>()),
                4..=9,
            )
            .prop_map(|v| v.into_iter().collect::<String>()),
            "[A-Za-z0-9._/-]{1,32}",
        )
            .prop_map(|(digits, suffix)| format!("10.{digits}/{suffix}"))
    }

    #[test]
    fn normalize_strips_resolver_url() {
        let id = Identifier::normalize("https://doi.org/10.1038/nature12373");
        assert_eq!(id.as_str(), "10.1038/nature12373");
        assert!(id.is_canonical());
    }

    #[test]
    fn normalize_strips_each_recognised_prefix() {
        proptest::proptest!(|(core in doi_core(), prefix in proptest::sample::select(RECOGNISED_PREFIXES.to_vec()))| {
            let id = Identifier::normalize(&format!("{prefix}{core}"));
            proptest::prop_assert_eq!(id.as_str(), core.as_str());
            proptest::prop_assert!(id.is_canonical());
        })
    }

    #[test]
    fn normalize_is_idempotent_on_canonical_values() {
        proptest::proptest!(|(core in doi_core())| {
            let once = Identifier::normalize(&core);
            let twice = Identifier::normalize(once.as_str());
            proptest::prop_assert_eq!(once, twice);
        })
    }

    #[test]
    fn normalize_trims_whitespace() {
        let id = Identifier::normalize("  doi:10.1000/182 ");
        assert_eq!(id.as_str(), "10.1000/182");
    }

    #[test]
    fn malformed_values_are_flagged_not_rejected() {
        let id = Identifier::normalize("not-an-identifier");
        assert_eq!(id.as_str(), "not-an-identifier");
        assert!(!id.is_canonical());
    }

    #[test]
    fn only_one_prefix_is_stripped() {
        // A second prefix is part of the value, not recursively removed.
        let id = Identifier::normalize("doi:DOI:10.1/x");
        assert_eq!(id.as_str(), "DOI:10.1/x");
        assert!(!id.is_canonical());
    }

    #[test]
    fn resolver_url_percent_encodes_the_identifier() {
        let id = Identifier::normalize("10.1000/a b<c>");
        let url = id.resolver_url().expect("url");
        assert_eq!(url.as_str(), "https://doi.org/10.1000/a%20b%3Cc%3E");
    }

    #[test]
    fn fallback_urls_cover_alternative_authorities() {
        let id = Identifier::normalize("10.1000/182");
        let urls: Vec<String> = id
            .fallback_resolver_urls()
            .iter()
            .map(|u| u.as_str().to_string())
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://dx.doi.org/10.1000/182".to_string(),
                "http://doi.org/10.1000/182".to_string(),
            ]
        );
    }
}
