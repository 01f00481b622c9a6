//! Hand-tuned link rules for publisher sites whose download links generic
//! heuristics miss. New publishers become additional table entries.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::resolver::page::Page;
use crate::resolver::{Candidate, Strategy};

pub struct PublisherRule {
    /// Authority substring the landing URL must contain for the rule to apply.
    pub host: &'static str,
    /// Builds a candidate straight from the landing URL, without a matching link.
    pub synthesize: Option<fn(&Url) -> Option<String>>,
    /// Link filter over (lower-cased href, lower-cased anchor text).
    pub link_matches: fn(&str, &str) -> bool,
}

pub static RULES: &[PublisherRule] = &[
    PublisherRule {
        host: "ncbi.nlm.nih.gov",
        synthesize: Some(pmc_pdf_url),
        link_matches: pmc_link,
    },
    PublisherRule {
        host: "nature.com",
        synthesize: None,
        link_matches: nature_link,
    },
    PublisherRule {
        host: "sciencedirect.com",
        synthesize: None,
        link_matches: elsevier_link,
    },
    PublisherRule {
        host: "elsevier.com",
        synthesize: None,
        link_matches: elsevier_link,
    },
    PublisherRule {
        host: "springer.com",
        synthesize: None,
        link_matches: springer_link,
    },
    PublisherRule {
        host: "wiley.com",
        synthesize: None,
        link_matches: wiley_link,
    },
    PublisherRule {
        host: "ieee.org",
        synthesize: None,
        link_matches: ieee_link,
    },
];

/// Life-sciences repository articles expose their document under a fixed
/// `/pdf/` path derived from the article id.
fn pmc_pdf_url(landing: &Url) -> Option<String> {
    static PMC_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/pmc/articles/([^/]+)").unwrap());
    let caps = PMC_ID_RE.captures(landing.path())?;
    Some(format!(
        "https://www.ncbi.nlm.nih.gov/pmc/articles/{}/pdf/",
        &caps[1]
    ))
}

fn pmc_link(href: &str, _text: &str) -> bool {
    href.contains("pdf") && href.contains("/pmc/")
}

fn nature_link(href: &str, _text: &str) -> bool {
    href.contains(".pdf") || href.contains("download")
}

fn elsevier_link(href: &str, _text: &str) -> bool {
    href.contains("pdfdownload") || href.contains("pdf")
}

fn springer_link(href: &str, _text: &str) -> bool {
    href.contains("content/pdf") || href.contains("download")
}

fn wiley_link(href: &str, _text: &str) -> bool {
    href.contains("pdfdirect") || href.contains("pdf")
}

fn ieee_link(href: &str, text: &str) -> bool {
    href.contains("pdf") && text.contains("download")
}

pub fn candidates(page: &Page, landing: &Url) -> Vec<Candidate> {
    let landing_str = landing.as_str().to_ascii_lowercase();
    let mut out = Vec::new();
    for rule in RULES {
        if !landing_str.contains(rule.host) {
            continue;
        }
        if let Some(synthesize) = rule.synthesize
            && let Some(url) = synthesize(landing)
        {
            out.push(Candidate {
                url,
                source: Strategy::PublisherPattern,
            });
        }
        for anchor in &page.anchors {
            let href = anchor.href.to_ascii_lowercase();
            let text = anchor.text.to_ascii_lowercase();
            if (rule.link_matches)(&href, &text) {
                out.push(Candidate {
                    url: anchor.href.clone(),
                    source: Strategy::PublisherPattern,
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::page;

    #[test]
    fn pmc_article_url_synthesizes_pdf_path() {
        let landing = Url::parse("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC123456/").unwrap();
        let found = candidates(&page::Page::default(), &landing);
        assert_eq!(
            found[0].url,
            "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC123456/pdf/"
        );
    }

    #[test]
    fn springer_rule_matches_content_pdf_links() {
        let html = r#"<a href="/content/pdf/10.1007/s1-2.pdf">Download chapter</a>
                      <a href="/journal/10">Journal home</a>"#;
        let landing = Url::parse("https://link.springer.com/article/10.1007/s1-2").unwrap();
        let found = candidates(&page::parse(html), &landing);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "/content/pdf/10.1007/s1-2.pdf");
    }

    #[test]
    fn ieee_rule_requires_download_text() {
        let html = r#"<a href="/stamp/stamp.jsp?arnumber=1&format=pdf">View</a>
                      <a href="/stamp/stamp.jsp?arnumber=1&format=pdf">Download PDF</a>"#;
        let landing = Url::parse("https://ieeexplore.ieee.org/document/1").unwrap();
        let found = candidates(&page::parse(html), &landing);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "/stamp/stamp.jsp?arnumber=1&format=pdf");
    }

    #[test]
    fn unrelated_hosts_produce_nothing() {
        let html = r#"<a href="/file.pdf">PDF</a>"#;
        let landing = Url::parse("https://example.org/article/1").unwrap();
        assert!(candidates(&page::parse(html), &landing).is_empty());
    }
}
