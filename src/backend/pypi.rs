//! PyPI web API: the JSON project endpoint and the HTML search pages.

use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use super::{IndexEntry, normalize_name};
use crate::package::Version;

/// Search pages fetched at most, whatever the index keeps returning.
pub(super) const MAX_SEARCH_PAGES: usize = 50;

static SNIPPET_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"class="package-snippet__name"[^>]*>([^<]*)<"#).expect("valid pattern")
});
static SNIPPET_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"class="package-snippet__version"[^>]*>([^<]*)<"#).expect("valid pattern")
});
static SNIPPET_DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"class="package-snippet__description"[^>]*>([^<]*)<"#).expect("valid pattern")
});

#[derive(Deserialize, Debug)]
pub(super) struct Project {
    pub info: ProjectInfo,
}

#[derive(Deserialize, Debug)]
pub(super) struct ProjectInfo {
    pub name: String,
    pub version: String,
    pub summary: Option<String>,
}

impl Project {
    pub fn into_entry(self) -> (String, IndexEntry) {
        let description = self
            .info
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        (
            normalize_name(&self.info.name),
            IndexEntry {
                version: Version::parse(&self.info.version),
                description,
            },
        )
    }
}

/// Extract the packages listed on one search result page.
pub(super) fn parse_search_page(html: &str) -> Vec<(String, IndexEntry)> {
    html.split(r#"class="package-snippet""#)
        .skip(1)
        .filter_map(|snippet| {
            let field = |re: &Regex| {
                re.captures(snippet)
                    .map(|c| decode_entities(c[1].trim()))
                    .filter(|s| !s.is_empty())
            };
            let name = field(&SNIPPET_NAME)?;
            let version = field(&SNIPPET_VERSION)?;
            Some((
                normalize_name(&name),
                IndexEntry {
                    version: Version::parse(&version),
                    description: field(&SNIPPET_DESCRIPTION),
                },
            ))
        })
        .collect()
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
