//! Package version ordering.
//!
//! Versions published on conda channels and PyPI follow (mostly) the Python
//! packaging scheme: `[N!]N(.N)*[{a|b|rc}N][.postN][.devN][+local]`. Only the
//! parts needed to order releases are parsed; strings that do not fit compare
//! after every parseable version, by plain text among themselves.

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^v?
        (?:(?P<epoch>\d+)!)?
        (?P<release>\d+(?:\.\d+)*)
        (?:[-_.]?(?P<pre_l>alpha|a|beta|b|preview|pre|rc|c)[-_.]?(?P<pre_n>\d*))?
        (?:-(?P<post_implicit>\d+)|[-_.]?(?:post|rev|r)[-_.]?(?P<post_n>\d*))?
        (?:[-_.]?dev[-_.]?(?P<dev_n>\d*))?
        (?:\+[a-z0-9]+(?:[-_.][a-z0-9]+)*)?
        $",
    )
    .expect("version pattern is valid")
});

/// Pre-release position. A bare `.devN` sorts before every pre-release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PreRelease {
    DevOnly,
    Alpha(u64),
    Beta(u64),
    Candidate(u64),
    Final,
}

/// Development marker. A final build sorts after its `.devN` builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DevRelease {
    Dev(u64),
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    epoch: u64,
    release: Vec<u64>,
    pre: PreRelease,
    post: Option<u64>,
    dev: DevRelease,
}

/// A comparable package version.
#[derive(Debug, Clone)]
pub struct Version {
    text: String,
    key: Option<Key>,
}

impl Version {
    pub fn parse(text: &str) -> Self {
        let text = text.trim().to_string();
        let key = parse_key(&text.to_lowercase());
        Self { text, key }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// True when the string was understood as a version number.
    pub fn is_valid(&self) -> bool {
        self.key.is_some()
    }

    pub fn is_prerelease(&self) -> bool {
        self.key.as_ref().is_some_and(|k| {
            k.pre != PreRelease::Final || matches!(k.dev, DevRelease::Dev(_))
        })
    }
}

fn number(s: Option<regex::Match<'_>>) -> u64 {
    s.and_then(|m| m.as_str().parse().ok()).unwrap_or(0)
}

fn parse_key(text: &str) -> Option<Key> {
    let caps = VERSION_RE.captures(text)?;

    let mut release = caps["release"]
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    while release.len() > 1 && release.last() == Some(&0) {
        release.pop();
    }

    let dev = match caps.name("dev_n") {
        Some(n) => DevRelease::Dev(number(Some(n))),
        None => DevRelease::Final,
    };

    let post = if caps.name("post_implicit").is_some() {
        Some(number(caps.name("post_implicit")))
    } else if caps.name("post_n").is_some() {
        Some(number(caps.name("post_n")))
    } else {
        None
    };

    let pre = match caps.name("pre_l").map(|m| m.as_str()) {
        Some("a" | "alpha") => PreRelease::Alpha(number(caps.name("pre_n"))),
        Some("b" | "beta") => PreRelease::Beta(number(caps.name("pre_n"))),
        Some(_) => PreRelease::Candidate(number(caps.name("pre_n"))),
        None if post.is_none() && matches!(dev, DevRelease::Dev(_)) => PreRelease::DevOnly,
        None => PreRelease::Final,
    };

    Some(Key {
        epoch: number(caps.name("epoch")),
        release,
        pre,
        post,
        dev,
    })
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.key, &other.key) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.text.cmp(&other.text),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for Version {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}
