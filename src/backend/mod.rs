//! Backend adapters for the two package sources.
//!
//! SEAMM components are distributed both on conda channels and on PyPI. The
//! [`EnvironmentManager`] trait wraps `conda`, which also owns the environment
//! SEAMM lives in; [`PackageIndex`] wraps `python -m pip` plus the PyPI web
//! API. Both expose the same verb set so the action engine can dispatch on a
//! package's [`Channel`] without caring which tool does the work.

mod conda;
mod pip;
mod pypi;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::package::Version;

pub use conda::{Conda, DEFAULT_CHANNEL};
pub use pip::{DEFAULT_INDEX_URL, Pip};

/// The source a package version comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Pypi,
    Conda(String),
}

impl Channel {
    /// Interpret a channel as reported by conda (a name or a channel URL).
    pub fn parse(text: &str) -> Self {
        let name = channel_name(text);
        if name.eq_ignore_ascii_case("pypi") {
            Channel::Pypi
        } else {
            Channel::Conda(name)
        }
    }

    pub fn is_pypi(&self) -> bool {
        matches!(self, Channel::Pypi)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Pypi => write!(f, "pypi"),
            Channel::Conda(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for Channel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Channel::parse(s))
    }
}

/// Reduce `https://conda.anaconda.org/conda-forge/noarch` to `conda-forge`.
fn channel_name(text: &str) -> String {
    let trimmed = text.trim().trim_end_matches('/');
    if !trimmed.contains("://") {
        return trimmed.to_string();
    }

    let mut segments = trimmed.split('/').skip(3).collect::<Vec<_>>();
    while segments.len() > 1 && segments.last().is_some_and(|s| is_platform_subdir(s)) {
        segments.pop();
    }
    segments
        .last()
        .map(|s| s.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

fn is_platform_subdir(segment: &str) -> bool {
    segment == "noarch"
        || ["linux-", "osx-", "win-"]
            .iter()
            .any(|prefix| segment.starts_with(prefix))
}

/// Canonical form of a package name: lower case, with `_` and `.` as `-`.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().replace(['_', '.'], "-")
}

/// A package as reported by the package index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub version: Version,
    pub description: Option<String>,
}

/// A package as reported by conda, either listed in an environment or found
/// on a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct CondaEntry {
    pub version: Version,
    pub channel: Channel,
    pub description: Option<String>,
}

/// The conda side: environments plus package operations inside the active one.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnvironmentManager: Send + Sync {
    /// Whether a conda executable could be found.
    fn is_installed(&self) -> bool;

    /// Names of all environments (the root prefix is `base`).
    async fn environments(&self) -> Result<Vec<String>>;

    async fn exists(&self, environment: &str) -> Result<bool>;

    /// The environment later commands are directed at, if any.
    fn active_environment(&self) -> Option<String>;

    /// Direct subsequent commands at `environment`.
    fn activate(&self, environment: &str);

    async fn prefix(&self, environment: &str) -> Result<Option<PathBuf>>;

    async fn create_environment(&self, spec: &Path, environment: &str) -> Result<()>;

    async fn update_environment(&self, spec: &Path, environment: &str) -> Result<()>;

    /// Packages installed in the active environment that match `query`.
    async fn list(&self, query: &str, fullname: bool) -> Result<BTreeMap<String, CondaEntry>>;

    /// Highest version per package name available on the default channel.
    async fn search(&self, query: &str) -> Result<BTreeMap<String, CondaEntry>>;

    async fn install(&self, package: &str, channel: &str) -> Result<()>;

    async fn update(&self, package: &str, channel: &str) -> Result<()>;

    async fn uninstall(&self, package: &str) -> Result<()>;
}

/// The pip side: the package index plus the interpreter packages go into.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackageIndex: Send + Sync {
    /// Search the index. With `exact`, only a package named `query` is returned.
    async fn search(&self, query: &str, exact: bool) -> Result<BTreeMap<String, IndexEntry>>;

    /// Installed version of `package`, or `None` when pip does not know it.
    async fn show(&self, package: &str) -> Result<Option<IndexEntry>>;

    /// Every installed package and its version.
    async fn list(&self) -> Result<BTreeMap<String, Version>>;

    async fn install(&self, package: &str) -> Result<()>;

    async fn update(&self, package: &str) -> Result<()>;

    async fn uninstall(&self, package: &str) -> Result<()>;

    /// Run pip with this interpreter from now on.
    fn use_interpreter(&self, python: &Path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse() {
        assert_eq!(Channel::parse("pypi"), Channel::Pypi);
        assert_eq!(Channel::parse("PyPI"), Channel::Pypi);
        assert_eq!(
            Channel::parse("conda-forge"),
            Channel::Conda("conda-forge".to_string())
        );
    }

    #[test]
    fn test_channel_parse_url() {
        assert_eq!(
            Channel::parse("https://conda.anaconda.org/conda-forge/noarch"),
            Channel::Conda("conda-forge".to_string())
        );
        assert_eq!(
            Channel::parse("https://conda.anaconda.org/molssi/linux-64/"),
            Channel::Conda("molssi".to_string())
        );
        assert_eq!(
            Channel::parse("https://repo.example.org/channels/seamm"),
            Channel::Conda("seamm".to_string())
        );
    }

    #[test]
    fn test_channel_display_round_trips_name() {
        assert_eq!(Channel::Pypi.to_string(), "pypi");
        assert_eq!(Channel::Conda("conda-forge".into()).to_string(), "conda-forge");
        assert!(Channel::Pypi.is_pypi());
        assert!(!Channel::Conda("x".into()).is_pypi());
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("MolSystem"), "molsystem");
        assert_eq!(normalize_name("reference_handler"), "reference-handler");
        assert_eq!(normalize_name("seamm.util"), "seamm-util");
        assert_eq!(normalize_name(" lammps-step "), "lammps-step");
    }
}
