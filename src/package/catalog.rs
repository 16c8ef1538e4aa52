//! The catalog of SEAMM packages available from conda and PyPI.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::time::Duration;

use super::Version;
use super::sets::{Category, EXTRA_PACKAGES, INSTALLER_PACKAGE};
use crate::backend::{Channel, EnvironmentManager, PackageIndex};

/// The authoritative entry for one available package.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageRecord {
    pub name: String,
    pub version: Version,
    pub channel: Channel,
    pub description: Option<String>,
}

impl PackageRecord {
    pub fn category(&self) -> Category {
        Category::of(&self.name)
    }
}

/// Available packages keyed by normalized name.
pub type Catalog = BTreeMap<String, PackageRecord>;

pub struct CatalogBuilder<'a> {
    conda: &'a dyn EnvironmentManager,
    pip: &'a dyn PackageIndex,
    progress: bool,
}

impl<'a> CatalogBuilder<'a> {
    pub fn new(conda: &'a dyn EnvironmentManager, pip: &'a dyn PackageIndex) -> Self {
        Self {
            conda,
            pip,
            progress: false,
        }
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn spinner(&self) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    /// Search both sources for SEAMM packages and merge the results.
    #[tracing::instrument(skip(self))]
    pub async fn find_packages(&self, query: &str) -> Result<Catalog> {
        let pb = self.spinner();
        pb.set_message(format!("Searching the package index for {}", query));

        let mut catalog: Catalog = self
            .pip
            .search(query, false)
            .await
            .context("Failed to search the package index for SEAMM packages")?
            .into_iter()
            .map(|(name, entry)| {
                (
                    name.clone(),
                    PackageRecord {
                        name,
                        version: entry.version,
                        channel: Channel::Pypi,
                        description: entry.description,
                    },
                )
            })
            .collect();

        catalog.remove(INSTALLER_PACKAGE);

        for package in EXTRA_PACKAGES {
            pb.set_message(format!("Looking up {}", package));
            match self.pip.search(package, true).await {
                Ok(found) => {
                    if let Some(entry) = found.get(*package) {
                        catalog.insert(
                            package.to_string(),
                            PackageRecord {
                                name: package.to_string(),
                                version: entry.version.clone(),
                                channel: Channel::Pypi,
                                description: entry.description.clone(),
                            },
                        );
                    }
                }
                Err(e) => warn!("Could not look up {} on the package index: {:#}", package, e),
            }
        }

        info!("Find packages: checking for conda versions");
        for record in catalog.values_mut() {
            pb.set_message(format!("Checking conda for {}", record.name));
            match self.conda.search(&record.name).await {
                Ok(found) => {
                    if let Some(entry) = found.get(&record.name) {
                        if entry.version >= record.version {
                            debug!(
                                "{}: conda {} ({}) supersedes pypi {}",
                                record.name, entry.version, entry.channel, record.version
                            );
                            record.version = entry.version.clone();
                            record.channel = entry.channel.clone();
                        }
                    }
                }
                Err(e) => warn!("conda search for {} failed: {:#}", record.name, e),
            }
        }

        pb.finish_and_clear();
        Ok(catalog)
    }
}
