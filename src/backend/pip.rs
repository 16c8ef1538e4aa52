//! pip in the SEAMM environment, plus the PyPI index it installs from.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::pypi::{MAX_SEARCH_PAGES, Project, parse_search_page};
use super::{IndexEntry, PackageIndex, normalize_name};
use crate::http::{HttpClient, is_not_found};
use crate::package::Version;
use crate::runtime::{CommandOutput, Runtime};

pub const DEFAULT_INDEX_URL: &str = "https://pypi.org";

#[derive(Deserialize, Debug)]
struct ListedPackage {
    name: String,
    version: String,
}

pub struct Pip<'a, R: Runtime> {
    runtime: &'a R,
    http: HttpClient,
    index_url: String,
    python: Mutex<Option<PathBuf>>,
}

impl<'a, R: Runtime> Pip<'a, R> {
    pub fn new(runtime: &'a R, http: HttpClient, index_url: &str) -> Self {
        let python = runtime
            .which("python3")
            .or_else(|| runtime.which("python"));
        Self {
            runtime,
            http,
            index_url: index_url.trim_end_matches('/').to_string(),
            python: Mutex::new(python),
        }
    }

    fn python(&self) -> Result<PathBuf> {
        self.python
            .lock()
            .ok()
            .and_then(|p| p.clone())
            .ok_or_else(|| anyhow!("No Python interpreter found for pip"))
    }

    fn pip(&self, args: &[&str]) -> Result<CommandOutput> {
        let python = self.python()?;
        let mut full = vec!["-m".to_string(), "pip".to_string()];
        full.extend(args.iter().map(|s| s.to_string()));
        self.runtime.run(&python, &full)
    }

    fn pip_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = self.pip(args)?;
        if !output.success() {
            let stderr = output.stderr.trim();
            bail!(
                "pip {} failed: {}",
                args.first().copied().unwrap_or_default(),
                if stderr.is_empty() { output.stdout.trim() } else { stderr }
            );
        }
        Ok(output)
    }

    /// Extra arguments that point pip at a non-default index.
    fn index_args(&self) -> Vec<String> {
        if self.index_url == DEFAULT_INDEX_URL {
            Vec::new()
        } else {
            vec!["--index-url".to_string(), format!("{}/simple", self.index_url)]
        }
    }

    async fn search_exact(&self, query: &str) -> Result<BTreeMap<String, IndexEntry>> {
        let url = format!("{}/pypi/{}/json", self.index_url, query);
        match self.http.get_json::<Project>(&url).await {
            Ok(project) => Ok(BTreeMap::from([project.into_entry()])),
            Err(e) if is_not_found(&e) => {
                debug!("{} is not on the package index", query);
                Ok(BTreeMap::new())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to look up {} on the package index", query)),
        }
    }

    async fn search_pages(&self, query: &str) -> Result<BTreeMap<String, IndexEntry>> {
        let url = format!("{}/search/", self.index_url);
        let mut result = BTreeMap::new();

        for page in 1..=MAX_SEARCH_PAGES {
            let page_number = page.to_string();
            let html = match self
                .http
                .get_text_with_query(&url, &[("q", query), ("page", &page_number)])
                .await
            {
                Ok(html) => html,
                // The index answers 404 past the last page.
                Err(e) if is_not_found(&e) && page > 1 => break,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to search the package index for {}", query));
                }
            };

            let entries = parse_search_page(&html);
            if entries.is_empty() {
                break;
            }
            debug!("Search page {} for {}: {} packages", page, query, entries.len());
            result.extend(entries);
        }

        Ok(result)
    }
}

fn parse_show(stdout: &str) -> Option<IndexEntry> {
    let mut version = None;
    let mut description = None;
    for line in stdout.lines() {
        if let Some(value) = line.strip_prefix("Version:") {
            version = Some(Version::parse(value));
        } else if let Some(value) = line.strip_prefix("Summary:") {
            let value = value.trim();
            if !value.is_empty() {
                description = Some(value.to_string());
            }
        }
    }
    version.map(|version| IndexEntry {
        version,
        description,
    })
}

#[async_trait]
impl<'a, R: Runtime> PackageIndex for Pip<'a, R> {
    #[tracing::instrument(skip(self))]
    async fn search(&self, query: &str, exact: bool) -> Result<BTreeMap<String, IndexEntry>> {
        if exact {
            self.search_exact(query).await
        } else {
            self.search_pages(query).await
        }
    }

    #[tracing::instrument(skip(self))]
    async fn show(&self, package: &str) -> Result<Option<IndexEntry>> {
        let output = self.pip(&["show", package])?;
        if !output.success() {
            debug!("pip does not know {}", package);
            return Ok(None);
        }
        Ok(parse_show(&output.stdout))
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self) -> Result<BTreeMap<String, Version>> {
        let output = self.pip_checked(&["list", "--format", "json"])?;
        let packages: Vec<ListedPackage> =
            serde_json::from_str(&output.stdout).context("Failed to parse pip list output")?;
        Ok(packages
            .into_iter()
            .map(|p| (normalize_name(&p.name), Version::parse(&p.version)))
            .collect())
    }

    #[tracing::instrument(skip(self))]
    async fn install(&self, package: &str) -> Result<()> {
        info!("pip install {}", package);
        let index = self.index_args();
        let mut args = vec!["install"];
        args.extend(index.iter().map(String::as_str));
        args.push(package);
        self.pip_checked(&args)
            .with_context(|| format!("Failed to install {} with pip", package))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn update(&self, package: &str) -> Result<()> {
        info!("pip install --upgrade {}", package);
        let index = self.index_args();
        let mut args = vec!["install", "--upgrade"];
        args.extend(index.iter().map(String::as_str));
        args.push(package);
        self.pip_checked(&args)
            .with_context(|| format!("Failed to update {} with pip", package))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn uninstall(&self, package: &str) -> Result<()> {
        info!("pip uninstall {}", package);
        self.pip_checked(&["uninstall", "--yes", package])
            .with_context(|| format!("Failed to uninstall {} with pip", package))?;
        Ok(())
    }

    fn use_interpreter(&self, python: &Path) {
        debug!("pip will use {}", python.display());
        match self.python.lock() {
            Ok(mut current) => *current = Some(python.to_path_buf()),
            Err(e) => warn!("Could not switch the pip interpreter: {}", e),
        }
    }
}
