//! The conda environment manager, driven through `conda ... --json`.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{Channel, CondaEntry, EnvironmentManager, normalize_name};
use crate::package::Version;
use crate::runtime::{CommandOutput, Runtime};

/// Channel searched and installed from when a package has no better source.
pub const DEFAULT_CHANNEL: &str = "conda-forge";

mod api {
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    pub struct Info {
        #[serde(default)]
        pub envs: Vec<String>,
        pub root_prefix: Option<String>,
    }

    #[derive(Deserialize, Debug)]
    pub struct Package {
        pub name: String,
        pub version: String,
        #[serde(default)]
        pub channel: String,
    }

    #[derive(Deserialize, Debug)]
    pub struct Error {
        pub exception_name: Option<String>,
        pub message: Option<String>,
        pub error: Option<String>,
    }
}

/// conda found on the search path (or via `CONDA_EXE`).
pub struct Conda<'a, R: Runtime> {
    runtime: &'a R,
    executable: Option<PathBuf>,
    active: Mutex<Option<String>>,
    channel: String,
}

impl<'a, R: Runtime> Conda<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        let executable = runtime
            .env_var("CONDA_EXE")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .filter(|p| runtime.exists(p))
            .or_else(|| runtime.which("conda"));
        debug!("conda executable: {:?}", executable);

        let active = runtime
            .env_var("CONDA_DEFAULT_ENV")
            .ok()
            .filter(|s| !s.is_empty());

        Self {
            runtime,
            executable,
            active: Mutex::new(active),
            channel: DEFAULT_CHANNEL.to_string(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let executable = self
            .executable
            .as_deref()
            .ok_or_else(|| anyhow!("conda is not installed"))?;
        let args = args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        self.runtime.run(executable, &args)
    }

    /// Run conda and fail with its own message when it exits nonzero.
    fn run_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(args)?;
        if !output.success() {
            bail!(
                "conda {} failed: {}",
                args.first().copied().unwrap_or_default(),
                error_message(&output)
            );
        }
        Ok(output)
    }

    fn info(&self) -> Result<api::Info> {
        let output = self.run_checked(&["info", "--json"])?;
        serde_json::from_str(&output.stdout).context("Failed to parse conda info output")
    }

    fn environment_paths(&self) -> Result<Vec<(String, PathBuf)>> {
        let info = self.info()?;
        let root = info.root_prefix.map(PathBuf::from);
        Ok(info
            .envs
            .into_iter()
            .map(PathBuf::from)
            .map(|path| {
                let name = if Some(&path) == root.as_ref() {
                    "base".to_string()
                } else {
                    path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string())
                };
                (name, path)
            })
            .collect())
    }

    /// `-n <env>` when an environment is active.
    fn target(&self) -> Vec<String> {
        match self.active_environment() {
            Some(env) => vec!["-n".to_string(), env],
            None => Vec::new(),
        }
    }

    fn with_target<'b>(&self, target: &'b [String], args: &[&'b str]) -> Vec<&'b str> {
        let mut full = args.to_vec();
        full.extend(target.iter().map(String::as_str));
        full
    }
}

fn error_message(output: &CommandOutput) -> String {
    if let Ok(err) = serde_json::from_str::<api::Error>(&output.stdout) {
        if let Some(message) = err.message.or(err.error) {
            return message.trim().to_string();
        }
    }
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        format!("exit code {}", output.code)
    } else {
        stderr.to_string()
    }
}

fn is_not_found(output: &CommandOutput) -> bool {
    serde_json::from_str::<api::Error>(&output.stdout)
        .ok()
        .and_then(|e| e.exception_name)
        .is_some_and(|name| name == "PackagesNotFoundError")
        || output.stdout.contains("PackagesNotFoundError")
        || output.stderr.contains("PackagesNotFoundError")
}

/// Keep the highest version per (normalized) package name.
fn highest_per_name(packages: impl IntoIterator<Item = api::Package>) -> BTreeMap<String, CondaEntry> {
    let mut result: BTreeMap<String, CondaEntry> = BTreeMap::new();
    for package in packages {
        let entry = CondaEntry {
            version: Version::parse(&package.version),
            channel: Channel::parse(&package.channel),
            description: None,
        };
        match result.get(&normalize_name(&package.name)) {
            Some(existing) if existing.version >= entry.version => {}
            _ => {
                result.insert(normalize_name(&package.name), entry);
            }
        }
    }
    result
}

#[async_trait]
impl<'a, R: Runtime> EnvironmentManager for Conda<'a, R> {
    fn is_installed(&self) -> bool {
        self.executable.is_some()
    }

    #[tracing::instrument(skip(self))]
    async fn environments(&self) -> Result<Vec<String>> {
        Ok(self
            .environment_paths()?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    #[tracing::instrument(skip(self))]
    async fn exists(&self, environment: &str) -> Result<bool> {
        Ok(self
            .environment_paths()?
            .iter()
            .any(|(name, _)| name == environment))
    }

    fn active_environment(&self) -> Option<String> {
        self.active.lock().ok().and_then(|active| active.clone())
    }

    fn activate(&self, environment: &str) {
        debug!("Activating conda environment {}", environment);
        if let Ok(mut active) = self.active.lock() {
            *active = Some(environment.to_string());
        }
    }

    #[tracing::instrument(skip(self))]
    async fn prefix(&self, environment: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .environment_paths()?
            .into_iter()
            .find(|(name, _)| name == environment)
            .map(|(_, path)| path))
    }

    #[tracing::instrument(skip(self))]
    async fn create_environment(&self, spec: &Path, environment: &str) -> Result<()> {
        info!("Creating conda environment {} from {}", environment, spec.display());
        let spec = spec.to_string_lossy().into_owned();
        self.run_checked(&["env", "create", "--file", spec.as_str(), "-n", environment])
            .with_context(|| format!("Failed to create the conda environment '{}'", environment))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn update_environment(&self, spec: &Path, environment: &str) -> Result<()> {
        info!("Updating conda environment {} from {}", environment, spec.display());
        let spec = spec.to_string_lossy().into_owned();
        self.run_checked(&["env", "update", "--file", spec.as_str(), "-n", environment])
            .with_context(|| format!("Failed to update the conda environment '{}'", environment))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self, query: &str, fullname: bool) -> Result<BTreeMap<String, CondaEntry>> {
        let target = self.target();
        let mut args = self.with_target(&target, &["list", "--json"]);
        if fullname {
            args.push("--full-name");
        }
        args.push(query);

        let output = self.run_checked(&args)?;
        let packages: Vec<api::Package> =
            serde_json::from_str(&output.stdout).context("Failed to parse conda list output")?;
        Ok(highest_per_name(packages))
    }

    #[tracing::instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<BTreeMap<String, CondaEntry>> {
        let output = self.run(&["search", "--json", "-c", self.channel.as_str(), query])?;
        if !output.success() {
            if is_not_found(&output) {
                debug!("conda search found nothing for {}", query);
                return Ok(BTreeMap::new());
            }
            bail!("conda search failed: {}", error_message(&output));
        }

        let found: BTreeMap<String, Vec<api::Package>> =
            serde_json::from_str(&output.stdout).context("Failed to parse conda search output")?;
        Ok(highest_per_name(found.into_values().flatten()))
    }

    #[tracing::instrument(skip(self))]
    async fn install(&self, package: &str, channel: &str) -> Result<()> {
        let target = self.target();
        let mut args = self.with_target(&target, &["install", "--yes", "--json"]);
        args.extend(["-c", channel, package]);
        self.run_checked(&args)
            .with_context(|| format!("Failed to install {} from conda channel {}", package, channel))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn update(&self, package: &str, channel: &str) -> Result<()> {
        let target = self.target();
        let mut args = self.with_target(&target, &["update", "--yes", "--json"]);
        args.extend(["-c", channel, package]);
        self.run_checked(&args)
            .with_context(|| format!("Failed to update {} from conda channel {}", package, channel))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn uninstall(&self, package: &str) -> Result<()> {
        let target = self.target();
        let mut args = self.with_target(&target, &["remove", "--yes", "--json"]);
        args.push(package);
        self.run_checked(&args)
            .with_context(|| format!("Failed to remove {} with conda", package))?;
        Ok(())
    }
}
