//! Run-wide options and the handles every action works through.

use anyhow::{Context as _, Result, anyhow};
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::backend::{EnvironmentManager, PackageIndex};
use crate::config::Configuration;
use crate::package::{Catalog, CatalogBuilder, StateResolver};
use crate::plugin::PluginInstaller;
use crate::runtime::Runtime;
use crate::service::{ServiceManager, service_name};

/// Environment used when none is given and none is active.
pub const DEFAULT_ENVIRONMENT: &str = "seamm";

/// Namespace searched on the package index for SEAMM packages.
pub const PACKAGE_QUERY: &str = "SEAMM";

/// Bundled conda environment file used when the target environment has to be
/// created or refreshed.
pub const ENVIRONMENT_SPEC: &str = include_str!("../data/seamm.yml");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// SEAMM data directory holding `seamm.ini`, logs and services.
    pub root: PathBuf,
    /// Target conda environment.
    pub environment: String,
    pub development: bool,
    /// Overrides the bundled environment file.
    pub environment_file: Option<PathBuf>,
    /// Environment the installer itself was started in, if any.
    pub running_environment: Option<String>,
    /// Show a spinner while the catalog is built.
    pub progress: bool,
}

impl Options {
    /// Development installations are the ones whose environment name says so.
    pub fn is_development(environment: &str) -> bool {
        environment.contains("dev")
    }

    /// `~/SEAMM`, or `~/SEAMM_DEV` in development mode.
    pub fn default_root(home: &Path, development: bool) -> PathBuf {
        home.join(if development { "SEAMM_DEV" } else { "SEAMM" })
    }

    /// True when the installer runs from inside the environment it manages.
    pub fn runs_in_target(&self) -> bool {
        self.running_environment.as_deref() == Some(self.environment.as_str())
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("seamm.ini")
    }
}

pub struct Context<'a, R: Runtime> {
    pub runtime: &'a R,
    pub conda: &'a dyn EnvironmentManager,
    pub pip: &'a dyn PackageIndex,
    /// `None` on platforms without a supported init system.
    pub services: Option<&'a dyn ServiceManager>,
    pub config: &'a Configuration,
    pub options: &'a Options,
    /// Prefix of the target environment, known once activated.
    prefix: OnceLock<PathBuf>,
}

impl<'a, R: Runtime> Context<'a, R> {
    pub fn new(
        runtime: &'a R,
        conda: &'a dyn EnvironmentManager,
        pip: &'a dyn PackageIndex,
        config: &'a Configuration,
        options: &'a Options,
    ) -> Self {
        Self {
            runtime,
            conda,
            pip,
            services: None,
            config,
            options,
            prefix: OnceLock::new(),
        }
    }

    pub fn with_services(mut self, services: Option<&'a dyn ServiceManager>) -> Self {
        self.services = services;
        self
    }

    pub fn prefix(&self) -> Option<&Path> {
        self.prefix.get().map(PathBuf::as_path)
    }

    fn bin_dir(&self) -> Option<PathBuf> {
        self.prefix().map(|prefix| prefix.join("bin"))
    }

    pub fn installer(&self) -> PluginInstaller<'a, R> {
        PluginInstaller::new(self.runtime).with_bin_dir(self.bin_dir())
    }

    /// Look for `program` in the target environment, then on the search path.
    pub fn find_executable(&self, program: &str) -> Option<PathBuf> {
        self.bin_dir()
            .map(|dir| dir.join(program))
            .filter(|path| self.runtime.exists(path))
            .or_else(|| self.runtime.which(program))
    }

    pub fn resolver(&self) -> StateResolver<'a> {
        StateResolver::new(self.conda, self.pip)
    }

    pub async fn catalog(&self) -> Result<Catalog> {
        CatalogBuilder::new(self.conda, self.pip)
            .with_progress(self.options.progress)
            .find_packages(PACKAGE_QUERY)
            .await
    }

    /// Plug-in installers are not run for GUI-only installations.
    pub fn gui_only(&self) -> bool {
        self.config.gui_only()
    }

    /// Registered name of a service in this mode, e.g. `dev_dashboard`.
    pub fn service_name(&self, service: &str) -> String {
        service_name(service, self.options.development)
    }

    /// Point conda and pip at the target environment.
    pub async fn activate(&self) -> Result<()> {
        let environment = &self.options.environment;
        self.conda.activate(environment);
        if let Some(prefix) = self.conda.prefix(environment).await? {
            let python = prefix.join("bin").join("python");
            debug!("Using {}", python.display());
            self.pip.use_interpreter(&python);
            let _ = self.prefix.set(prefix);
        }
        Ok(())
    }

    /// The environment file to build the target environment from: the one
    /// given on the command line, or the bundled one written to a temporary
    /// directory.
    pub fn environment_spec(&self) -> Result<PathBuf> {
        if let Some(path) = &self.options.environment_file {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            let path = PathBuf::from(expanded);
            if !self.runtime.exists(&path) {
                return Err(anyhow!("The environment file {} does not exist", path.display()));
            }
            return Ok(path);
        }

        let path = self.runtime.temp_dir().join("seamm-environment.yml");
        self.runtime
            .write(&path, ENVIRONMENT_SPEC.as_bytes())
            .context("Failed to write the SEAMM environment file")?;
        Ok(path)
    }
}
