//! Running a plug-in's own `<package>-installer` executable.

use anyhow::Result;
use log::info;
use std::path::PathBuf;

use crate::package::sets::has_installer;
use crate::runtime::{CommandOutput, Runtime};

/// Output markers meaning the package's local part still has to be set up.
const NEEDS_INSTALL_MARKERS: &[&str] = &["need to install", "not configured"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerOutput(pub CommandOutput);

impl InstallerOutput {
    pub fn success(&self) -> bool {
        self.0.success()
    }

    pub fn code(&self) -> i32 {
        self.0.code
    }

    pub fn stdout(&self) -> &str {
        &self.0.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.0.stderr
    }

    /// True when the installer ran cleanly and reported unfinished setup.
    pub fn needs_install(&self) -> bool {
        self.success()
            && NEEDS_INSTALL_MARKERS
                .iter()
                .any(|marker| self.0.stdout.contains(marker))
    }
}

pub struct PluginInstaller<'a, R: Runtime> {
    runtime: &'a R,
    /// Searched before the search path.
    bin_dir: Option<PathBuf>,
}

impl<'a, R: Runtime> PluginInstaller<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self {
            runtime,
            bin_dir: None,
        }
    }

    pub fn with_bin_dir(mut self, bin_dir: Option<PathBuf>) -> Self {
        self.bin_dir = bin_dir;
        self
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.bin_dir
            .as_ref()
            .map(|dir| dir.join(program))
            .filter(|path| self.runtime.exists(path))
            .or_else(|| self.runtime.which(program))
    }

    /// Run `<package>-installer` with `args`. `Ok(None)` means the package has
    /// no installer; a nonzero exit is returned, not raised.
    #[tracing::instrument(skip(self))]
    pub fn run(&self, package: &str, args: &[&str], verbose: bool) -> Result<Option<InstallerOutput>> {
        if !has_installer(package) {
            return Ok(None);
        }

        let program = format!("{}-installer", package);
        let Some(path) = self.locate(&program) else {
            info!("{} has no local installer", package);
            return Ok(None);
        };

        if verbose {
            println!("   Running the plug-in specific installer for {}.", package);
        }
        let args = args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let output = self.runtime.run(&path, &args)?;
        info!("{} {} exited with {}", program, args.join(" "), output.code);

        Ok(Some(InstallerOutput(output)))
    }
}
