//! Application layer - the actions behind each package command.
//!
//! Every action builds the catalog, expands the selector against it, and
//! walks the targets one at a time. Per-package failures are logged and
//! recorded in the [`ActionReport`]; only unmet preconditions stop an action.

mod check;
mod install;
mod installer;
mod show;
mod uninstall;
mod update;

#[cfg(test)]
mod properties;

use anyhow::Result;
use log::{info, warn};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::backend::Channel;
use crate::context::Context;
use crate::package::sets::CORE_PACKAGES;
use crate::package::{Group, InstalledState, Mutation, PackageRecord, Version, plan_update};
use crate::runtime::Runtime;

pub use check::CheckAction;
pub use install::InstallAction;
pub use installer::{InstallerCheck, SelfUpdateAction};
pub use show::{ShowAction, ShowGroup, ShowReport, ShowRow};
pub use uninstall::UninstallAction;
pub use update::UpdateAction;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Conda is not installed, so none of SEAMM is.")]
    CondaNotInstalled,
    #[error("The '{0}' Conda environment is not installed.")]
    EnvironmentMissing(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Installed,
    Updated,
    /// Removed from `from` and installed from the catalog's channel.
    Migrated { from: Channel },
    Uninstalled,
    /// Only the plug-in installer ran.
    InstallerRan,
    Skipped(String),
    Failed(String),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Installed => write!(f, "installed"),
            Outcome::Updated => write!(f, "updated"),
            Outcome::Migrated { from } => write!(f, "moved from {}", from),
            Outcome::Uninstalled => write!(f, "uninstalled"),
            Outcome::InstallerRan => write!(f, "installer ran"),
            Outcome::Skipped(reason) => write!(f, "skipped: {}", reason),
            Outcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOutcome {
    pub package: String,
    pub group: Group,
    pub outcome: Outcome,
    /// Installed state after the action, patched in memory.
    pub state: Option<InstalledState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionReport {
    pub outcomes: Vec<PackageOutcome>,
}

impl ActionReport {
    fn record(&mut self, package: &str, group: Group, outcome: Outcome, state: Option<InstalledState>) {
        info!("{}: {}", package, outcome);
        self.outcomes.push(PackageOutcome {
            package: package.to_string(),
            group,
            outcome,
            state,
        });
    }

    pub fn get(&self, package: &str) -> Option<&PackageOutcome> {
        self.outcomes.iter().find(|o| o.package == package)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PackageOutcome> {
        self.outcomes.iter().filter(|o| o.outcome.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

/// Conda must be present and the target environment must exist (or, with
/// `create_missing`, be created). Leaves conda and pip pointed at it.
pub(crate) async fn preflight<R: Runtime>(ctx: &Context<'_, R>, create_missing: bool) -> Result<()> {
    if !ctx.conda.is_installed() {
        return Err(PreconditionError::CondaNotInstalled.into());
    }

    let environment = &ctx.options.environment;
    if !ctx.conda.exists(environment).await? {
        if !create_missing {
            if let Ok(environments) = ctx.conda.environments().await {
                info!("Conda environments:\n    {}", environments.join("\n    "));
            }
            return Err(PreconditionError::EnvironmentMissing(environment.clone()).into());
        }
        println!("Creating the Conda environment '{}'. This may take a while.", environment);
        let spec = ctx.environment_spec()?;
        ctx.conda.create_environment(&spec, environment).await?;
        ctx.activate().await?;

        match ctx.pip.list().await {
            Ok(installed) => {
                println!();
                println!("Installed the {} Conda environment with:", environment);
                for line in core_report(&installed) {
                    println!("{}", line);
                }
                println!();
            }
            Err(e) => warn!("Could not list the packages in {}: {:#}", environment, e),
        }
        return Ok(());
    }

    ctx.activate().await
}

/// One line per core package: its version, or a warning when it is missing.
fn core_report(installed: &BTreeMap<String, Version>) -> Vec<String> {
    CORE_PACKAGES
        .iter()
        .map(|package| match installed.get(*package) {
            Some(version) => format!("   {} {}", package, version),
            None => format!("   Warning: {} was not installed!", package),
        })
        .collect()
}

pub(crate) async fn install_from<R: Runtime>(ctx: &Context<'_, R>, package: &str, channel: &Channel) -> Result<()> {
    match channel {
        Channel::Pypi => ctx.pip.install(package).await,
        Channel::Conda(name) => ctx.conda.install(package, name).await,
    }
}

pub(crate) async fn update_from<R: Runtime>(ctx: &Context<'_, R>, package: &str, channel: &Channel) -> Result<()> {
    match channel {
        Channel::Pypi => ctx.pip.update(package).await,
        Channel::Conda(name) => ctx.conda.update(package, name).await,
    }
}

pub(crate) async fn uninstall_from<R: Runtime>(ctx: &Context<'_, R>, package: &str, channel: &Channel) -> Result<()> {
    match channel {
        Channel::Pypi => ctx.pip.uninstall(package).await,
        Channel::Conda(_) => ctx.conda.uninstall(package).await,
    }
}

/// Bring an installed, out-of-date package to its catalog entry: in place on
/// the same channel, or by moving it between channels. A failed move tries to
/// put the package back where it was.
pub(crate) async fn bring_up_to_date<R: Runtime>(
    ctx: &Context<'_, R>,
    installed: &InstalledState,
    record: &PackageRecord,
) -> (Outcome, Option<InstalledState>) {
    let package = record.name.as_str();
    let target = InstalledState {
        version: record.version.clone(),
        channel: record.channel.clone(),
    };

    match plan_update(Some(installed), record) {
        Mutation::Install { channel } => match install_from(ctx, package, &channel).await {
            Ok(()) => (Outcome::Installed, Some(target)),
            Err(e) => failed(package, e, None),
        },
        Mutation::Update { channel } => match update_from(ctx, package, &channel).await {
            Ok(()) => (Outcome::Updated, Some(target)),
            Err(e) => failed(package, e, Some(installed.clone())),
        },
        Mutation::Reinstall { from, to } => {
            if let Err(e) = uninstall_from(ctx, package, &from).await {
                return failed(package, e, Some(installed.clone()));
            }
            match install_from(ctx, package, &to).await {
                Ok(()) => (Outcome::Migrated { from }, Some(target)),
                Err(e) => {
                    warn!("Installing {} from {} failed, restoring it from {}", package, to, from);
                    let (how, restored) = match install_from(ctx, package, &from).await {
                        // The restore may pick a different version than the one removed.
                        Ok(()) => (
                            format!("restored from {}", from),
                            ctx.resolver().package_info(package, false).await,
                        ),
                        Err(restore) => {
                            warn!("Could not restore {} from {}: {:#}", package, from, restore);
                            ("the package is no longer installed".to_string(), None)
                        }
                    };
                    (
                        Outcome::Failed(format!("installing from {} failed ({:#}); {}", to, e, how)),
                        restored,
                    )
                }
            }
        }
    }
}

fn failed(package: &str, error: anyhow::Error, state: Option<InstalledState>) -> (Outcome, Option<InstalledState>) {
    warn!("{} failed: {:#}", package, error);
    (Outcome::Failed(format!("{:#}", error)), state)
}

/// Run a plug-in installer verb for a mutation and print what went wrong, if
/// anything. Skipped entirely for GUI-only installations.
pub(crate) fn run_installer<R: Runtime>(ctx: &Context<'_, R>, package: &str, verb: &str) -> bool {
    if ctx.gui_only() {
        return false;
    }
    match ctx.installer().run(package, &[verb], true) {
        Ok(Some(output)) => {
            if !output.success() {
                println!(
                    "      The installer for {} returned code {}",
                    package,
                    output.code()
                );
                for line in output.stderr().lines() {
                    println!("         {}", line);
                }
            }
            true
        }
        Ok(None) => false,
        Err(e) => {
            warn!("Could not run the installer for {}: {:#}", package, e);
            false
        }
    }
}

/// Print a heading when the group changes.
pub(crate) fn heading(current: &mut Option<Group>, group: Group, verb: &str) {
    if *current != Some(group) {
        println!();
        println!("{} {}:", verb, group);
        *current = Some(group);
    }
}
