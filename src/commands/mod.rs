//! Command layer - turns parsed command-line arguments into actions and
//! prints their results.

pub mod app;
pub mod service;
pub mod services;
mod show;

use anyhow::{Result, bail};
use log::debug;

use crate::application::{
    ActionReport, CheckAction, InstallAction, InstallerCheck, SelfUpdateAction, ShowAction, UninstallAction,
    UpdateAction,
};
use crate::context::Context;
use crate::package::{Category, Selector};
use crate::runtime::Runtime;

pub use show::render_show;

/// The package actions reachable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageCommand {
    /// `third_party` limits the plug-in group to 3rd-party plug-ins.
    Install { update: bool, third_party: bool },
    /// `environment` also refreshes the conda environment itself. The
    /// `install_*` flags install missing plug-ins of that category.
    Update {
        environment: bool,
        install_molssi: bool,
        install_third_party: bool,
    },
    Uninstall { third_party: bool },
    Check { yes: bool },
    Show,
}

impl PackageCommand {
    pub fn verb(&self) -> &'static str {
        match self {
            PackageCommand::Install { .. } => "install",
            PackageCommand::Update { .. } => "update",
            PackageCommand::Uninstall { .. } => "uninstall",
            PackageCommand::Check { .. } => "check",
            PackageCommand::Show => "show",
        }
    }

    fn plugin_category(&self) -> Option<Category> {
        match *self {
            PackageCommand::Install { third_party: true, .. }
            | PackageCommand::Uninstall { third_party: true } => Some(Category::ThirdPartyPlugin),
            _ => None,
        }
    }

    pub async fn execute<R: Runtime>(&self, ctx: &Context<'_, R>, selector: &Selector) -> Result<ActionReport> {
        debug!("{} {:?}", self.verb(), selector);
        let selector = &selector.clone().with_plugin_category(self.plugin_category());
        match *self {
            PackageCommand::Install { update, .. } => {
                InstallAction::new(ctx).with_update(update).run(selector).await
            }
            PackageCommand::Update {
                environment,
                install_molssi,
                install_third_party,
            } => {
                let mut missing = Vec::new();
                if install_molssi {
                    missing.push(Category::MolssiPlugin);
                }
                if install_third_party {
                    missing.push(Category::ThirdPartyPlugin);
                }
                UpdateAction::new(ctx)
                    .with_environment(environment)
                    .with_install_missing(missing)
                    .run(selector)
                    .await
            }
            PackageCommand::Uninstall { .. } => UninstallAction::new(ctx).run(selector).await,
            PackageCommand::Check { yes } => CheckAction::new(ctx).with_yes(yes).run(selector).await,
            PackageCommand::Show => {
                let report = ShowAction::new(ctx).run(selector).await?;
                println!("{}", render_show(&report));
                Ok(ActionReport::default())
            }
        }
    }
}

/// Run a package command on `modules`, prompting for them when none were
/// given on the command line.
#[tracing::instrument(skip(ctx))]
pub async fn packages<R: Runtime>(ctx: &Context<'_, R>, command: PackageCommand, modules: &[String]) -> Result<()> {
    let Some(selector) = select(ctx.runtime, command.verb(), modules)? else {
        println!("Nothing to {}.", command.verb());
        return Ok(());
    };

    let report = command.execute(ctx, &selector).await?;
    print_failures(&report);
    let failed = report.failures().count();
    if failed > 0 {
        bail!("{} package(s) could not be handled by {}", failed, command.verb());
    }
    Ok(())
}

/// The selector from the command line, or asked for until the answer parses.
/// An empty answer cancels.
pub fn select<R: Runtime>(runtime: &R, verb: &str, modules: &[String]) -> Result<Option<Selector>> {
    if !modules.is_empty() {
        return Ok(Some(Selector::parse(modules)?));
    }

    let question = format!(
        "Which modules do you want to {}? (all, core, plug-ins, or package names)",
        verb
    );
    loop {
        let answer = runtime.prompt(&question)?;
        if answer.trim().is_empty() {
            return Ok(None);
        }
        match Selector::parse_line(&answer) {
            Ok(selector) if !selector.is_empty() => return Ok(Some(selector)),
            Ok(_) => continue,
            Err(e) => println!("{}", e),
        }
    }
}

pub fn print_failures(report: &ActionReport) {
    if !report.has_failures() {
        return;
    }
    println!();
    println!("These packages had problems:");
    for failure in report.failures() {
        println!("   {}: {}", failure.package, failure.outcome);
    }
}

/// `check-installer`: report on, and with `yes` fix, the installer itself.
pub async fn check_installer<R: Runtime>(ctx: &Context<'_, R>, yes: bool) -> Result<()> {
    let mut result = SelfUpdateAction::new(ctx).with_yes(yes).run().await?;
    println!("{}", result);

    let question = match &result {
        InstallerCheck::NotInstalled { .. } => Some("Install it now?"),
        // The running installer cannot replace itself.
        InstallerCheck::UpdateAvailable { .. } if !ctx.options.runs_in_target() => {
            Some("Update it now?")
        }
        _ => None,
    };
    if let Some(question) = question {
        if !yes && ctx.runtime.confirm(question)? {
            result = SelfUpdateAction::new(ctx).with_yes(true).run().await?;
            println!("{}", result);
        }
    }
    Ok(())
}
