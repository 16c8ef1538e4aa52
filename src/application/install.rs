//! Install action - puts missing packages into the SEAMM environment.

use anyhow::Result;
use log::{debug, warn};

use super::{
    ActionReport, Outcome, bring_up_to_date, heading, install_from, preflight, run_installer,
};
use crate::context::Context;
use crate::package::sets::{DASHBOARD_PACKAGE, JOBSERVER_PACKAGE};
use crate::package::{
    InstalledState, PackageRecord, PackageStatus, Selector, Target, classify,
};
use crate::runtime::Runtime;

pub struct InstallAction<'c, 'a, R: Runtime> {
    ctx: &'c Context<'a, R>,
    update: bool,
}

impl<'c, 'a, R: Runtime> InstallAction<'c, 'a, R> {
    pub fn new(ctx: &'c Context<'a, R>) -> Self {
        Self { ctx, update: false }
    }

    /// Also update out-of-date packages instead of just reporting them.
    pub fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    pub async fn run(&self, selector: &Selector) -> Result<ActionReport> {
        preflight(self.ctx, true).await?;
        let catalog = self.ctx.catalog().await?;

        let mut report = ActionReport::default();
        let mut group = None;
        for target in selector.targets(catalog.keys().map(String::as_str)) {
            heading(&mut group, target.group, "Installing");
            let (outcome, state) = self.install_one(&target, catalog.get(&target.name)).await;
            report.record(&target.name, target.group, outcome, state);
        }
        Ok(report)
    }

    async fn install_one(
        &self,
        target: &Target,
        record: Option<&PackageRecord>,
    ) -> (Outcome, Option<InstalledState>) {
        let name = target.name.as_str();
        let installed = self.ctx.resolver().package_info(name, false).await;

        let Some(record) = record else {
            println!("   {} is not available.", name);
            return (Outcome::Skipped("not available".to_string()), installed);
        };

        match classify(installed.as_ref(), Some(record)) {
            PackageStatus::NotInstalled => {
                println!(
                    "   Installing {} {} version {}.",
                    record.category().to_string().to_lowercase(),
                    name,
                    record.version
                );
                if let Err(e) = install_from(self.ctx, name, &record.channel).await {
                    warn!("Installing {} failed: {:#}", name, e);
                    println!("   Installing {} failed: {:#}", name, e);
                    return (Outcome::Failed(format!("{:#}", e)), None);
                }
                self.restart_service(name);
                run_installer(self.ctx, name, "install");
                (
                    Outcome::Installed,
                    Some(InstalledState {
                        version: record.version.clone(),
                        channel: record.channel.clone(),
                    }),
                )
            }
            PackageStatus::OutOfDate => {
                let Some(current) = installed else {
                    return (Outcome::Skipped("not installed".to_string()), None);
                };
                if !self.update {
                    println!(
                        "   {} is out of date: version {} is installed, {} is available. \
                         Use --update to update it.",
                        name, current.version, record.version
                    );
                    return (Outcome::Skipped("out of date".to_string()), Some(current));
                }
                println!(
                    "   Updating {} from version {} to {}.",
                    name, current.version, record.version
                );
                let (outcome, state) = bring_up_to_date(self.ctx, &current, record).await;
                if !outcome.is_failure() {
                    self.restart_service(name);
                    run_installer(self.ctx, name, "update");
                }
                (outcome, state)
            }
            _ => {
                if self.local_part_missing(name) {
                    println!("   Installing the local part of {}.", name);
                    run_installer(self.ctx, name, "install");
                    (Outcome::InstallerRan, installed)
                } else {
                    debug!("{} is up to date", name);
                    (Outcome::Skipped("up to date".to_string()), installed)
                }
            }
        }
    }

    /// Ask the plug-in's installer whether its own setup is incomplete.
    fn local_part_missing(&self, name: &str) -> bool {
        if self.ctx.gui_only() {
            return false;
        }
        match self.ctx.installer().run(name, &["show"], false) {
            Ok(Some(output)) => output.needs_install(),
            Ok(None) => false,
            Err(e) => {
                warn!("Could not run the installer for {}: {:#}", name, e);
                false
            }
        }
    }

    /// A freshly installed dashboard or JobServer replaces the running one.
    fn restart_service(&self, package: &str) {
        let service = match package {
            DASHBOARD_PACKAGE => "dashboard",
            JOBSERVER_PACKAGE => "jobserver",
            _ => return,
        };
        let Some(services) = self.ctx.services else {
            return;
        };
        let name = self.ctx.service_name(service);
        if services.path(&name).is_some() {
            if let Err(e) = services.restart(&name) {
                debug!("Restarting {} failed: {:#}", name, e);
            }
        }
    }
}
