//! Update action - brings installed packages up to their catalog versions.

use anyhow::{Context as _, Result};
use log::{debug, warn};

use super::{
    ActionReport, Outcome, bring_up_to_date, heading, install_from, preflight, run_installer,
};
use crate::context::Context;
use crate::package::{
    Category, Group, InstalledState, PackageRecord, PackageStatus, Selector, Target, classify,
};
use crate::runtime::Runtime;

pub struct UpdateAction<'c, 'a, R: Runtime> {
    ctx: &'c Context<'a, R>,
    environment: bool,
    install_missing: Vec<Category>,
}

impl<'c, 'a, R: Runtime> UpdateAction<'c, 'a, R> {
    pub fn new(ctx: &'c Context<'a, R>) -> Self {
        Self {
            ctx,
            environment: false,
            install_missing: Vec::new(),
        }
    }

    /// Refresh the conda environment itself from the environment file first.
    pub fn with_environment(mut self, environment: bool) -> Self {
        self.environment = environment;
        self
    }

    /// Also install selected packages of these categories that are missing.
    pub fn with_install_missing(mut self, categories: Vec<Category>) -> Self {
        self.install_missing = categories;
        self
    }

    pub async fn run(&self, selector: &Selector) -> Result<ActionReport> {
        preflight(self.ctx, false).await?;

        if self.environment {
            let name = &self.ctx.options.environment;
            println!("Updating the conda environment {}", name);
            let spec = self.ctx.environment_spec()?;
            self.ctx
                .conda
                .update_environment(&spec, name)
                .await
                .with_context(|| format!("Failed to update the conda environment {}", name))?;
        }

        let catalog = self.ctx.catalog().await?;

        let mut report = ActionReport::default();
        let mut group = None;
        for target in selector.targets(catalog.keys().map(String::as_str)) {
            heading(&mut group, target.group, "Updating");
            let (outcome, state) = self.update_one(&target, catalog.get(&target.name)).await;
            report.record(&target.name, target.group, outcome, state);
        }
        Ok(report)
    }

    async fn update_one(
        &self,
        target: &Target,
        record: Option<&PackageRecord>,
    ) -> (Outcome, Option<InstalledState>) {
        let name = target.name.as_str();
        let installed = self.ctx.resolver().package_info(name, false).await;

        match (classify(installed.as_ref(), record), installed, record) {
            (PackageStatus::OutOfDate, Some(current), Some(record)) => {
                println!(
                    "   Updating {} {} from version {} to {}.",
                    record.category().to_string().to_lowercase(),
                    name,
                    current.version,
                    record.version
                );
                let (outcome, state) = bring_up_to_date(self.ctx, &current, record).await;
                match &outcome {
                    Outcome::Failed(reason) => println!("   Updating {} failed: {}", name, reason),
                    _ => {
                        run_installer(self.ctx, name, "update");
                    }
                }
                (outcome, state)
            }
            (PackageStatus::NotInstalled, _, Some(record))
                if self.install_missing.contains(&record.category()) =>
            {
                self.install_missing_one(record).await
            }
            (PackageStatus::UpToDate, installed, _) => {
                debug!("{} is up to date", name);
                (Outcome::Skipped("up to date".to_string()), installed)
            }
            (PackageStatus::InstalledNotAvailable, installed, _) => {
                println!("   {} is installed but no longer available.", name);
                (Outcome::Skipped("not available".to_string()), installed)
            }
            (_, installed, _) => {
                if target.group == Group::Explicit {
                    println!("   {} is not installed.", name);
                }
                (Outcome::Skipped("not installed".to_string()), installed)
            }
        }
    }

    async fn install_missing_one(&self, record: &PackageRecord) -> (Outcome, Option<InstalledState>) {
        let name = record.name.as_str();
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
        run_installer(self.ctx, name, "install");
        (
            Outcome::Installed,
            Some(InstalledState {
                version: record.version.clone(),
                channel: record.channel.clone(),
            }),
        )
    }
}
