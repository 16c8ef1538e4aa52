//! Check action - asks each plug-in's installer to verify its setup.

use anyhow::Result;
use log::warn;

use super::{ActionReport, Outcome, heading, preflight};
use crate::context::Context;
use crate::package::{Group, Selector};
use crate::runtime::Runtime;

pub struct CheckAction<'c, 'a, R: Runtime> {
    ctx: &'c Context<'a, R>,
    yes: bool,
}

impl<'c, 'a, R: Runtime> CheckAction<'c, 'a, R> {
    pub fn new(ctx: &'c Context<'a, R>) -> Self {
        Self { ctx, yes: false }
    }

    /// Pass `--yes` so installers fix problems without asking.
    pub fn with_yes(mut self, yes: bool) -> Self {
        self.yes = yes;
        self
    }

    pub async fn run(&self, selector: &Selector) -> Result<ActionReport> {
        preflight(self.ctx, false).await?;
        let catalog = self.ctx.catalog().await?;

        let mut args = vec!["check"];
        if self.yes {
            args.push("--yes");
        }

        let mut report = ActionReport::default();
        let mut group = None;
        for target in selector.targets(catalog.keys().map(String::as_str)) {
            heading(&mut group, target.group, "Checking");
            let name = target.name.as_str();

            if target.group == Group::Explicit && !catalog.contains_key(name) {
                println!("    {} is not installed.", name);
                report.record(name, target.group, Outcome::Skipped("not available".to_string()), None);
                continue;
            }

            println!("   Checking the installation for {}.", name);
            let outcome = match self.ctx.installer().run(name, &args, false) {
                Ok(Some(output)) => {
                    for line in output.stdout().lines() {
                        println!("      {}", line);
                    }
                    if output.success() {
                        Outcome::InstallerRan
                    } else {
                        println!(
                            "      The installer for {} returned code {}",
                            name,
                            output.code()
                        );
                        for line in output.stderr().lines() {
                            println!("         {}", line);
                        }
                        Outcome::Failed(format!("installer exited with code {}", output.code()))
                    }
                }
                Ok(None) => Outcome::Skipped("no installer".to_string()),
                Err(e) => {
                    warn!("Could not run the installer for {}: {:#}", name, e);
                    Outcome::Failed(format!("{:#}", e))
                }
            };
            report.record(name, target.group, outcome, None);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::PreconditionError;
    use crate::backend::{IndexEntry, MockEnvironmentManager, MockPackageIndex};
    use crate::config::Configuration;
    use crate::context::Options;
    use crate::package::Version;
    use crate::runtime::{CommandOutput, MockRuntime};
    use mockall::predicate::eq;
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};

    fn options() -> Options {
        Options {
            root: PathBuf::from("/home/user/SEAMM"),
            environment: "seamm".to_string(),
            development: false,
            environment_file: None,
            running_environment: None,
            progress: false,
        }
    }

    fn config() -> Configuration {
        Configuration::parse(Path::new("/home/user/SEAMM/seamm.ini"), "[SEAMM]\n").unwrap()
    }

    #[tokio::test]
    async fn test_check_passes_yes_and_reports_failures() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_which()
            .with(eq("lammps-step-installer"))
            .returning(|_| Some(PathBuf::from("/env/bin/lammps-step-installer")));
        runtime
            .expect_run()
            .withf(|_, args| args == ["check", "--yes"])
            .times(1)
            .returning(|_, _| Ok(CommandOutput::new(1, "", "LAMMPS not found")));
        let mut conda = MockEnvironmentManager::new();
        conda.expect_is_installed().return_const(true);
        conda.expect_exists().returning(|_| Ok(true));
        conda.expect_activate().return_const(());
        conda.expect_prefix().returning(|_| Ok(None));
        conda.expect_search().returning(|_| Ok(BTreeMap::new()));
        conda.expect_install().never();
        let mut pip = MockPackageIndex::new();
        pip.expect_search()
            .with(eq("SEAMM"), eq(false))
            .returning(|_, _| {
                Ok(BTreeMap::from([(
                    "lammps-step".to_string(),
                    IndexEntry {
                        version: Version::parse("2024.1.1"),
                        description: None,
                    },
                )]))
            });
        pip.expect_search().returning(|_, _| Ok(BTreeMap::new()));
        let (config, options) = (config(), options());
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

        let report = CheckAction::new(&ctx)
            .with_yes(true)
            .run(&Selector::names(&["lammps-step", "missing-step"]))
            .await
            .unwrap();

        assert!(report.get("lammps-step").unwrap().outcome.is_failure());
        assert_eq!(
            report.get("missing-step").unwrap().outcome,
            Outcome::Skipped("not available".to_string())
        );
    }

    #[tokio::test]
    async fn test_conda_missing() {
        let mut runtime = MockRuntime::new();
        runtime.expect_run().never();
        let mut conda = MockEnvironmentManager::new();
        conda.expect_is_installed().return_const(false);
        let pip = MockPackageIndex::new();
        let (config, options) = (config(), options());
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

        let err = CheckAction::new(&ctx).run(&Selector::core()).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<PreconditionError>(),
            Some(&PreconditionError::CondaNotInstalled)
        );
    }
}
