//! Uninstall action - removes packages from the SEAMM environment.

use anyhow::Result;
use log::warn;

use super::{ActionReport, Outcome, heading, preflight, run_installer, uninstall_from};
use crate::context::Context;
use crate::package::sets::INSTALLER_PACKAGE;
use crate::package::{Group, InstalledState, Selector, Target};
use crate::runtime::Runtime;

pub struct UninstallAction<'c, 'a, R: Runtime> {
    ctx: &'c Context<'a, R>,
}

impl<'c, 'a, R: Runtime> UninstallAction<'c, 'a, R> {
    pub fn new(ctx: &'c Context<'a, R>) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, selector: &Selector) -> Result<ActionReport> {
        preflight(self.ctx, false).await?;
        let catalog = self.ctx.catalog().await?;

        let mut report = ActionReport::default();
        let mut group = None;
        for target in selector.targets(catalog.keys().map(String::as_str)) {
            heading(&mut group, target.group, "Uninstalling");
            let (outcome, state) = self.uninstall_one(&target).await;
            report.record(&target.name, target.group, outcome, state);
        }
        Ok(report)
    }

    async fn uninstall_one(&self, target: &Target) -> (Outcome, Option<InstalledState>) {
        let name = target.name.as_str();
        if name == INSTALLER_PACKAGE {
            println!("   {} cannot uninstall itself.", INSTALLER_PACKAGE);
            let state = self.ctx.resolver().package_info(name, false).await;
            return (Outcome::Skipped("the installer is kept".to_string()), state);
        }

        let Some(installed) = self.ctx.resolver().package_info(name, false).await else {
            if target.group == Group::Explicit {
                println!("   {} is not installed.", name);
            }
            return (Outcome::Skipped("not installed".to_string()), None);
        };

        println!("   Uninstalling {} version {}.", name, installed.version);
        run_installer(self.ctx, name, "uninstall");

        match uninstall_from(self.ctx, name, &installed.channel).await {
            Ok(()) => (Outcome::Uninstalled, None),
            Err(e) => {
                warn!("Uninstalling {} failed: {:#}", name, e);
                println!("   Uninstalling {} failed: {:#}", name, e);
                (Outcome::Failed(format!("{:#}", e)), Some(installed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::PreconditionError;
    use crate::backend::{Channel, CondaEntry, IndexEntry, MockEnvironmentManager, MockPackageIndex};
    use crate::config::Configuration;
    use crate::context::Options;
    use crate::package::Version;
    use crate::runtime::{CommandOutput, MockRuntime};
    use mockall::Sequence;
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

    fn conda_env() -> MockEnvironmentManager {
        let mut conda = MockEnvironmentManager::new();
        conda.expect_is_installed().return_const(true);
        conda.expect_exists().returning(|_| Ok(true));
        conda.expect_activate().return_const(());
        conda.expect_prefix().returning(|_| Ok(None));
        conda.expect_search().returning(|_| Ok(BTreeMap::new()));
        conda
    }

    fn empty_index() -> MockPackageIndex {
        let mut pip = MockPackageIndex::new();
        pip.expect_search().returning(|_, _| Ok(BTreeMap::new()));
        pip
    }

    #[tokio::test]
    async fn test_installer_runs_before_removal() {
        let mut seq = Sequence::new();
        let mut runtime = MockRuntime::new();
        runtime
            .expect_which()
            .with(eq("nwchem-step-installer"))
            .returning(|_| Some(PathBuf::from("/env/bin/nwchem-step-installer")));
        runtime
            .expect_run()
            .withf(|_, args| args == ["uninstall"])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(CommandOutput::new(0, "", "")));
        let mut conda = conda_env();
        conda.expect_list().returning(|_, _| {
            Ok(BTreeMap::from([(
                "nwchem-step".to_string(),
                CondaEntry {
                    version: Version::parse("2023.1.2"),
                    channel: Channel::Conda("conda-forge".to_string()),
                    description: None,
                },
            )]))
        });
        conda
            .expect_uninstall()
            .with(eq("nwchem-step"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let mut pip = empty_index();
        pip.expect_uninstall().never();
        let (config, options) = (config(), options());
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

        let report = UninstallAction::new(&ctx)
            .run(&Selector::names(&["nwchem-step"]))
            .await
            .unwrap();
        let outcome = report.get("nwchem-step").unwrap();
        assert_eq!(outcome.outcome, Outcome::Uninstalled);
        assert_eq!(outcome.state, None);
    }

    #[tokio::test]
    async fn test_installer_package_is_never_removed() {
        let runtime = MockRuntime::new();
        let mut conda = conda_env();
        conda.expect_list().returning(|_, _| Ok(BTreeMap::new()));
        conda.expect_uninstall().never();
        let mut pip = empty_index();
        pip.expect_show().returning(|_| {
            Ok(Some(IndexEntry {
                version: Version::parse("2024.3.1"),
                description: None,
            }))
        });
        pip.expect_uninstall().never();
        let (config, options) = (config(), options());
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

        let report = UninstallAction::new(&ctx)
            .run(&Selector::names(&["seamm-installer"]))
            .await
            .unwrap();
        assert!(matches!(
            report.get("seamm-installer").unwrap().outcome,
            Outcome::Skipped(_)
        ));
    }

    #[tokio::test]
    async fn test_not_installed_is_reported() {
        let runtime = MockRuntime::new();
        let mut conda = conda_env();
        conda.expect_list().returning(|_, _| Ok(BTreeMap::new()));
        let mut pip = empty_index();
        pip.expect_show().returning(|_| Ok(None));
        pip.expect_uninstall().never();
        let (config, options) = (config(), options());
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

        let report = UninstallAction::new(&ctx)
            .run(&Selector::names(&["ghost-step"]))
            .await
            .unwrap();
        assert_eq!(
            report.get("ghost-step").unwrap().outcome,
            Outcome::Skipped("not installed".to_string())
        );
    }

    #[tokio::test]
    async fn test_conda_missing() {
        let runtime = MockRuntime::new();
        let mut conda = MockEnvironmentManager::new();
        conda.expect_is_installed().return_const(false);
        conda.expect_uninstall().never();
        let mut pip = MockPackageIndex::new();
        pip.expect_uninstall().never();
        let (config, options) = (config(), options());
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

        let err = UninstallAction::new(&ctx)
            .run(&Selector::core())
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<PreconditionError>(),
            Some(&PreconditionError::CondaNotInstalled)
        );
    }
}
