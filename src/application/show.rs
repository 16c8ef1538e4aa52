//! Show action - the read-only view of the catalog against what is installed.

use anyhow::Result;
use log::warn;

use super::preflight;
use crate::context::Context;
use crate::package::{Group, PackageStatus, Selector, Version, classify};
use crate::runtime::Runtime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowRow {
    pub number: usize,
    pub package: String,
    pub installed: Option<Version>,
    pub available: Option<Version>,
    pub status: PackageStatus,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowGroup {
    pub group: Group,
    pub rows: Vec<ShowRow>,
}

impl ShowGroup {
    pub fn all_up_to_date(&self) -> bool {
        self.rows.iter().all(|row| row.status == PackageStatus::UpToDate)
    }

    /// One line summarizing the group, e.g. for the table footer.
    pub fn summary(&self) -> String {
        if self.all_up_to_date() {
            format!("All of {} are installed and up to date.", self.group)
        } else {
            let pending = self
                .rows
                .iter()
                .filter(|row| row.status != PackageStatus::UpToDate)
                .count();
            format!(
                "{} of {} are not installed or not up to date.",
                pending, self.group
            )
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShowReport {
    pub groups: Vec<ShowGroup>,
}

pub struct ShowAction<'c, 'a, R: Runtime> {
    ctx: &'c Context<'a, R>,
}

impl<'c, 'a, R: Runtime> ShowAction<'c, 'a, R> {
    pub fn new(ctx: &'c Context<'a, R>) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, selector: &Selector) -> Result<ShowReport> {
        preflight(self.ctx, false).await?;
        let catalog = self.ctx.catalog().await?;
        let resolver = self.ctx.resolver();

        let mut report = ShowReport::default();
        for target in selector.targets(catalog.keys().map(String::as_str)) {
            let record = catalog.get(&target.name);
            let installed = resolver.package_info(&target.name, false).await;
            let status = classify(installed.as_ref(), record);

            let mut description = record
                .and_then(|r| r.description.clone())
                .unwrap_or_default();
            if installed.is_some() {
                if let Some(extra) = self.installer_report(&target.name) {
                    if !description.is_empty() {
                        description.push('\n');
                    }
                    description.push_str(&extra);
                }
            }

            if report.groups.last().map(|g| g.group) != Some(target.group) {
                report.groups.push(ShowGroup {
                    group: target.group,
                    rows: Vec::new(),
                });
            }
            if let Some(group) = report.groups.last_mut() {
                group.rows.push(ShowRow {
                    number: group.rows.len() + 1,
                    package: target.name.clone(),
                    installed: installed.map(|state| state.version),
                    available: record.map(|r| r.version.clone()),
                    status,
                    description,
                });
            }
        }
        Ok(report)
    }

    /// What the package's installer says about its local setup.
    fn installer_report(&self, package: &str) -> Option<String> {
        match self.ctx.installer().run(package, &["show"], false) {
            Ok(Some(output)) if output.success() => {
                let text = output.stdout().trim_end();
                (!text.is_empty()).then(|| text.to_string())
            }
            Ok(Some(output)) => {
                let mut text = format!(
                    "The installer for {} returned code {}",
                    package,
                    output.code()
                );
                for line in output.stderr().lines() {
                    text.push_str("\n    ");
                    text.push_str(line);
                }
                Some(text)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Could not run the installer for {}: {:#}", package, e);
                None
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

    fn conda_env() -> MockEnvironmentManager {
        let mut conda = MockEnvironmentManager::new();
        conda.expect_is_installed().return_const(true);
        conda.expect_exists().returning(|_| Ok(true));
        conda.expect_activate().return_const(());
        conda.expect_prefix().returning(|_| Ok(None));
        conda.expect_search().returning(|_| Ok(BTreeMap::new()));
        conda.expect_install().never();
        conda.expect_update().never();
        conda.expect_uninstall().never();
        conda
    }

    fn index() -> MockPackageIndex {
        let mut pip = MockPackageIndex::new();
        pip.expect_search()
            .with(eq("SEAMM"), eq(false))
            .returning(|_, _| {
                Ok(BTreeMap::from([
                    (
                        "mopac-step".to_string(),
                        IndexEntry {
                            version: Version::parse("2024.2.1"),
                            description: Some("MOPAC plug-in".to_string()),
                        },
                    ),
                    (
                        "psi4-step".to_string(),
                        IndexEntry {
                            version: Version::parse("2024.1.1"),
                            description: Some("Psi4 plug-in".to_string()),
                        },
                    ),
                ]))
            });
        pip.expect_search().returning(|_, _| Ok(BTreeMap::new()));
        pip.expect_show().returning(|_| Ok(None));
        pip.expect_install().never();
        pip.expect_uninstall().never();
        pip
    }

    #[tokio::test]
    async fn test_rows_carry_status_and_installer_output() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_which()
            .with(eq("mopac-step-installer"))
            .returning(|_| Some(PathBuf::from("/env/bin/mopac-step-installer")));
        runtime
            .expect_run()
            .withf(|_, args| args == ["show"])
            .returning(|_, _| Ok(CommandOutput::new(2, "", "MOPAC executable missing")));
        let mut conda = conda_env();
        conda.expect_list().returning(|query, _| {
            let mut listed = BTreeMap::new();
            if query == "mopac-step" {
                listed.insert(
                    "mopac-step".to_string(),
                    CondaEntry {
                        version: Version::parse("2023.1.1"),
                        channel: Channel::Pypi,
                        description: None,
                    },
                );
            }
            Ok(listed)
        });
        let pip = index();
        let (config, options) = (config(), options());
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

        let report = ShowAction::new(&ctx)
            .run(&Selector::names(&["mopac-step", "psi4-step"]))
            .await
            .unwrap();

        assert_eq!(report.groups.len(), 1);
        let rows = &report.groups[0].rows;
        assert_eq!(rows[0].number, 1);
        assert_eq!(rows[0].status, PackageStatus::OutOfDate);
        assert_eq!(
            rows[0].description,
            "MOPAC plug-in\nThe installer for mopac-step returned code 2\n    MOPAC executable missing"
        );
        assert_eq!(rows[1].number, 2);
        assert_eq!(rows[1].status, PackageStatus::NotInstalled);
        assert_eq!(rows[1].installed, None);
        assert!(!report.groups[0].all_up_to_date());
        assert_eq!(
            report.groups[0].summary(),
            "2 of the specified modules in SEAMM are not installed or not up to date."
        );
    }

    #[tokio::test]
    async fn test_show_is_repeatable() {
        let mut runtime = MockRuntime::new();
        runtime.expect_which().returning(|_| None);
        let mut conda = conda_env();
        conda.expect_list().returning(|_, _| Ok(BTreeMap::new()));
        let pip = index();
        let (config, options) = (config(), options());
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

        let selector = Selector::all();
        let first = ShowAction::new(&ctx).run(&selector).await.unwrap();
        let second = ShowAction::new(&ctx).run(&selector).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.groups.iter().map(|g| g.group).collect::<Vec<_>>(),
            vec![Group::Core, Group::Plugins]
        );
    }

    #[tokio::test]
    async fn test_missing_environment() {
        let runtime = MockRuntime::new();
        let mut conda = MockEnvironmentManager::new();
        conda.expect_is_installed().return_const(true);
        conda.expect_exists().returning(|_| Ok(false));
        conda.expect_environments().returning(|| Ok(vec!["base".to_string()]));
        let pip = MockPackageIndex::new();
        let (config, options) = (config(), options());
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

        let err = ShowAction::new(&ctx).run(&Selector::all()).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<PreconditionError>(),
            Some(&PreconditionError::EnvironmentMissing("seamm".to_string()))
        );
    }
}
