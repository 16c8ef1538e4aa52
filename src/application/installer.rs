//! Keeping `seamm-installer` itself current.

use anyhow::{Context as _, Result};
use log::{info, warn};
use std::fmt;

use super::{PreconditionError, install_from, uninstall_from};
use crate::backend::{Channel, DEFAULT_CHANNEL};
use crate::context::Context;
use crate::package::Version;
use crate::package::sets::INSTALLER_PACKAGE;
use crate::runtime::Runtime;

/// What the self-update check found, and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallerCheck {
    UpToDate { version: Version },
    Installed { version: Version, source: Channel },
    Updated { from: Version, to: Version, source: Channel },
    /// A newer version exists; `command` upgrades it by hand.
    UpdateAvailable {
        installed: Version,
        available: Version,
        command: String,
    },
    NotInstalled { available: Version, source: Channel },
    /// Installed, but the lookups found no version to compare against.
    NotAvailable { version: Version },
    /// Neither installed nor found anywhere.
    Unavailable,
}

impl fmt::Display for InstallerCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let package = INSTALLER_PACKAGE;
        match self {
            InstallerCheck::UpToDate { version } => write!(
                f,
                "The SEAMM installer '{}', version {} is up-to-date.",
                package, version
            ),
            InstallerCheck::Installed { version, source } => write!(
                f,
                "The SEAMM installer '{}' was not installed, so installed version {} from {}.",
                package, version, source
            ),
            InstallerCheck::Updated { from, to, source } => write!(
                f,
                "The SEAMM installer '{}' version {} was updated to version {} from {}.",
                package, from, to, source
            ),
            InstallerCheck::UpdateAvailable {
                installed,
                available,
                command,
            } => write!(
                f,
                "The SEAMM installer '{}' version {} is installed but a newer version {} \
                 is available.\nUpdate it with this command:\n\n    {}",
                package, installed, available, command
            ),
            InstallerCheck::NotInstalled { available, source } => write!(
                f,
                "The SEAMM installer '{}' is not installed but version {} is available from {}.",
                package, available, source
            ),
            InstallerCheck::NotAvailable { version } => write!(
                f,
                "The SEAMM installer '{}' version {} is installed, but no available \
                 version was found, so it could not be checked.",
                package, version
            ),
            InstallerCheck::Unavailable => write!(
                f,
                "The SEAMM installer '{}' is neither installed nor available!",
                package
            ),
        }
    }
}

pub struct SelfUpdateAction<'c, 'a, R: Runtime> {
    ctx: &'c Context<'a, R>,
    yes: bool,
}

impl<'c, 'a, R: Runtime> SelfUpdateAction<'c, 'a, R> {
    pub fn new(ctx: &'c Context<'a, R>) -> Self {
        Self { ctx, yes: false }
    }

    /// Install or update without asking.
    pub fn with_yes(mut self, yes: bool) -> Self {
        self.yes = yes;
        self
    }

    /// Compare the installed installer with the newest one on conda and the
    /// package index, then install or update it when allowed.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> Result<InstallerCheck> {
        if !self.ctx.conda.is_installed() {
            return Err(PreconditionError::CondaNotInstalled.into());
        }
        info!("Checking if the installer is up-to-date.");

        let installed = self
            .ctx
            .resolver()
            .package_info(INSTALLER_PACKAGE, false)
            .await;
        let available = self.newest_available().await;

        let result = match (installed, available) {
            (None, None) => InstallerCheck::Unavailable,
            (None, Some((version, source))) => {
                if self.yes {
                    println!(
                        "The SEAMM installer '{}' is not installed so will install version {} from {}.",
                        INSTALLER_PACKAGE, version, source
                    );
                    install_from(self.ctx, INSTALLER_PACKAGE, &source)
                        .await
                        .with_context(|| format!("Failed to install {}", INSTALLER_PACKAGE))?;
                    InstallerCheck::Installed { version, source }
                } else {
                    InstallerCheck::NotInstalled {
                        available: version,
                        source,
                    }
                }
            }
            (Some(state), Some((version, source))) if version > state.version => {
                if self.yes && !self.ctx.options.runs_in_target() {
                    println!(
                        "The SEAMM installer '{}' version {} will be updated to version {} from {}.",
                        INSTALLER_PACKAGE, state.version, version, source
                    );
                    uninstall_from(self.ctx, INSTALLER_PACKAGE, &state.channel)
                        .await
                        .with_context(|| format!("Failed to remove the old {}", INSTALLER_PACKAGE))?;
                    install_from(self.ctx, INSTALLER_PACKAGE, &source)
                        .await
                        .with_context(|| format!("Failed to install {}", INSTALLER_PACKAGE))?;
                    InstallerCheck::Updated {
                        from: state.version,
                        to: version,
                        source,
                    }
                } else {
                    InstallerCheck::UpdateAvailable {
                        installed: state.version,
                        available: version,
                        command: upgrade_command(&source),
                    }
                }
            }
            (Some(state), None) => {
                warn!(
                    "{} {} is installed but no available version was found",
                    INSTALLER_PACKAGE, state.version
                );
                InstallerCheck::NotAvailable {
                    version: state.version,
                }
            }
            (Some(state), Some(_)) => InstallerCheck::UpToDate {
                version: state.version,
            },
        };
        Ok(result)
    }

    /// Highest version on either source. The package index only wins when
    /// strictly newer.
    async fn newest_available(&self) -> Option<(Version, Channel)> {
        let mut best = match self.ctx.conda.search(INSTALLER_PACKAGE).await {
            Ok(found) => found
                .get(INSTALLER_PACKAGE)
                .map(|entry| (entry.version.clone(), entry.channel.clone())),
            Err(e) => {
                warn!("conda search for {} failed: {:#}", INSTALLER_PACKAGE, e);
                None
            }
        };

        match self.ctx.pip.search(INSTALLER_PACKAGE, true).await {
            Ok(found) => {
                if let Some(entry) = found.get(INSTALLER_PACKAGE) {
                    if best.as_ref().is_none_or(|(version, _)| entry.version > *version) {
                        best = Some((entry.version.clone(), Channel::Pypi));
                    }
                }
            }
            Err(e) => warn!("Could not look up {} on the package index: {:#}", INSTALLER_PACKAGE, e),
        }
        best
    }
}

fn upgrade_command(source: &Channel) -> String {
    match source {
        Channel::Pypi => format!("pip install --upgrade {}", INSTALLER_PACKAGE),
        Channel::Conda(_) => format!("conda update -c {} {}", DEFAULT_CHANNEL, INSTALLER_PACKAGE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CondaEntry, IndexEntry, MockEnvironmentManager, MockPackageIndex};
    use crate::config::Configuration;
    use crate::context::Options;
    use crate::runtime::MockRuntime;
    use mockall::Sequence;
    use mockall::predicate::eq;
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};

    fn options(running: &str) -> Options {
        Options {
            root: PathBuf::from("/home/user/SEAMM"),
            environment: "seamm".to_string(),
            development: false,
            environment_file: None,
            running_environment: Some(running.to_string()),
            progress: false,
        }
    }

    fn config() -> Configuration {
        Configuration::parse(Path::new("/home/user/SEAMM/seamm.ini"), "[SEAMM]\n").unwrap()
    }

    fn forge() -> Channel {
        Channel::Conda("conda-forge".to_string())
    }

    fn conda_with(installed: Option<(&'static str, Channel)>, on_forge: Option<&'static str>) -> MockEnvironmentManager {
        let mut conda = MockEnvironmentManager::new();
        conda.expect_is_installed().return_const(true);
        conda.expect_list().returning(move |_, _| {
            Ok(installed
                .clone()
                .map(|(version, channel)| {
                    BTreeMap::from([(
                        INSTALLER_PACKAGE.to_string(),
                        CondaEntry {
                            version: Version::parse(version),
                            channel,
                            description: None,
                        },
                    )])
                })
                .unwrap_or_default())
        });
        conda.expect_search().with(eq(INSTALLER_PACKAGE)).returning(move |_| {
            Ok(on_forge
                .map(|version| {
                    BTreeMap::from([(
                        INSTALLER_PACKAGE.to_string(),
                        CondaEntry {
                            version: Version::parse(version),
                            channel: forge(),
                            description: None,
                        },
                    )])
                })
                .unwrap_or_default())
        });
        conda
    }

    fn pip_with(on_index: &'static str) -> MockPackageIndex {
        let mut pip = MockPackageIndex::new();
        pip.expect_search()
            .with(eq(INSTALLER_PACKAGE), eq(true))
            .returning(move |_, _| {
                Ok(BTreeMap::from([(
                    INSTALLER_PACKAGE.to_string(),
                    IndexEntry {
                        version: Version::parse(on_index),
                        description: None,
                    },
                )]))
            });
        pip.expect_show().returning(|_| Ok(None));
        pip
    }

    #[tokio::test]
    async fn test_up_to_date() {
        let runtime = MockRuntime::new();
        let mut conda = conda_with(Some(("2024.3.1", forge())), Some("2024.3.1"));
        conda.expect_install().never();
        let pip = pip_with("2024.3.1");
        let (config, options) = (config(), options("base"));
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

        let result = SelfUpdateAction::new(&ctx).with_yes(true).run().await.unwrap();
        assert_eq!(
            result,
            InstallerCheck::UpToDate {
                version: Version::parse("2024.3.1")
            }
        );
    }

    #[tokio::test]
    async fn test_installed_but_nothing_available_is_not_up_to_date() {
        let runtime = MockRuntime::new();
        let mut conda = conda_with(Some(("2024.3.1", forge())), None);
        conda.expect_install().never();
        let mut pip = MockPackageIndex::new();
        pip.expect_search()
            .with(eq(INSTALLER_PACKAGE), eq(true))
            .returning(|_, _| Ok(BTreeMap::new()));
        pip.expect_show().returning(|_| Ok(None));
        let (config, options) = (config(), options("base"));
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

        let result = SelfUpdateAction::new(&ctx).with_yes(true).run().await.unwrap();
        assert_eq!(
            result,
            InstallerCheck::NotAvailable {
                version: Version::parse("2024.3.1")
            }
        );
        assert!(result.to_string().contains("no available version was found"));
    }

    #[tokio::test]
    async fn test_newer_on_index_moves_channels() {
        let runtime = MockRuntime::new();
        let mut seq = Sequence::new();
        let mut conda = conda_with(Some(("2024.1.1", forge())), Some("2024.2.1"));
        conda
            .expect_uninstall()
            .with(eq(INSTALLER_PACKAGE))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let mut pip = pip_with("2024.3.1");
        pip.expect_install()
            .with(eq(INSTALLER_PACKAGE))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let (config, options) = (config(), options("base"));
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

        let result = SelfUpdateAction::new(&ctx).with_yes(true).run().await.unwrap();
        assert_eq!(
            result,
            InstallerCheck::Updated {
                from: Version::parse("2024.1.1"),
                to: Version::parse("2024.3.1"),
                source: Channel::Pypi,
            }
        );
    }

    #[tokio::test]
    async fn test_running_inside_target_only_advises() {
        let runtime = MockRuntime::new();
        let mut conda = conda_with(Some(("2024.1.1", forge())), Some("2024.2.1"));
        conda.expect_uninstall().never();
        conda.expect_install().never();
        let mut pip = pip_with("2024.1.1");
        pip.expect_install().never();
        let (config, options) = (config(), options("seamm"));
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

        let result = SelfUpdateAction::new(&ctx).with_yes(true).run().await.unwrap();
        assert_eq!(
            result,
            InstallerCheck::UpdateAvailable {
                installed: Version::parse("2024.1.1"),
                available: Version::parse("2024.2.1"),
                command: "conda update -c conda-forge seamm-installer".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_not_installed_without_yes() {
        let runtime = MockRuntime::new();
        let mut conda = conda_with(None, None);
        conda.expect_install().never();
        let mut pip = pip_with("2024.3.1");
        pip.expect_install().never();
        let (config, options) = (config(), options("base"));
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

        let result = SelfUpdateAction::new(&ctx).run().await.unwrap();
        assert_eq!(
            result,
            InstallerCheck::NotInstalled {
                available: Version::parse("2024.3.1"),
                source: Channel::Pypi,
            }
        );
        assert!(result.to_string().contains("is not installed"));
    }
}
