//! What is installed in the SEAMM environment, and from where.

use log::{debug, warn};

use super::Version;
use crate::backend::{Channel, EnvironmentManager, PackageIndex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledState {
    pub version: Version,
    pub channel: Channel,
}

pub struct StateResolver<'a> {
    conda: &'a dyn EnvironmentManager,
    pip: &'a dyn PackageIndex,
}

impl<'a> StateResolver<'a> {
    pub fn new(conda: &'a dyn EnvironmentManager, pip: &'a dyn PackageIndex) -> Self {
        Self { conda, pip }
    }

    /// Installed version and channel of `package`, or `None` if it is not
    /// installed. conda is asked first because it also sees pip installs;
    /// pip is only consulted when conda does not list the package.
    #[tracing::instrument(skip(self))]
    pub async fn package_info(&self, package: &str, conda_only: bool) -> Option<InstalledState> {
        match self.conda.list(package, true).await {
            Ok(listed) => {
                if let Some(entry) = listed.get(package) {
                    return Some(InstalledState {
                        version: entry.version.clone(),
                        channel: entry.channel.clone(),
                    });
                }
            }
            Err(e) => warn!("conda list for {} failed: {:#}", package, e),
        }

        if conda_only {
            return None;
        }

        match self.pip.show(package).await {
            Ok(Some(entry)) => Some(InstalledState {
                version: entry.version,
                channel: Channel::Pypi,
            }),
            Ok(None) => None,
            Err(e) => {
                debug!("pip show for {} failed: {:#}", package, e);
                None
            }
        }
    }
}
