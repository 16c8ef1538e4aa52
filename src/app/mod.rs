//! Desktop launchers ("apps") for SEAMM, the dashboard and the JobServer.

mod linux;
mod mac;

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::runtime::Runtime;

pub use linux::DesktopEntries;
pub use mac::AppBundles;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownApp {
    /// What the user types on the command line.
    pub key: &'static str,
    pub title: &'static str,
    /// Package whose installed version the app reports.
    pub package: &'static str,
}

pub const KNOWN_APPS: &[KnownApp] = &[
    KnownApp {
        key: "seamm",
        title: "SEAMM",
        package: "seamm",
    },
    KnownApp {
        key: "dashboard",
        title: "Dashboard",
        package: "seamm-dashboard",
    },
    KnownApp {
        key: "jobserver",
        title: "JobServer",
        package: "seamm-jobserver",
    },
];

impl KnownApp {
    pub fn find(key: &str) -> Option<&'static KnownApp> {
        KNOWN_APPS
            .iter()
            .find(|app| app.key.eq_ignore_ascii_case(key) || app.title.eq_ignore_ascii_case(key))
    }

    /// `SEAMM`, or `SEAMM-dev` in development mode.
    pub fn app_name(&self, development: bool) -> String {
        if development {
            format!("{}-dev", self.title)
        } else {
            self.title.to_string()
        }
    }
}

/// Names of every app this installer may have created.
pub(crate) fn all_app_names() -> Vec<String> {
    KNOWN_APPS
        .iter()
        .flat_map(|app| [app.app_name(false), app.app_name(true)])
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDescriptor {
    pub name: String,
    /// Program and arguments.
    pub command: Vec<String>,
    pub icon: Option<PathBuf>,
    pub version: String,
    pub all_users: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCreated {
    Created(PathBuf),
    AlreadyExists(PathBuf),
}

#[cfg_attr(test, mockall::automock)]
pub trait AppManager: Send + Sync {
    /// Write the launcher. An existing one is kept unless `force`.
    fn create(&self, app: &AppDescriptor, force: bool) -> Result<AppCreated>;

    /// Returns false if the app did not exist.
    fn delete(&self, name: &str, all_users: bool) -> Result<bool>;

    /// Installed SEAMM apps by name, user locations first.
    fn list(&self) -> Result<BTreeMap<String, PathBuf>>;
}

pub fn for_platform<'a, R: Runtime>(runtime: &'a R) -> Option<Box<dyn AppManager + 'a>> {
    if cfg!(target_os = "macos") {
        Some(Box::new(AppBundles::new(runtime)))
    } else if cfg!(target_os = "linux") {
        Some(Box::new(DesktopEntries::new(runtime)))
    } else {
        None
    }
}
