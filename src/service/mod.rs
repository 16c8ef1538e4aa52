//! Long-running SEAMM services (the dashboard and the JobServer).
//!
//! Each platform keeps services in its own init system: systemd user units on
//! Linux and launchd agents on macOS. [`ServiceManager`] hides the difference;
//! [`for_platform`] picks the implementation once at startup.

mod launchd;
mod systemd;

use anyhow::Result;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

pub use launchd::Launchd;
pub use systemd::Systemd;

pub const KNOWN_SERVICES: &[&str] = &["dashboard", "jobserver"];

/// Prefix of every unit file and launchd label.
pub const IDENTIFIER: &str = "org.molssi.seamm";

pub const PRODUCTION_PORT: u16 = 55055;
pub const DEVELOPMENT_PORT: u16 = 55066;

pub fn default_port(development: bool) -> u16 {
    if development {
        DEVELOPMENT_PORT
    } else {
        PRODUCTION_PORT
    }
}

/// `dashboard` or, in development mode, `dev_dashboard`.
pub fn service_name(service: &str, development: bool) -> String {
    if development {
        format!("dev_{}", service)
    } else {
        service.to_string()
    }
}

/// Everything needed to write a service definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Name the service is registered under, e.g. `dev_jobserver`.
    pub name: String,
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// stdout and stderr both go here.
    pub log: PathBuf,
    pub root: PathBuf,
    pub port: Option<u16>,
}

impl ServiceDescriptor {
    /// Describe `service` (`dashboard` or `jobserver`) running `executable`
    /// against `root`.
    pub fn new(
        service: &str,
        executable: PathBuf,
        root: &Path,
        development: bool,
        port: Option<u16>,
    ) -> Self {
        let root_arg = root.display().to_string();
        let (args, port) = if service == "dashboard" {
            let port = port.unwrap_or_else(|| default_port(development));
            (
                vec![
                    "--port".to_string(),
                    port.to_string(),
                    "--root".to_string(),
                    root_arg,
                ],
                Some(port),
            )
        } else {
            (vec!["--root".to_string(), root_arg], None)
        };

        Self {
            name: service_name(service, development),
            executable,
            args,
            working_dir: root.join("services"),
            log: root.join("logs").join(format!("{}.out", service)),
            root: root.to_path_buf(),
            port,
        }
    }

    /// Programs that run `service`, in order of preference.
    pub fn executable_names(service: &str) -> [String; 2] {
        [format!("seamm-{}", service), service.to_string()]
    }

    pub fn description(&self) -> String {
        let (base, development) = match self.name.strip_prefix("dev_") {
            Some(base) => (base, true),
            None => (self.name.as_str(), false),
        };
        let title = match base {
            "jobserver" => "JobServer".to_string(),
            other => {
                let mut chars = other.chars();
                chars
                    .next()
                    .map(|c| c.to_uppercase().collect::<String>() + chars.as_str())
                    .unwrap_or_default()
            }
        };
        if development {
            format!("SEAMM {} (development)", title)
        } else {
            format!("SEAMM {}", title)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    NotRunning,
    NotCreated,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Running => write!(f, "running"),
            ServiceState::NotRunning => write!(f, "not running"),
            ServiceState::NotCreated => write!(f, "not created"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub name: String,
    pub state: ServiceState,
    pub root: Option<String>,
    pub port: Option<String>,
    pub path: Option<PathBuf>,
}

impl ServiceStatus {
    pub fn not_created(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: ServiceState::NotCreated,
            root: None,
            port: None,
            path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// Written and started.
    Created(PathBuf),
    /// A definition exists and `force` was not given.
    AlreadyExists(PathBuf),
    /// The init system's directory was not writable; the file went to
    /// `path` and the user must finish by hand.
    WrittenElsewhere { path: PathBuf, instructions: String },
}

#[cfg_attr(test, mockall::automock)]
pub trait ServiceManager: Send + Sync {
    /// Write the service definition and start it. With `force`, an existing
    /// service is stopped and replaced.
    fn create(&self, descriptor: &ServiceDescriptor, force: bool) -> Result<CreateOutcome>;

    /// Stop and remove the service. Returns false if there was nothing to remove.
    fn delete(&self, name: &str) -> Result<bool>;

    fn start(&self, name: &str) -> Result<()>;

    fn stop(&self, name: &str) -> Result<()>;

    fn restart(&self, name: &str) -> Result<()>;

    fn is_running(&self, name: &str) -> Result<bool>;

    fn status(&self, name: &str) -> Result<ServiceStatus>;

    /// Definition file of a created service.
    fn path(&self, name: &str) -> Option<PathBuf>;

    /// Names of all created SEAMM services.
    fn list(&self) -> Result<Vec<String>>;
}

/// The service manager for the running platform, if it has one.
pub fn for_platform<'a, R: Runtime>(runtime: &'a R) -> Option<Box<dyn ServiceManager + 'a>> {
    if cfg!(target_os = "macos") {
        Some(Box::new(Launchd::new(runtime)))
    } else if cfg!(target_os = "linux") {
        Some(Box::new(Systemd::new(runtime)))
    } else {
        None
    }
}

pub(crate) fn is_permission_denied(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::PermissionDenied)
    })
}

/// Show `path` relative to the home directory when it is inside it.
pub fn display_path(path: &Path, home: Option<&Path>) -> String {
    match home.and_then(|home| path.strip_prefix(home).ok()) {
        Some(relative) => format!("~/{}", relative.display()),
        None => path.display().to_string(),
    }
}
