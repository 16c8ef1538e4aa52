use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use super::{
    CreateOutcome, IDENTIFIER, ServiceDescriptor, ServiceManager, ServiceState, ServiceStatus,
    display_path, is_permission_denied,
};
use crate::runtime::{CommandOutput, Runtime};

/// systemd user units, one per service, each running a launcher script kept
/// in the SEAMM root.
pub struct Systemd<'a, R: Runtime> {
    runtime: &'a R,
}

fn unit_file_name(name: &str) -> String {
    format!("{}.{}.service", IDENTIFIER, name)
}

fn unit_quote(word: &str) -> String {
    if word.contains(char::is_whitespace) {
        format!("\"{}\"", word)
    } else {
        word.to_string()
    }
}

fn unit_text(descriptor: &ServiceDescriptor, script: &Path) -> String {
    let log = descriptor.log.display();
    format!(
        "[Unit]\n\
         Description={description}\n\
         \n\
         [Service]\n\
         Type=simple\n\
         WorkingDirectory={wd}\n\
         ExecStart={exec}\n\
         StandardOutput=append:{log}\n\
         StandardError=append:{log}\n\
         Restart=on-failure\n\
         RestartSec=5\n\
         \n\
         [Install]\n\
         WantedBy=default.target\n",
        description = descriptor.description(),
        wd = unit_quote(&descriptor.working_dir.display().to_string()),
        exec = unit_quote(&script.display().to_string()),
        log = log,
    )
}

fn script_text(descriptor: &ServiceDescriptor) -> String {
    let mut words = vec![descriptor.executable.display().to_string()];
    words.extend(descriptor.args.iter().cloned());
    format!("#!/bin/sh\nexec {}\n", shell_words::join(&words))
}

/// Value following `flag` in the `exec` line of a launcher script.
fn script_option(script: &str, flag: &str) -> Option<String> {
    let line = script.lines().find_map(|line| line.strip_prefix("exec "))?;
    let words = match shell_words::split(line) {
        Ok(words) => words,
        Err(e) => {
            warn!("Could not parse the launcher script: {}", e);
            return None;
        }
    };
    words
        .iter()
        .position(|word| word == flag)
        .and_then(|i| words.get(i + 1).cloned())
}

fn exec_start(unit: &str) -> Option<PathBuf> {
    unit.lines()
        .find_map(|line| line.strip_prefix("ExecStart="))
        .map(|value| PathBuf::from(value.trim().trim_matches('"')))
}

impl<'a, R: Runtime> Systemd<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    fn unit_dir(&self) -> Result<PathBuf> {
        let home = self
            .runtime
            .home_dir()
            .ok_or_else(|| anyhow!("Could not determine the home directory"))?;
        Ok(home.join(".config").join("systemd").join("user"))
    }

    fn unit_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.unit_dir()?.join(unit_file_name(name)))
    }

    #[tracing::instrument(skip(self))]
    fn systemctl(&self, args: &[&str]) -> Result<CommandOutput> {
        let program = self
            .runtime
            .which("systemctl")
            .ok_or_else(|| anyhow!("systemctl was not found; SEAMM services need systemd"))?;
        let mut command = vec!["--user".to_string()];
        command.extend(args.iter().map(|s| s.to_string()));
        debug!("systemctl {}", command.join(" "));
        self.runtime.run(&program, &command)
    }

    fn systemctl_checked(&self, args: &[&str], what: &str) -> Result<()> {
        let output = self.systemctl(args)?;
        if !output.success() {
            bail!("{} was not successful:\n{}", what, output.stderr.trim());
        }
        Ok(())
    }

    fn write_files(&self, descriptor: &ServiceDescriptor, unit: &Path) -> Result<Option<CreateOutcome>> {
        self.runtime.create_dir_all(&descriptor.working_dir)?;
        if let Some(logs) = descriptor.log.parent() {
            self.runtime.create_dir_all(logs)?;
        }

        let script = descriptor.working_dir.join(&descriptor.name);
        self.runtime
            .write(&script, script_text(descriptor).as_bytes())?;
        self.runtime.set_permissions(&script, 0o755)?;

        let text = unit_text(descriptor, &script);
        let written = self
            .runtime
            .create_dir_all(&self.unit_dir()?)
            .and_then(|_| self.runtime.write(unit, text.as_bytes()));

        match written {
            Ok(()) => Ok(None),
            Err(e) if is_permission_denied(&e) => {
                let home = self.runtime.home_dir();
                let downloads = home
                    .clone()
                    .ok_or_else(|| anyhow!("Could not determine the home directory"))?
                    .join("Downloads");
                let elsewhere = downloads.join(unit_file_name(&descriptor.name));
                self.runtime.create_dir_all(&downloads)?;
                self.runtime.write(&elsewhere, text.as_bytes())?;
                let instructions = format!(
                    "You do not have permission to write to {}.\n\
                     The needed file has been written to {}.\n\
                     Move it to {} and then start the service with\n\n   \
                     systemctl --user daemon-reload\n   \
                     systemctl --user enable --now {}",
                    display_path(unit, home.as_deref()),
                    display_path(&elsewhere, home.as_deref()),
                    display_path(&self.unit_dir()?, home.as_deref()),
                    unit_file_name(&descriptor.name),
                );
                Ok(Some(CreateOutcome::WrittenElsewhere {
                    path: elsewhere,
                    instructions,
                }))
            }
            Err(e) => Err(e),
        }
    }
}

impl<R: Runtime> ServiceManager for Systemd<'_, R> {
    fn create(&self, descriptor: &ServiceDescriptor, force: bool) -> Result<CreateOutcome> {
        let unit = self.unit_path(&descriptor.name)?;
        if self.runtime.exists(&unit) {
            if !force {
                return Ok(CreateOutcome::AlreadyExists(unit));
            }
            info!("Replacing the service {}", descriptor.name);
            self.delete(&descriptor.name)
                .with_context(|| format!("Could not stop the service '{}'", descriptor.name))?;
        }

        if let Some(outcome) = self.write_files(descriptor, &unit)? {
            return Ok(outcome);
        }

        let file_name = unit_file_name(&descriptor.name);
        self.systemctl_checked(&["daemon-reload"], "Reloading systemd")?;
        self.systemctl_checked(
            &["enable", "--now", &file_name],
            &format!("Starting the service '{}'", descriptor.name),
        )?;
        Ok(CreateOutcome::Created(unit))
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let unit = self.unit_path(name)?;
        if !self.runtime.exists(&unit) {
            return Ok(false);
        }

        let output = self.systemctl(&["disable", "--now", &unit_file_name(name)])?;
        if !output.success() {
            warn!("Could not disable {}: {}", name, output.stderr.trim());
        }

        if let Some(script) = exec_start(&self.runtime.read_to_string(&unit)?) {
            if self.runtime.exists(&script) {
                self.runtime.remove_file(&script)?;
            }
        }
        self.runtime.remove_file(&unit)?;
        self.systemctl(&["daemon-reload"])?;
        Ok(true)
    }

    fn start(&self, name: &str) -> Result<()> {
        if self.path(name).is_none() {
            bail!("The service '{}' has not been created.", name);
        }
        self.systemctl_checked(
            &["start", &unit_file_name(name)],
            &format!("Starting the service '{}'", name),
        )
    }

    fn stop(&self, name: &str) -> Result<()> {
        self.systemctl_checked(
            &["stop", &unit_file_name(name)],
            &format!("Stopping the service '{}'", name),
        )
    }

    fn restart(&self, name: &str) -> Result<()> {
        if self.path(name).is_none() {
            bail!("The service '{}' has not been created.", name);
        }
        self.systemctl_checked(
            &["restart", &unit_file_name(name)],
            &format!("Restarting the service '{}'", name),
        )
    }

    fn is_running(&self, name: &str) -> Result<bool> {
        if self.path(name).is_none() {
            return Ok(false);
        }
        let output = self.systemctl(&["is-active", "--quiet", &unit_file_name(name)])?;
        Ok(output.success())
    }

    fn status(&self, name: &str) -> Result<ServiceStatus> {
        let Some(unit) = self.path(name) else {
            return Ok(ServiceStatus::not_created(name));
        };

        let state = if self.is_running(name)? {
            ServiceState::Running
        } else {
            ServiceState::NotRunning
        };

        let script = exec_start(&self.runtime.read_to_string(&unit)?)
            .filter(|script| self.runtime.exists(script))
            .map(|script| self.runtime.read_to_string(&script))
            .transpose()?
            .unwrap_or_default();

        Ok(ServiceStatus {
            name: name.to_string(),
            state,
            root: script_option(&script, "--root"),
            port: script_option(&script, "--port"),
            path: Some(unit),
        })
    }

    fn path(&self, name: &str) -> Option<PathBuf> {
        self.unit_path(name)
            .ok()
            .filter(|path| self.runtime.exists(path))
    }

    fn list(&self) -> Result<Vec<String>> {
        let pattern = self
            .unit_dir()?
            .join(format!("{}.*.service", IDENTIFIER))
            .display()
            .to_string();
        let prefix = format!("{}.", IDENTIFIER);
        Ok(self
            .runtime
            .glob(&pattern)?
            .iter()
            .filter_map(|path| path.file_name()?.to_str())
            .filter_map(|file| file.strip_prefix(&prefix)?.strip_suffix(".service"))
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use std::io;

    const UNIT: &str = "/home/user/.config/systemd/user/org.molssi.seamm.dashboard.service";

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor {
            name: "dashboard".to_string(),
            executable: PathBuf::from("/opt/conda/envs/seamm/bin/seamm-dashboard"),
            args: vec![
                "--port".to_string(),
                "55055".to_string(),
                "--root".to_string(),
                "/home/user/My SEAMM".to_string(),
            ],
            working_dir: PathBuf::from("/home/user/My SEAMM/services"),
            log: PathBuf::from("/home/user/My SEAMM/logs/dashboard.out"),
            root: PathBuf::from("/home/user/My SEAMM"),
            port: Some(55055),
        }
    }

    fn base_runtime() -> MockRuntime {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_home_dir()
            .returning(|| Some(PathBuf::from("/home/user")));
        runtime
            .expect_which()
            .with(eq("systemctl"))
            .returning(|_| Some(PathBuf::from("/usr/bin/systemctl")));
        runtime
    }

    #[test]
    fn test_script_round_trip() {
        let script = script_text(&descriptor());
        assert_eq!(
            script,
            "#!/bin/sh\nexec /opt/conda/envs/seamm/bin/seamm-dashboard --port 55055 --root '/home/user/My SEAMM'\n"
        );
        assert_eq!(script_option(&script, "--root").as_deref(), Some("/home/user/My SEAMM"));
        assert_eq!(script_option(&script, "--port").as_deref(), Some("55055"));
        assert_eq!(script_option(&script, "--missing"), None);
    }

    #[test]
    fn test_script_option_reads_edited_script() {
        let script = "#!/bin/sh\n# edited by hand\nexec \"/opt/My Conda/bin/seamm-dashboard\" --root \"/srv/My SEAMM\" --port=x --port 8080\n";
        assert_eq!(script_option(script, "--root").as_deref(), Some("/srv/My SEAMM"));
        assert_eq!(script_option(script, "--port").as_deref(), Some("8080"));

        let unbalanced = "#!/bin/sh\nexec seamm-dashboard --root '/srv/SEAMM\n";
        assert_eq!(script_option(unbalanced, "--root"), None);
    }

    #[test]
    fn test_unit_text() {
        let text = unit_text(&descriptor(), Path::new("/home/user/My SEAMM/services/dashboard"));
        assert!(text.contains("Description=SEAMM Dashboard\n"));
        assert!(text.contains("ExecStart=\"/home/user/My SEAMM/services/dashboard\"\n"));
        assert!(text.contains("StandardOutput=append:/home/user/My SEAMM/logs/dashboard.out\n"));
        assert!(text.contains("WantedBy=default.target"));
        assert_eq!(
            exec_start(&text),
            Some(PathBuf::from("/home/user/My SEAMM/services/dashboard"))
        );
    }

    #[test]
    fn test_create_existing_without_force() {
        let mut runtime = base_runtime();
        runtime
            .expect_exists()
            .with(eq(PathBuf::from(UNIT)))
            .returning(|_| true);
        runtime.expect_write().never();
        runtime.expect_run().never();

        let outcome = Systemd::new(&runtime).create(&descriptor(), false).unwrap();
        assert_eq!(outcome, CreateOutcome::AlreadyExists(PathBuf::from(UNIT)));
    }

    #[test]
    fn test_create_writes_and_enables() {
        let mut runtime = base_runtime();
        runtime.expect_exists().returning(|_| false);
        runtime.expect_create_dir_all().returning(|_| Ok(()));
        runtime
            .expect_write()
            .withf(|path, _| path == Path::new("/home/user/My SEAMM/services/dashboard"))
            .times(1)
            .returning(|_, _| Ok(()));
        runtime
            .expect_set_permissions()
            .with(eq(PathBuf::from("/home/user/My SEAMM/services/dashboard")), eq(0o755))
            .times(1)
            .returning(|_, _| Ok(()));
        runtime
            .expect_write()
            .withf(|path, contents| {
                path == Path::new(UNIT)
                    && String::from_utf8_lossy(contents).contains("[Service]")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        runtime
            .expect_run()
            .withf(|_, args| args == ["--user", "daemon-reload"])
            .times(1)
            .returning(|_, _| Ok(CommandOutput::default()));
        runtime
            .expect_run()
            .withf(|_, args| {
                args == ["--user", "enable", "--now", "org.molssi.seamm.dashboard.service"]
            })
            .times(1)
            .returning(|_, _| Ok(CommandOutput::default()));

        let outcome = Systemd::new(&runtime).create(&descriptor(), false).unwrap();
        assert_eq!(outcome, CreateOutcome::Created(PathBuf::from(UNIT)));
    }

    #[test]
    fn test_create_without_permission_writes_to_downloads() {
        let mut runtime = base_runtime();
        runtime.expect_exists().returning(|_| false);
        runtime.expect_create_dir_all().returning(|_| Ok(()));
        runtime.expect_set_permissions().returning(|_, _| Ok(()));
        runtime
            .expect_write()
            .withf(|path, _| path == Path::new(UNIT))
            .returning(|_, _| {
                Err(anyhow::Error::from(io::Error::from(io::ErrorKind::PermissionDenied))
                    .context("Failed to write"))
            });
        runtime
            .expect_write()
            .withf(|path, _| {
                path == Path::new("/home/user/Downloads/org.molssi.seamm.dashboard.service")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        runtime.expect_write().returning(|_, _| Ok(()));
        runtime.expect_run().never();

        let outcome = Systemd::new(&runtime).create(&descriptor(), false).unwrap();
        match outcome {
            CreateOutcome::WrittenElsewhere { path, instructions } => {
                assert_eq!(
                    path,
                    PathBuf::from("/home/user/Downloads/org.molssi.seamm.dashboard.service")
                );
                assert!(instructions.contains("~/Downloads/org.molssi.seamm.dashboard.service"));
                assert!(instructions.contains("systemctl --user enable --now"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_status_reads_root_and_port() {
        let mut runtime = base_runtime();
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_run()
            .withf(|_, args| args[1] == "is-active")
            .returning(|_, _| Ok(CommandOutput::new(3, "", "")));
        runtime
            .expect_read_to_string()
            .with(eq(PathBuf::from(UNIT)))
            .returning(|_| Ok(unit_text(&descriptor(), Path::new("/home/user/My SEAMM/services/dashboard"))));
        runtime
            .expect_read_to_string()
            .with(eq(PathBuf::from("/home/user/My SEAMM/services/dashboard")))
            .returning(|_| Ok(script_text(&descriptor())));

        let status = Systemd::new(&runtime).status("dashboard").unwrap();
        assert_eq!(status.state, ServiceState::NotRunning);
        assert_eq!(status.root.as_deref(), Some("/home/user/My SEAMM"));
        assert_eq!(status.port.as_deref(), Some("55055"));
    }

    #[test]
    fn test_status_not_created() {
        let mut runtime = base_runtime();
        runtime.expect_exists().returning(|_| false);
        runtime.expect_run().never();

        let status = Systemd::new(&runtime).status("dev_jobserver").unwrap();
        assert_eq!(status, ServiceStatus::not_created("dev_jobserver"));
    }

    #[test]
    fn test_delete_missing_is_false() {
        let mut runtime = base_runtime();
        runtime.expect_exists().returning(|_| false);
        runtime.expect_run().never();

        assert!(!Systemd::new(&runtime).delete("dashboard").unwrap());
    }

    #[test]
    fn test_start_failure_reports_stderr() {
        let mut runtime = base_runtime();
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_run()
            .returning(|_, _| Ok(CommandOutput::new(1, "", "Unit not found.")));

        let err = Systemd::new(&runtime).start("jobserver").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Starting the service 'jobserver' was not successful"));
        assert!(message.contains("Unit not found."));
    }

    #[test]
    fn test_list() {
        let mut runtime = base_runtime();
        runtime
            .expect_glob()
            .with(eq("/home/user/.config/systemd/user/org.molssi.seamm.*.service"))
            .returning(|_| {
                Ok(vec![
                    PathBuf::from(UNIT),
                    PathBuf::from("/home/user/.config/systemd/user/org.molssi.seamm.dev_jobserver.service"),
                ])
            });

        assert_eq!(
            Systemd::new(&runtime).list().unwrap(),
            ["dashboard", "dev_jobserver"]
        );
    }
}
