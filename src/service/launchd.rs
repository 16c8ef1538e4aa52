use anyhow::{Result, anyhow, bail};
use log::{debug, info};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use super::{
    CreateOutcome, IDENTIFIER, ServiceDescriptor, ServiceManager, ServiceState, ServiceStatus,
    display_path, is_permission_denied,
};
use crate::runtime::{CommandOutput, Runtime};

static ROOT_ARG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<string>--root</string>\s*<string>([^<]*)</string>").expect("valid pattern")
});

static PORT_ARG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<string>--port</string>\s*<string>([^<]*)</string>").expect("valid pattern")
});

/// A launch agent or daemon found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Agent {
    /// `gui/<uid>` or `system`.
    domain: String,
    /// `<domain>/<label>`, as `launchctl print` wants it.
    target: String,
    path: PathBuf,
}

/// launchd agents in `~/Library/LaunchAgents`, plus any an administrator put
/// in the system-wide directories.
pub struct Launchd<'a, R: Runtime> {
    runtime: &'a R,
}

fn label(name: &str) -> String {
    format!("{}.{}", IDENTIFIER, name)
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn plist_text(descriptor: &ServiceDescriptor) -> String {
    let mut arguments = format!(
        "       <string>{}</string>\n",
        xml_escape(&descriptor.executable.display().to_string())
    );
    for arg in &descriptor.args {
        arguments.push_str(&format!("       <string>{}</string>\n", xml_escape(arg)));
    }
    let log = xml_escape(&descriptor.log.display().to_string());

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
  <dict>
    <key>Label</key>
    <string>{label}</string>
    <key>KeepAlive</key>
    <true/>
    <key>ProgramArguments</key>
    <array>
{arguments}    </array>
    <key>ProcessType</key>
    <string>Interactive</string>
    <key>WorkingDirectory</key>
    <string>{wd}</string>
    <key>StandardErrorPath</key>
    <string>{log}</string>
    <key>StandardOutPath</key>
    <string>{log}</string>
  </dict>
</plist>
"#,
        label = label(&descriptor.name),
        arguments = arguments,
        wd = xml_escape(&descriptor.working_dir.display().to_string()),
        log = log,
    )
}

fn plist_option(regex: &Regex, text: &str) -> Option<String> {
    regex.captures(text).map(|c| xml_unescape(&c[1]))
}

impl<'a, R: Runtime> Launchd<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    fn user_domain(&self) -> String {
        format!("gui/{}", self.runtime.uid())
    }

    fn user_agents_dir(&self) -> Result<PathBuf> {
        let home = self
            .runtime
            .home_dir()
            .ok_or_else(|| anyhow!("Could not determine the home directory"))?;
        Ok(home.join("Library").join("LaunchAgents"))
    }

    /// All SEAMM agents by short name (`dashboard`, `dev_jobserver`, ...).
    fn agents(&self) -> Result<BTreeMap<String, Agent>> {
        let user = self.user_domain();
        let mut locations = vec![];
        if let Ok(dir) = self.user_agents_dir() {
            locations.push((dir, user.clone()));
        }
        locations.push((PathBuf::from("/Library/LaunchAgents"), user));
        locations.push((PathBuf::from("/Library/LaunchDaemons"), "system".to_string()));

        let prefix = format!("{}.", IDENTIFIER);
        let mut agents = BTreeMap::new();
        for (dir, domain) in locations {
            let pattern = dir.join(format!("{}*.plist", prefix)).display().to_string();
            for path in self.runtime.glob(&pattern)? {
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let Some(short) = stem.strip_prefix(&prefix) else {
                    continue;
                };
                debug!("Found launchd agent {} in {}", short, dir.display());
                agents.entry(short.to_string()).or_insert(Agent {
                    target: format!("{}/{}", domain, stem),
                    domain: domain.clone(),
                    path: path.clone(),
                });
            }
        }
        Ok(agents)
    }

    fn agent(&self, name: &str) -> Result<Option<Agent>> {
        Ok(self.agents()?.remove(name))
    }

    #[tracing::instrument(skip(self))]
    fn launchctl(&self, args: &[&str]) -> Result<CommandOutput> {
        let program = self
            .runtime
            .which("launchctl")
            .unwrap_or_else(|| PathBuf::from("/bin/launchctl"));
        let args = args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        self.runtime.run(&program, &args)
    }

    fn agent_running(&self, agent: &Agent) -> Result<bool> {
        Ok(self.launchctl(&["print", &agent.target])?.success())
    }

    fn bootout(&self, name: &str, agent: &Agent) -> Result<()> {
        let output = self.launchctl(&["bootout", &agent.target])?;
        if !output.success() {
            bail!(
                "Could not stop the service '{}':\n{}",
                name,
                output.stderr.trim()
            );
        }
        Ok(())
    }

    fn bootstrap(&self, name: &str, agent: &Agent) -> Result<()> {
        let path = agent.path.display().to_string();
        let output = self.launchctl(&["bootstrap", &agent.domain, &path])?;
        if !output.success() {
            bail!(
                "Starting the service '{}' was not successful:\n{}",
                name,
                output.stderr.trim()
            );
        }
        Ok(())
    }

    fn created(&self, name: &str) -> Result<Agent> {
        self.agent(name)?
            .ok_or_else(|| anyhow!("The service '{}' has not been created.", name))
    }
}

impl<R: Runtime> ServiceManager for Launchd<'_, R> {
    fn create(&self, descriptor: &ServiceDescriptor, force: bool) -> Result<CreateOutcome> {
        let name = &descriptor.name;
        if let Some(agent) = self.agent(name)? {
            if !force {
                return Ok(CreateOutcome::AlreadyExists(agent.path));
            }
            info!("Replacing the service {}", name);
            if self.agent_running(&agent)? {
                self.bootout(name, &agent)?;
            }
            self.runtime.remove_file(&agent.path)?;
        }

        if let Some(logs) = descriptor.log.parent() {
            self.runtime.create_dir_all(logs)?;
        }
        self.runtime.create_dir_all(&descriptor.working_dir)?;

        let dir = self.user_agents_dir()?;
        let agent = Agent {
            domain: self.user_domain(),
            target: format!("{}/{}", self.user_domain(), label(name)),
            path: dir.join(format!("{}.plist", label(name))),
        };
        let text = plist_text(descriptor);

        let written = self
            .runtime
            .create_dir_all(&dir)
            .and_then(|_| self.runtime.write(&agent.path, text.as_bytes()));
        match written {
            Ok(()) => {}
            Err(e) if is_permission_denied(&e) => {
                let home = self.runtime.home_dir();
                let downloads = home
                    .clone()
                    .ok_or_else(|| anyhow!("Could not determine the home directory"))?
                    .join("Downloads");
                let elsewhere = downloads.join(format!("{}.plist", label(name)));
                self.runtime.create_dir_all(&downloads)?;
                self.runtime.write(&elsewhere, text.as_bytes())?;
                let instructions = format!(
                    "You do not have permission to write to {}.\n\
                     The needed file has been written to {}.\n\
                     If you can move it to the correct place, do so, then either log out \
                     and back in, or run\n\n   launchctl bootstrap {} {}",
                    display_path(&agent.path, home.as_deref()),
                    display_path(&elsewhere, home.as_deref()),
                    agent.domain,
                    agent.path.display(),
                );
                return Ok(CreateOutcome::WrittenElsewhere {
                    path: elsewhere,
                    instructions,
                });
            }
            Err(e) => return Err(e),
        }

        self.bootstrap(name, &agent)?;
        Ok(CreateOutcome::Created(agent.path))
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let Some(agent) = self.agent(name)? else {
            return Ok(false);
        };
        if self.agent_running(&agent)? {
            self.bootout(name, &agent)?;
        }
        self.runtime.remove_file(&agent.path)?;
        Ok(true)
    }

    fn start(&self, name: &str) -> Result<()> {
        let agent = self.created(name)?;
        if self.agent_running(&agent)? {
            debug!("{} is already running", name);
            return Ok(());
        }
        self.bootstrap(name, &agent)
    }

    fn stop(&self, name: &str) -> Result<()> {
        let agent = self.created(name)?;
        if self.agent_running(&agent)? {
            self.bootout(name, &agent)?;
        }
        Ok(())
    }

    fn restart(&self, name: &str) -> Result<()> {
        self.stop(name)?;
        self.start(name)
    }

    fn is_running(&self, name: &str) -> Result<bool> {
        match self.agent(name)? {
            Some(agent) => self.agent_running(&agent),
            None => Ok(false),
        }
    }

    fn status(&self, name: &str) -> Result<ServiceStatus> {
        let Some(agent) = self.agent(name)? else {
            return Ok(ServiceStatus::not_created(name));
        };
        let state = if self.agent_running(&agent)? {
            ServiceState::Running
        } else {
            ServiceState::NotRunning
        };

        let text = self.runtime.read_to_string(&agent.path)?;
        Ok(ServiceStatus {
            name: name.to_string(),
            state,
            root: plist_option(&ROOT_ARG, &text),
            port: plist_option(&PORT_ARG, &text),
            path: Some(agent.path),
        })
    }

    fn path(&self, name: &str) -> Option<PathBuf> {
        self.agent(name).ok().flatten().map(|agent| agent.path)
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.agents()?.into_keys().collect())
    }
}
