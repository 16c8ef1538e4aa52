use anyhow::{Result, anyhow};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{AppCreated, AppDescriptor, AppManager, all_app_names};
use crate::runtime::Runtime;

const SYSTEM_APPLICATIONS: &str = "/usr/local/share/applications";

/// freedesktop.org `.desktop` entries.
pub struct DesktopEntries<'a, R: Runtime> {
    runtime: &'a R,
}

/// Quote an `Exec` argument as the desktop entry format requires.
fn exec_quote(arg: &str) -> String {
    const RESERVED: &[char] = &[
        ' ', '\t', '\n', '"', '\'', '\\', '>', '<', '~', '|', '&', ';', '$', '*', '?', '#', '(',
        ')', '`',
    ];
    if !arg.is_empty() && !arg.contains(RESERVED) {
        return arg.to_string();
    }
    let mut quoted = String::from("\"");
    for c in arg.chars() {
        if matches!(c, '"' | '`' | '$' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn entry_text(app: &AppDescriptor) -> String {
    let exec = app
        .command
        .iter()
        .map(|arg| exec_quote(arg))
        .collect::<Vec<_>>()
        .join(" ");
    let mut text = format!(
        "[Desktop Entry]\n\
         Version=1.5\n\
         Type=Application\n\
         Name={name}\n\
         Comment={name} {version}\n\
         Exec={exec}\n",
        name = app.name,
        version = app.version,
        exec = exec,
    );
    if let Some(icon) = &app.icon {
        text.push_str(&format!("Icon={}\n", icon.display()));
    }
    text.push_str("Terminal=false\nCategories=Education;Science;Chemistry;Physics;\n");
    text
}

impl<'a, R: Runtime> DesktopEntries<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    fn applications_dir(&self, all_users: bool) -> Result<PathBuf> {
        if all_users {
            return Ok(PathBuf::from(SYSTEM_APPLICATIONS));
        }
        let home = self
            .runtime
            .home_dir()
            .ok_or_else(|| anyhow!("Could not determine the home directory"))?;
        Ok(home.join(".local").join("share").join("applications"))
    }
}

impl<R: Runtime> AppManager for DesktopEntries<'_, R> {
    fn create(&self, app: &AppDescriptor, force: bool) -> Result<AppCreated> {
        let dir = self.applications_dir(app.all_users)?;
        let path = dir.join(format!("{}.desktop", app.name));
        if self.runtime.exists(&path) && !force {
            return Ok(AppCreated::AlreadyExists(path));
        }
        self.runtime.create_dir_all(&dir)?;
        self.runtime.write(&path, entry_text(app).as_bytes())?;
        Ok(AppCreated::Created(path))
    }

    fn delete(&self, name: &str, all_users: bool) -> Result<bool> {
        let path = self
            .applications_dir(all_users)?
            .join(format!("{}.desktop", name));
        if !self.runtime.exists(&path) {
            return Ok(false);
        }
        self.runtime.remove_file(&path)?;
        Ok(true)
    }

    fn list(&self) -> Result<BTreeMap<String, PathBuf>> {
        let mut apps = BTreeMap::new();
        for all_users in [false, true] {
            let Ok(dir) = self.applications_dir(all_users) else {
                continue;
            };
            for name in all_app_names() {
                let path = dir.join(format!("{}.desktop", name));
                if self.runtime.exists(&path) {
                    apps.entry(name).or_insert(path);
                }
            }
        }
        Ok(apps)
    }
}
