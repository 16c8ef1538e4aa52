use anyhow::{Result, anyhow};
use chrono::{Datelike, Local};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{AppCreated, AppDescriptor, AppManager, all_app_names};
use crate::runtime::Runtime;
use crate::service::IDENTIFIER;

/// `.app` bundles whose executable is a shell script.
pub struct AppBundles<'a, R: Runtime> {
    runtime: &'a R,
}

fn copyright() -> String {
    format!("Copyright 2017-{} MolSSI", Local::now().year())
}

fn info_plist(app: &AppDescriptor, icon_file: Option<&str>, copyright: &str) -> String {
    let icon = icon_file
        .map(|file| {
            format!(
                "    <key>CFBundleIconFile</key>\n    <string>{}</string>\n\n",
                file
            )
        })
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple Computer//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
  <dict>
    <key>CFBundleIdentifier</key>
    <string>{identifier}.{name}</string>

    <key>CFBundleName</key>
    <string>{name}</string>

    <key>CFBundleShortVersionString</key>
    <string>{version}</string>

    <key>CFBundleExecutable</key>
    <string>{name}</string>

{icon}    <key>CFBundleDevelopmentRegion</key>
    <string>en</string>

    <key>CFBundlePackageType</key>
    <string>APPL</string>

    <key>LSApplicationCategoryType</key>
    <string>public.app-category.education</string>

    <key>NSHumanReadableCopyright</key>
    <string>{copyright}</string>
  </dict>
</plist>
"#,
        identifier = IDENTIFIER,
        name = app.name,
        version = app.version,
        icon = icon,
        copyright = copyright,
    )
}

fn launcher_script(app: &AppDescriptor) -> String {
    format!("#!/bin/bash\nexec {} \"$@\"\n", shell_words::join(&app.command))
}

impl<'a, R: Runtime> AppBundles<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    fn applications_dir(&self, all_users: bool) -> Result<PathBuf> {
        if all_users {
            return Ok(PathBuf::from("/Applications"));
        }
        let home = self
            .runtime
            .home_dir()
            .ok_or_else(|| anyhow!("Could not determine the home directory"))?;
        Ok(home.join("Applications"))
    }

    fn write_bundle(&self, app: &AppDescriptor, bundle: &Path) -> Result<()> {
        let contents = bundle.join("Contents");
        let macos = contents.join("MacOS");
        self.runtime.create_dir_all(&macos)?;

        let script = macos.join(&app.name);
        self.runtime
            .write(&script, launcher_script(app).as_bytes())?;
        self.runtime.set_permissions(&script, 0o755)?;

        let icon_file = match &app.icon {
            Some(icon) => {
                let resources = contents.join("Resources");
                let file = format!("{}.icns", app.name);
                self.runtime.create_dir_all(&resources)?;
                self.runtime.copy(icon, &resources.join(&file))?;
                Some(file)
            }
            None => None,
        };

        let plist = info_plist(app, icon_file.as_deref(), &copyright());
        self.runtime
            .write(&contents.join("Info.plist"), plist.as_bytes())
    }
}

impl<R: Runtime> AppManager for AppBundles<'_, R> {
    fn create(&self, app: &AppDescriptor, force: bool) -> Result<AppCreated> {
        let bundle = self
            .applications_dir(app.all_users)?
            .join(format!("{}.app", app.name));
        if self.runtime.exists(&bundle) {
            if !force {
                return Ok(AppCreated::AlreadyExists(bundle));
            }
            self.runtime.remove_dir_all(&bundle)?;
        }
        self.write_bundle(app, &bundle)?;
        Ok(AppCreated::Created(bundle))
    }

    fn delete(&self, name: &str, all_users: bool) -> Result<bool> {
        let bundle = self
            .applications_dir(all_users)?
            .join(format!("{}.app", name));
        if !self.runtime.exists(&bundle) {
            return Ok(false);
        }
        self.runtime.remove_dir_all(&bundle)?;
        Ok(true)
    }

    fn list(&self) -> Result<BTreeMap<String, PathBuf>> {
        let mut apps = BTreeMap::new();
        for all_users in [false, true] {
            let Ok(dir) = self.applications_dir(all_users) else {
                continue;
            };
            for name in all_app_names() {
                let bundle = dir.join(format!("{}.app", name));
                if self.runtime.is_dir(&bundle) {
                    apps.entry(name).or_insert(bundle);
                }
            }
        }
        Ok(apps)
    }
}
