//! The `seamm.ini` configuration file shared by SEAMM and its plug-ins.

use anyhow::{Context, Result};
use ini::Ini;
use log::{debug, info};
use rand::RngCore;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

/// Written when the file does not exist yet.
pub const TEMPLATE: &str = include_str!("../data/seamm.ini");

const SEAMM_SECTION: &str = "SEAMM";
const INSTALLER_SECTION: &str = "SEAMM-INSTALLER";
const SECRET_KEY: &str = "secret-key";
const GUI_ONLY: &str = "gui-only";

/// The file is shared with SEAMM and the plug-ins, so it is saved as the
/// text that was read with only the changed keys edited. `ini` answers reads.
pub struct Configuration {
    path: PathBuf,
    text: String,
    ini: Ini,
}

fn section_header(line: &str) -> Option<&str> {
    line.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(str::trim)
}

/// Key of an assignment line; `None` for comments, blanks and headers.
fn key_of(line: &str) -> Option<&str> {
    if line.is_empty() || line.starts_with(['#', ';', '[']) {
        return None;
    }
    let end = line.find(['=', ':'])?;
    Some(line[..end].trim())
}

/// Set `key` in `section` of `text`, leaving every other line as it is. A
/// missing key goes after the last line of its section; a missing section is
/// appended.
fn set_in_text(text: &str, section: &str, key: &str, value: &str) -> String {
    let entry = format!("{} = {}", key, value);
    let mut lines = text.lines().map(str::to_string).collect::<Vec<_>>();

    let mut in_section = false;
    let mut section_end = None;
    let mut existing = None;
    for (i, line) in lines.iter().enumerate() {
        let line = line.trim();
        if let Some(name) = section_header(line) {
            in_section = name == section;
            if in_section && section_end.is_none() {
                section_end = Some(i + 1);
            }
            continue;
        }
        if !in_section {
            continue;
        }
        if key_of(line) == Some(key) {
            existing = Some(i);
            break;
        }
        if !line.is_empty() {
            section_end = Some(i + 1);
        }
    }

    match (existing, section_end) {
        (Some(i), _) => lines[i] = entry,
        (None, Some(end)) => lines.insert(end, entry),
        (None, None) => {
            if lines.last().is_some_and(|line| !line.trim().is_empty()) {
                lines.push(String::new());
            }
            lines.push(format!("[{}]", section));
            lines.push(entry);
        }
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn new_secret_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn is_true(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "yes" | "on" | "1"
    )
}

impl Configuration {
    /// Parse configuration text; `path` is where [`save`](Self::save) writes.
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let ini = Ini::load_from_str(text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            text: text.to_string(),
            ini,
        })
    }

    /// Read `path`, creating it from the template first if needed, and make
    /// sure the dashboard has a secret key.
    #[tracing::instrument(skip(runtime))]
    pub fn load_or_create<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        if !runtime.exists(path) {
            info!("Creating {}", path.display());
            if let Some(parent) = path.parent() {
                runtime.create_dir_all(parent)?;
            }
            runtime.write(path, TEMPLATE.as_bytes())?;
        }

        let text = runtime.read_to_string(path)?;
        let mut config = Self::parse(path, &text)?;

        if config.secret_key().is_none() {
            debug!("Generating a secret key for the dashboard");
            config.set(SEAMM_SECTION, SECRET_KEY, &new_secret_key());
            config.save(runtime)?;
        }

        Ok(config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.ini.section(Some(section)).and_then(|s| s.get(key))
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.text = set_in_text(&self.text, section, key, value);
        self.ini.with_section(Some(section)).set(key, value);
    }

    pub fn secret_key(&self) -> Option<&str> {
        self.get(SEAMM_SECTION, SECRET_KEY)
            .filter(|key| !key.trim().is_empty())
    }

    /// Installations that only run the GUI skip the plug-ins' own installers.
    pub fn gui_only(&self) -> bool {
        self.get(INSTALLER_SECTION, GUI_ONLY).is_some_and(is_true)
    }

    pub fn set_gui_only(&mut self, gui_only: bool) {
        self.set(INSTALLER_SECTION, GUI_ONLY, if gui_only { "true" } else { "false" });
    }

    pub fn to_text(&self) -> &str {
        &self.text
    }

    #[tracing::instrument(skip(self, runtime))]
    pub fn save<R: Runtime>(&self, runtime: &R) -> Result<()> {
        runtime.write(&self.path, self.text.as_bytes())
    }
}
