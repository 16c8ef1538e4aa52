//! Which packages an action applies to.

use std::fmt;
use thiserror::Error;

use super::sets::{CORE_PACKAGES, Category, is_plugin};
use crate::backend::normalize_name;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("'{0}' is not a package name or one of all, core, plug-ins")]
pub struct InvalidSelector(pub String);

/// How a target was selected; actions print one heading per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Core,
    Plugins,
    Explicit,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Group::Core => write!(f, "the core packages of SEAMM"),
            Group::Plugins => write!(f, "the plug-ins for SEAMM"),
            Group::Explicit => write!(f, "the specified modules in SEAMM"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub group: Group,
}

/// Explicit package names and/or the symbolic groups `core`, `plug-ins` and `all`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    core: bool,
    plugins: bool,
    explicit: Vec<String>,
    plugin_category: Option<Category>,
}

impl Selector {
    pub fn parse<I, S>(tokens: I) -> Result<Self, InvalidSelector>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut selector = Selector::default();
        for token in tokens {
            let token = token.as_ref().trim();
            match token.to_lowercase().as_str() {
                "" => continue,
                "all" => {
                    selector.core = true;
                    selector.plugins = true;
                }
                "core" => selector.core = true,
                "plug-ins" | "plugins" => selector.plugins = true,
                _ if is_valid_name(token) => {
                    let name = normalize_name(token);
                    if !selector.explicit.contains(&name) {
                        selector.explicit.push(name);
                    }
                }
                _ => return Err(InvalidSelector(token.to_string())),
            }
        }
        Ok(selector)
    }

    /// Parse whitespace- or comma-separated tokens typed at a prompt.
    pub fn parse_line(line: &str) -> Result<Self, InvalidSelector> {
        Self::parse(line.split(|c: char| c.is_whitespace() || c == ','))
    }

    pub fn core() -> Self {
        Self {
            core: true,
            ..Default::default()
        }
    }

    pub fn all() -> Self {
        Self {
            core: true,
            plugins: true,
            ..Default::default()
        }
    }

    pub fn names<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            explicit: names.iter().map(|n| normalize_name(n.as_ref())).collect(),
            ..Default::default()
        }
    }

    /// Limit the `plug-ins` group to one category. Core and explicit names
    /// are not filtered.
    pub fn with_plugin_category(mut self, category: Option<Category>) -> Self {
        self.plugin_category = category;
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.core && !self.plugins && self.explicit.is_empty()
    }

    pub fn explicit(&self) -> &[String] {
        &self.explicit
    }

    /// Expand against the names in a catalog. Each package appears once, in
    /// its first group: core order, then plug-ins sorted, then explicit names
    /// in the order given.
    pub fn targets<'c>(&self, catalog: impl IntoIterator<Item = &'c str>) -> Vec<Target> {
        let mut targets: Vec<Target> = Vec::new();
        let mut push = |name: &str, group: Group| {
            if !targets.iter().any(|t| t.name == name) {
                targets.push(Target {
                    name: name.to_string(),
                    group,
                });
            }
        };

        if self.core {
            for name in CORE_PACKAGES {
                push(name, Group::Core);
            }
        }
        if self.plugins {
            let mut plugins = catalog
                .into_iter()
                .filter(|name| is_plugin(name))
                .filter(|name| self.plugin_category.is_none_or(|c| Category::of(name) == c))
                .collect::<Vec<_>>();
            plugins.sort_unstable();
            for name in plugins {
                push(name, Group::Plugins);
            }
        }
        for name in &self.explicit {
            push(name, Group::Explicit);
        }
        targets
    }
}

fn is_valid_name(token: &str) -> bool {
    let mut chars = token.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
