//! Fixed package sets and the category derived from them.

use std::fmt;

/// The foundation of every installation, in install order.
pub const CORE_PACKAGES: &[&str] = &[
    "seamm",
    "seamm-jobserver",
    "seamm-util",
    "seamm-widgets",
    "seamm-ff-util",
    "molsystem",
    "reference-handler",
];

/// Packages found by the namespace search that are not plug-ins.
pub const EXCLUDE_PLUG_INS: &[&str] = &[
    "seamm-dashboard",
    "seamm-cookiecutter",
    "cassandra-step",
    "solvate-step",
];

/// Packages that never ship a `<package>-installer` executable.
pub const NO_INSTALLER: &[&str] = &["seamm", "seamm-installer"];

/// Dependencies whose names do not match the namespace search.
pub const EXTRA_PACKAGES: &[&str] = &["molsystem", "reference-handler"];

/// Plug-ins maintained by the MolSSI. Every other plug-in is third-party.
pub const MOLSSI_PLUG_INS: &[&str] = &[
    "control-parameters-step",
    "crystal-builder-step",
    "custom-step",
    "dftbplus-step",
    "diffusivity-step",
    "forcefield-step",
    "from-smiles-step",
    "gaussian-step",
    "lammps-step",
    "loop-step",
    "mopac-step",
    "packmol-step",
    "properties-step",
    "psi4-step",
    "qcarchive-step",
    "rdkit-step",
    "read-structure-step",
    "set-cell-step",
    "structure-step",
    "supercell-step",
    "table-step",
    "thermal-conductivity-step",
    "torchani-step",
];

/// This program's own package.
pub const INSTALLER_PACKAGE: &str = "seamm-installer";

/// The dashboard is installed like a plug-in but is excluded from the plug-in set.
pub const DASHBOARD_PACKAGE: &str = "seamm-dashboard";

pub const JOBSERVER_PACKAGE: &str = "seamm-jobserver";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Core,
    MolssiPlugin,
    ThirdPartyPlugin,
}

impl Category {
    pub fn of(package: &str) -> Self {
        if CORE_PACKAGES.contains(&package) {
            Category::Core
        } else if MOLSSI_PLUG_INS.contains(&package) {
            Category::MolssiPlugin
        } else {
            Category::ThirdPartyPlugin
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Core => write!(f, "Core package"),
            Category::MolssiPlugin => write!(f, "MolSSI plug-in"),
            Category::ThirdPartyPlugin => write!(f, "3rd-party plug-in"),
        }
    }
}

pub fn is_core(package: &str) -> bool {
    CORE_PACKAGES.contains(&package)
}

/// True for catalog entries that count as plug-ins.
pub fn is_plugin(package: &str) -> bool {
    !is_core(package) && !EXCLUDE_PLUG_INS.contains(&package) && package != INSTALLER_PACKAGE
}

pub fn has_installer(package: &str) -> bool {
    !NO_INSTALLER.contains(&package)
}
