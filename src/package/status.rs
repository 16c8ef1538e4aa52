//! Classification of a package and the mutation that brings it up to date.

use std::fmt;

use super::catalog::PackageRecord;
use super::state::InstalledState;
use crate::backend::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    NotInstalled,
    OutOfDate,
    UpToDate,
    InstalledNotAvailable,
    Unavailable,
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PackageStatus::NotInstalled => "not installed",
            PackageStatus::OutOfDate => "out of date",
            PackageStatus::UpToDate => "up to date",
            PackageStatus::InstalledNotAvailable => "installed, not available",
            PackageStatus::Unavailable => "not available",
        };
        f.write_str(text)
    }
}

pub fn classify(installed: Option<&InstalledState>, available: Option<&PackageRecord>) -> PackageStatus {
    match (installed, available) {
        (None, Some(_)) => PackageStatus::NotInstalled,
        (Some(state), Some(record)) if state.version < record.version => PackageStatus::OutOfDate,
        (Some(_), Some(_)) => PackageStatus::UpToDate,
        (Some(_), None) => PackageStatus::InstalledNotAvailable,
        (None, None) => PackageStatus::Unavailable,
    }
}

/// Adapter operations that take a package to its authoritative catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Install { channel: Channel },
    Update { channel: Channel },
    /// Remove from `from`, then install from `to`.
    Reinstall { from: Channel, to: Channel },
}

pub fn plan_update(installed: Option<&InstalledState>, record: &PackageRecord) -> Mutation {
    match installed {
        None => Mutation::Install {
            channel: record.channel.clone(),
        },
        Some(state) if state.channel == record.channel => Mutation::Update {
            channel: record.channel.clone(),
        },
        Some(state) => Mutation::Reinstall {
            from: state.channel.clone(),
            to: record.channel.clone(),
        },
    }
}
