//! SEAMM package domain.
//!
//! Versions and their ordering, the fixed package sets, the catalog of
//! available packages, the installed state of a package, and the pure
//! functions that decide what an action should do with it.

mod catalog;
mod selector;
pub mod sets;
mod state;
mod status;
mod version;

pub use catalog::{Catalog, CatalogBuilder, PackageRecord};
pub use selector::{Group, InvalidSelector, Selector, Target};
pub use sets::Category;
pub use state::{InstalledState, StateResolver};
pub use status::{Mutation, PackageStatus, classify, plan_update};
pub use version::Version;
