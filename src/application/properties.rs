//! Behaviour of the actions against stateful conda and pip fakes.

use std::path::PathBuf;

use super::*;
use crate::backend::Channel;
use crate::context::Context;
use crate::package::{PackageStatus, Selector, Version, classify};
use crate::runtime::{CommandOutput, MockRuntime};
use crate::test_utils::{FakeConda, FakePip, SharedWorld, forge, test_config, test_options};

/// A runtime where `<package>-installer` exists for `packages` and each run
/// is logged in the world.
fn runtime_with_installers(world: &SharedWorld, packages: &'static [&'static str]) -> MockRuntime {
    let mut runtime = MockRuntime::new();
    runtime.expect_which().returning(move |program| {
        let package = program.strip_suffix("-installer")?;
        packages
            .contains(&package)
            .then(|| PathBuf::from("/env/bin").join(program))
    });
    let log = world.clone();
    runtime.expect_run().returning(move |program, args| {
        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        log.record(format!("{} {}", name, args.join(" ")));
        Ok(CommandOutput::new(0, "", ""))
    });
    runtime
}

#[test_log::test(tokio::test)]
async fn test_install_from_index_then_runs_installer() {
    let world = SharedWorld::default();
    world.offer_index("foo", "2.0");
    let runtime = runtime_with_installers(&world, &[]);
    let (conda, pip) = (FakeConda::new(&world), FakePip::new(&world));
    let (config, options) = (test_config(), test_options());
    let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

    let report = InstallAction::new(&ctx)
        .run(&Selector::names(&["foo"]))
        .await
        .unwrap();

    assert_eq!(report.get("foo").unwrap().outcome, Outcome::Installed);
    assert_eq!(world.events(), vec!["pip install foo"]);
}

#[test_log::test(tokio::test)]
async fn test_install_round_trip_is_up_to_date() {
    let world = SharedWorld::default();
    world.offer_index("mopac-step", "2023.9.1");
    world.offer_conda("mopac-step", "2023.10.1");
    let runtime = runtime_with_installers(&world, &["mopac-step"]);
    let (conda, pip) = (FakeConda::new(&world), FakePip::new(&world));
    let (config, options) = (test_config(), test_options());
    let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

    InstallAction::new(&ctx)
        .run(&Selector::names(&["mopac-step"]))
        .await
        .unwrap();

    let catalog = ctx.catalog().await.unwrap();
    let record = catalog.get("mopac-step").unwrap();
    let state = ctx.resolver().package_info("mopac-step", false).await.unwrap();
    assert_eq!(classify(Some(&state), Some(record)), PackageStatus::UpToDate);
    assert_eq!(state.version, Version::parse("2023.10.1"));
    assert_eq!(state.channel, forge());
    assert_eq!(
        world.events(),
        vec![
            "conda install mopac-step -c conda-forge",
            "mopac-step-installer install",
        ]
    );
}

#[test_log::test(tokio::test)]
async fn test_update_moves_between_channels() {
    let world = SharedWorld::default();
    world.offer_index("foo", "1.0");
    world.offer_conda("foo", "2.0");
    world.install("foo", "1.0", Channel::Pypi);
    let runtime = runtime_with_installers(&world, &[]);
    let (conda, pip) = (FakeConda::new(&world), FakePip::new(&world));
    let (config, options) = (test_config(), test_options());
    let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

    let report = UpdateAction::new(&ctx)
        .run(&Selector::names(&["foo"]))
        .await
        .unwrap();

    assert_eq!(
        report.get("foo").unwrap().outcome,
        Outcome::Migrated { from: Channel::Pypi }
    );
    assert_eq!(
        world.events(),
        vec!["pip uninstall foo", "conda install foo -c conda-forge"]
    );
    let state = ctx.resolver().package_info("foo", false).await.unwrap();
    assert_eq!(state.channel, forge());
    assert_eq!(state.version, Version::parse("2.0"));
}

#[test_log::test(tokio::test)]
async fn test_uninstall_runs_installer_first() {
    let world = SharedWorld::default();
    world.offer_index("nwchem-step", "2024.1.1");
    world.install("nwchem-step", "2024.1.1", Channel::Pypi);
    let runtime = runtime_with_installers(&world, &["nwchem-step"]);
    let (conda, pip) = (FakeConda::new(&world), FakePip::new(&world));
    let (config, options) = (test_config(), test_options());
    let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

    UninstallAction::new(&ctx)
        .run(&Selector::names(&["nwchem-step"]))
        .await
        .unwrap();

    assert_eq!(
        world.events(),
        vec!["nwchem-step-installer uninstall", "pip uninstall nwchem-step"]
    );
    assert!(world.lock().installed.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_conda_missing_mutates_nothing() {
    let world = SharedWorld::default();
    world.offer_index("seamm", "2024.1.1");
    world.install("seamm-util", "2023.1.1", Channel::Pypi);
    let runtime = runtime_with_installers(&world, &["seamm-util"]);
    let (conda, pip) = (FakeConda::missing(&world), FakePip::new(&world));
    let (config, options) = (test_config(), test_options());
    let ctx = Context::new(&runtime, &conda, &pip, &config, &options);
    let core = Selector::core();

    let results = [
        InstallAction::new(&ctx).run(&core).await.map(|_| ()),
        UpdateAction::new(&ctx).run(&core).await.map(|_| ()),
        CheckAction::new(&ctx).run(&core).await.map(|_| ()),
        UninstallAction::new(&ctx).run(&core).await.map(|_| ()),
    ];
    for result in results {
        let err = result.unwrap_err();
        assert_eq!(
            err.downcast_ref::<PreconditionError>(),
            Some(&PreconditionError::CondaNotInstalled)
        );
    }
    assert!(world.events().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_show_twice_gives_same_classification() {
    let world = SharedWorld::default();
    world.offer_index("seamm", "2024.1.2");
    world.offer_index("lammps-step", "2024.1.1");
    world.offer_conda("lammps-step", "2024.2.1");
    world.install("seamm", "2024.1.1", Channel::Pypi);
    let runtime = runtime_with_installers(&world, &[]);
    let (conda, pip) = (FakeConda::new(&world), FakePip::new(&world));
    let (config, options) = (test_config(), test_options());
    let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

    let first = ShowAction::new(&ctx).run(&Selector::all()).await.unwrap();
    let second = ShowAction::new(&ctx).run(&Selector::all()).await.unwrap();

    assert_eq!(first, second);
    let seamm = &first.groups[0].rows[0];
    assert_eq!(seamm.package, "seamm");
    assert_eq!(seamm.status, PackageStatus::OutOfDate);
    assert!(world.events().is_empty());
}
