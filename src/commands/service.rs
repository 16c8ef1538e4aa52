//! `service` subcommands: the dashboard and JobServer as user services.

use anyhow::Result;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use log::debug;

use crate::context::Context;
use crate::runtime::Runtime;
use crate::service::{
    CreateOutcome, KNOWN_SERVICES, ServiceDescriptor, ServiceManager, ServiceState, display_path,
    service_name,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCommand {
    Create { force: bool, port: Option<u16> },
    Delete,
    Start,
    Stop,
    Restart,
    Show,
    /// `all` covers both the production and the development services.
    Status { all: bool },
}

/// Run a service subcommand for `services` (both known services when empty).
#[tracing::instrument(skip(ctx))]
pub async fn run<R: Runtime>(ctx: &Context<'_, R>, command: ServiceCommand, services: &[String]) -> Result<()> {
    let Some(manager) = ctx.services else {
        println!(
            "SEAMM does not support services on {} yet.",
            std::env::consts::OS
        );
        return Ok(());
    };

    let services = known(services);
    match command {
        ServiceCommand::Create { force, port } => {
            find_environment(ctx).await;
            for service in &services {
                create(ctx, manager, service, force, port)?;
            }
        }
        ServiceCommand::Delete => {
            for service in &services {
                let name = ctx.service_name(service);
                if manager.delete(&name)? {
                    println!("Deleted the service '{}'.", name);
                } else {
                    println!("The service '{}' does not exist.", name);
                }
            }
        }
        ServiceCommand::Start => {
            for service in &services {
                let name = ctx.service_name(service);
                if manager.is_running(&name)? {
                    println!("The service '{}' was already running.", name);
                } else {
                    report(&name, manager.start(&name), "has been started");
                }
            }
        }
        ServiceCommand::Stop => {
            for service in &services {
                let name = ctx.service_name(service);
                if manager.is_running(&name)? {
                    report(&name, manager.stop(&name), "has been stopped");
                } else {
                    println!("The service '{}' was not running.", name);
                }
            }
        }
        ServiceCommand::Restart => {
            for service in &services {
                let name = ctx.service_name(service);
                report(&name, manager.restart(&name), "was restarted");
            }
        }
        ServiceCommand::Show => {
            println!("{}", show_table(ctx, manager, &services));
        }
        ServiceCommand::Status { all } => {
            let modes = if all {
                vec![false, true]
            } else {
                vec![ctx.options.development]
            };
            println!("{}", status_table(manager, &services, &modes)?);
        }
    }
    Ok(())
}

/// Drop unknown names with a message; no names means all of them.
fn known(services: &[String]) -> Vec<String> {
    if services.is_empty() {
        return KNOWN_SERVICES.iter().map(|s| s.to_string()).collect();
    }
    services
        .iter()
        .filter(|service| {
            let ok = KNOWN_SERVICES.contains(&service.as_str());
            if !ok {
                println!(
                    "'{}' is not a SEAMM service. The services are {}.",
                    service,
                    KNOWN_SERVICES.join(", ")
                );
            }
            ok
        })
        .cloned()
        .collect()
}

/// Activate the target environment when it exists, so its executables are
/// found first.
async fn find_environment<R: Runtime>(ctx: &Context<'_, R>) {
    if !ctx.conda.is_installed() {
        return;
    }
    match ctx.conda.exists(&ctx.options.environment).await {
        Ok(true) => {
            if let Err(e) = ctx.activate().await {
                debug!("Could not activate {}: {:#}", ctx.options.environment, e);
            }
        }
        Ok(false) => debug!("The environment {} does not exist", ctx.options.environment),
        Err(e) => debug!("Could not look for {}: {:#}", ctx.options.environment, e),
    }
}

fn create<R: Runtime>(
    ctx: &Context<'_, R>,
    manager: &dyn ServiceManager,
    service: &str,
    force: bool,
    port: Option<u16>,
) -> Result<()> {
    let names = ServiceDescriptor::executable_names(service);
    let Some(executable) = names.iter().find_map(|name| ctx.find_executable(name)) else {
        println!("Could not find {} or {}. Is it installed?", names[0], names[1]);
        println!();
        return Ok(());
    };

    let descriptor = ServiceDescriptor::new(
        service,
        executable,
        &ctx.options.root,
        ctx.options.development,
        port,
    );
    println!("Creating the service {}", descriptor.name);
    match manager.create(&descriptor, force)? {
        CreateOutcome::Created(path) => {
            debug!("Wrote {}", path.display());
            println!("The service '{}' was created and started.", descriptor.name);
        }
        CreateOutcome::AlreadyExists(_) => println!(
            "The service '{}' already exists! Use --force to recreate the service from scratch.",
            descriptor.name
        ),
        CreateOutcome::WrittenElsewhere { path, instructions } => {
            println!();
            println!(
                "You do not have permission to create the service '{}'.",
                descriptor.name
            );
            println!(
                "The needed file has been written to {}",
                display_path(&path, ctx.runtime.home_dir().as_deref())
            );
            println!("{}", instructions);
        }
    }
    Ok(())
}

fn report(name: &str, result: Result<()>, done: &str) {
    match result {
        Ok(()) => println!("The service '{}' {}.", name, done),
        Err(e) => println!("{:#}", e),
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn show_table<R: Runtime>(ctx: &Context<'_, R>, manager: &dyn ServiceManager, services: &[String]) -> Table {
    let home = ctx.runtime.home_dir();
    let mut table = new_table(vec!["Service", "Path"]);
    for service in services {
        let name = ctx.service_name(service);
        let path = manager
            .path(&name)
            .map(|path| display_path(&path, home.as_deref()))
            .unwrap_or_else(|| "not found".to_string());
        table.add_row(vec![name, path]);
    }
    table
}

fn status_table(manager: &dyn ServiceManager, services: &[String], modes: &[bool]) -> Result<Table> {
    let mut table = new_table(vec!["Service", "Status", "Root", "Port"]);
    for &development in modes {
        for service in services {
            let name = service_name(service, development);
            let status = manager.status(&name)?;
            if status.state == ServiceState::NotCreated {
                println!("The service '{}' has not been created.", name);
            }
            table.add_row(vec![
                name,
                status.state.to_string(),
                status.root.unwrap_or_else(|| "?".to_string()),
                status.port.unwrap_or_default(),
            ]);
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockEnvironmentManager, MockPackageIndex};
    use crate::config::Configuration;
    use crate::context::Options;
    use crate::runtime::MockRuntime;
    use crate::service::{MockServiceManager, ServiceStatus};
    use mockall::predicate::eq;
    use std::path::{Path, PathBuf};

    fn options(development: bool) -> Options {
        Options {
            root: PathBuf::from("/home/user/SEAMM"),
            environment: "seamm".to_string(),
            development,
            environment_file: None,
            running_environment: None,
            progress: false,
        }
    }

    fn config() -> Configuration {
        Configuration::parse(Path::new("/home/user/SEAMM/seamm.ini"), "[SEAMM]\n").unwrap()
    }

    fn no_conda() -> MockEnvironmentManager {
        let mut conda = MockEnvironmentManager::new();
        conda.expect_is_installed().return_const(false);
        conda
    }

    #[test]
    fn test_known_filters_names() {
        assert_eq!(known(&[]), vec!["dashboard", "jobserver"]);
        assert_eq!(
            known(&["jobserver".to_string(), "webserver".to_string()]),
            vec!["jobserver"]
        );
    }

    #[tokio::test]
    async fn test_create_uses_found_executable() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_which()
            .with(eq("seamm-dashboard"))
            .returning(|_| Some(PathBuf::from("/opt/conda/envs/seamm/bin/seamm-dashboard")));
        let conda = no_conda();
        let pip = MockPackageIndex::new();
        let mut manager = MockServiceManager::new();
        manager
            .expect_create()
            .withf(|descriptor, force| {
                descriptor.name == "dev_dashboard"
                    && descriptor.port == Some(55066)
                    && descriptor.executable == Path::new("/opt/conda/envs/seamm/bin/seamm-dashboard")
                    && *force
            })
            .times(1)
            .returning(|_, _| Ok(CreateOutcome::Created(PathBuf::from("/unit"))));
        let (config, options) = (config(), options(true));
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options).with_services(Some(&manager));

        run(
            &ctx,
            ServiceCommand::Create {
                force: true,
                port: None,
            },
            &["dashboard".to_string()],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_create_skips_missing_executable() {
        let mut runtime = MockRuntime::new();
        runtime.expect_which().returning(|_| None);
        let conda = no_conda();
        let pip = MockPackageIndex::new();
        let mut manager = MockServiceManager::new();
        manager.expect_create().never();
        let (config, options) = (config(), options(false));
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options).with_services(Some(&manager));

        run(
            &ctx,
            ServiceCommand::Create {
                force: false,
                port: None,
            },
            &[],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_start_skips_running_service() {
        let runtime = MockRuntime::new();
        let conda = no_conda();
        let pip = MockPackageIndex::new();
        let mut manager = MockServiceManager::new();
        manager
            .expect_is_running()
            .with(eq("dashboard"))
            .returning(|_| Ok(true));
        manager
            .expect_is_running()
            .with(eq("jobserver"))
            .returning(|_| Ok(false));
        manager
            .expect_start()
            .with(eq("jobserver"))
            .times(1)
            .returning(|_| Ok(()));
        let (config, options) = (config(), options(false));
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options).with_services(Some(&manager));

        run(&ctx, ServiceCommand::Start, &[]).await.unwrap();
    }

    #[test]
    fn test_status_all_covers_both_modes() {
        let mut manager = MockServiceManager::new();
        manager.expect_status().times(2).returning(|name| {
            Ok(if name == "jobserver" {
                ServiceStatus {
                    name: name.to_string(),
                    state: ServiceState::Running,
                    root: Some("/home/user/SEAMM".to_string()),
                    port: None,
                    path: None,
                }
            } else {
                ServiceStatus::not_created(name)
            })
        });

        let table = status_table(&manager, &["jobserver".to_string()], &[false, true])
            .unwrap()
            .to_string();
        assert!(table.contains("dev_jobserver"));
        assert!(table.contains("not created"));
        assert!(table.contains("/home/user/SEAMM"));
    }

    #[tokio::test]
    async fn test_unsupported_platform() {
        let runtime = MockRuntime::new();
        let conda = MockEnvironmentManager::new();
        let pip = MockPackageIndex::new();
        let (config, options) = (config(), options(false));
        let ctx = Context::new(&runtime, &conda, &pip, &config, &options);

        run(&ctx, ServiceCommand::Stop, &[]).await.unwrap();
    }
}
