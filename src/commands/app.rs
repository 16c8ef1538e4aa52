//! `app` subcommands: desktop launchers for SEAMM, the dashboard and the
//! JobServer.

use anyhow::Result;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::app::{AppCreated, AppDescriptor, AppManager, KNOWN_APPS, KnownApp};
use crate::context::Context;
use crate::runtime::Runtime;
use crate::service::{default_port, display_path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    Create {
        force: bool,
        all_users: bool,
        /// An icon file, or a directory of `<App>.icns`/`<App>.png` files.
        icons: Option<PathBuf>,
    },
    Delete { all_users: bool },
    List,
}

#[tracing::instrument(skip(ctx, manager))]
pub async fn run<R: Runtime>(
    ctx: &Context<'_, R>,
    manager: Option<&dyn AppManager>,
    command: &AppCommand,
    apps: &[String],
) -> Result<()> {
    let Some(manager) = manager else {
        println!("SEAMM does not support apps on {} yet.", std::env::consts::OS);
        return Ok(());
    };

    match command {
        AppCommand::Create {
            force,
            all_users,
            icons,
        } => {
            prepare(ctx).await;
            for app in known(apps) {
                create(ctx, manager, app, *force, *all_users, icons.as_deref()).await?;
            }
        }
        AppCommand::Delete { all_users } => {
            for app in known(apps) {
                let name = app.app_name(ctx.options.development);
                if manager.delete(&name, *all_users)? {
                    println!("Deleted the app '{}'.", name);
                } else {
                    println!("The app '{}' does not exist.", name);
                }
            }
        }
        AppCommand::List => {
            let found = manager.list()?;
            if found.is_empty() {
                println!("Found no SEAMM apps.");
            } else {
                let home = ctx.runtime.home_dir();
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(vec!["App", "Path"]);
                for (name, path) in found {
                    table.add_row(vec![name, display_path(&path, home.as_deref())]);
                }
                println!("{}", table);
            }
        }
    }
    Ok(())
}

fn known(apps: &[String]) -> Vec<&'static KnownApp> {
    if apps.is_empty() {
        return KNOWN_APPS.iter().collect();
    }
    apps.iter()
        .filter_map(|key| {
            let app = KnownApp::find(key);
            if app.is_none() {
                let keys = KNOWN_APPS.iter().map(|a| a.key).collect::<Vec<_>>();
                println!("'{}' is not a SEAMM app. The apps are {}.", key, keys.join(", "));
            }
            app
        })
        .collect()
}

/// Point conda at the target environment so versions and executables come
/// from it.
async fn prepare<R: Runtime>(ctx: &Context<'_, R>) {
    if !ctx.conda.is_installed() {
        return;
    }
    if let Ok(true) = ctx.conda.exists(&ctx.options.environment).await {
        if let Err(e) = ctx.activate().await {
            debug!("Could not activate {}: {:#}", ctx.options.environment, e);
        }
    }
}

async fn create<R: Runtime>(
    ctx: &Context<'_, R>,
    manager: &dyn AppManager,
    app: &KnownApp,
    force: bool,
    all_users: bool,
    icons: Option<&Path>,
) -> Result<()> {
    let version = match ctx.conda.list(app.package, true).await {
        Ok(listed) => listed.get(app.package).map(|entry| entry.version.to_string()),
        Err(e) => {
            warn!("conda list for {} failed: {:#}", app.package, e);
            None
        }
    };
    let Some(version) = version else {
        println!(
            "{} is not installed, so the {} app was not created.",
            app.package, app.title
        );
        return Ok(());
    };

    let Some(command) = app_command(ctx, app) else {
        println!("Could not find the program for {}. Is it installed?", app.title);
        return Ok(());
    };

    let descriptor = AppDescriptor {
        name: app.app_name(ctx.options.development),
        command,
        icon: icons.and_then(|icons| icon_for(ctx.runtime, icons, app)),
        version,
        all_users,
    };

    let home = ctx.runtime.home_dir();
    match manager.create(&descriptor, force)? {
        AppCreated::Created(path) => println!(
            "Created the app '{}' in {}",
            descriptor.name,
            display_path(&path, home.as_deref())
        ),
        AppCreated::AlreadyExists(path) => println!(
            "The app '{}' already exists in {}. Use --force to recreate it.",
            descriptor.name,
            display_path(&path, home.as_deref())
        ),
    }
    Ok(())
}

/// What the launcher runs. SEAMM itself runs through `conda run` so it gets
/// its whole environment.
fn app_command<R: Runtime>(ctx: &Context<'_, R>, app: &KnownApp) -> Option<Vec<String>> {
    let root = ctx.options.root.display().to_string();
    match app.key {
        "seamm" => {
            let conda = ctx
                .runtime
                .env_var("CONDA_EXE")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .or_else(|| ctx.runtime.which("conda"))?;
            let mut command = vec![conda.display().to_string(), "run".to_string()];
            match ctx.prefix() {
                Some(prefix) => command.extend(["-p".to_string(), prefix.display().to_string()]),
                None => command.extend(["-n".to_string(), ctx.options.environment.clone()]),
            }
            command.push("seamm".to_string());
            Some(command)
        }
        "dashboard" => {
            let executable = ctx.find_executable("seamm-dashboard")?;
            Some(vec![
                executable.display().to_string(),
                "--root".to_string(),
                root,
                "--port".to_string(),
                default_port(ctx.options.development).to_string(),
            ])
        }
        _ => {
            let executable = ctx.find_executable("seamm-jobserver")?;
            Some(vec![executable.display().to_string(), "--root".to_string(), root])
        }
    }
}

fn icon_for<R: Runtime>(runtime: &R, icons: &Path, app: &KnownApp) -> Option<PathBuf> {
    let expanded = PathBuf::from(shellexpand::tilde(&icons.to_string_lossy()).into_owned());
    if !runtime.is_dir(&expanded) {
        return runtime.exists(&expanded).then_some(expanded);
    }
    let extension = if cfg!(target_os = "macos") { "icns" } else { "png" };
    let icon = expanded.join(format!("{}.{}", app.title, extension));
    if runtime.exists(&icon) {
        Some(icon)
    } else {
        debug!("No icon {}", icon.display());
        None
    }
}
