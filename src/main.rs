use anyhow::{Context as _, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug};
use std::io::IsTerminal;
use std::path::PathBuf;

use seamm_installer::commands::app::AppCommand;
use seamm_installer::commands::service::ServiceCommand;
use seamm_installer::commands::services::Backends;
use seamm_installer::commands::{self, PackageCommand};
use seamm_installer::config::Configuration;
use seamm_installer::context::{Context, DEFAULT_ENVIRONMENT, Options};
use seamm_installer::runtime::{RealRuntime, Runtime};
use seamm_installer::{app, service};

/// seamm-installer - install, update and run SEAMM
///
/// Manages the SEAMM packages and plug-ins in a conda environment, the
/// dashboard and JobServer services, and the desktop apps.
///
/// Examples:
///   seamm-installer install core          # Install the core of SEAMM
///   seamm-installer update all            # Update everything installed
///   seamm-installer service create        # Run the dashboard and JobServer
#[derive(Parser, Debug)]
#[command(author, version = env!("SEAMM_INSTALLER_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// The level of informational output (defaults to warn; RUST_LOG is used otherwise)
    #[arg(
        long = "log-level",
        value_name = "LEVEL",
        value_parser = ["off", "error", "warn", "info", "debug", "trace"],
        global = true
    )]
    pub log_level: Option<String>,

    /// SEAMM data directory (defaults to ~/SEAMM, or ~/SEAMM_DEV in development)
    #[arg(long = "root", value_name = "PATH", global = true)]
    pub root: Option<PathBuf>,

    /// The conda environment for SEAMM (defaults to the active one, else seamm)
    #[arg(long, env = "SEAMM_ENVIRONMENT", value_name = "NAME", global = true)]
    pub environment: Option<String>,

    /// Work with the development installation
    #[arg(long, global = true, conflicts_with = "production")]
    pub development: bool,

    /// Work with the production installation
    #[arg(long, global = true)]
    pub production: bool,

    /// Package index URL (defaults to https://pypi.org)
    #[arg(long = "index-url", env = "SEAMM_INDEX_URL", value_name = "URL", global = true)]
    pub index_url: Option<String>,

    /// Environment file used to create or update the conda environment
    #[arg(long = "environment-file", value_name = "PATH", global = true)]
    pub environment_file: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install SEAMM packages and plug-ins
    Install(InstallArgs),

    /// Update installed packages to their newest versions
    Update(UpdateArgs),

    /// Uninstall packages
    Uninstall(UninstallArgs),

    /// Ask each package to check its installation
    Check(CheckArgs),

    /// Show the installed and available versions of packages
    Show(ModulesArgs),

    /// Check whether the installer itself is current
    CheckInstaller(YesArgs),

    /// Manage the dashboard and JobServer services
    Service {
        #[command(subcommand)]
        command: ServiceCommands,
    },

    /// Manage the desktop apps
    App {
        #[command(subcommand)]
        command: AppCommands,
    },
}

#[derive(clap::Args, Debug)]
pub struct ModulesArgs {
    /// Package names, or all, core, plug-ins
    #[arg(value_name = "MODULES")]
    pub modules: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Also update packages that are out of date
    #[arg(long)]
    pub update: bool,

    /// Install only what the graphical interface needs; skip the plug-in installers
    #[arg(long = "gui-only")]
    pub gui_only: bool,

    /// Limit the plug-ins to those not from MolSSI
    #[arg(long = "third-party")]
    pub third_party: bool,

    #[command(flatten)]
    pub modules: ModulesArgs,
}

#[derive(clap::Args, Debug)]
pub struct UpdateArgs {
    /// Update the conda environment itself, then every package
    #[arg(long)]
    pub all: bool,

    /// Also install MolSSI plug-ins that are missing
    #[arg(long = "install-molssi")]
    pub install_molssi: bool,

    /// Also install 3rd-party plug-ins that are missing
    #[arg(long = "install-3rd-party")]
    pub install_third_party: bool,

    #[command(flatten)]
    pub modules: ModulesArgs,
}

#[derive(clap::Args, Debug)]
pub struct UninstallArgs {
    /// Limit the plug-ins to those not from MolSSI
    #[arg(long = "third-party")]
    pub third_party: bool,

    #[command(flatten)]
    pub modules: ModulesArgs,
}

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub yes: YesArgs,

    #[command(flatten)]
    pub modules: ModulesArgs,
}

#[derive(clap::Args, Debug)]
pub struct YesArgs {
    /// Answer yes to any questions
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(clap::Args, Debug)]
pub struct ServicesArgs {
    /// dashboard and/or jobserver (default: both)
    #[arg(value_name = "SERVICES")]
    pub services: Vec<String>,
}

#[derive(clap::Subcommand, Debug)]
enum ServiceCommands {
    /// Create and start services
    Create {
        /// Recreate the service if it already exists
        #[arg(long)]
        force: bool,

        /// Dashboard port (defaults to 55055, or 55066 in development)
        #[arg(long, short = 'p')]
        port: Option<u16>,

        #[command(flatten)]
        services: ServicesArgs,
    },
    /// Stop and remove services
    Delete(ServicesArgs),
    /// Start services
    Start(ServicesArgs),
    /// Stop services
    Stop(ServicesArgs),
    /// Restart services
    Restart(ServicesArgs),
    /// Show where the service definitions are
    Show(ServicesArgs),
    /// Show whether services are running, and how
    Status {
        /// Both the production and the development services
        #[arg(long)]
        all: bool,

        #[command(flatten)]
        services: ServicesArgs,
    },
}

#[derive(clap::Args, Debug)]
pub struct AppsArgs {
    /// seamm, dashboard and/or jobserver (default: all)
    #[arg(value_name = "APPS")]
    pub apps: Vec<String>,
}

#[derive(clap::Subcommand, Debug)]
enum AppCommands {
    /// Create the desktop apps
    Create {
        /// Recreate the app if it already exists
        #[arg(long)]
        force: bool,

        /// Install for all users
        #[arg(long = "all-users")]
        all_users: bool,

        /// Icon file, or a directory of icons named after the apps
        #[arg(long, value_name = "PATH")]
        icons: Option<PathBuf>,

        #[command(flatten)]
        apps: AppsArgs,
    },
    /// Delete desktop apps
    Delete {
        /// Delete the apps installed for all users
        #[arg(long = "all-users")]
        all_users: bool,

        #[command(flatten)]
        apps: AppsArgs,
    },
    /// List the SEAMM apps
    List,
}

fn init_logging(level: Option<&str>) -> Result<()> {
    match level {
        Some(level) => {
            let filter = level
                .parse::<LevelFilter>()
                .map_err(|_| anyhow!("Invalid log level '{}'", level))?;
            env_logger::Builder::new().filter_level(filter).init();
        }
        None => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init()
        }
    }
    Ok(())
}

fn options<R: Runtime>(runtime: &R, cli: &Cli) -> Result<Options> {
    let running_environment = runtime
        .env_var("CONDA_DEFAULT_ENV")
        .ok()
        .filter(|s| !s.is_empty());
    let environment = cli
        .environment
        .clone()
        .or_else(|| running_environment.clone())
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

    let development = if cli.development {
        true
    } else if cli.production {
        false
    } else {
        Options::is_development(&environment)
    };

    let root = match &cli.root {
        Some(root) => PathBuf::from(shellexpand::tilde(&root.to_string_lossy()).into_owned()),
        None => {
            let home = runtime
                .home_dir()
                .context("Could not determine the home directory")?;
            Options::default_root(&home, development)
        }
    };

    Ok(Options {
        root,
        environment,
        development,
        environment_file: cli.environment_file.clone(),
        running_environment,
        progress: std::io::stdout().is_terminal(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    let runtime = RealRuntime;
    let options = options(&runtime, &cli)?;
    debug!("{:?}", options);

    let mut config = Configuration::load_or_create(&runtime, &options.config_path())?;
    if let Commands::Install(args) = &cli.command {
        if args.gui_only && !config.gui_only() {
            config.set_gui_only(true);
            config.save(&runtime)?;
        }
    }

    let backends = Backends::new(&runtime, cli.index_url.as_deref())?;
    let service_manager = service::for_platform(&runtime);
    let app_manager = app::for_platform(&runtime);
    let ctx = Context::new(&runtime, &backends.conda, &backends.pip, &config, &options)
        .with_services(service_manager.as_deref());

    match cli.command {
        Commands::Install(args) => {
            let command = PackageCommand::Install {
                update: args.update,
                third_party: args.third_party,
            };
            commands::packages(&ctx, command, &args.modules.modules).await?
        }
        Commands::Update(args) => {
            let mut modules = args.modules.modules;
            if modules.is_empty() {
                if args.all {
                    modules.push("all".to_string());
                } else if args.install_molssi || args.install_third_party {
                    modules.push("plug-ins".to_string());
                }
            }
            let command = PackageCommand::Update {
                environment: args.all,
                install_molssi: args.install_molssi,
                install_third_party: args.install_third_party,
            };
            commands::packages(&ctx, command, &modules).await?
        }
        Commands::Uninstall(args) => {
            let command = PackageCommand::Uninstall {
                third_party: args.third_party,
            };
            commands::packages(&ctx, command, &args.modules.modules).await?
        }
        Commands::Check(args) => {
            let command = PackageCommand::Check { yes: args.yes.yes };
            commands::packages(&ctx, command, &args.modules.modules).await?
        }
        Commands::Show(args) => commands::packages(&ctx, PackageCommand::Show, &args.modules).await?,
        Commands::CheckInstaller(args) => commands::check_installer(&ctx, args.yes).await?,
        Commands::Service { command } => {
            let (command, services) = match command {
                ServiceCommands::Create {
                    force,
                    port,
                    services,
                } => (ServiceCommand::Create { force, port }, services),
                ServiceCommands::Delete(services) => (ServiceCommand::Delete, services),
                ServiceCommands::Start(services) => (ServiceCommand::Start, services),
                ServiceCommands::Stop(services) => (ServiceCommand::Stop, services),
                ServiceCommands::Restart(services) => (ServiceCommand::Restart, services),
                ServiceCommands::Show(services) => (ServiceCommand::Show, services),
                ServiceCommands::Status { all, services } => (ServiceCommand::Status { all }, services),
            };
            commands::service::run(&ctx, command, &services.services).await?
        }
        Commands::App { command } => {
            let (command, apps_args) = match command {
                AppCommands::Create {
                    force,
                    all_users,
                    icons,
                    apps,
                } => (
                    AppCommand::Create {
                        force,
                        all_users,
                        icons,
                    },
                    apps,
                ),
                AppCommands::Delete { all_users, apps } => (AppCommand::Delete { all_users }, apps),
                AppCommands::List => (AppCommand::List, AppsArgs { apps: Vec::new() }),
            };
            commands::app::run(&ctx, app_manager.as_deref(), &command, &apps_args.apps).await?
        }
    }
    Ok(())
}
