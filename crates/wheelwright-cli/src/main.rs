use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Result as AnyResult;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use serde::Serialize;
use serde_json::json;
use wheelwright_core::{
    BuildError, BuildOptions, Config, HttpStorageClient, InstallState, ProjectVersion,
    SystemEffects, VersionError, VersionResolver, WheelSummary, Wheels,
};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = WheelwrightCli::parse();
    init_tracing(cli.trace, cli.verbose, cli.quiet);

    let mut config = Config::from_env();
    if cli.verbose > 0 || cli.trace {
        config.set_verbose(true);
    }

    let code = match execute(&cli.command, &config) {
        Ok(()) => 0,
        Err(err) => report_failure(&err),
    };
    if code == 0 {
        Ok(())
    } else {
        process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("wheelwright={level},wheelwright_core={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Typed failures print as one message and exit 1; anything else exits 2.
fn report_failure(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(version) = cause.downcast_ref::<VersionError>() {
            eprintln!("{version}");
            return 1;
        }
        if let Some(build) = cause.downcast_ref::<BuildError>() {
            eprintln!("{build}");
            return 1;
        }
    }
    eprintln!("Error: {err:?}");
    2
}

fn execute(command: &CommandCli, config: &Config) -> AnyResult<()> {
    match command {
        CommandCli::Version(args) => show_version(args, config),
        CommandCli::Build(args) => build_wheel(args, config),
    }
}

fn show_version(args: &ProjectArgs, config: &Config) -> AnyResult<()> {
    let effects = Arc::new(SystemEffects::new(config, args.start_dir()?));
    let resolver = VersionResolver::new(
        effects,
        args.released_version.clone(),
        args.product.clone(),
        config.build().github_org.clone(),
    );
    let version = resolver.resolve()?;
    if args.json {
        let payload = json!({
            "version": version,
            "unreleased": version.is_unreleased(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{version}");
    }
    Ok(())
}

#[derive(Serialize)]
struct BuildReport<'a> {
    version: &'a ProjectVersion,
    wheel: WheelSummary,
    remote_path: &'a str,
    uploads: Vec<UploadReport>,
}

#[derive(Serialize)]
struct UploadReport {
    target: UploadTarget,
    location: String,
}

fn build_wheel(args: &BuildArgs, config: &Config) -> AnyResult<()> {
    let project = &args.project;
    let effects = Arc::new(SystemEffects::new(config, project.start_dir()?));
    let storage = Arc::new(HttpStorageClient::from_config(config.databricks())?);
    let options = BuildOptions {
        verbose: config.build().verbose,
        github_org: config.build().github_org.clone(),
        version_marker: args.version_marker.clone(),
    };
    let wheels = Wheels::new(
        effects,
        storage,
        args.target.install_state(&project.product),
        project.released_version.clone(),
        options,
    );

    let built = wheels.build()?;
    let mut uploads = Vec::new();
    if let Some(destination) = args.upload {
        if destination.includes_dbfs() {
            let path = built.upload_to_dbfs()?;
            uploads.push(UploadReport {
                target: UploadTarget::Dbfs,
                location: format!("dbfs:{path}"),
            });
        }
        if destination.includes_workspace() {
            let path = built.upload_to_wsfs()?;
            uploads.push(UploadReport {
                target: UploadTarget::Workspace,
                location: format!("/Workspace{path}"),
            });
        }
    }

    let report = BuildReport {
        version: built.version(),
        wheel: built.summary()?,
        remote_path: built.remote_wheel(),
        uploads,
    };
    if project.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Built {}", report.wheel.label());
        println!("Version {}", report.version);
        if report.uploads.is_empty() {
            println!("Remote path {}", report.remote_path);
        }
        for upload in &report.uploads {
            println!("Uploaded {}", upload.location);
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(
    name = "wheelwright",
    version,
    about = "Build a versioned Python wheel from a project checkout and upload it.",
    propagate_version = true
)]
struct WheelwrightCli {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[arg(long, global = true, help = "Trace-level logging")]
    trace: bool,
    #[arg(short, long, global = true, help = "Only log warnings and errors")]
    quiet: bool,
    #[command(subcommand)]
    command: CommandCli,
}

#[derive(Subcommand, Debug)]
enum CommandCli {
    #[command(about = "Print the version the wheel would be built with.")]
    Version(ProjectArgs),
    #[command(about = "Build the wheel and optionally upload it.")]
    Build(BuildArgs),
}

#[derive(Args, Debug)]
struct ProjectArgs {
    #[arg(long, value_name = "VERSION", help = "Version to use outside a git checkout")]
    released_version: String,
    #[arg(long, value_name = "NAME")]
    product: String,
    #[arg(long, value_name = "DIR", help = "Start project discovery here instead of the cwd")]
    project_root: Option<PathBuf>,
    #[arg(long, help = "Emit JSON output")]
    json: bool,
}

impl ProjectArgs {
    fn start_dir(&self) -> AnyResult<PathBuf> {
        match &self.project_root {
            Some(root) => Ok(root.clone()),
            None => Ok(env::current_dir()?),
        }
    }
}

#[derive(Args, Debug)]
struct BuildArgs {
    #[command(flatten)]
    project: ProjectArgs,
    #[command(flatten)]
    target: InstallTargetArgs,
    #[arg(long, value_enum, value_name = "TARGET")]
    upload: Option<UploadTarget>,
    #[arg(
        long,
        value_name = "PATH",
        help = "Version file to rewrite, relative to the project root"
    )]
    version_marker: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InstallTargetArgs {
    #[arg(long, value_name = "FOLDER")]
    install_folder: Option<String>,
    #[arg(long, value_name = "USER", help = "Install under /Users/<USER>/.<product>")]
    user: Option<String>,
    #[arg(long, help = "Install under /Applications/<product>")]
    global: bool,
}

impl InstallTargetArgs {
    fn install_state(&self, product: &str) -> InstallState {
        if let Some(folder) = &self.install_folder {
            InstallState::new(product, folder.clone())
        } else if let Some(user) = &self.user {
            InstallState::user(product, user)
        } else {
            InstallState::global(product)
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
enum UploadTarget {
    Dbfs,
    Workspace,
    Both,
}

impl UploadTarget {
    fn includes_dbfs(self) -> bool {
        matches!(self, Self::Dbfs | Self::Both)
    }

    fn includes_workspace(self) -> bool {
        matches!(self, Self::Workspace | Self::Both)
    }
}
