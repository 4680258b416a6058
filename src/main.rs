use clap::{Parser, Subcommand};
use std::path::PathBuf;

use apkdbg::commands::{self, StartOptions};
use apkdbg::Result;

/// Debug native Android applications from the command line.
#[derive(Parser, Debug)]
#[command(name = "apkdbg", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Android manifest file
    #[arg(long, global = true, default_value = "app/src/main/AndroidManifest.xml")]
    manifest: PathBuf,

    /// Application package (asks gradle when omitted)
    #[arg(long, global = true)]
    package: Option<String>,

    /// Android SDK root
    #[arg(long, global = true, env = "ANDROID_SDK_ROOT")]
    sdkroot: Option<PathBuf>,

    /// Native debugger port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// JDWP port
    #[arg(long, global = true)]
    jdwpport: Option<u16>,

    /// Device identifier prefix
    #[arg(long, global = true)]
    device: Option<String>,

    /// Build and install before starting
    #[arg(long, global = true)]
    build: bool,

    /// Start a debug session; `--debug false` only launches the app
    #[arg(long, global = true, default_value_t = true, action = clap::ArgAction::Set)]
    debug: bool,

    /// Where debug binaries of the running app are collected
    #[arg(long, global = true, default_value = ".debug")]
    symbols_dir: PathBuf,

    /// Native library to collect next to the executable
    #[arg(long, global = true, default_value = "libnative-activity.so")]
    native_lib: String,

    /// Skip collecting debug binaries
    #[arg(long, global = true)]
    no_symbols: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List connected devices
    Devices,
    /// List available emulators
    Emulators,
    /// Launch an emulator (the first available one by default)
    Emulator { name: Option<String> },
    /// Launch the application and start a debug session
    Start,
    /// Kill leftover debug processes
    Stop,
}

impl Cli {
    fn start_options(&self) -> StartOptions {
        StartOptions {
            project_dir: PathBuf::from("."),
            manifest: self.manifest.clone(),
            package: self.package.clone(),
            sdk_root: self.sdkroot.clone(),
            debugger_port: self.port,
            jdwp_port: self.jdwpport,
            device: self.device.clone(),
            build: self.build,
            debug: self.debug,
            symbols_dir: (!self.no_symbols).then(|| self.symbols_dir.clone()),
            native_lib: self.native_lib.clone(),
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match &cli.command {
        Command::Devices => commands::devices().await?,
        Command::Emulators => commands::emulators(cli.sdkroot.as_deref()).await?,
        Command::Emulator { name } => {
            commands::emulator(cli.sdkroot.as_deref(), name.as_deref()).await?
        }
        Command::Stop => commands::stop(&cli.start_options()).await?,
        Command::Start => {
            if let Some(outcome) = commands::start(&cli.start_options()).await? {
                if !outcome.is_success() {
                    eprintln!("{outcome}");
                }
                return Ok(outcome.exit_code());
            }
        }
    }
    Ok(0)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            1
        }
    };
    std::process::exit(code);
}
