//! Top-level subcommands behind the `apkdbg` binary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::adb::{self, Adb, Device};
use crate::manifest::AndroidManifest;
use crate::session::{self, DebugSession, ProcessLocator, SessionContext, SessionOutcome, SymbolsConfig};
use crate::{config, sdk, Error, Result};

/// Options shared by `start` and `stop`.
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub project_dir: PathBuf,
    pub manifest: PathBuf,
    pub package: Option<String>,
    pub sdk_root: Option<PathBuf>,
    pub debugger_port: Option<u16>,
    pub jdwp_port: Option<u16>,
    pub device: Option<String>,
    pub build: bool,
    pub debug: bool,
    pub symbols_dir: Option<PathBuf>,
    pub native_lib: String,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            manifest: PathBuf::from("app/src/main/AndroidManifest.xml"),
            package: None,
            sdk_root: None,
            debugger_port: None,
            jdwp_port: None,
            device: None,
            build: false,
            debug: true,
            symbols_dir: Some(PathBuf::from(".debug")),
            native_lib: session::symbols::DEFAULT_NATIVE_LIB.to_string(),
        }
    }
}

/// Print the serial of every connected device.
pub async fn devices() -> Result<()> {
    let devices = adb::list_devices().await?;
    if devices.is_empty() {
        return Err(Error::DeviceNotFound("No devices found".to_string()));
    }
    for device in devices {
        println!("{}", device.serial);
    }
    Ok(())
}

pub async fn emulators(sdk_root: Option<&Path>) -> Result<()> {
    let root = sdk::sdk_root(sdk_root)?;
    for name in sdk::list_emulators(&root).await? {
        println!("{name}");
    }
    Ok(())
}

/// Launch `name`, or the first known AVD when no name is given.
pub async fn emulator(sdk_root: Option<&Path>, name: Option<&str>) -> Result<()> {
    let root = sdk::sdk_root(sdk_root)?;
    let name = match name {
        Some(name) => name.to_string(),
        None => sdk::list_emulators(&root)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Sdk("No emulators found".to_string()))?,
    };
    println!("Launching emulator {name}");
    sdk::launch_emulator(&root, &name)
}

/// Kill leftover debug-server and application processes.
pub async fn stop(opts: &StartOptions) -> Result<()> {
    let target = resolve_target(opts).await?;
    session::terminate_remote_processes(&target.adb, target.adb.package()).await;
    Ok(())
}

/// Launch the application and, unless `opts.debug` is off, run a debug
/// session until it ends. Returns the session outcome for debug runs.
pub async fn start(opts: &StartOptions) -> Result<Option<SessionOutcome>> {
    // Resolved first so a missing SDK fails before anything is built.
    let sdk_root = if opts.debug { Some(sdk::sdk_root(opts.sdk_root.as_deref())?) } else { None };

    if opts.build {
        println!("Building...");
        sdk::build_and_install(&opts.project_dir).await?;
    }

    let manifest = AndroidManifest::parse(&opts.project_dir.join(&opts.manifest))?;
    let target = resolve_target(opts).await?;
    let package = target.adb.package().to_string();
    let activity = manifest
        .main_activity_intent(&package)
        .ok_or_else(|| Error::Manifest("no activity declared".to_string()))?;

    let mut settings = config::resolve(Some(opts.project_dir.as_path()));
    if let Some(port) = opts.debugger_port {
        settings.debugger_port = port;
    }
    if let Some(port) = opts.jdwp_port {
        settings.jdwp_port = port;
    }

    let Some(sdk_root) = sdk_root else {
        println!("Starting application");
        session::terminate_remote_processes(&target.adb, &package).await;
        session::start_application(&target.adb, &package, &activity, false).await?;
        let pid = ProcessLocator::new(settings.locate_timeout(), settings.locate_poll_interval())
            .locate(&target.adb, &package)
            .await?;
        println!("Application running with PID {pid}");
        return Ok(None);
    };

    let mut device = target.device;
    device.arch = target.adb.arch().await?;
    let server = sdk::find_debug_server(&sdk_root, &device.arch)?;
    println!("Using debug server at {}", server.display());

    let mut ctx = SessionContext::new(device, package, server)
        .with_settings(&settings)
        .launching(activity);
    if let Some(dir) = &opts.symbols_dir {
        let mut symbols = SymbolsConfig::new(opts.project_dir.join(dir));
        symbols.build_dir = opts.project_dir.join(session::symbols::DEFAULT_BUILD_DIR);
        symbols.native_lib = opts.native_lib.clone();
        ctx = ctx.with_symbols(symbols);
    }

    println!("Starting debug session on port {}", settings.debugger_port);
    let sink = Arc::new(Mutex::new(tokio::io::stdout()));
    let mut session = DebugSession::new(ctx, Arc::new(target.adb));
    let outcome = session.run(sink).await;
    println!("Closing debug session");
    Ok(Some(outcome))
}

struct Target {
    device: Device,
    adb: Adb,
}

async fn resolve_target(opts: &StartOptions) -> Result<Target> {
    let package = match &opts.package {
        Some(package) if !package.is_empty() => package.clone(),
        _ => sdk::application_id(&opts.project_dir)
            .await?
            .ok_or_else(|| Error::Build("Application package not specified".to_string()))?,
    };

    let device = adb::select_device(adb::list_devices().await?, opts.device.as_deref())?;
    println!("Connecting to {:?}", device.model);
    let adb = Adb::new(&device, package);
    Ok(Target { device, adb })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = StartOptions::default();
        assert!(opts.debug);
        assert!(!opts.build);
        assert_eq!(opts.manifest, PathBuf::from("app/src/main/AndroidManifest.xml"));
        assert_eq!(opts.symbols_dir, Some(PathBuf::from(".debug")));
        assert_eq!(opts.native_lib, "libnative-activity.so");
    }

    #[tokio::test]
    async fn test_emulators_without_sdk_fails() {
        let err = emulators(Some(Path::new("/nonexistent/android-sdk"))).await.unwrap_err();
        assert!(matches!(err, Error::Sdk(_)));
    }
}
