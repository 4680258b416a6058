use std::path::PathBuf;

use crate::adb::RemoteShell;
use crate::error::TransferStep;
use crate::{Error, Result};

pub const DEFAULT_BUILD_DIR: &str = "app/build/intermediates/cmake/debug";
pub const DEFAULT_NATIVE_LIB: &str = "libnative-activity.so";

/// Where the host-side debugger expects the binaries of the running app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolsConfig {
    pub output_dir: PathBuf,
    pub build_dir: PathBuf,
    pub native_lib: String,
}

impl SymbolsConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
            native_lib: DEFAULT_NATIVE_LIB.to_string(),
        }
    }
}

/// Copy the locally built native library for the device ABI and pull the
/// process executable into `config.output_dir`.
pub async fn collect<S: RemoteShell>(shell: &S, pid: &str, config: &SymbolsConfig) -> Result<()> {
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|e| local_copy_error(format!("failed to create {}: {}", config.output_dir.display(), e)))?;

    let abi = shell
        .run_as("getprop ro.product.cpu.abi")
        .await
        .map_err(|e| e.into_transfer(TransferStep::LocalCopy))?;
    let suffix = format!("/{}/{}", abi.trim(), config.native_lib);
    let library = crate::sdk::find_newest(&config.build_dir, &suffix).ok_or_else(|| {
        local_copy_error(format!("no {} under {}", suffix, config.build_dir.display()))
    })?;
    tokio::fs::copy(&library, config.output_dir.join(&config.native_lib))
        .await
        .map_err(|e| local_copy_error(format!("failed to copy {}: {}", library.display(), e)))?;

    let listing = shell
        .run_as(&format!("ls -l /proc/{pid}/exe"))
        .await
        .map_err(|e| e.into_transfer(TransferStep::Pull))?;
    let executable = parse_exe_link(&listing).ok_or_else(|| Error::Transfer {
        step: TransferStep::Pull,
        reason: format!("unexpected /proc/{pid}/exe listing: {}", listing.trim()),
    })?;
    shell
        .pull(&executable, &config.output_dir.join("exe"))
        .await
        .map_err(|e| e.into_transfer(TransferStep::Pull))?;

    tracing::info!("Collected debug binaries in {}", config.output_dir.display());
    Ok(())
}

fn local_copy_error(reason: String) -> Error {
    Error::Transfer { step: TransferStep::LocalCopy, reason }
}

/// Symlink target from an `ls -l` line (`... exe -> /system/bin/app_process64`).
pub fn parse_exe_link(listing: &str) -> Option<String> {
    listing
        .split_once("->")
        .map(|(_, target)| target.trim().to_string())
        .filter(|target| !target.is_empty())
}
