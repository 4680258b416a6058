use std::path::Path;

use crate::adb::{RemoteShell, STAGING_DIR};
use crate::error::TransferStep;
use crate::{Error, Result};

/// Install `local` into `dest_dir` inside the app sandbox and return the
/// installed path.
///
/// The sandbox is not writable by `adb push`, so the binary is staged in
/// the shared temp directory and copied over as the app user. Staged files
/// are left behind.
pub async fn install<S: RemoteShell>(shell: &S, local: &Path, dest_dir: &str) -> Result<String> {
    let file_name = local
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Transfer {
            step: TransferStep::Push,
            reason: format!("{} has no file name", local.display()),
        })?;
    if !local.is_file() {
        return Err(Error::Transfer {
            step: TransferStep::Push,
            reason: format!("{} does not exist", local.display()),
        });
    }

    shell
        .run_as(&format!("mkdir -p {dest_dir}"))
        .await
        .map_err(|e| e.into_transfer(TransferStep::CreateDir))?;

    let staged = format!("{STAGING_DIR}/{file_name}");
    shell
        .push(local, &staged)
        .await
        .map_err(|e| e.into_transfer(TransferStep::Push))?;

    let installed = format!("{dest_dir}/{file_name}");
    shell
        .run_as(&format!("cat {staged} > {installed}"))
        .await
        .map_err(|e| e.into_transfer(TransferStep::Copy))?;

    shell
        .run_as(&format!("chmod 777 {installed}"))
        .await
        .map_err(|e| e.into_transfer(TransferStep::Permission))?;

    tracing::info!("Installed {} at {}", local.display(), installed);
    Ok(installed)
}
