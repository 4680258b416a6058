//! Host-side Android SDK and Gradle helpers.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::SystemTime;
use tokio::process::Command;
use walkdir::WalkDir;

use crate::adb::run_captured;
use crate::{Error, Result};

const APP_ID_PREFIX: &str = "APPID:";

/// Resolve the SDK root: explicit path, then `ANDROID_SDK_ROOT`, then `ANDROID_HOME`.
pub fn sdk_root(explicit: Option<&Path>) -> Result<PathBuf> {
    sdk_root_with(explicit, |key| std::env::var_os(key).map(PathBuf::from))
}

fn sdk_root_with(
    explicit: Option<&Path>,
    lookup: impl Fn(&str) -> Option<PathBuf>,
) -> Result<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| lookup("ANDROID_SDK_ROOT"))
        .or_else(|| lookup("ANDROID_HOME"))
        .ok_or_else(|| {
            Error::Sdk("ANDROID_SDK_ROOT not set, and not specified using --sdkroot".to_string())
        })
}

/// Most recently modified file under `root` whose path ends with `suffix`.
pub fn find_newest(root: &Path, suffix: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().to_string_lossy().ends_with(suffix))
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            Some((modified, e.into_path()))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}

/// Newest `lldb-server` shipped in the SDK for `arch` (e.g. `aarch64`).
pub fn find_debug_server(sdk_root: &Path, arch: &str) -> Result<PathBuf> {
    let suffix = format!("{arch}/lldb-server");
    find_newest(sdk_root, &suffix).ok_or_else(|| {
        Error::Sdk(format!("no {} found under {}", suffix, sdk_root.display()))
    })
}

fn emulator_tool(sdk_root: &Path) -> Result<PathBuf> {
    let path = sdk_root.join("emulator").join("emulator");
    if path.is_file() {
        Ok(path)
    } else {
        Err(Error::Sdk(format!("emulator tool not found at {}", path.display())))
    }
}

pub async fn list_emulators(sdk_root: &Path) -> Result<Vec<String>> {
    let tool = emulator_tool(sdk_root)?;
    let mut cmd = Command::new(&tool);
    cmd.arg("-list-avds");
    let output = run_captured(cmd, &format!("{} -list-avds", tool.display())).await?;
    Ok(output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Start an emulator in the background; it outlives this process.
pub fn launch_emulator(sdk_root: &Path, name: &str) -> Result<()> {
    let tool = emulator_tool(sdk_root)?;
    std::process::Command::new(&tool)
        .args(["-avd", name, "-dns-server", "8.8.8.8"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::Sdk(format!("failed to launch emulator: {e}")))?;
    Ok(())
}

async fn run_gradle(project_dir: &Path, task: &str) -> Result<String> {
    let mut cmd = Command::new(project_dir.join("gradlew"));
    cmd.arg(task).current_dir(project_dir);
    run_captured(cmd, &format!("./gradlew {task}"))
        .await
        .map_err(|e| match e {
            Error::Command { output, .. } => Error::Build(output),
            other => other,
        })
}

/// Ask Gradle for the application ID (`printAppID` task).
pub async fn application_id(project_dir: &Path) -> Result<Option<String>> {
    let output = run_gradle(project_dir, "printAppID").await?;
    Ok(parse_app_id(&output))
}

pub async fn build_and_install(project_dir: &Path) -> Result<()> {
    run_gradle(project_dir, "installDebug").await?;
    Ok(())
}

fn parse_app_id(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix(APP_ID_PREFIX))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn touch(path: &Path, age: Duration) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = File::create(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn test_find_newest_prefers_latest_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("ndk/21.0/lldb/aarch64/lldb-server");
        let new = dir.path().join("ndk/25.1/lldb/aarch64/lldb-server");
        touch(&old, Duration::from_secs(3600));
        touch(&new, Duration::from_secs(60));
        touch(&dir.path().join("ndk/25.1/lldb/x86_64/lldb-server"), Duration::ZERO);

        assert_eq!(find_debug_server(dir.path(), "aarch64").unwrap(), new);
    }

    #[test]
    fn test_find_debug_server_missing_arch() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("ndk/lldb/x86_64/lldb-server"), Duration::ZERO);
        let err = find_debug_server(dir.path(), "armv7l").unwrap_err();
        assert!(matches!(err, Error::Sdk(_)));
    }

    #[test]
    fn test_sdk_root_precedence() {
        let env = |key: &str| match key {
            "ANDROID_SDK_ROOT" => None,
            "ANDROID_HOME" => Some(PathBuf::from("/opt/android")),
            _ => None,
        };
        assert_eq!(sdk_root_with(None, env).unwrap(), PathBuf::from("/opt/android"));
        assert_eq!(
            sdk_root_with(Some(Path::new("/sdk")), env).unwrap(),
            PathBuf::from("/sdk")
        );
        assert!(sdk_root_with(None, |_| None).is_err());
    }

    #[test]
    fn test_parse_app_id() {
        let output = "> Task :app:printAppID\nAPPID: com.example.app\n\nBUILD SUCCESSFUL in 1s\n";
        assert_eq!(parse_app_id(output).as_deref(), Some("com.example.app"));
        assert_eq!(parse_app_id("BUILD SUCCESSFUL\n"), None);
        assert_eq!(parse_app_id("APPID:   \n"), None);
    }

    #[test]
    fn test_missing_emulator_tool() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(launch_emulator(dir.path(), "Pixel_7"), Err(Error::Sdk(_))));
    }
}
