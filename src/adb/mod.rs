//! Device transport: the `RemoteShell` seam and its adb-backed implementation.

pub mod device;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::{Error, Result};

pub use device::{list_devices, select_device, Device};

/// Host-side staging area every app-sandbox install goes through.
pub const STAGING_DIR: &str = "/data/local/tmp";

/// Request/response access to one selected device.
///
/// Every call is a self-contained command, so implementations must tolerate
/// concurrent invocations from the background session tasks.
pub trait RemoteShell: Send + Sync + 'static {
    /// Run a transport command (`adb -t <id> <args…>`), returning combined output.
    fn command(&self, args: &[&str]) -> impl Future<Output = Result<String>> + Send;

    /// Run a script as the application's user inside its sandbox.
    fn run_as(&self, script: &str) -> impl Future<Output = Result<String>> + Send;

    fn push(&self, local: &Path, remote: &str) -> impl Future<Output = Result<()>> + Send;

    fn pull(&self, remote: &str, local: &Path) -> impl Future<Output = Result<()>> + Send;

    /// Build (without spawning) the log-tailing command scoped to `pid`.
    fn log_command(&self, pid: &str) -> Command;
}

/// `RemoteShell` over the `adb` command-line tool.
#[derive(Debug, Clone)]
pub struct Adb {
    program: PathBuf,
    transport_id: String,
    package: String,
}

impl Adb {
    pub fn new(device: &Device, package: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from("adb"),
            transport_id: device.transport_id.clone(),
            package: package.into(),
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub async fn shell(&self, args: &[&str]) -> Result<String> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("shell");
        full.extend_from_slice(args);
        self.command(&full).await
    }

    /// CPU architecture as reported by `uname -m`.
    pub async fn arch(&self) -> Result<String> {
        Ok(self.shell(&["uname", "-m"]).await?.trim().to_string())
    }

    pub async fn abi(&self) -> Result<String> {
        Ok(self.shell(&["getprop", "ro.product.cpu.abi"]).await?.trim().to_string())
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-t").arg(&self.transport_id);
        cmd
    }
}

impl RemoteShell for Adb {
    async fn command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = self.base_command();
        cmd.args(args);
        run_captured(cmd, &self.describe(args)).await
    }

    async fn run_as(&self, script: &str) -> Result<String> {
        let wrapped = format!("sh -c {}", shell_quote(script));
        self.shell(&["run-as", &self.package, &wrapped]).await
    }

    async fn push(&self, local: &Path, remote: &str) -> Result<()> {
        let local = local.to_string_lossy();
        self.command(&["push", &local, remote]).await?;
        Ok(())
    }

    async fn pull(&self, remote: &str, local: &Path) -> Result<()> {
        let local = local.to_string_lossy();
        self.command(&["pull", remote, &local]).await?;
        Ok(())
    }

    fn log_command(&self, pid: &str) -> Command {
        let mut cmd = self.base_command();
        cmd.arg("logcat").arg(format!("--pid={pid}"));
        cmd
    }
}

impl Adb {
    fn describe(&self, args: &[&str]) -> String {
        format!("{} -t {} {}", self.program.display(), self.transport_id, args.join(" "))
    }
}

/// Run `cmd` to completion, returning stdout followed by stderr.
/// A non-zero exit becomes `Error::Command` carrying that output.
pub(crate) async fn run_captured(mut cmd: Command, description: &str) -> Result<String> {
    tracing::debug!("running: {}", description);
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::Command { command: description.to_string(), output: e.to_string() })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(Error::Command {
            command: description.to_string(),
            output: if combined.trim().is_empty() { output.status.to_string() } else { combined },
        });
    }
    Ok(combined)
}

/// Quote `s` as a single POSIX shell word.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}


#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        Device::parse("emulator-5554 device product:sdk model:Pixel_7 transport_id:3")
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("ps"), "'ps'");
        assert_eq!(shell_quote("echo 'hi'"), r"'echo '\''hi'\'''");
    }

    #[test]
    fn test_log_command_targets_transport_and_pid() {
        let adb = Adb::new(&device(), "com.example.app");
        let cmd = adb.log_command("1234");
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "adb");
        let args: Vec<_> = std_cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(args, vec!["-t", "3", "logcat", "--pid=1234"]);
    }

    #[tokio::test]
    async fn test_run_captured_combines_streams() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2"]);
        let output = run_captured(cmd, "sh").await.unwrap();
        assert_eq!(output, "out\nerr\n");
    }

    #[tokio::test]
    async fn test_run_captured_nonzero_exit_is_command_error() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo 'run-as: package not debuggable' >&2; exit 1"]);
        let err = run_captured(cmd, "adb shell run-as").await.unwrap_err();
        match err {
            Error::Command { command, output } => {
                assert_eq!(command, "adb shell run-as");
                assert!(output.contains("not debuggable"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_command_error() {
        let adb = Adb::new(&device(), "com.example.app").with_program("/nonexistent/adb");
        let err = adb.command(&["devices"]).await.unwrap_err();
        assert!(matches!(err, Error::Command { .. }));
    }
}
