use std::sync::Arc;
use tokio::sync::oneshot;

use crate::adb::RemoteShell;
use crate::error::ServerStage;
use crate::{Error, Result};

const LOG_FILE: &str = "gdbserver.log";
const LOG_CHANNELS: &str = "lldb process:gdb-remote";

/// Runs the native debug server as a background remote command.
#[derive(Debug, Clone)]
pub struct RemoteDebugServerRunner {
    server_path: String,
    log_dir: String,
}

impl RemoteDebugServerRunner {
    pub fn new(server_path: impl Into<String>, log_dir: impl Into<String>) -> Self {
        Self { server_path: server_path.into(), log_dir: log_dir.into() }
    }

    fn log_file(&self) -> String {
        format!("{}/{}", self.log_dir, LOG_FILE)
    }

    /// Create the log directory and truncate the server's log file.
    pub fn prepare_script(&self) -> String {
        format!("mkdir -p {} && cat /dev/null > {}", self.log_dir, self.log_file())
    }

    pub fn server_script(&self, pid: &str, socket: &str) -> String {
        format!(
            "{} gdbserver unix-abstract://{} --native-regs --attach {} --log-file {} --log-channels \"{}\"",
            self.server_path,
            socket,
            pid,
            self.log_file(),
            LOG_CHANNELS
        )
    }

    /// Start the server attached to `pid`, listening on `socket`.
    ///
    /// Returns immediately. The receiver resolves exactly once, when the
    /// remote command ends; during a live session any resolution means the
    /// session is over.
    pub fn start<S: RemoteShell>(
        &self,
        shell: Arc<S>,
        pid: &str,
        socket: &str,
    ) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();
        let prepare = self.prepare_script();
        let server = self.server_script(pid, socket);

        tokio::spawn(async move {
            let result = async {
                shell
                    .run_as(&prepare)
                    .await
                    .map_err(|e| stage_error(ServerStage::Prepare, e))?;
                shell
                    .run_as(&server)
                    .await
                    .map_err(|e| stage_error(ServerStage::Run, e))?;
                Ok(())
            }
            .await;

            match &result {
                Ok(()) => tracing::info!("Debug server exited"),
                Err(e) => tracing::warn!("Debug server failed: {}", e),
            }
            let _ = tx.send(result);
        });

        rx
    }
}

fn stage_error(stage: ServerStage, err: Error) -> Error {
    let reason = match err {
        Error::Command { output, .. } if !output.trim().is_empty() => output.trim().to_string(),
        other => other.to_string(),
    };
    Error::DebugServer { stage, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adb::testing::{command_failed, ScriptedShell};

    fn runner() -> RemoteDebugServerRunner {
        RemoteDebugServerRunner::new(
            "/data/data/com.example.app/lldb/bin/lldb-server",
            "/data/data/com.example.app/lldb/log",
        )
    }

    #[test]
    fn test_server_script() {
        assert_eq!(
            runner().server_script("1234", "/com.example.app/debug.sock"),
            "/data/data/com.example.app/lldb/bin/lldb-server gdbserver \
             unix-abstract:///com.example.app/debug.sock --native-regs --attach 1234 \
             --log-file /data/data/com.example.app/lldb/log/gdbserver.log \
             --log-channels \"lldb process:gdb-remote\""
        );
    }

    #[test]
    fn test_prepare_script_truncates_log() {
        assert_eq!(
            runner().prepare_script(),
            "mkdir -p /data/data/com.example.app/lldb/log && \
             cat /dev/null > /data/data/com.example.app/lldb/log/gdbserver.log"
        );
    }

    #[tokio::test]
    async fn test_clean_exit_reports_ok() {
        let shell = Arc::new(ScriptedShell::new());
        let rx = runner().start(Arc::clone(&shell), "1234", "/s");
        rx.await.unwrap().unwrap();

        let calls = shell.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("run-as mkdir -p"));
        assert!(calls[1].contains("--attach 1234"));
    }

    #[tokio::test]
    async fn test_prepare_failure_skips_server() {
        let shell = Arc::new(
            ScriptedShell::new().on("run-as mkdir", |_| Err(command_failed("Read-only file system"))),
        );
        let err = runner().start(Arc::clone(&shell), "1234", "/s").await.unwrap().unwrap_err();

        match err {
            Error::DebugServer { stage, reason } => {
                assert_eq!(stage, ServerStage::Prepare);
                assert_eq!(reason, "Read-only file system");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(shell.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_server_exit_reports_run_stage() {
        let shell = Arc::new(ScriptedShell::new().on(
            "run-as /data/data/com.example.app/lldb/bin/lldb-server",
            |_| Err(command_failed("error: failed to attach to process 1234")),
        ));
        let err = runner().start(shell, "1234", "/s").await.unwrap().unwrap_err();
        assert!(matches!(err, Error::DebugServer { stage: ServerStage::Run, .. }));
        assert!(err.to_string().contains("failed to attach"));
    }
}
