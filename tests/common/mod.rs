#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio::sync::oneshot;

use apkdbg::adb::{Device, RemoteShell};
use apkdbg::session::SessionContext;
use apkdbg::{Error, Result};

pub const PACKAGE: &str = "com.example.app";
pub const PID: &str = "1234";

pub const HANDSHAKE: &[u8] = b"JDWP-Handshake";
pub const RESUME_OK: [u8; 11] = [0, 0, 0, 11, 0, 0, 0, 1, 0x80, 0, 0];
pub const RESUME_FAILED: [u8; 11] = [0, 0, 0, 11, 0, 0, 0, 1, 0x80, 0, 13];

/// Scripted device: answers `ps` with a listing containing the package,
/// keeps the debug server "running" until told otherwise and tails logs
/// with a local shell script.
pub struct FakeShell {
    calls: Mutex<Vec<String>>,
    ps_output: String,
    log_script: String,
    server_exit: Mutex<Option<oneshot::Receiver<Result<String>>>>,
    failure: Option<(String, String)>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            ps_output: format!(
                "USER           PID  PPID     VSZ    RSS WCHAN            ADDR S NAME\n\
                 root             1     0   10904   2364 0                   0 S init\n\
                 u0_a120       {PID}   612 1422336 98220 0                   0 S {PACKAGE}\n"
            ),
            log_script: "sleep 10".to_string(),
            server_exit: Mutex::new(None),
            failure: None,
        }
    }

    /// The returned sender decides when and how the debug server exits.
    pub fn with_server_exit(self) -> (Self, oneshot::Sender<Result<String>>) {
        let (tx, rx) = oneshot::channel();
        *self.server_exit.lock().unwrap() = Some(rx);
        (self, tx)
    }

    pub fn with_log_script(mut self, script: &str) -> Self {
        self.log_script = script.to_string();
        self
    }

    pub fn without_process(mut self) -> Self {
        self.ps_output = "USER PID PPID VSZ RSS WCHAN ADDR S NAME\n".to_string();
        self
    }

    /// Fail every call whose recorded text starts with `prefix`.
    pub fn failing(mut self, prefix: &str, output: &str) -> Self {
        self.failure = Some((prefix.to_string(), output.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(prefix))
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call.clone());
        match &self.failure {
            Some((prefix, output)) if call.starts_with(prefix.as_str()) => Err(Error::Command {
                command: call,
                output: output.clone(),
            }),
            _ => Ok(()),
        }
    }
}

impl RemoteShell for FakeShell {
    async fn command(&self, args: &[&str]) -> Result<String> {
        self.record(args.join(" "))?;
        Ok(String::new())
    }

    async fn run_as(&self, script: &str) -> Result<String> {
        self.record(format!("run-as {script}"))?;
        if script == "ps" {
            return Ok(self.ps_output.clone());
        }
        if script.contains(" gdbserver ") {
            let exit = self.server_exit.lock().unwrap().take();
            return match exit {
                Some(rx) => rx.await.unwrap_or_else(|_| Ok(String::new())),
                None => std::future::pending().await,
            };
        }
        Ok(String::new())
    }

    async fn push(&self, local: &Path, remote: &str) -> Result<()> {
        self.record(format!("push {} {}", local.display(), remote))
    }

    async fn pull(&self, remote: &str, local: &Path) -> Result<()> {
        self.record(format!("pull {} {}", remote, local.display()))
    }

    fn log_command(&self, _pid: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&self.log_script);
        cmd
    }
}

pub fn device() -> Device {
    Device::parse("emulator-5554 device product:sdk model:Pixel_7 device:emu64 transport_id:1")
}

/// Write a stand-in debug server binary under `dir`.
pub fn debug_server(dir: &Path) -> PathBuf {
    let path = dir.join("lldb-server");
    std::fs::write(&path, b"\x7fELF").unwrap();
    path
}

/// Context pointed at a fake agent on `jdwp_port`, with short timeouts.
pub fn context(server: &Path, jdwp_port: u16) -> SessionContext {
    let mut ctx = SessionContext::new(device(), PACKAGE, server);
    ctx.jdwp_port = jdwp_port;
    ctx.locate_timeout = Duration::from_millis(300);
    ctx.poll_interval = Duration::from_millis(10);
    ctx.jdwp_timeout = Duration::from_secs(2);
    ctx
}

/// Fake JDWP agent accepting one connection. It answers the handshake with
/// `handshake_reply` and the first command with `resume_reply`, then holds
/// the connection open until the client hangs up.
pub async fn spawn_agent(handshake_reply: &'static [u8], resume_reply: [u8; 11]) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else { return };
        let mut handshake = [0u8; 14];
        if socket.read_exact(&mut handshake).await.is_err() {
            return;
        }
        if socket.write_all(handshake_reply).await.is_err() {
            return;
        }
        let mut command = [0u8; 11];
        if socket.read_exact(&mut command).await.is_err() {
            return;
        }
        if socket.write_all(&resume_reply).await.is_err() {
            return;
        }
        let mut rest = Vec::new();
        let _ = socket.read_to_end(&mut rest).await;
    });
    port
}
