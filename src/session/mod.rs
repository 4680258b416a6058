//! Debug session orchestration: launch, locate, install, forward, handshake,
//! then race the debug server against the log stream.

pub mod forward;
pub mod installer;
pub mod locator;
pub mod logcat;
pub mod server;
pub mod symbols;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::oneshot;

use crate::adb::{Device, RemoteShell};
use crate::config::Settings;
use crate::error::ServerStage;
use crate::jdwp::JdwpClient;
use crate::{Error, Result};

pub use forward::{ForwardMapping, PortForwardManager, RemoteEndpoint};
pub use locator::ProcessLocator;
pub use logcat::{LogSink, LogStreamer};
pub use server::RemoteDebugServerRunner;
pub use symbols::SymbolsConfig;

const DEBUG_SERVER_PROCESS: &str = "lldb-server";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Launching,
    Locating,
    Installing,
    CollectingSymbols,
    Forwarding,
    Handshaking,
    ServerStarting,
    Resuming,
    LogStreaming,
    Closing,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Launching => "launching application",
            SessionState::Locating => "locating process",
            SessionState::Installing => "installing debug server",
            SessionState::CollectingSymbols => "collecting debug binaries",
            SessionState::Forwarding => "setting up port forwards",
            SessionState::Handshaking => "connecting to the Java debugger",
            SessionState::ServerStarting => "starting debug server",
            SessionState::Resuming => "resuming the VM",
            SessionState::LogStreaming => "streaming logs",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one session needs, passed explicitly to each phase.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub device: Device,
    pub package: String,
    /// Fully qualified activity to (re)start; `None` attaches to a running app.
    pub launch_activity: Option<String>,
    /// Host path of the debug server built for the device architecture.
    pub debug_server: PathBuf,
    pub debugger_port: u16,
    pub jdwp_host: String,
    pub jdwp_port: u16,
    pub locate_timeout: Duration,
    pub poll_interval: Duration,
    pub jdwp_timeout: Duration,
    pub symbols: Option<SymbolsConfig>,
}

impl SessionContext {
    pub fn new(device: Device, package: impl Into<String>, debug_server: impl Into<PathBuf>) -> Self {
        Self {
            device,
            package: package.into(),
            launch_activity: None,
            debug_server: debug_server.into(),
            debugger_port: 0,
            jdwp_host: "127.0.0.1".to_string(),
            jdwp_port: 0,
            locate_timeout: locator::DEFAULT_TIMEOUT,
            poll_interval: locator::DEFAULT_POLL_INTERVAL,
            jdwp_timeout: crate::jdwp::DEFAULT_TIMEOUT,
            symbols: None,
        }
        .with_settings(&Settings::default())
    }

    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.debugger_port = settings.debugger_port;
        self.jdwp_port = settings.jdwp_port;
        self.locate_timeout = settings.locate_timeout();
        self.poll_interval = settings.locate_poll_interval();
        self.jdwp_timeout = settings.jdwp_timeout();
        self
    }

    pub fn launching(mut self, activity: impl Into<String>) -> Self {
        self.launch_activity = Some(activity.into());
        self
    }

    pub fn with_symbols(mut self, symbols: SymbolsConfig) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn package_home(&self) -> String {
        format!("/data/data/{}", self.package)
    }

    pub fn server_dir(&self) -> String {
        format!("{}/lldb/bin", self.package_home())
    }

    pub fn log_dir(&self) -> String {
        format!("{}/lldb/log", self.package_home())
    }

    /// Abstract socket name the debug server listens on.
    pub fn socket_name(&self) -> String {
        format!("/{}/debug.sock", self.package)
    }
}

/// How a session ended. Exactly one of these terminates every session.
#[derive(Debug)]
pub enum SessionOutcome {
    /// The debug server command returned, cleanly or not.
    DebugServerExited(Result<()>),
    LogStreamFailed(Error),
    SetupFailed { phase: SessionState, error: Error },
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::DebugServerExited(Ok(())))
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            SessionOutcome::DebugServerExited(Ok(())) => None,
            SessionOutcome::DebugServerExited(Err(e))
            | SessionOutcome::LogStreamFailed(e)
            | SessionOutcome::SetupFailed { error: e, .. } => Some(e),
        }
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::DebugServerExited(Ok(())) => f.write_str("Debug server exited, session closed"),
            SessionOutcome::DebugServerExited(Err(e)) => write!(f, "Debug server error: {e}"),
            SessionOutcome::LogStreamFailed(e) => write!(f, "Log stream error: {e}"),
            SessionOutcome::SetupFailed { phase, error } => write!(f, "Failed while {phase}: {error}"),
        }
    }
}

/// One debug session against one device and application.
pub struct DebugSession<S: RemoteShell> {
    ctx: SessionContext,
    shell: Arc<S>,
    state: SessionState,
    history: Vec<SessionState>,
    pid: Option<String>,
    forwards: PortForwardManager,
}

impl<S: RemoteShell> DebugSession<S> {
    pub fn new(ctx: SessionContext, shell: Arc<S>) -> Self {
        Self {
            ctx,
            shell,
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
            pid: None,
            forwards: PortForwardManager::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// Process ID, once located. Never re-resolved within a session.
    pub fn pid(&self) -> Option<&str> {
        self.pid.as_deref()
    }

    pub fn forwards(&self) -> &[ForwardMapping] {
        self.forwards.active()
    }

    fn enter(&mut self, state: SessionState) {
        tracing::info!("Session {} -> {}", self.state, state);
        self.state = state;
        self.history.push(state);
    }

    /// Run the session to completion, relaying application logs into `sink`.
    /// Leftover remote processes are always killed before returning.
    pub async fn run<W>(&mut self, sink: LogSink<W>) -> SessionOutcome
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut jdwp = JdwpClient::new(self.ctx.jdwp_host.clone(), self.ctx.jdwp_port)
            .with_timeout(self.ctx.jdwp_timeout);

        let outcome = match self.setup(&mut jdwp).await {
            Ok((pid, server_rx)) => {
                self.enter(SessionState::LogStreaming);
                tracing::info!("Ready for debugger on port {}", self.ctx.debugger_port);
                let log_rx = LogStreamer::start(self.shell.log_command(&pid), sink);
                wait_for_first_exit(server_rx, log_rx).await
            }
            Err(error) => SessionOutcome::SetupFailed { phase: self.state, error },
        };

        self.enter(SessionState::Closing);
        jdwp.close().await;
        terminate_remote_processes(&*self.shell, &self.ctx.package).await;
        self.enter(SessionState::Closed);
        outcome
    }

    async fn setup(&mut self, jdwp: &mut JdwpClient) -> Result<(String, oneshot::Receiver<Result<()>>)> {
        let ctx = self.ctx.clone();
        let shell = Arc::clone(&self.shell);

        if let Some(activity) = &ctx.launch_activity {
            self.enter(SessionState::Launching);
            terminate_remote_processes(&*shell, &ctx.package).await;
            start_application(&*shell, &ctx.package, activity, true).await?;
        }

        self.enter(SessionState::Locating);
        let pid = ProcessLocator::new(ctx.locate_timeout, ctx.poll_interval)
            .locate(&*shell, &ctx.package)
            .await?;
        tracing::info!("Application running with PID {}", pid);
        self.pid = Some(pid.clone());

        self.enter(SessionState::Installing);
        let server_path = installer::install(&*shell, &ctx.debug_server, &ctx.server_dir()).await?;

        if let Some(config) = &ctx.symbols {
            self.enter(SessionState::CollectingSymbols);
            symbols::collect(&*shell, &pid, config).await?;
        }

        let socket = ctx.socket_name();
        self.enter(SessionState::Forwarding);
        self.forwards
            .configure(&*shell, ctx.debugger_port, &socket, ctx.jdwp_port, &pid)
            .await?;

        self.enter(SessionState::Handshaking);
        jdwp.connect().await?;

        self.enter(SessionState::ServerStarting);
        let server_rx = RemoteDebugServerRunner::new(server_path, ctx.log_dir())
            .start(Arc::clone(&shell), &pid, &socket);

        self.enter(SessionState::Resuming);
        jdwp.resume().await?;

        Ok((pid, server_rx))
    }
}

/// First completion wins. A log stream that ends cleanly reports nothing, so
/// only its errors can end the session; the loser is left running.
async fn wait_for_first_exit(
    mut server_rx: oneshot::Receiver<Result<()>>,
    mut log_rx: oneshot::Receiver<Error>,
) -> SessionOutcome {
    tokio::select! {
        result = &mut server_rx => SessionOutcome::DebugServerExited(result.unwrap_or_else(|_| {
            Err(Error::DebugServer {
                stage: ServerStage::Run,
                reason: "runner ended without reporting".to_string(),
            })
        })),
        Ok(error) = &mut log_rx => SessionOutcome::LogStreamFailed(error),
    }
}

/// `am start-activity -S [-D] <package>/<activity>`; `-D` makes the app wait
/// for a debugger.
pub async fn start_application<S: RemoteShell>(
    shell: &S,
    package: &str,
    activity: &str,
    wait_for_debugger: bool,
) -> Result<()> {
    let component = format!("{package}/{activity}");
    let mut args = vec!["shell", "am", "start-activity", "-S"];
    if wait_for_debugger {
        args.push("-D");
    }
    args.push(&component);

    let output = shell.command(&args).await.map_err(|e| match e {
        Error::Command { output, .. } => Error::Launch(output.trim().to_string()),
        other => other,
    })?;
    // `am` reports some failures with a zero exit status.
    if output.contains("Error:") {
        return Err(Error::Launch(output.trim().to_string()));
    }
    Ok(())
}

/// Best-effort kill of the debug server and the application. Failures are
/// logged only.
pub async fn terminate_remote_processes<S: RemoteShell>(shell: &S, package: &str) {
    for target in [DEBUG_SERVER_PROCESS, package] {
        if let Err(e) = shell.run_as(&format!("killall {target}")).await {
            tracing::debug!("killall {} failed: {}", target, e);
        }
    }
}
