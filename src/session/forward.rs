use std::fmt;

use crate::adb::RemoteShell;
use crate::{Error, Result};

/// Device-side end of a forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEndpoint {
    /// Unix socket in the abstract namespace (the native debug server).
    AbstractSocket(String),
    /// JDWP channel of a process ID (the managed runtime).
    Jdwp(String),
}

impl RemoteEndpoint {
    pub fn spec(&self) -> String {
        match self {
            RemoteEndpoint::AbstractSocket(name) => format!("localabstract:{name}"),
            RemoteEndpoint::Jdwp(pid) => format!("jdwp:{pid}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardMapping {
    pub local_port: u16,
    pub remote: RemoteEndpoint,
}

impl ForwardMapping {
    pub fn local_spec(&self) -> String {
        format!("tcp:{}", self.local_port)
    }
}

impl fmt::Display for ForwardMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.local_spec(), self.remote.spec())
    }
}

/// Owns the device's forward table. The only transition is "remove all,
/// then add the required set"; nothing is rolled back on failure.
#[derive(Debug, Default)]
pub struct PortForwardManager {
    active: Vec<ForwardMapping>,
}

impl PortForwardManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forwards this manager has successfully added since the last clear.
    pub fn active(&self) -> &[ForwardMapping] {
        &self.active
    }

    pub async fn configure<S: RemoteShell>(
        &mut self,
        shell: &S,
        native_port: u16,
        native_socket: &str,
        managed_port: u16,
        pid: &str,
    ) -> Result<()> {
        self.clear(shell).await?;

        let required = [
            ForwardMapping {
                local_port: native_port,
                remote: RemoteEndpoint::AbstractSocket(native_socket.to_string()),
            },
            ForwardMapping {
                local_port: managed_port,
                remote: RemoteEndpoint::Jdwp(pid.to_string()),
            },
        ];
        for mapping in required {
            self.add(shell, mapping).await?;
        }
        Ok(())
    }

    async fn clear<S: RemoteShell>(&mut self, shell: &S) -> Result<()> {
        shell
            .command(&["forward", "--remove-all"])
            .await
            .map_err(|e| forward_error("--remove-all".to_string(), e))?;
        self.active.clear();
        Ok(())
    }

    async fn add<S: RemoteShell>(&mut self, shell: &S, mapping: ForwardMapping) -> Result<()> {
        let local = mapping.local_spec();
        let remote = mapping.remote.spec();
        shell
            .command(&["forward", &local, &remote])
            .await
            .map_err(|e| forward_error(mapping.to_string(), e))?;
        tracing::debug!("Forwarding {}", mapping);
        self.active.push(mapping);
        Ok(())
    }
}

fn forward_error(spec: String, err: Error) -> Error {
    let reason = match err {
        Error::Command { output, .. } => output.trim().to_string(),
        other => other.to_string(),
    };
    Error::Forward { spec, reason }
}
