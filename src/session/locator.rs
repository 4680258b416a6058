use std::time::Duration;
use tokio::time::Instant;

use crate::adb::RemoteShell;
use crate::{Error, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polls the device process table until the application's PID shows up.
#[derive(Debug, Clone, Copy)]
pub struct ProcessLocator {
    timeout: Duration,
    poll_interval: Duration,
}

impl Default for ProcessLocator {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

impl ProcessLocator {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self { timeout, poll_interval }
    }

    /// Query failures are returned immediately; only "not listed yet" is retried.
    pub async fn locate<S: RemoteShell>(&self, shell: &S, package: &str) -> Result<String> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let listing = shell.run_as("ps").await?;
            if let Some(pid) = find_pid(&listing, package) {
                tracing::debug!("Found {} with PID {}", package, pid);
                return Ok(pid);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::ProcessTimeout {
                    package: package.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

/// PID column of the process-table line for `package`. A line whose last
/// field is exactly the package wins over one that merely mentions it.
/// Lines without a second column never match.
pub fn find_pid(listing: &str, package: &str) -> Option<String> {
    let pid_of = |line: &str| line.split_whitespace().nth(1).map(str::to_string);

    let candidates = || listing.lines().filter(move |line| line.contains(package));
    candidates()
        .filter(|line| line.split_whitespace().last() == Some(package))
        .find_map(pid_of)
        .or_else(|| candidates().find_map(pid_of))
}
