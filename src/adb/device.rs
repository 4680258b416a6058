use std::sync::LazyLock;
use tokio::process::Command;

use crate::{Error, Result};

static FIELD_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(\w+):(\S+)").expect("Invalid device field regex pattern")
});

/// A connected device as reported by `adb devices -l`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub serial: String,
    /// Addresses the device on every later adb call (`adb -t <id>`).
    pub transport_id: String,
    pub model: String,
    /// CPU architecture (`uname -m`); empty until queried with `Adb::arch`.
    pub arch: String,
    /// The raw listing line; device selection matches against it.
    pub line: String,
}

impl Device {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        Self {
            serial: line.split_whitespace().next().unwrap_or_default().to_string(),
            transport_id: field(line, "transport_id"),
            model: field(line, "model"),
            arch: String::new(),
            line: line.to_string(),
        }
    }
}

fn field(line: &str, name: &str) -> String {
    FIELD_RE
        .captures_iter(line)
        .find(|cap| &cap[1] == name)
        .map(|cap| cap[2].to_string())
        .unwrap_or_default()
}

/// Parse `adb devices -l` output, skipping the header line.
pub fn parse_devices(output: &str) -> Vec<Device> {
    output
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Device::parse)
        .collect()
}

pub async fn list_devices() -> Result<Vec<Device>> {
    let mut cmd = Command::new("adb");
    cmd.args(["devices", "-l"]);
    let output = super::run_captured(cmd, "adb devices -l").await?;
    Ok(parse_devices(&output))
}

/// Pick the first device, or the first whose listing starts with `prefix`.
pub fn select_device(devices: Vec<Device>, prefix: Option<&str>) -> Result<Device> {
    let none_found = || Error::DeviceNotFound("No device or emulator found".to_string());
    match prefix.filter(|p| !p.is_empty()) {
        None => {
            tracing::info!("No device specified, using first found device");
            devices.into_iter().next().ok_or_else(none_found)
        }
        Some(_) if devices.is_empty() => Err(none_found()),
        Some(prefix) => devices
            .into_iter()
            .find(|d| d.line.starts_with(prefix))
            .ok_or_else(|| Error::DeviceNotFound(format!("Specified device '{prefix}' not found"))),
    }
}
