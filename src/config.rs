use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const MAX_TIMEOUT_MS: u64 = 120_000;

/// All configurable settings with their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub debugger_port: u16,
    pub jdwp_port: u16,
    pub locate_timeout_ms: u64,
    pub locate_poll_interval_ms: u64,
    pub jdwp_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debugger_port: 6666,
            jdwp_port: 6667,
            locate_timeout_ms: 5_000,
            locate_poll_interval_ms: 100,
            jdwp_timeout_ms: 5_000,
        }
    }
}

impl Settings {
    pub fn locate_timeout(&self) -> Duration {
        Duration::from_millis(self.locate_timeout_ms)
    }

    pub fn locate_poll_interval(&self) -> Duration {
        Duration::from_millis(self.locate_poll_interval_ms)
    }

    pub fn jdwp_timeout(&self) -> Duration {
        Duration::from_millis(self.jdwp_timeout_ms)
    }
}

/// Raw JSON representation; every field is optional.
#[derive(Debug, Deserialize, Default)]
struct SettingsFile {
    #[serde(rename = "ports.debugger")]
    debugger_port: Option<u16>,
    #[serde(rename = "ports.jdwp")]
    jdwp_port: Option<u16>,
    #[serde(rename = "locate.timeoutMs")]
    locate_timeout_ms: Option<u64>,
    #[serde(rename = "locate.pollIntervalMs")]
    locate_poll_interval_ms: Option<u64>,
    #[serde(rename = "jdwp.timeoutMs")]
    jdwp_timeout_ms: Option<u64>,
}

/// Resolve settings: defaults → user global → project-local.
pub fn resolve(project_root: Option<&Path>) -> Settings {
    let global_path = dirs::home_dir().map(|h| h.join(".apkdbg/settings.json"));
    let project_path = project_root.map(|r| r.join(".apkdbg/settings.json"));
    resolve_with_paths(global_path.as_deref(), project_path.as_deref())
}

fn resolve_with_paths(global_path: Option<&Path>, project_path: Option<&Path>) -> Settings {
    let mut settings = Settings::default();

    if let Some(path) = global_path {
        apply_file(&mut settings, path);
    }
    if let Some(path) = project_path {
        apply_file(&mut settings, path);
    }

    settings
}

fn apply_file(settings: &mut Settings, path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else { return };
    let Ok(file) = serde_json::from_str::<SettingsFile>(&content) else {
        tracing::warn!("Invalid settings file, ignoring: {}", path.display());
        return;
    };

    apply_port(&mut settings.debugger_port, file.debugger_port, "ports.debugger");
    apply_port(&mut settings.jdwp_port, file.jdwp_port, "ports.jdwp");
    apply_ms(&mut settings.locate_timeout_ms, file.locate_timeout_ms, "locate.timeoutMs", 100, MAX_TIMEOUT_MS);
    apply_ms(
        &mut settings.locate_poll_interval_ms,
        file.locate_poll_interval_ms,
        "locate.pollIntervalMs",
        10,
        5_000,
    );
    apply_ms(&mut settings.jdwp_timeout_ms, file.jdwp_timeout_ms, "jdwp.timeoutMs", 100, MAX_TIMEOUT_MS);
}

fn apply_port(slot: &mut u16, value: Option<u16>, key: &str) {
    match value {
        Some(0) => tracing::warn!("{} must be non-zero, using default", key),
        Some(v) => *slot = v,
        None => {}
    }
}

fn apply_ms(slot: &mut u64, value: Option<u64>, key: &str, min: u64, max: u64) {
    let Some(v) = value else { return };
    if (min..=max).contains(&v) {
        *slot = v;
    } else {
        tracing::warn!("{} ({}) out of range ({}..{}), using default", key, v, min, max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_no_files_exist() {
        let settings = resolve_with_paths(None, None);
        assert_eq!(settings.debugger_port, 6666);
        assert_eq!(settings.jdwp_port, 6667);
        assert_eq!(settings.locate_timeout(), Duration::from_secs(5));
        assert_eq!(settings.locate_poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_project_overrides_global() {
        let dir = tempdir().unwrap();
        let global = dir.path().join("global.json");
        let project = dir.path().join("project.json");
        std::fs::write(&global, r#"{"ports.jdwp": 7000, "locate.timeoutMs": 8000}"#).unwrap();
        std::fs::write(&project, r#"{"ports.jdwp": 7100}"#).unwrap();

        let settings = resolve_with_paths(Some(&global), Some(&project));
        assert_eq!(settings.jdwp_port, 7100); // project wins
        assert_eq!(settings.locate_timeout_ms, 8000); // global applies
        assert_eq!(settings.debugger_port, 6666);
    }

    #[test]
    fn test_invalid_json_ignored() {
        let dir = tempdir().unwrap();
        let bad_file = dir.path().join("bad.json");
        std::fs::write(&bad_file, "{ports").unwrap();

        let settings = resolve_with_paths(Some(&bad_file), None);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_missing_file_ignored() {
        let settings = resolve_with_paths(Some(Path::new("/nonexistent/settings.json")), None);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_zero_port_rejected() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("settings.json");
        std::fs::write(&file, r#"{"ports.debugger": 0, "ports.jdwp": 9001}"#).unwrap();

        let settings = resolve_with_paths(Some(&file), None);
        assert_eq!(settings.debugger_port, 6666);
        assert_eq!(settings.jdwp_port, 9001);
    }

    #[test]
    fn test_out_of_range_intervals_use_default() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("settings.json");
        std::fs::write(&file, r#"{"locate.pollIntervalMs": 1, "jdwp.timeoutMs": 999999}"#).unwrap();

        let settings = resolve_with_paths(Some(&file), None);
        assert_eq!(settings.locate_poll_interval_ms, 100);
        assert_eq!(settings.jdwp_timeout_ms, 5_000);
    }
}
