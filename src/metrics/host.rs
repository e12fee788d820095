//! Host identity: hostname, platform, architecture, kernel release.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;

/// Operating-system identity strings
#[derive(Debug, Clone, Serialize)]
pub struct OsInfo {
    pub platform: &'static str,
    pub arch: &'static str,
    pub release: String,
}

pub fn hostname() -> Result<String> {
    let name = fs::read_to_string("/proc/sys/kernel/hostname")
        .context("Failed to read /proc/sys/kernel/hostname")?;
    Ok(name.trim().to_string())
}

pub fn os_info() -> Result<OsInfo> {
    let release = fs::read_to_string("/proc/sys/kernel/osrelease")
        .context("Failed to read /proc/sys/kernel/osrelease")?;

    Ok(OsInfo {
        platform: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        release: release.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_is_trimmed_and_non_empty() {
        let name = hostname().unwrap();
        assert!(!name.is_empty());
        assert_eq!(name, name.trim());
    }

    #[test]
    fn os_info_reports_linux() {
        let os = os_info().unwrap();
        assert_eq!(os.platform, "linux");
        assert!(!os.arch.is_empty());
        assert!(!os.release.is_empty());
    }
}
