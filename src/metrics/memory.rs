//! Memory totals from /proc/meminfo.

use crate::metrics::round2;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

/// Memory figures for one snapshot. The used fields are derived from the
/// totals, never read independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
    pub used_percent: f64,
}

impl MemoryInfo {
    /// Derive the used fields from raw totals.
    pub fn from_totals(total_bytes: u64, free_bytes: u64) -> Self {
        let used_bytes = total_bytes.saturating_sub(free_bytes);
        let used_percent = if total_bytes > 0 {
            round2(used_bytes as f64 / total_bytes as f64 * 100.0)
        } else {
            0.0
        };

        Self {
            total_bytes,
            free_bytes,
            used_bytes,
            used_percent,
        }
    }
}

/// Read current memory figures from /proc/meminfo
pub fn read() -> Result<MemoryInfo> {
    let meminfo =
        fs::read_to_string("/proc/meminfo").context("Failed to read /proc/meminfo")?;
    let (total, free) = parse_meminfo(&meminfo)?;
    Ok(MemoryInfo::from_totals(total, free))
}

fn parse_meminfo(content: &str) -> Result<(u64, u64)> {
    let mut total = None;
    let mut free = None;

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }

        if parts[0] != "MemTotal:" && parts[0] != "MemFree:" {
            continue;
        }

        // Values are reported in KB. A garbled value must fail the
        // collection rather than masquerade as zero bytes.
        let value: u64 = parts[1]
            .parse()
            .map(|kb: u64| kb * 1024)
            .with_context(|| format!("Unparseable {} value in /proc/meminfo", parts[0]))?;

        match parts[0] {
            "MemTotal:" => total = Some(value),
            "MemFree:" => free = Some(value),
            _ => {}
        }
    }

    match (total, free) {
        (Some(total), Some(free)) => Ok((total, free)),
        _ => anyhow::bail!("MemTotal/MemFree missing from /proc/meminfo"),
    }
}
