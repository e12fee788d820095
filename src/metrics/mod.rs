//! Snapshot assembly: synchronous OS facts merged with the bounded
//! asynchronous CPU usage sample into one response payload.

pub mod cpu;
pub mod host;
pub mod memory;
pub mod network;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

pub use cpu::{CpuSampleOutcome, CpuTopology, LoadAverage};
pub use host::OsInfo;
pub use memory::MemoryInfo;
pub use network::InterfaceAddress;

/// Constant identifier reported in every snapshot
pub const SERVER_NAME: &str = "hostmon";

/// One point-in-time measurement set, built fresh per request
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub server: &'static str,
    pub hostname: String,
    pub os: OsInfo,
    pub cpu: CpuReport,
    pub memory: MemoryInfo,
    pub network: NetworkReport,
    pub timestamp: DateTime<Utc>,
}

/// CPU section of the snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuReport {
    pub cores: usize,
    pub model: Option<String>,
    #[serde(rename = "speedMHz")]
    pub speed_mhz: Option<f64>,
    pub usage_percent: Option<f64>,
    pub load_average: LoadAverage,
}

/// Network section: the interface address map, passed through as
/// enumerated.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkReport {
    pub interfaces: BTreeMap<String, Vec<InterfaceAddress>>,
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Collect one snapshot.
///
/// Synchronous OS facts are gathered first; any failure among them aborts
/// the whole collection. Only then does the bounded usage race start, so
/// total latency is the OS-call time plus at most the sampler deadline.
/// A timed-out or failed sample degrades to `usagePercent: null` rather
/// than failing the request.
pub async fn collect() -> Result<MetricsSnapshot> {
    let hostname = host::hostname()?;
    let os = host::os_info()?;
    let topology = cpu::topology()?;
    let load_average = cpu::load_average()?;
    let memory = memory::read()?;
    let interfaces = network::interface_addresses()?;

    let usage_percent = match cpu::sample_usage_bounded(cpu::SAMPLE_DEADLINE).await {
        CpuSampleOutcome::Sampled(fraction) => Some(round2(fraction * 100.0)),
        CpuSampleOutcome::Unavailable => None,
    };

    Ok(MetricsSnapshot {
        server: SERVER_NAME,
        hostname,
        os,
        cpu: CpuReport {
            cores: topology.cores,
            model: topology.model,
            speed_mhz: topology.speed_mhz,
            usage_percent,
            load_average,
        },
        memory,
        network: NetworkReport { interfaces },
        timestamp: Utc::now(),
    })
}
