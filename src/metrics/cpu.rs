//! CPU facts from /proc/stat, /proc/loadavg and /proc/cpuinfo, plus the
//! deadline-bounded utilization sampler.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;

/// Upper bound on how long a metrics request waits for the usage sampler.
pub const SAMPLE_DEADLINE: Duration = Duration::from_millis(1500);

/// Interval between the two /proc/stat readings the sampler compares.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(1000);

/// Raw CPU time counters from the aggregate line of /proc/stat
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }
}

/// Static CPU topology: logical core count plus the first core's
/// model name and clock speed when the architecture reports them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuTopology {
    pub cores: usize,
    pub model: Option<String>,
    pub speed_mhz: Option<f64>,
}

/// Load averages over 1, 5 and 15 minutes
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoadAverage {
    #[serde(rename = "1m")]
    pub one: f64,
    #[serde(rename = "5m")]
    pub five: f64,
    #[serde(rename = "15m")]
    pub fifteen: f64,
}

/// Result of one bounded usage sampling attempt. `Sampled` carries the
/// busy fraction in [0, 1]; timeouts and sampler errors both collapse to
/// `Unavailable` and never fail the request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CpuSampleOutcome {
    Sampled(f64),
    Unavailable,
}

/// Read current CPU topology from /proc/cpuinfo
pub fn topology() -> Result<CpuTopology> {
    let content =
        fs::read_to_string("/proc/cpuinfo").context("Failed to read /proc/cpuinfo")?;
    Ok(parse_cpuinfo(&content))
}

/// Read the three load-average figures from /proc/loadavg
pub fn load_average() -> Result<LoadAverage> {
    let content =
        fs::read_to_string("/proc/loadavg").context("Failed to read /proc/loadavg")?;
    parse_loadavg(&content)
}

/// Sample overall CPU utilization, never waiting longer than `deadline`.
///
/// The sampler needs two /proc/stat readings separated by its sampling
/// interval, so it is raced against a deadline timer. The spawned task is
/// not cancelled on timeout; it finishes in the background and its send
/// into the dropped channel is a no-op.
pub async fn sample_usage_bounded(deadline: Duration) -> CpuSampleOutcome {
    race_deadline(deadline, sample_usage()).await
}

/// Race `sample` against `deadline`. The oneshot sender acts as the
/// settle-once latch: whichever side loses the race finds the channel
/// already closed.
async fn race_deadline<F>(deadline: Duration, sample: F) -> CpuSampleOutcome
where
    F: Future<Output = Result<f64>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        // Late completions land in a closed channel and are discarded.
        let _ = tx.send(sample.await);
    });

    tokio::select! {
        res = rx => match res {
            Ok(Ok(fraction)) => CpuSampleOutcome::Sampled(fraction.clamp(0.0, 1.0)),
            Ok(Err(err)) => {
                tracing::warn!("cpu usage sampling failed: {err:#}");
                CpuSampleOutcome::Unavailable
            }
            // Sampler task panicked or was dropped before sending.
            Err(_) => CpuSampleOutcome::Unavailable,
        },
        _ = tokio::time::sleep(deadline) => {
            tracing::warn!(
                deadline_ms = deadline.as_millis() as u64,
                "cpu usage sampling exceeded deadline, reporting null"
            );
            CpuSampleOutcome::Unavailable
        }
    }
}

/// Busy fraction from two /proc/stat readings separated by the sampling
/// interval.
async fn sample_usage() -> Result<f64> {
    let first = read_cpu_times()?;
    tokio::time::sleep(SAMPLE_INTERVAL).await;
    let second = read_cpu_times()?;
    Ok(busy_fraction(&first, &second))
}

fn read_cpu_times() -> Result<CpuTimes> {
    let content = fs::read_to_string("/proc/stat").context("Failed to read /proc/stat")?;
    parse_stat(&content)
}

fn parse_stat(content: &str) -> Result<CpuTimes> {
    let line = content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .context("No aggregate cpu line in /proc/stat")?;
    Ok(parse_cpu_line(line))
}

fn parse_cpu_line(line: &str) -> CpuTimes {
    let parts: Vec<u64> = line
        .split_whitespace()
        .skip(1) // Skip "cpu"
        .filter_map(|s| s.parse().ok())
        .collect();

    CpuTimes {
        user: *parts.first().unwrap_or(&0),
        nice: *parts.get(1).unwrap_or(&0),
        system: *parts.get(2).unwrap_or(&0),
        idle: *parts.get(3).unwrap_or(&0),
        iowait: *parts.get(4).unwrap_or(&0),
        irq: *parts.get(5).unwrap_or(&0),
        softirq: *parts.get(6).unwrap_or(&0),
        steal: *parts.get(7).unwrap_or(&0),
    }
}

fn busy_fraction(prev: &CpuTimes, curr: &CpuTimes) -> f64 {
    let total_delta = curr.total().saturating_sub(prev.total());
    if total_delta == 0 {
        return 0.0;
    }

    let idle_delta = (curr.idle + curr.iowait).saturating_sub(prev.idle + prev.iowait);
    1.0 - (idle_delta as f64 / total_delta as f64)
}

fn parse_cpuinfo(content: &str) -> CpuTopology {
    let mut cores = 0;
    let mut model = None;
    let mut speed_mhz = None;

    for line in content.lines() {
        let mut split = line.splitn(2, ':');
        let key = split.next().unwrap_or("").trim();
        let value = split.next().map(str::trim);

        match (key, value) {
            ("processor", Some(_)) => cores += 1,
            ("model name", Some(v)) if model.is_none() => model = Some(v.to_string()),
            ("cpu MHz", Some(v)) if speed_mhz.is_none() => speed_mhz = v.parse().ok(),
            _ => {}
        }
    }

    CpuTopology {
        cores,
        model,
        speed_mhz,
    }
}

fn parse_loadavg(content: &str) -> Result<LoadAverage> {
    let parts: Vec<f64> = content
        .split_whitespace()
        .take(3)
        .filter_map(|s| s.parse().ok())
        .collect();

    if parts.len() < 3 {
        anyhow::bail!("Malformed /proc/loadavg: {:?}", content.trim());
    }

    Ok(LoadAverage {
        one: parts[0],
        five: parts[1],
        fifteen: parts[2],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn parses_aggregate_cpu_line() {
        let times = parse_cpu_line("cpu  100 5 30 800 20 1 2 3 0 0");
        assert_eq!(times.user, 100);
        assert_eq!(times.idle, 800);
        assert_eq!(times.iowait, 20);
        assert_eq!(times.steal, 3);
        assert_eq!(times.total(), 961);
    }

    #[test]
    fn stat_requires_aggregate_line() {
        assert!(parse_stat("cpu0 1 2 3 4\nctxt 5\n").is_err());
        assert!(parse_stat("cpu  1 2 3 4 5 6 7 8 0 0\ncpu0 1 2 3 4\n").is_ok());
    }

    #[test]
    fn busy_fraction_from_deltas() {
        let prev = parse_cpu_line("cpu 100 0 100 700 100 0 0 0");
        // +100 busy ticks, +100 idle+iowait ticks => 50% busy
        let curr = parse_cpu_line("cpu 150 0 150 750 150 0 0 0");
        let frac = busy_fraction(&prev, &curr);
        assert!((frac - 0.5).abs() < 1e-9);
    }

    #[test]
    fn busy_fraction_zero_when_counters_static() {
        let times = parse_cpu_line("cpu 1 2 3 4 5 6 7 8");
        assert_eq!(busy_fraction(&times, &times), 0.0);
    }

    #[test]
    fn parses_cpuinfo_topology() {
        let content = "\
processor\t: 0
model name\t: AMD EPYC 7571
cpu MHz\t\t: 2199.938

processor\t: 1
model name\t: AMD EPYC 7571
cpu MHz\t\t: 2199.938
";
        let topo = parse_cpuinfo(content);
        assert_eq!(topo.cores, 2);
        assert_eq!(topo.model.as_deref(), Some("AMD EPYC 7571"));
        assert_eq!(topo.speed_mhz, Some(2199.938));
    }

    #[test]
    fn cpuinfo_tolerates_missing_model_and_speed() {
        // RISC-V / ARM style cpuinfo without model name or cpu MHz lines
        let topo = parse_cpuinfo("processor\t: 0\nhart\t\t: 1\n\nprocessor\t: 1\nhart\t\t: 0\n");
        assert_eq!(topo.cores, 2);
        assert_eq!(topo.model, None);
        assert_eq!(topo.speed_mhz, None);
    }

    #[test]
    fn parses_loadavg() {
        let load = parse_loadavg("0.52 0.58 0.59 1/467 31337\n").unwrap();
        assert_eq!(load.one, 0.52);
        assert_eq!(load.five, 0.58);
        assert_eq!(load.fifteen, 0.59);
        assert!(parse_loadavg("garbage").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn fast_sampler_wins_the_race() {
        let outcome = race_deadline(SAMPLE_DEADLINE, async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(0.4321)
        })
        .await;
        assert_eq!(outcome, CpuSampleOutcome::Sampled(0.4321));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_sampler_loses_at_the_deadline() {
        let before = tokio::time::Instant::now();
        let outcome = race_deadline(SAMPLE_DEADLINE, async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(1.0)
        })
        .await;
        assert_eq!(outcome, CpuSampleOutcome::Unavailable);
        // Paused clock: the race resolves at the deadline, not when the
        // stalled sampler would have finished.
        let elapsed = before.elapsed();
        assert!(elapsed >= SAMPLE_DEADLINE);
        assert!(elapsed < SAMPLE_DEADLINE + Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_sampler_is_swallowed() {
        let outcome =
            race_deadline(SAMPLE_DEADLINE, async { Err(anyhow!("tick source broken")) }).await;
        assert_eq!(outcome, CpuSampleOutcome::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn late_completion_is_a_no_op() {
        let (done_tx, done_rx) = oneshot::channel();
        let outcome = race_deadline(Duration::from_millis(10), async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = done_tx.send(());
            Ok(0.9)
        })
        .await;
        assert_eq!(outcome, CpuSampleOutcome::Unavailable);

        // The sampler still runs to completion after losing the race; its
        // result simply goes nowhere.
        done_rx.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_samples_are_clamped() {
        let outcome = race_deadline(SAMPLE_DEADLINE, async { Ok(1.7) }).await;
        assert_eq!(outcome, CpuSampleOutcome::Sampled(1.0));
    }
}
