//! Per-operation status accounting.
//!
//! The dispatcher records every completed request here: how often each
//! operation ran, how often it failed, which statuses it produced, and a
//! bounded latency sample for percentile estimates. Snapshots are cheap and
//! the collector can dump itself through `tracing` for operators.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::protocol::Status;

/// Cap on retained latency samples per operation; past it the reservoir
/// wraps and overwrites the oldest samples.
const MAX_SAMPLES: usize = 4096;

#[derive(Debug, Default)]
struct OpRecord {
    count: u64,
    errors: u64,
    statuses: HashMap<u32, u64>,
    total_ns: u64,
    samples: Vec<u64>,
    next_sample: usize,
}

impl OpRecord {
    fn record(&mut self, status: Status, elapsed_ns: u64) {
        self.count += 1;
        if status != Status::Ok {
            self.errors += 1;
        }
        *self.statuses.entry(status.code()).or_insert(0) += 1;
        self.total_ns = self.total_ns.saturating_add(elapsed_ns);

        if self.samples.len() < MAX_SAMPLES {
            self.samples.push(elapsed_ns);
        } else {
            self.samples[self.next_sample] = elapsed_ns;
            self.next_sample = (self.next_sample + 1) % MAX_SAMPLES;
        }
    }
}

/// Latency distribution for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: usize,
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: u64,
    pub p50_ns: u64,
    pub p90_ns: u64,
    pub p99_ns: u64,
}

/// Point-in-time summary of one operation.
#[derive(Debug, Clone)]
pub struct OperationStats {
    pub op_name: String,
    pub count: u64,
    pub errors: u64,
    /// Status code -> occurrences.
    pub statuses: HashMap<u32, u64>,
    pub latency: LatencyStats,
}

/// Collects per-operation counters and latencies. Cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct OpStatsCollector {
    records: Arc<Mutex<HashMap<&'static str, OpRecord>>>,
}

impl OpStatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed request.
    pub fn record(&self, op: &'static str, status: Status, elapsed_ns: u64) {
        let mut records = self.records.lock().expect("stats collector poisoned");
        records.entry(op).or_default().record(status, elapsed_ns);
    }

    /// Snapshot all operations, busiest first.
    pub fn summary(&self) -> Vec<OperationStats> {
        let records = self.records.lock().expect("stats collector poisoned");
        let mut summary: Vec<OperationStats> = records
            .iter()
            .map(|(op, record)| OperationStats {
                op_name: (*op).to_string(),
                count: record.count,
                errors: record.errors,
                statuses: record.statuses.clone(),
                latency: compute_stats(&mut record.samples.clone(), record.total_ns, record.count),
            })
            .collect();
        summary.sort_by(|a, b| b.count.cmp(&a.count));
        summary
    }

    /// Emit the summary through tracing, one line per operation.
    pub fn log_summary(&self) {
        for op in self.summary() {
            info!(
                target: "nfs-pipe::stats",
                op = %op.op_name,
                count = op.count,
                errors = op.errors,
                p50_us = op.latency.p50_ns / 1000,
                p99_us = op.latency.p99_ns / 1000,
                max_us = op.latency.max_ns / 1000,
                "op stats"
            );
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records
            .lock()
            .expect("stats collector poisoned")
            .is_empty()
    }
}

fn compute_stats(samples: &mut [u64], total_ns: u64, count: u64) -> LatencyStats {
    if samples.is_empty() {
        return LatencyStats {
            count: 0,
            min_ns: 0,
            max_ns: 0,
            mean_ns: 0,
            p50_ns: 0,
            p90_ns: 0,
            p99_ns: 0,
        };
    }

    samples.sort_unstable();
    let n = samples.len();
    let percentile = |p: f64| -> u64 {
        let idx = ((n as f64 * p) as usize).saturating_sub(1).min(n - 1);
        samples[idx]
    };

    LatencyStats {
        count: n,
        min_ns: samples[0],
        max_ns: samples[n - 1],
        // Mean over everything ever recorded, not just the reservoir.
        mean_ns: if count > 0 { total_ns / count } else { 0 },
        p50_ns: percentile(0.50),
        p90_ns: percentile(0.90),
        p99_ns: percentile(0.99),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_collector() {
        let stats = OpStatsCollector::new();
        assert!(stats.is_empty());
        assert!(stats.summary().is_empty());
    }

    #[test]
    fn test_counts_and_statuses() {
        let stats = OpStatsCollector::new();
        stats.record("read", Status::Ok, 1_000);
        stats.record("read", Status::Ok, 3_000);
        stats.record("read", Status::NoEnt, 2_000);
        stats.record("write", Status::Ok, 10_000);

        let summary = stats.summary();
        assert_eq!(summary.len(), 2);

        // Busiest first.
        assert_eq!(summary[0].op_name, "read");
        assert_eq!(summary[0].count, 3);
        assert_eq!(summary[0].errors, 1);
        assert_eq!(summary[0].statuses[&Status::Ok.code()], 2);
        assert_eq!(summary[0].statuses[&Status::NoEnt.code()], 1);
        assert_eq!(summary[0].latency.mean_ns, 2_000);

        assert_eq!(summary[1].op_name, "write");
        assert_eq!(summary[1].errors, 0);
    }

    #[test]
    fn test_percentiles() {
        let stats = OpStatsCollector::new();
        for i in 1..=100u64 {
            stats.record("lookup", Status::Ok, i);
        }

        let summary = stats.summary();
        let latency = &summary[0].latency;
        assert_eq!(latency.min_ns, 1);
        assert_eq!(latency.max_ns, 100);
        assert_eq!(latency.p50_ns, 50);
        assert_eq!(latency.p90_ns, 90);
        assert_eq!(latency.p99_ns, 99);
    }

    #[test]
    fn test_reservoir_wraps() {
        let stats = OpStatsCollector::new();
        for i in 0..(MAX_SAMPLES as u64 + 10) {
            stats.record("getattr", Status::Ok, i);
        }

        let summary = stats.summary();
        assert_eq!(summary[0].count, MAX_SAMPLES as u64 + 10);
        assert_eq!(summary[0].latency.count, MAX_SAMPLES);
    }
}
