use chrono::Local;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::info;

use crate::packet::Direction;
use crate::pipeline::StageReport;

// ==========================================
// 1. 每个方向的统计 (每秒清零)
// ==========================================
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct DirectionStats {
    pub in_pkts: u64,
    pub drop_pkts: u64,
    pub out_pkts: u64,
    pub out_bytes: f64,
}

/// One second worth of traffic, as printed on the board.
#[derive(Debug, Clone)]
pub struct Report {
    pub elapsed: Duration,
    pub directions: Vec<(Direction, DirectionStats)>,
    pub stages: Vec<StageReport>,
    pub backlog: usize,
}

impl Report {
    pub fn mbps(stats: &DirectionStats, elapsed: Duration) -> f64 {
        (stats.out_bytes * 8.0) / 1_000_000.0 / elapsed.as_secs_f64()
    }
}

// ==========================================
// 2. 监控面板
// ==========================================
pub struct Monitor {
    name: String,
    stats: HashMap<Direction, DirectionStats>,
    last_report: Instant,
    interval: Duration,
}

impl Monitor {
    pub fn new(name: &str, now: Instant) -> Self {
        Self {
            name: name.to_string(),
            stats: HashMap::new(),
            last_report: now,
            interval: Duration::from_secs(1),
        }
    }

    pub fn record_in(&mut self, direction: Direction) {
        self.stats.entry(direction).or_default().in_pkts += 1;
    }

    pub fn record_out(&mut self, direction: Direction, len: usize) {
        let stat = self.stats.entry(direction).or_default();
        stat.out_pkts += 1;
        stat.out_bytes += len as f64;
    }

    pub fn record_drop(&mut self, direction: Direction) {
        self.stats.entry(direction).or_default().drop_pkts += 1;
    }

    /// Logs and returns a report once per interval, then resets the per-second counters.
    pub fn check_and_report(&mut self, now: Instant, stages: Vec<StageReport>) -> Option<Report> {
        let elapsed = now.saturating_duration_since(self.last_report);
        if elapsed < self.interval {
            return None;
        }

        let mut directions: Vec<_> = self
            .stats
            .iter_mut()
            .map(|(direction, stat)| (*direction, std::mem::take(stat)))
            .collect();
        directions.sort_unstable_by_key(|(direction, _)| direction.as_str());

        let backlog = stages.iter().map(|stage| stage.status.buffered).sum();
        let report = Report {
            elapsed,
            directions,
            stages,
            backlog,
        };
        self.print(&report);
        self.last_report = now;
        Some(report)
    }

    fn print(&self, report: &Report) {
        let now_str = Local::now().format("%H:%M:%S").to_string();

        info!("📊 [{}] 监控面板: {}", now_str, self.name);
        info!(
            "{:<9} | {:<10} | {:<10} | {:<10} | {:<10}",
            "Direction", "入队(包/s)", "丢弃(包/s)", "出队(包/s)", "速度(Mbps)"
        );

        let mut total = DirectionStats::default();
        for (direction, stat) in &report.directions {
            info!(
                "{:<9} | {:<10} | {:<10} | {:<10} | {:<10.2}",
                direction.as_str(),
                stat.in_pkts,
                stat.drop_pkts,
                stat.out_pkts,
                Report::mbps(stat, report.elapsed)
            );
            total.in_pkts += stat.in_pkts;
            total.drop_pkts += stat.drop_pkts;
            total.out_pkts += stat.out_pkts;
            total.out_bytes += stat.out_bytes;
        }
        info!(
            "{:<9} | {:<10} | {:<10} | {:<10} | {:<10.2} | {} 包积压",
            "TOTAL",
            total.in_pkts,
            total.drop_pkts,
            total.out_pkts,
            Report::mbps(&total, report.elapsed),
            report.backlog
        );

        for stage in &report.stages {
            info!(
                "  {:<8} {:<9} active={:<5} buffered={:<6} overflow={}",
                stage.name,
                stage.state.as_str(),
                stage.active,
                stage.status.buffered,
                stage.status.overflow
            );
        }
    }
}
