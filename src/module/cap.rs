use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::{
    config::{CapConfig, ModuleConfig, Panel},
    module::{Module, ModuleStatus},
    packet::PacketNode,
    packet_queue::PacketQueue,
};

/// Hard limit of the cap buffer. Eligible packets beyond it are dropped for good.
pub const CAP_KEEP_AT_MOST: usize = 5000;

const BYTES_PER_MBIT: f64 = 1024.0 * 1024.0 / 8.0;

// ==========================================
// 按真实流逝时间计算字节预算的限速器
// ==========================================
pub struct CapEngine<T> {
    config: Arc<CapConfig>,
    buffer: PacketQueue<T>,
    hard_limit: usize,
    // 只有真正放行了包才会往前推
    last_tick: Instant,

    overflow: u64,
    pending_dropped: Vec<PacketNode<T>>,

    // 每秒打印一次实际速度
    report_start: Instant,
    report_bytes: usize,
}

impl<T> CapEngine<T> {
    pub fn new(config: Arc<CapConfig>) -> Self {
        Self::with_limit(config, CAP_KEEP_AT_MOST)
    }

    pub fn with_limit(config: Arc<CapConfig>, hard_limit: usize) -> Self {
        let now = Instant::now();
        Self {
            config,
            buffer: PacketQueue::with_capacity(hard_limit),
            hard_limit,
            last_tick: now,
            overflow: 0,
            pending_dropped: Vec::new(),
            report_start: now,
            report_bytes: 0,
        }
    }

    /// Bytes that may leave at `rate_mbps` over `elapsed`.
    pub fn budget(elapsed: Duration, rate_mbps: f64) -> usize {
        (elapsed.as_secs_f64() * rate_mbps * BYTES_PER_MBIT) as usize
    }

    fn report_speed(&mut self, now: Instant, rate_mbps: f64) {
        let elapsed = now.saturating_duration_since(self.report_start);
        if elapsed < Duration::from_secs(1) {
            return;
        }
        let speed = self.report_bytes as f64 / BYTES_PER_MBIT / elapsed.as_secs_f64();
        info!(
            "Max Speed {:.2} Mb/s Process Speed {:.2} Mb/s, {} packets buffered",
            rate_mbps,
            speed,
            self.buffer.len()
        );
        self.report_bytes = 0;
        self.report_start = now;
    }
}

impl<T> Module<T> for CapEngine<T> {
    fn name(&self) -> &'static str {
        "Cap"
    }

    fn key(&self) -> &'static str {
        self.config.key()
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled.get()
    }

    fn panel(&self) -> Panel<'_> {
        self.config.panel()
    }

    fn start(&mut self, now: Instant) {
        // 上一次 close 被跳过了，这是 bug
        assert!(
            self.buffer.is_empty(),
            "cap started with {} packets still buffered",
            self.buffer.len()
        );
        self.last_tick = now;
        self.report_start = now;
        self.report_bytes = 0;
        debug!(rate_mbps = self.config.rate_mbps(), "cap enabled");
    }

    fn process(&mut self, live: &mut PacketQueue<T>, now: Instant) -> bool {
        let inbound = self.config.inbound.get();
        let outbound = self.config.outbound.get();
        let rate_mbps = self.config.rate_mbps();
        let mut budget = Self::budget(now.saturating_duration_since(self.last_tick), rate_mbps);

        self.report_speed(now, rate_mbps);

        // 1. 把合格的包按原顺序收进缓冲，装满之后剩下的直接丢
        let mut buffered = 0;
        let mut dropped = 0;
        let mut cursor = live.front();
        while let Some(id) = cursor {
            cursor = live.next(id);
            if !live.get(id).direction().passes(inbound, outbound) {
                continue;
            }
            let node = live.detach(id);
            if self.buffer.len() < self.hard_limit {
                self.buffer.push_back(node);
                buffered += 1;
            } else {
                self.pending_dropped.push(node);
                dropped += 1;
            }
        }
        if dropped > 0 {
            self.overflow += 1;
            warn!("hitting cap max, dropping {} packets", dropped);
        }
        if buffered > 0 {
            debug!("capping {} packets", buffered);
        }

        // 2. 从最老的开始放，放不下就停，不跳着挑小包
        let mut released = 0;
        while let Some(id) = self.buffer.front() {
            let len = self.buffer.get(id).len();
            if len > budget {
                break;
            }
            let node = self.buffer.detach(id);
            live.push_back(node);
            if released == 0 {
                self.last_tick = now;
            }
            budget -= len;
            released += 1;
            self.report_bytes += len;
        }

        buffered > 0 || released > 0 || dropped > 0
    }

    fn close(&mut self, live: &mut PacketQueue<T>) {
        let flushed = live.append(&mut self.buffer);
        debug!("cap disabled, sent all {} buffered packets", flushed);
    }

    fn status(&self) -> ModuleStatus {
        ModuleStatus {
            buffered: self.buffer.len(),
            overflow: self.overflow,
        }
    }

    fn collect_dropped(&mut self) -> Vec<PacketNode<T>> {
        std::mem::take(&mut self.pending_dropped)
    }
}
