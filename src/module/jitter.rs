use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, trace, warn};

use crate::{
    config::{JitterConfig, ModuleConfig, Panel},
    module::{Module, ModuleStatus},
    packet_queue::PacketQueue,
};

pub const JITTER_KEEP_AT_MOST: usize = 2000;
/// Packets forced out when the buffer fills up.
pub const JITTER_FLUSH_WHEN_FULL: usize = 800;

pub struct JitterEngine<T, R = StdRng> {
    config: Arc<JitterConfig>,
    rng: R,
    buffer: PacketQueue<T>,
    hard_limit: usize,
    flush_batch: usize,
    overflow: u64,
}

impl<T> JitterEngine<T, StdRng> {
    pub fn new(config: Arc<JitterConfig>) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<T, R: Rng> JitterEngine<T, R> {
    pub fn with_rng(config: Arc<JitterConfig>, rng: R) -> Self {
        Self::with_limits(config, rng, JITTER_KEEP_AT_MOST, JITTER_FLUSH_WHEN_FULL)
    }

    pub fn with_limits(
        config: Arc<JitterConfig>,
        rng: R,
        hard_limit: usize,
        flush_batch: usize,
    ) -> Self {
        assert!(flush_batch > 0 && flush_batch <= hard_limit);
        Self {
            config,
            rng,
            buffer: PacketQueue::with_capacity(hard_limit),
            hard_limit,
            flush_batch,
            overflow: 0,
        }
    }

    fn draw_delay(&mut self, max_ms: u32) -> Duration {
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(u64::from(self.rng.gen_range(0..max_ms)))
    }
}

impl<T, R: Rng> Module<T> for JitterEngine<T, R> {
    fn name(&self) -> &'static str {
        "Jitter"
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

    fn start(&mut self, _now: Instant) {
        assert!(
            self.buffer.is_empty(),
            "jitter started with {} packets still buffered",
            self.buffer.len()
        );
        debug!(max_ms = self.config.time.raw(), "jitter enabled");
    }

    fn process(&mut self, live: &mut PacketQueue<T>, now: Instant) -> bool {
        let inbound = self.config.inbound.get();
        let outbound = self.config.outbound.get();
        let max_ms = self.config.time.raw();

        // 1. 收包并盖上截止时间，缓冲满了就让后面的包留在 live 里
        let mut cursor = live.front();
        while let Some(id) = cursor {
            if self.buffer.len() >= self.hard_limit {
                break;
            }
            cursor = live.next(id);
            if !live.get(id).direction().passes(inbound, outbound) {
                continue;
            }
            let delay = self.draw_delay(max_ms);
            let mut node = live.detach(id);
            node.deadline = Some(now + delay);
            trace!(delay_ms = delay.as_millis() as u64, len = node.len(), "jitter packet");
            self.buffer.push_back(node);
        }

        // 2. 到期的包按扫描顺序放回去，不按截止时间排序
        let mut cursor = self.buffer.front();
        while let Some(id) = cursor {
            cursor = self.buffer.next(id);
            let due = self
                .buffer
                .get(id)
                .deadline
                .is_none_or(|deadline| now >= deadline);
            if due {
                live.push_back(self.buffer.detach(id));
            }
        }

        // 3. 还是满的话，把最老的一批强制放走
        if self.buffer.len() >= self.hard_limit {
            let mut flushed = 0;
            while flushed < self.flush_batch {
                let Some(node) = self.buffer.pop_front() else {
                    break;
                };
                live.push_back(node);
                flushed += 1;
            }
            self.overflow += 1;
            warn!("jitter buffer full, flushed {} packets early", flushed);
        }

        !self.buffer.is_empty()
    }

    fn close(&mut self, live: &mut PacketQueue<T>) {
        let flushed = live.append(&mut self.buffer);
        debug!("jitter disabled, flushed {} packets", flushed);
    }

    fn status(&self) -> ModuleStatus {
        ModuleStatus {
            buffered: self.buffer.len(),
            overflow: self.overflow,
        }
    }
}
