use std::sync::Arc;
use std::time::Instant;

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, trace};

use crate::{
    config::{DROP_CHANCE_MAX, DropConfig, ModuleConfig, Panel},
    module::Module,
    packet::PacketNode,
    packet_queue::PacketQueue,
};

// 确定性模式下的统计窗口
const WINDOW: u64 = 1000;

pub struct DropEngine<T, R = StdRng> {
    config: Arc<DropConfig>,
    rng: R,

    // 确定性模式计数：seen 一直往上走，dropped_in_window 每 1000 个清零
    seen: u64,
    dropped_in_window: u64,

    pending_dropped: Vec<PacketNode<T>>,
}

impl<T> DropEngine<T, StdRng> {
    pub fn new(config: Arc<DropConfig>) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<T, R: Rng> DropEngine<T, R> {
    pub fn with_rng(config: Arc<DropConfig>, rng: R) -> Self {
        Self {
            config,
            rng,
            seen: 0,
            dropped_in_window: 0,
            pending_dropped: Vec::new(),
        }
    }

    /// Decides the fate of one eligible packet. `chance` is in basis points.
    fn should_drop(&mut self, chance: u32, random: bool) -> bool {
        if random {
            return chance >= DROP_CHANCE_MAX || self.rng.gen_range(0..DROP_CHANCE_MAX) < chance;
        }

        self.seen += 1;
        let mut drop = false;
        if self.dropped_in_window < u64::from(chance / 10) {
            self.dropped_in_window += 1;
            drop = true;
        }
        if self.seen % WINDOW == 0 {
            self.dropped_in_window = 0;
        }
        drop
    }
}

impl<T, R: Rng> Module<T> for DropEngine<T, R> {
    fn name(&self) -> &'static str {
        "Drop"
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
        self.seen = 0;
        self.dropped_in_window = 0;
        debug!("drop enabled");
    }

    fn process(&mut self, live: &mut PacketQueue<T>, _now: Instant) -> bool {
        // 每个 tick 只读一次配置，同一批包看到的是同一份值
        let inbound = self.config.inbound.get();
        let outbound = self.config.outbound.get();
        let random = self.config.random.get();
        let chance = self.config.chance.raw();

        let mut dropped = 0;
        let mut cursor = live.front();
        while let Some(id) = cursor {
            cursor = live.next(id);
            let direction = live.get(id).direction();
            if direction.passes(inbound, outbound) && self.should_drop(chance, random) {
                let node = live.detach(id);
                trace!(
                    chance = chance as f64 / 100.0,
                    direction = direction.as_str(),
                    random,
                    len = node.len(),
                    "dropped packet"
                );
                self.pending_dropped.push(node);
                dropped += 1;
            }
        }

        dropped > 0
    }

    fn close(&mut self, _live: &mut PacketQueue<T>) {
        debug!("drop disabled");
    }

    fn collect_dropped(&mut self) -> Vec<PacketNode<T>> {
        std::mem::take(&mut self.pending_dropped)
    }
}
