use std::time::Instant;

use tracing::{debug, info};

use crate::{
    error::Error,
    module::{Module, ModuleStatus},
    packet::PacketNode,
    packet_queue::PacketQueue,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Disabled,
    Starting,
    Running,
    Closing,
}

impl Lifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::Disabled => "disabled",
            Lifecycle::Starting => "starting",
            Lifecycle::Running => "running",
            Lifecycle::Closing => "closing",
        }
    }
}

struct Stage<T> {
    module: Box<dyn Module<T>>,
    state: Lifecycle,
    // 上一个 tick 有没有干活，给监控看的
    active: bool,
}

/// Snapshot of one registered module, in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub name: &'static str,
    pub key: &'static str,
    pub state: Lifecycle,
    pub active: bool,
    pub status: ModuleStatus,
}

// ==========================================
// 每个 tick 按注册顺序把 live 列表依次交给各模块
// ==========================================
pub struct Pipeline<T> {
    stages: Vec<Stage<T>>,
    pending_dropped: Vec<PacketNode<T>>,
}

impl<T> Default for Pipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pipeline<T> {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            pending_dropped: Vec::new(),
        }
    }

    pub fn register(&mut self, module: Box<dyn Module<T>>) -> Result<(), Error> {
        let key = module.key();
        if self.stages.iter().any(|stage| stage.module.key() == key) {
            return Err(Error::DuplicateModule(key));
        }
        debug!(module = module.name(), key, "registered");
        self.stages.push(Stage {
            module,
            state: Lifecycle::Disabled,
            active: false,
        });
        Ok(())
    }

    /// Runs one tick over `live`. Returns whether any module did work.
    pub fn tick(&mut self, live: &mut PacketQueue<T>, now: Instant) -> bool {
        let mut working = false;

        for stage in &mut self.stages {
            let enabled = stage.module.is_enabled();

            match (stage.state, enabled) {
                (Lifecycle::Disabled, true) => {
                    stage.state = Lifecycle::Starting;
                    stage.module.start(now);
                    stage.state = Lifecycle::Running;
                    info!("{} enabled", stage.module.name());
                }
                (Lifecycle::Running, false) => {
                    Self::close_stage(stage, live);
                    self.pending_dropped.extend(stage.module.collect_dropped());
                    continue;
                }
                (Lifecycle::Disabled, false) => continue,
                _ => {}
            }

            stage.active = stage.module.process(live, now);
            working |= stage.active;
            self.pending_dropped.extend(stage.module.collect_dropped());

            #[cfg(debug_assertions)]
            live.check_integrity();
        }

        working
    }

    /// Closes every running module, flushing their buffers into `live`.
    pub fn shutdown(&mut self, live: &mut PacketQueue<T>) {
        for stage in &mut self.stages {
            if stage.state == Lifecycle::Running {
                Self::close_stage(stage, live);
                self.pending_dropped.extend(stage.module.collect_dropped());
            }
        }
    }

    // ✅ 倒垃圾口
    pub fn collect_dropped(&mut self) -> Vec<PacketNode<T>> {
        std::mem::take(&mut self.pending_dropped)
    }

    pub fn stages(&self) -> Vec<StageReport> {
        self.stages
            .iter()
            .map(|stage| StageReport {
                name: stage.module.name(),
                key: stage.module.key(),
                state: stage.state,
                active: stage.active,
                status: stage.module.status(),
            })
            .collect()
    }

    /// Packets held back inside module buffers.
    pub fn backlog(&self) -> usize {
        self.stages
            .iter()
            .map(|stage| stage.module.status().buffered)
            .sum()
    }

    fn close_stage(stage: &mut Stage<T>, live: &mut PacketQueue<T>) {
        stage.state = Lifecycle::Closing;
        stage.module.close(live);
        let left = stage.module.status().buffered;
        assert_eq!(
            left,
            0,
            "{} still holds {} packets after close",
            stage.module.name(),
            left
        );
        stage.state = Lifecycle::Disabled;
        stage.active = false;
        info!("{} disabled", stage.module.name());
    }
}
