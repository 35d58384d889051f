use std::time::Instant;

use crate::{config::Panel, packet::PacketNode, packet_queue::PacketQueue};

mod cap;
mod drop;
mod jitter;

pub use cap::{CAP_KEEP_AT_MOST, CapEngine};
pub use drop::DropEngine;
pub use jitter::{JITTER_FLUSH_WHEN_FULL, JITTER_KEEP_AT_MOST, JitterEngine};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleStatus {
    /// 模块内部缓冲里的包数
    pub buffered: usize,
    /// 触发过多少次溢出保护 (cap 丢包 / jitter 强制放行)
    pub overflow: u64,
}

/// One impairment stage of the shaping pipeline.
///
/// The pipeline calls `start` when the module becomes enabled, `process` once per tick
/// while it stays enabled and `close` once it is disabled. `process` and `close` get the
/// shared live list: whatever is left in it at the end of the tick gets sent.
pub trait Module<T> {
    fn name(&self) -> &'static str;

    /// Stable key, also the prefix of every configuration option of the module.
    fn key(&self) -> &'static str;

    fn is_enabled(&self) -> bool;

    fn panel(&self) -> Panel<'_>;

    fn start(&mut self, now: Instant);

    /// Returns whether the module did anything visible this tick.
    fn process(&mut self, live: &mut PacketQueue<T>, now: Instant) -> bool;

    /// Must leave every internal buffer empty, with the packets moved into `live`.
    fn close(&mut self, live: &mut PacketQueue<T>);

    fn status(&self) -> ModuleStatus {
        ModuleStatus::default()
    }

    // ✅ 倒垃圾口：被永久丢弃的包交给调用方去下 Drop verdict
    fn collect_dropped(&mut self) -> Vec<PacketNode<T>> {
        Vec::new()
    }
}
