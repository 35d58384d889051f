use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::{SeedableRng, rngs::StdRng};

use nfq_impair::{
    Direction, Lifecycle, PacketNode, PacketQueue, Pipeline,
    config::{CapConfig, ConfigRegistry, DropConfig, JitterConfig},
    module::{CapEngine, DropEngine, JitterEngine},
};

struct Rig {
    registry: ConfigRegistry,
    drop: Arc<DropConfig>,
    jitter: Arc<JitterConfig>,
    cap: Arc<CapConfig>,
    pipeline: Pipeline<Vec<u8>>,
}

fn rig() -> Rig {
    let drop = Arc::new(DropConfig::default());
    let jitter = Arc::new(JitterConfig::default());
    let cap = Arc::new(CapConfig::default());

    let mut registry = ConfigRegistry::new();
    registry.register(drop.clone());
    registry.register(jitter.clone());
    registry.register(cap.clone());

    let mut pipeline = Pipeline::new();
    pipeline
        .register(Box::new(DropEngine::with_rng(
            drop.clone(),
            StdRng::seed_from_u64(11),
        )))
        .unwrap();
    pipeline
        .register(Box::new(JitterEngine::with_rng(
            jitter.clone(),
            StdRng::seed_from_u64(12),
        )))
        .unwrap();
    pipeline.register(Box::new(CapEngine::new(cap.clone()))).unwrap();

    Rig {
        registry,
        drop,
        jitter,
        cap,
        pipeline,
    }
}

fn packet(tag: u16, len: usize, direction: Direction) -> PacketNode<Vec<u8>> {
    let mut payload = vec![0u8; len.max(2)];
    payload[..2].copy_from_slice(&tag.to_be_bytes());
    PacketNode::new(payload, direction, len)
}

fn tag(node: &PacketNode<Vec<u8>>) -> u16 {
    u16::from_be_bytes([node.payload[0], node.payload[1]])
}

#[test]
fn inbound_only_full_drop() {
    let mut rig = rig();
    rig.registry.apply("drop", "on").unwrap();
    rig.registry.apply("drop-random", "off").unwrap();
    rig.registry.apply("drop-chance", "100").unwrap();
    rig.registry.apply("drop-outbound", "off").unwrap();

    let mut live = PacketQueue::new();
    for t in 0..5 {
        live.push_back(packet(t, 100, Direction::Inbound));
        live.push_back(packet(100 + t, 100, Direction::Outbound));
    }

    assert!(rig.pipeline.tick(&mut live, Instant::now()));

    assert_eq!(live.len(), 5);
    assert!(live.iter().all(|n| n.direction() == Direction::Outbound));
    let dropped = rig.pipeline.collect_dropped();
    assert_eq!(dropped.len(), 5);
    assert!(dropped.iter().all(|n| n.direction() == Direction::Inbound));
    live.check_integrity();
}

#[test]
fn cap_holds_first_packet_with_zero_elapsed_time() {
    let mut rig = rig();
    rig.registry.apply("cap", "on").unwrap();
    rig.registry.apply("cap-kps", "1.0").unwrap();

    let t0 = Instant::now();
    let mut live = PacketQueue::new();
    live.push_back(packet(1, 1500, Direction::Outbound));
    rig.pipeline.tick(&mut live, t0);

    assert!(live.is_empty());
    assert_eq!(rig.pipeline.backlog(), 1);

    // 1Mb/s = 131072 B/s，12ms 之后 1500 字节放得下
    rig.pipeline.tick(&mut live, t0 + Duration::from_millis(12));
    assert_eq!(live.len(), 1);
    assert_eq!(rig.pipeline.backlog(), 0);
}

#[test]
fn disabling_flushes_every_buffered_packet() {
    let mut rig = rig();
    rig.registry.apply("jitter", "on").unwrap();
    rig.registry.apply("jitter-time", "3000").unwrap();
    rig.registry.apply("cap", "on").unwrap();
    rig.registry.apply("cap-kps", "0.1").unwrap();

    let t0 = Instant::now();
    let mut live = PacketQueue::new();
    for t in 0..300 {
        live.push_back(packet(t, 1200, Direction::Inbound));
    }
    rig.pipeline.tick(&mut live, t0);
    let sent_early = live.len();
    let held = rig.pipeline.backlog();
    assert_eq!(sent_early + held, 300);
    assert!(held > 0);

    let mut live = PacketQueue::new();
    rig.jitter.enabled.set(false);
    rig.cap.enabled.set(false);
    rig.pipeline.tick(&mut live, t0 + Duration::from_millis(1));

    assert_eq!(live.len(), held);
    assert_eq!(rig.pipeline.backlog(), 0);
    assert!(
        rig.pipeline
            .stages()
            .iter()
            .all(|stage| stage.state == Lifecycle::Disabled)
    );
    live.check_integrity();
}

#[test]
fn every_packet_is_sent_held_or_dropped() {
    let mut rig = rig();
    rig.registry.apply("drop", "on").unwrap();
    rig.registry.apply("drop-chance", "25").unwrap();
    rig.registry.apply("jitter", "on").unwrap();
    rig.registry.apply("jitter-time", "40").unwrap();
    rig.registry.apply("cap", "on").unwrap();
    rig.registry.apply("cap-kps", "4.0").unwrap();
    rig.registry.apply("cap-inbound", "off").unwrap();

    let t0 = Instant::now();
    let mut sent = Vec::new();
    let mut dropped = 0;
    let mut next_tag = 0u16;
    for tick in 0..200u64 {
        let mut live = PacketQueue::new();
        for _ in 0..10 {
            let direction = if next_tag % 2 == 0 {
                Direction::Inbound
            } else {
                Direction::Outbound
            };
            live.push_back(packet(next_tag, 500, direction));
            next_tag += 1;
        }
        rig.pipeline.tick(&mut live, t0 + Duration::from_millis(tick));
        live.check_integrity();
        dropped += rig.pipeline.collect_dropped().len();
        sent.extend(live.iter().map(tag));
    }

    let mut live = PacketQueue::new();
    rig.pipeline.shutdown(&mut live);
    sent.extend(live.iter().map(tag));
    dropped += rig.pipeline.collect_dropped().len();

    assert_eq!(rig.pipeline.backlog(), 0);
    assert_eq!(sent.len() + dropped, 2000);

    // 没有重复
    let mut unique = sent.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), sent.len());
}

#[test]
fn config_changes_apply_on_the_next_tick() {
    let mut rig = rig();
    rig.registry.apply("drop", "on").unwrap();
    rig.registry.apply("drop-chance", "0").unwrap();

    let now = Instant::now();
    let mut live = PacketQueue::new();
    live.push_back(packet(1, 64, Direction::Inbound));
    assert!(!rig.pipeline.tick(&mut live, now));
    assert_eq!(live.len(), 1);

    // 超出范围的值被拒绝，旧值保留
    assert!(rig.registry.apply("drop-chance", "150").is_err());
    assert_eq!(rig.drop.chance.raw(), 0);

    rig.registry.apply("drop-chance", "100").unwrap();
    assert!(rig.pipeline.tick(&mut live, now));
    assert!(live.is_empty());
}
