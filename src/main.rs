use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nfq_impair::{
    Error, PacketQueue, Pipeline,
    capture::NfqCapture,
    cli::Args,
    config::{CapConfig, ConfigRegistry, DropConfig, JitterConfig},
    console,
    module::{CapEngine, DropEngine, JitterEngine},
    monitor::Monitor,
    nfq_message::NfqMessage,
};

fn main() -> Result<(), Error> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    // 1. 配置：CLI 先写一遍，之后由控制台线程异步改
    let drop_config = Arc::new(DropConfig::default());
    let jitter_config = Arc::new(JitterConfig::default());
    let cap_config = Arc::new(CapConfig::default());

    let mut registry = ConfigRegistry::new();
    registry.register(drop_config.clone());
    registry.register(jitter_config.clone());
    registry.register(cap_config.clone());
    args.apply(&registry)?;

    // 2. 固定顺序：先丢包，再抖动，最后限速
    let mut pipeline: Pipeline<NfqMessage> = Pipeline::new();
    pipeline.register(Box::new(DropEngine::new(drop_config)))?;
    pipeline.register(Box::new(JitterEngine::new(jitter_config)))?;
    pipeline.register(Box::new(CapEngine::new(cap_config)))?;

    let mut capture = NfqCapture::open(&args.inbound_queues, &args.outbound_queues)?;
    info!(
        inbound = ?args.inbound_queues,
        outbound = ?args.outbound_queues,
        "capturing"
    );

    let running = Arc::new(AtomicBool::new(true));
    if args.no_console {
        console::show(&registry);
    } else {
        console::spawn(registry.clone(), running.clone())?;
        console::execute(&registry, "help")?;
    }

    let mut monitor = Monitor::new("ImpairPipeline", Instant::now());
    let mut live: PacketQueue<NfqMessage> = PacketQueue::with_capacity(args.batch_limit);

    while running.load(Ordering::Relaxed) {
        let received = capture.recv_batch(&mut live, args.batch_limit, &mut monitor);

        let now = Instant::now();
        let mut working = pipeline.tick(&mut live, now);
        working |= received > 0;

        let dropped = pipeline.collect_dropped();
        if !dropped.is_empty() {
            working = true;
            capture.drop_all(dropped, &mut monitor);
        }

        if !live.is_empty() {
            working = true;
            capture.accept_all(&mut live, &mut monitor);
        }

        monitor.check_and_report(now, pipeline.stages());

        if !working {
            if pipeline.backlog() > 0 {
                // 还有包压在模块里，不能睡太久
                std::thread::yield_now();
            } else {
                std::thread::sleep(Duration::from_micros(100));
            }
        }
    }

    // 退出前把模块里压着的包全部放走
    pipeline.shutdown(&mut live);
    capture.drop_all(pipeline.collect_dropped(), &mut monitor);
    let flushed = live.len();
    capture.accept_all(&mut live, &mut monitor);
    info!("stopped, flushed {} buffered packets", flushed);
    Ok(())
}
