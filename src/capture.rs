use nfq::{Message, Queue, Verdict};
use tracing::{debug, warn};

use crate::{
    error::Error,
    monitor::Monitor,
    nfq_message::NfqMessage,
    packet::{Direction, PacketNode},
    packet_queue::PacketQueue,
};

const COPY_RANGE: u16 = 0xFFFF;
const QUEUE_MAX_LEN: u32 = 10000;

fn make_queue(queue_num: u16) -> Result<Queue, std::io::Error> {
    let mut q = Queue::open()?;
    q.bind(queue_num)?;
    q.set_copy_range(queue_num, COPY_RANGE)?;
    q.set_queue_max_len(queue_num, QUEUE_MAX_LEN)?;
    q.set_nonblocking(true);
    Ok(q)
}

struct Bound {
    queue: Queue,
    queue_num: u16,
    direction: Direction,
}

// ==========================================
// NFQUEUE 抓包：进来的队列号决定方向
// ==========================================
pub struct NfqCapture {
    queues: Vec<Bound>,
}

impl NfqCapture {
    pub fn open(inbound: &[u16], outbound: &[u16]) -> Result<Self, Error> {
        let mut queues = Vec::new();
        let wanted = inbound
            .iter()
            .map(|q| (*q, Direction::Inbound))
            .chain(outbound.iter().map(|q| (*q, Direction::Outbound)));
        for (queue_num, direction) in wanted {
            let queue = make_queue(queue_num)?;
            debug!(queue_num, direction = direction.as_str(), "bound nfqueue");
            queues.push(Bound {
                queue,
                queue_num,
                direction,
            });
        }
        if queues.is_empty() {
            return Err(Error::NoQueues);
        }
        Ok(Self { queues })
    }

    /// Pulls up to `limit` packets from all queues, round-robin, into the back of `live`.
    pub fn recv_batch(
        &mut self,
        live: &mut PacketQueue<NfqMessage>,
        limit: usize,
        monitor: &mut Monitor,
    ) -> usize {
        let mut packet_count = 0;
        loop {
            let mut no_packet = true;
            for (idx, bound) in self.queues.iter_mut().enumerate() {
                if packet_count >= limit {
                    return packet_count;
                }
                let Ok(msg) = bound.queue.recv() else {
                    continue;
                };
                no_packet = false;
                packet_count += 1;

                let len = msg.get_payload().len();
                monitor.record_in(bound.direction);
                live.push_back(PacketNode::new(
                    NfqMessage::new(msg, idx),
                    bound.direction,
                    len,
                ));
            }
            if no_packet {
                return packet_count;
            }
        }
    }

    /// Sends everything left in the live list, in order.
    pub fn accept_all(&mut self, live: &mut PacketQueue<NfqMessage>, monitor: &mut Monitor) {
        while let Some(node) = live.pop_front() {
            monitor.record_out(node.direction(), node.len());
            self.verdict(node, Verdict::Accept);
        }
    }

    pub fn drop_all(&mut self, dropped: Vec<PacketNode<NfqMessage>>, monitor: &mut Monitor) {
        for node in dropped {
            monitor.record_drop(node.direction());
            self.verdict(node, Verdict::Drop);
        }
    }

    fn verdict(&mut self, node: PacketNode<NfqMessage>, verdict: Verdict) {
        let payload = node.into_payload();
        let idx = payload.queue_idx();
        let mut msg: Message = payload.into();
        msg.set_verdict(verdict);
        if let Some(bound) = self.queues.get_mut(idx) {
            if let Err(e) = bound.queue.verdict(msg) {
                warn!(queue_num = bound.queue_num, "failed to set verdict: {:?}", e);
            }
        }
    }
}
