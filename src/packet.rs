use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Whether a module with the given inbound/outbound switches should touch this packet.
    pub fn passes(self, inbound: bool, outbound: bool) -> bool {
        match self {
            Direction::Inbound => inbound,
            Direction::Outbound => outbound,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

#[derive(Debug)]
pub struct PacketNode<T> {
    // 数据包实体，谁持有节点谁就持有它
    pub payload: T,
    direction: Direction,
    len: usize,

    // 只有 jitter 会用：在这个时刻之前不许放行
    pub deadline: Option<Instant>,
}

impl<T> PacketNode<T> {
    pub fn new(payload: T, direction: Direction, len: usize) -> Self {
        Self {
            payload,
            direction,
            len,
            deadline: None,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

impl<T: AsRef<[u8]>> PacketNode<T> {
    pub fn from_payload(payload: T, direction: Direction) -> Self {
        let len = payload.as_ref().len();
        Self::new(payload, direction, len)
    }
}
