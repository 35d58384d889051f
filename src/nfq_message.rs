use nfq::Message;

// 记住包是从哪个队列句柄来的，下 verdict 要还回去
pub struct NfqMessage {
    msg: Message,
    queue_idx: usize,
}

impl NfqMessage {
    pub fn new(msg: Message, queue_idx: usize) -> Self {
        Self { msg, queue_idx }
    }

    pub fn queue_idx(&self) -> usize {
        self.queue_idx
    }
}

impl AsRef<[u8]> for NfqMessage {
    fn as_ref(&self) -> &[u8] {
        self.msg.get_payload()
    }
}

impl From<NfqMessage> for Message {
    fn from(value: NfqMessage) -> Self {
        value.msg
    }
}
