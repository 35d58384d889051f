use crate::packet::PacketNode;

// ==========================================
// 基于 arena 的双向链表
// head / tail 哨兵用 None 表示，永远不持有真实的包
// ==========================================

/// Handle to a node living inside a [`PacketQueue`].
///
/// A handle goes stale as soon as its node is detached. Using a stale handle is a
/// programming error and panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    generation: u64,
}

struct Link<T> {
    node: PacketNode<T>,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Slot<T> {
    generation: u64,
    link: Option<Link<T>>,
}

pub struct PacketQueue<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> Default for PacketQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PacketQueue<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        let empty = self.head.is_none();
        // 计数和链接必须一致，不一致就是 bug
        assert_eq!(
            empty,
            self.len == 0,
            "packet queue size {} disagrees with linkage",
            self.len
        );
        empty
    }

    pub fn front(&self) -> Option<NodeId> {
        self.head.map(|index| self.id_of(index))
    }

    pub fn back(&self) -> Option<NodeId> {
        self.tail.map(|index| self.id_of(index))
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.link(id).next.map(|index| self.id_of(index))
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.link(id).prev.map(|index| self.id_of(index))
    }

    pub fn get(&self, id: NodeId) -> &PacketNode<T> {
        &self.link(id).node
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut PacketNode<T> {
        &mut self.link_mut(id).node
    }

    pub fn push_back(&mut self, node: PacketNode<T>) -> NodeId {
        let after = self.tail;
        self.link_in(node, after)
    }

    pub fn push_front(&mut self, node: PacketNode<T>) -> NodeId {
        self.link_in(node, None)
    }

    /// Inserts `node` as the successor of `position`. `None` is the head sentinel.
    pub fn insert_after(&mut self, position: Option<NodeId>, node: PacketNode<T>) -> NodeId {
        let after = position.map(|id| self.checked_index(id));
        self.link_in(node, after)
    }

    /// Unlinks the node in O(1) and hands it back by value.
    pub fn detach(&mut self, id: NodeId) -> PacketNode<T> {
        let index = self.checked_index(id);
        self.unlink(index)
    }

    pub fn pop_front(&mut self) -> Option<PacketNode<T>> {
        let index = self.head?;
        Some(self.unlink(index))
    }

    pub fn pop_back(&mut self) -> Option<PacketNode<T>> {
        let index = self.tail?;
        Some(self.unlink(index))
    }

    /// Moves every node of `other` to the back of `self`, keeping their order.
    pub fn append(&mut self, other: &mut PacketQueue<T>) -> usize {
        let mut moved = 0;
        while let Some(node) = other.pop_front() {
            self.push_back(node);
            moved += 1;
        }
        moved
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            queue: self,
            cursor: self.head,
            forward: true,
        }
    }

    pub fn iter_rev(&self) -> Iter<'_, T> {
        Iter {
            queue: self,
            cursor: self.tail,
            forward: false,
        }
    }

    /// Sum of the payload lengths of every queued packet.
    pub fn bytes(&self) -> usize {
        self.iter().map(PacketNode::len).sum()
    }

    /// Walks head -> tail and tail -> head and panics unless both walks agree with each
    /// other and with the tracked size.
    pub fn check_integrity(&self) {
        let mut forward = Vec::with_capacity(self.len);
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(index) = cursor {
            assert!(
                forward.len() < self.len,
                "packet queue walk exceeds tracked size {}",
                self.len
            );
            let link = self.slots[index]
                .link
                .as_ref()
                .unwrap_or_else(|| panic!("packet queue links to vacant slot {index}"));
            assert_eq!(link.prev, prev, "broken back link at slot {index}");
            forward.push(index);
            prev = Some(index);
            cursor = link.next;
        }
        assert_eq!(prev, self.tail, "tail sentinel does not close the forward walk");
        assert_eq!(forward.len(), self.len, "tracked size disagrees with forward walk");

        let mut backward = Vec::with_capacity(self.len);
        let mut cursor = self.tail;
        while let Some(index) = cursor {
            assert!(backward.len() < self.len, "packet queue backward walk loops");
            backward.push(index);
            cursor = self.slots[index].link.as_ref().and_then(|link| link.prev);
        }
        backward.reverse();
        assert_eq!(forward, backward, "forward and backward walks disagree");
    }

    fn link_in(&mut self, node: PacketNode<T>, after: Option<usize>) -> NodeId {
        let next = match after {
            Some(index) => self.slots[index].link.as_ref().and_then(|link| link.next),
            None => self.head,
        };

        let link = Link {
            node,
            prev: after,
            next,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index].link = Some(link);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    link: Some(link),
                });
                self.slots.len() - 1
            }
        };

        match after {
            Some(prev) => self.link_at(prev).next = Some(index),
            None => self.head = Some(index),
        }
        match next {
            Some(next) => self.link_at(next).prev = Some(index),
            None => self.tail = Some(index),
        }

        self.len += 1;
        self.id_of(index)
    }

    fn unlink(&mut self, index: usize) -> PacketNode<T> {
        let slot = &mut self.slots[index];
        let link = slot
            .link
            .take()
            .unwrap_or_else(|| panic!("detaching vacant slot {index}"));
        // 句柄作废
        slot.generation += 1;
        self.free.push(index);

        match link.prev {
            Some(prev) => self.link_at(prev).next = link.next,
            None => self.head = link.next,
        }
        match link.next {
            Some(next) => self.link_at(next).prev = link.prev,
            None => self.tail = link.prev,
        }

        self.len = self
            .len
            .checked_sub(1)
            .unwrap_or_else(|| panic!("packet queue size underflow"));
        link.node
    }

    fn id_of(&self, index: usize) -> NodeId {
        NodeId {
            index,
            generation: self.slots[index].generation,
        }
    }

    fn checked_index(&self, id: NodeId) -> usize {
        match self.slots.get(id.index) {
            Some(slot) if slot.generation == id.generation && slot.link.is_some() => id.index,
            _ => panic!("stale packet handle {id:?}"),
        }
    }

    fn link(&self, id: NodeId) -> &Link<T> {
        let index = self.checked_index(id);
        self.slots[index]
            .link
            .as_ref()
            .unwrap_or_else(|| panic!("stale packet handle {id:?}"))
    }

    fn link_mut(&mut self, id: NodeId) -> &mut Link<T> {
        let index = self.checked_index(id);
        self.link_at(index)
    }

    fn link_at(&mut self, index: usize) -> &mut Link<T> {
        self.slots[index]
            .link
            .as_mut()
            .unwrap_or_else(|| panic!("packet queue links to vacant slot {index}"))
    }
}

pub struct Iter<'a, T> {
    queue: &'a PacketQueue<T>,
    cursor: Option<usize>,
    forward: bool,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a PacketNode<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let link = self.queue.slots[index].link.as_ref()?;
        self.cursor = if self.forward { link.next } else { link.prev };
        Some(&link.node)
    }
}
