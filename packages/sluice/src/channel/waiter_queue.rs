// pending operations part of a channel.

use std::{
    collections::VecDeque,
    task::Waker,
};


// queue of nodes, each corresponding to a pending operation future.
//
// nodes are identified by keys handed out in strictly increasing order, and removal preserves
// the relative order of the rest, so the queue is always sorted by key. the node at the front is
// the one that has been waiting the longest.
pub(crate) struct WaiterQueue<P> {
    nodes: VecDeque<Node<P>>,
    next_key: u64,
}

// a pending operation.
struct Node<P> {
    key: u64,
    // data the operation parks in the queue while it waits.
    payload: P,
    // waker to notify when the operation may be able to make progress.
    waker: Option<Waker>,
}

impl<P> WaiterQueue<P> {
    // construct empty queue.
    pub(crate) fn new() -> Self {
        WaiterQueue {
            nodes: VecDeque::new(),
            next_key: 0,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // link a new node to the back of this queue and return its key.
    pub(crate) fn push(&mut self, payload: P) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        self.nodes.push_back(Node { key, payload, waker: None });
        key
    }

    // index of the node with the given key, if it is still linked.
    fn index(&self, key: u64) -> Option<usize> {
        self.nodes.binary_search_by_key(&key, |node| node.key).ok()
    }

    // whether the node with the given key is still linked.
    pub(crate) fn contains(&self, key: u64) -> bool {
        self.index(key).is_some()
    }

    // whether the node with the given key is linked and at the front of this queue.
    pub(crate) fn is_front(&self, key: u64) -> bool {
        self.nodes.front().is_some_and(|node| node.key == key)
    }

    // unlink the node with the given key, returning its payload. its waker is dropped without
    // being woken.
    pub(crate) fn remove(&mut self, key: u64) -> Option<P> {
        let idx = self.index(key)?;
        self.nodes.remove(idx).map(|node| node.payload)
    }

    // unlink the node at the front of this queue, returning its payload and waker.
    pub(crate) fn pop_front(&mut self) -> Option<(P, Option<Waker>)> {
        self.nodes.pop_front().map(|node| (node.payload, node.waker))
    }

    // install the waker for the node with the given key, unless an equivalent one is already
    // installed. does nothing if the node is not linked.
    pub(crate) fn set_waker(&mut self, key: u64, waker: &Waker) {
        let Some(idx) = self.index(key) else { return };
        let slot = &mut self.nodes[idx].waker;
        if !slot.as_ref().is_some_and(|installed| installed.will_wake(waker)) {
            *slot = Some(waker.clone());
        }
    }

    // take and wake the waker of the node at the front of this queue, if there is one.
    //
    // if the front node's waker was already taken, it has been notified and not yet re-polled, and
    // it is responsible for passing on the notification.
    pub(crate) fn wake_front(&mut self) {
        if let Some(waker) = self.nodes.front_mut().and_then(|node| node.waker.take()) {
            waker.wake();
        }
    }

    // take and wake the wakers of all nodes, leaving the nodes linked.
    pub(crate) fn wake_all(&mut self) {
        for node in self.nodes.iter_mut() {
            if let Some(waker) = node.waker.take() {
                waker.wake();
            }
        }
    }
}
