// minimal safe core of the channel. the exposed API is a convenience wrapper around this.

use super::{
    error::Terminal,
    waiter_queue::WaiterQueue,
};
use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
};


// handle to a channel.
pub(crate) struct Channel<T>(Arc<Shared<T>>);

// channel shared state.
struct Shared<T> {
    // mutex around lockable state.
    lockable: Mutex<Lockable<T>>,
    // elems maximum length. zero means elements are only ever handed directly from a send node to
    // a recv future.
    bound: usize,
}

// channel lockable state.
struct Lockable<T> {
    // storage for buffered elements. invariant: elems.len() <= bound.
    elems: VecDeque<T>,
    // node queue for send futures. each node holds the element its future is trying to send. a
    // send future whose node has been unlinked by someone else has delivered its element.
    send_nodes: WaiterQueue<T>,
    // node queue for recv futures.
    recv_nodes: WaiterQueue<()>,
    // begins as none. once set to some, never changes again.
    terminal: Option<Terminal>,
    // begins as false. once set to true, never changes again.
    //
    // - if true, terminal is some.
    // - if true, recv futures return terminal once elems is empty, and never take elements from
    //   send nodes.
    // - if true, send futures panic.
    closed: bool,
}

// misuse faults. these are raised only after the lock is released.
const WRITE_CLOSED: &str = "write to closed channel";
const ERROR_ALREADY_SET: &str = "setting error on an already errored channel";
const CLOSE_CLOSED: &str = "close of closed channel";

impl<T> Shared<T> {
    // lock the channel. no panic ever occurs while the lock is held, except from user drop
    // implementations, in which case the state is still consistent.
    fn lock(&self) -> MutexGuard<'_, Lockable<T>> {
        self.lockable.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Lockable<T> {
    // whether a recv future polled now could resolve.
    fn recv_ready(&self) -> bool {
        self.closed || !self.elems.is_empty() || !self.send_nodes.is_empty()
    }
}

impl<T> Channel<T> {
    // construct open channel with the given bound.
    pub(crate) fn new(bound: usize) -> Self {
        Channel(Arc::new(Shared {
            lockable: Mutex::new(Lockable {
                elems: VecDeque::with_capacity(bound),
                send_nodes: WaiterQueue::new(),
                recv_nodes: WaiterQueue::new(),
                terminal: None,
                closed: false,
            }),
            bound,
        }))
    }

    // clone another handle to the channel.
    pub(crate) fn clone(&self) -> Self {
        Channel(Arc::clone(&self.0))
    }

    // elems maximum length.
    pub(crate) fn bound(&self) -> usize {
        self.0.bound
    }

    // number of buffered elements.
    pub(crate) fn len(&self) -> usize {
        self.0.lock().elems.len()
    }

    // clone of the terminal state, if set.
    pub(crate) fn terminal(&self) -> Option<Terminal> {
        self.0.lock().terminal.clone()
    }

    // whether the channel is closed.
    pub(crate) fn is_closed(&self) -> bool {
        self.0.lock().closed
    }

    // set the terminal state without closing.
    //
    // panics if the terminal state is already set.
    pub(crate) fn set_terminal(&self, terminal: Terminal) {
        let mut lock = self.0.lock();
        if lock.terminal.is_some() {
            drop(lock);
            panic!("{}", ERROR_ALREADY_SET);
        }
        lock.terminal = Some(terminal);
    }

    // close the channel, with the given terminal state if one is given, or else with the already
    // set terminal state if there is one, or else with end-of-stream.
    //
    // panics if already closed, or if a terminal state is given but one is already set.
    pub(crate) fn close(&self, terminal: Option<Terminal>) {
        let mut lock = self.0.lock();
        if lock.closed {
            drop(lock);
            panic!("{}", CLOSE_CLOSED);
        }
        if terminal.is_some() && lock.terminal.is_some() {
            drop(lock);
            panic!("{}", ERROR_ALREADY_SET);
        }
        lock.close(terminal);
    }

    // close the channel unless already closed, never panicking. the given terminal state is only
    // used if none is set yet. returns whether this closed it.
    pub(crate) fn try_close(&self, terminal: Terminal) -> bool {
        let mut lock = self.0.lock();
        if lock.closed {
            return false;
        }
        if lock.terminal.is_none() {
            lock.terminal = Some(terminal);
        }
        lock.close(None);
        true
    }

    // construct a recv future.
    pub(crate) fn recv(&self) -> Recv<T> {
        Recv {
            shared: Arc::clone(&self.0),
            node: None,
            terminated: false,
        }
    }

    // construct a send future, linking it into the send node queue.
    //
    // panics if the channel is closed.
    pub(crate) fn send(&self, elem: T) -> Send<T> {
        let mut lock = self.0.lock();
        if lock.closed {
            drop(lock);
            panic!("{}", WRITE_CLOSED);
        }
        let node = lock.send_nodes.push(elem);
        // a recv future may now be able to take the element directly
        lock.recv_nodes.wake_front();
        Send {
            shared: Arc::clone(&self.0),
            node: Some(node),
        }
    }
}

impl<T> Lockable<T> {
    // close, keeping an existing terminal state if no new one is given, and wake everything up.
    fn close(&mut self, terminal: Option<Terminal>) {
        if let Some(terminal) = terminal {
            self.terminal = Some(terminal);
        }
        let terminal = self.terminal.get_or_insert(Terminal::EndOfStream);
        trace!(%terminal, "channel closed");
        self.closed = true;
        self.recv_nodes.wake_all();
        self.send_nodes.wake_all();
    }
}


// recv future.
pub(crate) struct Recv<T> {
    // handle to channel shared state.
    shared: Arc<Shared<T>>,
    // key of this future's node in the recv node queue, if linked. a node is only linked once the
    // future first returns pending.
    node: Option<u64>,
    // whether this future has resolved or cancelled.
    terminated: bool,
}

impl<T> Recv<T> {
    // whether this future has resolved or cancelled.
    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated
    }

    // mark as terminated, unlink node if linked, and if this future may have swallowed a
    // notification that something is ready, pass it on.
    fn terminate(&mut self, lock: &mut Lockable<T>) {
        self.terminated = true;
        if let Some(node) = self.node.take() {
            lock.recv_nodes.remove(node);
        }
        if lock.recv_ready() {
            lock.recv_nodes.wake_front();
        }
    }

    // if not already resolved or cancelled, cancel the future. never takes an element.
    pub(crate) fn cancel(&mut self) {
        if self.terminated {
            return;
        }
        if self.node.is_none() {
            // never linked, so never notified
            self.terminated = true;
            return;
        }
        let shared = Arc::clone(&self.shared);
        let mut lock = shared.lock();
        self.terminate(&mut lock);
    }
}

impl<T> Future for Recv<T> {
    type Output = Result<T, Terminal>;

    // - resolves to ok with an element, dequeued in FIFO order: first from the buffer, then
    //   directly from the oldest send node.
    // - once the channel is closed and the buffer is empty, resolves to err with the terminal
    //   state.
    //
    // panics if already resolved or cancelled.
    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let this = self.get_mut();
        assert!(!this.terminated, "recv future polled after already resolved or cancelled");

        let shared = Arc::clone(&this.shared);
        let mut guard = shared.lock();
        let lock = &mut *guard;

        if let Some(elem) = lock.elems.pop_front() {
            // freed a slot, so the front send node may now be able to push
            lock.send_nodes.wake_front();
            this.terminate(lock);
            return Poll::Ready(Ok(elem));
        }

        if lock.closed {
            let terminal = lock.terminal.clone()
                .expect("closed channel without terminal state (internal bug)");
            this.terminate(lock);
            return Poll::Ready(Err(terminal));
        }

        if let Some((elem, waker)) = lock.send_nodes.pop_front() {
            // hand-off: the send future finds its node gone and resolves
            if let Some(waker) = waker {
                waker.wake();
            }
            if lock.elems.len() < this.shared.bound {
                // the new front send node may push into the buffer
                lock.send_nodes.wake_front();
            }
            this.terminate(lock);
            return Poll::Ready(Ok(elem));
        }

        let node = *this.node.get_or_insert_with(|| lock.recv_nodes.push(()));
        lock.recv_nodes.set_waker(node, cx.waker());
        Poll::Pending
    }
}

impl<T> Drop for Recv<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}


// send future.
pub(crate) struct Send<T> {
    // handle to channel shared state.
    shared: Arc<Shared<T>>,
    // key of this future's node in the send node queue. none once resolved or cancelled.
    node: Option<u64>,
}

impl<T> Send<T> {
    // whether this future has resolved or cancelled.
    pub(crate) fn is_terminated(&self) -> bool {
        self.node.is_none()
    }

    // if not already resolved or cancelled, cancel the future and return the elem, unless it was
    // already delivered.
    //
    // never panics.
    pub(crate) fn cancel(&mut self) -> Option<T> {
        let node = self.node.take()?;
        let mut guard = self.shared.lock();
        let lock = &mut *guard;
        let was_front = lock.send_nodes.is_front(node);
        let elem = lock.send_nodes.remove(node);
        if was_front && lock.elems.len() < self.shared.bound {
            // next send node, if we were blocking it
            lock.send_nodes.wake_front();
        }
        elem
    }
}

impl<T> Future for Send<T> {
    type Output = ();

    // - resolves once the element is either pushed into the buffer or taken by a recv future.
    // - only the front send node may push into the buffer, which keeps elements in FIFO order.
    //
    // panics if the channel is closed before the element is delivered, or if already resolved or
    // cancelled.
    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<()> {
        let this = self.get_mut();
        let node = this.node
            .expect("send future polled after already resolved or cancelled");

        let mut guard = this.shared.lock();
        let lock = &mut *guard;

        if !lock.send_nodes.contains(node) {
            // a recv future took the element
            this.node = None;
            return Poll::Ready(());
        }

        if lock.closed {
            let elem = lock.send_nodes.remove(node);
            this.node = None;
            drop(guard);
            drop(elem);
            panic!("{}", WRITE_CLOSED);
        }

        let bound = this.shared.bound;
        if lock.send_nodes.is_front(node) && lock.elems.len() < bound {
            if let Some(elem) = lock.send_nodes.remove(node) {
                lock.elems.push_back(elem);
                this.node = None;
                // next recv node, since there is now an element
                lock.recv_nodes.wake_front();
                if lock.elems.len() < bound {
                    // next send node, if channel is still not full
                    lock.send_nodes.wake_front();
                }
                return Poll::Ready(());
            }
        }

        lock.send_nodes.set_waker(node, cx.waker());
        Poll::Pending
    }
}

impl<T> Drop for Send<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}
