// exposed API of channels

use self::future::*;
use super::{
    error::*,
    core,
};
use std::fmt::{self, Debug, Formatter};
use tokio_util::sync::CancellationToken;


/// Channel with a sticky terminal state
///
/// A channel is a FIFO queue of messages with a capacity fixed at construction. Writers block once
/// the buffer is full, or, for zero-capacity channels, until a reader takes the message directly.
/// Readers block until a message is available or the channel is closed.
///
/// Closing a channel sets its terminal state, which every subsequent read observes once the
/// buffered messages have been drained, on every handle and every view, forever. This is either
/// [`Terminal::EndOfStream`] or an explicit [`StickyError`].
///
/// `Channel` is a handle: cloning it creates another handle to the same channel. The
/// [`read_only`](Self::read_only) and [`write_only`](Self::write_only) views can be used to hand
/// out only one side of the capability.
///
/// # Ownership of termination
///
/// Any number of tasks may read and write concurrently. Setting the terminal state and closing
/// are meant to be done by a single owner, the producer side. Writing to a closed channel, setting
/// the terminal state twice, or closing twice, are programming errors, and panic.
pub struct Channel<T> {
    inner: core::Channel<T>,
}

impl<T> Channel<T> {
    /// Create an open channel with zero capacity
    ///
    /// Every write blocks until a reader takes its message.
    pub fn new() -> Self {
        Self::with_size(0)
    }

    /// Create an open channel which buffers up to `capacity` messages
    pub fn with_size(capacity: usize) -> Self {
        Channel { inner: core::Channel::new(capacity) }
    }

    /// Create an already closed channel with the given terminal state
    ///
    /// Passing [`Terminal::EndOfStream`] or `None::<StickyError>` creates a channel that is simply
    /// finished.
    pub fn with_error(error: impl Into<Terminal>) -> Self {
        let channel = Self::new();
        channel.close_with_error(error);
        channel
    }

    /// Get a read-only view of this channel
    pub fn read_only(&self) -> crate::ReadOnly<T> {
        crate::ReadOnly::new(self.clone())
    }

    /// Get a write-only view of this channel
    pub fn write_only(&self) -> crate::WriteOnly<T> {
        crate::WriteOnly::new(self.clone())
    }

    /// Create a future to read a message from this channel
    ///
    /// Resolves to the next message, or, once the channel is closed and all buffered messages have
    /// been read, to its terminal state. See the API of [`ReadFut`], as it is not only a future,
    /// but also provides additional methods, including the API for blocking on a read operation
    /// or trying to read immediately.
    ///
    /// This is also the building block for multiplexing: a `ReadFut` may be used in
    /// `tokio::select!`, and dropping it unresolved never loses a message.
    pub fn read(&self) -> ReadFut<T> {
        ReadFut(self.inner.recv())
    }

    /// Read a message, unless the cancellation token fires first
    ///
    /// Cancellation only abandons this read: the channel is not closed, and no message is
    /// consumed. If the token is already cancelled, this returns [`CancelledError`] even if a
    /// message is available.
    pub async fn read_with_cancellation(
        &self,
        token: &CancellationToken,
    ) -> Result<T, CancellableReadError> {
        let mut read = self.read();
        tokio::select! {
            biased;
            () = token.cancelled() => {
                read.abort();
                Err(CancelledError.into())
            }
            result = &mut read => result.map_err(Into::into),
        }
    }

    /// Call `f` on every message until the channel closes
    ///
    /// Returns `Ok` if the channel simply finished, and the error if it was closed with one or if
    /// `f` returned one.
    ///
    /// Important: if `f` returns an error, messages may remain in the channel. If this was the
    /// last reader, writers may then block forever. Use [`drain`](Self::drain) to prevent that.
    pub async fn for_each<F, E>(&self, mut f: F) -> Result<(), E>
    where
        F: FnMut(T) -> Result<(), E>,
        E: From<StickyError>,
    {
        loop {
            match self.read().await {
                Ok(msg) => f(msg)?,
                Err(terminal) => return terminal.into_result().map_err(E::from),
            }
        }
    }

    /// Call `f` on every message until the channel closes or the cancellation token fires
    ///
    /// Same as [`for_each`](Self::for_each), but also returns [`CancelledError`] if the token
    /// fires. That does not close the channel.
    pub async fn for_each_with_cancellation<F, E>(
        &self,
        token: &CancellationToken,
        mut f: F,
    ) -> Result<(), E>
    where
        F: FnMut(T) -> Result<(), E>,
        E: From<StickyError> + From<CancelledError>,
    {
        loop {
            match self.read_with_cancellation(token).await {
                Ok(msg) => f(msg)?,
                Err(CancellableReadError::Terminal(terminal)) =>
                    return terminal.into_result().map_err(E::from),
                Err(CancellableReadError::Cancelled(e)) => return Err(e.into()),
            }
        }
    }

    /// Read all messages until the channel closes
    ///
    /// If the channel was closed with an error, the messages read before it are returned alongside
    /// it.
    pub async fn collect_rest(&self) -> Result<Vec<T>, CollectError<T, StickyError>> {
        let mut values = Vec::with_capacity(self.len());
        loop {
            match self.read().await {
                Ok(msg) => values.push(msg),
                Err(Terminal::EndOfStream) => return Ok(values),
                Err(Terminal::Failed(cause)) => return Err(CollectError { values, cause }),
            }
        }
    }

    /// Read all messages until the channel closes or the cancellation token fires
    ///
    /// Same as [`collect_rest`](Self::collect_rest), but also stops if the token fires, returning
    /// the partial results alongside [`CancelledError`]. That does not close the channel.
    pub async fn collect_rest_with_cancellation(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<T>, CollectError<T, CancellableError>> {
        let mut values = Vec::with_capacity(self.len());
        loop {
            let cause: CancellableError = match self.read_with_cancellation(token).await {
                Ok(msg) => {
                    values.push(msg);
                    continue;
                }
                Err(CancellableReadError::Terminal(Terminal::EndOfStream)) => return Ok(values),
                Err(CancellableReadError::Terminal(Terminal::Failed(e))) => e.into(),
                Err(CancellableReadError::Cancelled(e)) => e.into(),
            };
            return Err(CollectError { values, cause });
        }
    }

    /// Read and discard messages until the channel closes
    ///
    /// This unblocks writers stuck on a full channel when no more messages are wanted.
    pub async fn drain(&self) {
        while self.read().await.is_ok() {}
    }

    /// Read and discard messages until the channel closes or the cancellation token fires
    ///
    /// Returns [`CancelledError`] if the token fired first. That does not close the channel.
    pub async fn drain_with_cancellation(
        &self,
        token: &CancellationToken,
    ) -> Result<(), CancelledError> {
        loop {
            match self.read_with_cancellation(token).await {
                Ok(_) => (),
                Err(CancellableReadError::Terminal(_)) => return Ok(()),
                Err(CancellableReadError::Cancelled(e)) => return Err(e),
            }
        }
    }

    /// Convert into a stream of messages
    ///
    /// The stream ends once the channel simply finishes. If the channel was closed with an error,
    /// the stream yields that error once and then ends.
    #[cfg(feature = "futures")]
    pub fn into_stream(self) -> impl futures::Stream<Item = Result<T, StickyError>> {
        futures::stream::unfold(Some(self), |state| async move {
            let channel = state?;
            match channel.read().await {
                Ok(msg) => Some((Ok(msg), Some(channel))),
                Err(Terminal::EndOfStream) => None,
                Err(Terminal::Failed(e)) => Some((Err(e), None)),
            }
        })
    }

    /// Number of buffered, unread messages
    ///
    /// Always zero for zero-capacity channels.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether there are no buffered, unread messages
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffer capacity, fixed at construction
    pub fn cap(&self) -> usize {
        self.inner.bound()
    }

    /// The terminal state, if it has been set
    ///
    /// This is always `Some` once the channel is closed, and may be `Some` before that if
    /// [`set_error`](Self::set_error) was used.
    pub fn err(&self) -> Option<Terminal> {
        self.inner.terminal()
    }

    /// Whether the channel is closed for writing
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Create a future to write a message into this channel
    ///
    /// See the API of [`WriteFut`], as it is not only a future, but also provides additional
    /// methods, including the API for blocking on a write operation or trying to write
    /// immediately.
    ///
    /// Panics if the channel is closed. The future also panics when polled if the channel gets
    /// closed before the message is delivered.
    pub fn write(&self, msg: T) -> WriteFut<T> {
        WriteFut(self.inner.send(msg))
    }

    /// Write a message, unless the cancellation token fires first
    ///
    /// If this returns an error, the message was not delivered and is handed back. Cancellation
    /// does not close the channel.
    ///
    /// Panics if the channel is closed.
    pub async fn write_with_cancellation(
        &self,
        token: &CancellationToken,
        msg: T,
    ) -> Result<(), WriteError<T, CancelledError>> {
        let mut write = self.write(msg);
        tokio::select! {
            biased;
            () = token.cancelled() => match write.rescind() {
                Some(msg) => Err(WriteError { msg, cause: CancelledError }),
                // a reader took it in the meantime
                None => Ok(()),
            },
            () = &mut write => Ok(()),
        }
    }

    /// Set the terminal state without closing the channel
    ///
    /// Writing remains possible, and readers keep receiving messages until the channel is
    /// closed, at which point they observe this terminal state. Never blocks.
    ///
    /// Panics if the terminal state is already set.
    pub fn set_error(&self, error: impl Into<Terminal>) {
        let error = error.into();
        trace!(%error, "setting channel error");
        self.inner.set_terminal(error);
    }

    /// Close the channel
    ///
    /// The terminal state becomes end-of-stream, unless one was already set. Buffered messages
    /// remain readable. Never blocks.
    ///
    /// Panics if the channel is already closed.
    pub fn close(&self) {
        self.inner.close(None);
    }

    /// Set the terminal state and close the channel, atomically
    ///
    /// Panics if the channel is already closed or its terminal state is already set.
    pub fn close_with_error(&self, error: impl Into<Terminal>) {
        self.inner.close(Some(error.into()));
    }

    // close unless already closed, never panicking.
    pub(crate) fn try_close(&self, terminal: Terminal) -> bool {
        self.inner.try_close(terminal)
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Channel { inner: self.inner.clone() }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for Channel<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Channel")
            .field("len", &self.len())
            .field("cap", &self.cap())
            .field("terminal", &self.err())
            .finish()
    }
}


// future types for channels.
pub(crate) mod future {
    use super::*;
    use crate::channel::polling::{Timeout, poll};
    use std::{
        task::{Poll, Context},
        future::Future,
        pin::Pin,
        time::{Duration, Instant},
    };

    /// Future for reading from a [`Channel`]
    ///
    /// A message is not dequeued from the channel until this future resolves (a call to `poll`
    /// returns `Poll::Ready`). If this future has not yet resolved, the read operation may be
    /// aborted by calling [`abort`](Self::abort) (or by dropping), without losing any message.
    ///
    /// The terminal state this may resolve to is sticky: once a read resolves to it, every
    /// further read returns the same.
    pub struct ReadFut<T>(pub(super) core::Recv<T>);

    impl<T> Future for ReadFut<T> {
        type Output = Result<T, Terminal>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            let this = self.get_mut();
            // for implementation of FusedFuture
            if this.is_terminated() {
                return Poll::Pending;
            }
            Pin::new(&mut this.0).poll(cx)
        }
    }

    impl<T> ReadFut<T> {
        /// Abort this read operation
        ///
        /// Does nothing if this future has already resolved or aborted. Never panics.
        pub fn abort(&mut self) {
            self.0.cancel();
        }

        /// Block until this future resolves
        ///
        /// Calling this method counts as polling this future, and when this method returns, that
        /// counts as this future resolving. This method will panic if this future has already
        /// resolved or aborted. It must not be called from within an async runtime's worker.
        pub fn block(&mut self) -> Result<T, Terminal> {
            assert!(!self.is_terminated(), "ReadFut.block called after terminated");
            poll(&mut self.0, Timeout::Never).expect("poll timed out with Timeout::Never")
        }

        /// Try to resolve this future immediately without blocking
        ///
        /// Calling this method counts as polling this future, and if this method returns anything
        /// other than [`WouldBlockError`], that counts as this future resolving. If it returns
        /// [`WouldBlockError`], this future is aborted. This method will panic if this future has
        /// already resolved or aborted.
        pub fn try_now(&mut self) -> Result<T, TryReadError> {
            assert!(!self.is_terminated(), "ReadFut.try_now called after terminated");
            self.block_with(Timeout::NonBlocking)
        }

        /// Block until this future resolves or a timeout elapses
        ///
        /// Same as [`block_deadline`](Self::block_deadline), with the deadline computed from now.
        pub fn block_timeout(&mut self, timeout: Duration) -> Result<T, TryReadError> {
            self.block_deadline(Instant::now() + timeout)
        }

        /// Block until this future resolves or the deadline is reached
        ///
        /// Calling this method counts as polling this future, and if this method returns anything
        /// other than [`WouldBlockError`], that counts as this future resolving. If it returns
        /// [`WouldBlockError`], this future is aborted. This method will panic if this future has
        /// already resolved or aborted.
        pub fn block_deadline(&mut self, deadline: Instant) -> Result<T, TryReadError> {
            assert!(!self.is_terminated(), "ReadFut.block_deadline called after terminated");
            self.block_with(Timeout::At(deadline))
        }

        fn block_with(&mut self, timeout: Timeout) -> Result<T, TryReadError> {
            match poll(&mut self.0, timeout) {
                Some(result) => result.map_err(TryReadError::from),
                None => {
                    self.abort();
                    Err(WouldBlockError.into())
                }
            }
        }

        /// Whether this future has already resolved or aborted
        pub fn is_terminated(&self) -> bool {
            self.0.is_terminated()
        }
    }

    #[cfg(feature = "futures")]
    impl<T> futures::future::FusedFuture for ReadFut<T> {
        fn is_terminated(&self) -> bool {
            Self::is_terminated(self)
        }
    }


    /// Future for writing into a [`Channel`]
    ///
    /// Resolves once the message is delivered: pushed into the channel's buffer, or, for
    /// zero-capacity channels, taken by a reader. If this future has not yet resolved, the write
    /// operation may be aborted and its message retrieved by calling [`rescind`](Self::rescind)
    /// (or by dropping).
    ///
    /// Write futures deliver in the order they were created. Thus, if one creates a write future
    /// and holds it for an extended period without polling it, it may block write futures
    /// created after it.
    ///
    /// Panics when polled if the channel was closed before the message was delivered.
    pub struct WriteFut<T>(pub(super) core::Send<T>);

    impl<T> Future for WriteFut<T> {
        type Output = ();

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<()> {
            let this = self.get_mut();
            // for implementation of FusedFuture
            if this.is_terminated() {
                return Poll::Pending;
            }
            Pin::new(&mut this.0).poll(cx)
        }
    }

    impl<T> WriteFut<T> {
        /// If the message has not yet been delivered, abort the write operation and rescind the
        /// message
        ///
        /// Returns `None` if this future has already resolved or rescinded, or if a reader took
        /// the message in the meantime. Never panics.
        pub fn rescind(&mut self) -> Option<T> {
            self.0.cancel()
        }

        /// Block until this future resolves
        ///
        /// Calling this method counts as polling this future, and when this method returns, that
        /// counts as this future resolving. This method will panic if this future has already
        /// resolved or rescinded. It must not be called from within an async runtime's worker.
        pub fn block(&mut self) {
            assert!(!self.is_terminated(), "WriteFut.block called after terminated");
            poll(&mut self.0, Timeout::Never).expect("poll timed out with Timeout::Never")
        }

        /// Try to resolve this future immediately without blocking
        ///
        /// Calling this method counts as polling this future. If this method returns
        /// [`WouldBlockError`], the write is rescinded, and the message is handed back. This
        /// method will panic if this future has already resolved or rescinded.
        pub fn try_now(&mut self) -> Result<(), WriteError<T, WouldBlockError>> {
            assert!(!self.is_terminated(), "WriteFut.try_now called after terminated");
            self.block_with(Timeout::NonBlocking)
        }

        /// Block until this future resolves or a timeout elapses
        ///
        /// Same as [`block_deadline`](Self::block_deadline), with the deadline computed from now.
        pub fn block_timeout(&mut self, timeout: Duration) -> Result<(), WriteError<T, WouldBlockError>> {
            self.block_deadline(Instant::now() + timeout)
        }

        /// Block until this future resolves or the deadline is reached
        ///
        /// Calling this method counts as polling this future. If this method returns
        /// [`WouldBlockError`], the write is rescinded, and the message is handed back. This
        /// method will panic if this future has already resolved or rescinded.
        pub fn block_deadline(&mut self, deadline: Instant) -> Result<(), WriteError<T, WouldBlockError>> {
            assert!(!self.is_terminated(), "WriteFut.block_deadline called after terminated");
            self.block_with(Timeout::At(deadline))
        }

        fn block_with(&mut self, timeout: Timeout) -> Result<(), WriteError<T, WouldBlockError>> {
            if poll(&mut self.0, timeout).is_some() {
                return Ok(());
            }
            match self.rescind() {
                Some(msg) => Err(WriteError { msg, cause: WouldBlockError }),
                // a reader took it after the last poll
                None => Ok(()),
            }
        }

        /// Whether this future has already resolved or rescinded
        pub fn is_terminated(&self) -> bool {
            self.0.is_terminated()
        }
    }

    #[cfg(feature = "futures")]
    impl<T> futures::future::FusedFuture for WriteFut<T> {
        fn is_terminated(&self) -> bool {
            Self::is_terminated(self)
        }
    }
}


// ==== tests ====


#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_pcg::Pcg32;
    use std::{
        thread,
        time::Duration,
    };

    fn new_rng(seed: u64) -> impl Rng {
        Pcg32::seed_from_u64(seed)
    }

    // channel with a thread writing 1..=count into it, closing it afterwards if close is true.
    fn producer(count: i32, close: bool) -> Channel<i32> {
        let channel = Channel::new();
        let send = channel.write_only();
        thread::spawn(move || {
            for i in 1..=count {
                send.write(i).block();
            }
            if close {
                send.close();
            }
        });
        channel
    }

    #[test]
    fn new_channel_is_open_and_empty() {
        let channel = Channel::<i32>::new();
        assert_eq!(channel.len(), 0);
        assert_eq!(channel.cap(), 0);
        assert!(channel.err().is_none());
        assert!(!channel.is_closed());
    }

    #[test]
    fn with_size_buffers() {
        let channel = Channel::with_size(2);
        channel.write(123).try_now().unwrap();
        assert_eq!(channel.len(), 1);
        assert_eq!(channel.cap(), 2);
    }

    #[test]
    fn with_error_is_closed() {
        let channel = Channel::<i32>::with_error(anyhow::anyhow!("unexpected eof"));
        assert_eq!(channel.len(), 0);
        assert_eq!(channel.cap(), 0);
        assert!(channel.is_closed());
        let terminal = channel.read().block().unwrap_err();
        assert_eq!(terminal.to_string(), "unexpected eof");

        let channel = Channel::<i32>::with_error(None::<StickyError>);
        assert!(channel.read().block().unwrap_err().is_end_of_stream());
        assert!(channel.err().unwrap().is_end_of_stream());
    }

    #[test]
    fn read_then_close() {
        let channel = producer(2, false);
        assert_eq!(channel.read().block().unwrap(), 1);
        assert_eq!(channel.read().block().unwrap(), 2);
        channel.close();
        assert!(channel.read().block().unwrap_err().is_end_of_stream());
        assert!(channel.err().unwrap().is_end_of_stream());
    }

    #[test]
    fn order_preserved() {
        let channel = Channel::with_size(100);
        for i in 0..100 {
            channel.write(i).block();
        }
        channel.close();
        let values = block_on(channel.collect_rest()).unwrap();
        assert_eq!(values, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn sticky_error_broadcast() {
        let channel = Channel::<i32>::new();
        let error = StickyError::msg("boom");

        let joins = (0..4)
            .map(|_| {
                let recv = channel.read_only();
                thread::spawn(move || recv.read().block().unwrap_err())
            })
            .collect::<Vec<_>>();
        thread::sleep(Duration::from_millis(20));
        channel.close_with_error(error.clone());

        for join in joins {
            assert!(join.join().unwrap().error().unwrap().ptr_eq(&error));
        }
        // including views created afterwards, repeatedly
        for _ in 0..3 {
            let terminal = channel.read_only().read().block().unwrap_err();
            assert!(terminal.error().unwrap().ptr_eq(&error));
        }
        assert!(channel.err().unwrap().error().unwrap().ptr_eq(&error));
    }

    #[test]
    fn close_drains_buffer_first() {
        let channel = Channel::with_size(3);
        channel.write(1).block();
        channel.write(2).block();
        channel.close_with_error(anyhow::anyhow!("done"));
        assert_eq!(channel.read().block().unwrap(), 1);
        assert_eq!(channel.read().block().unwrap(), 2);
        assert_eq!(channel.read().block().unwrap_err().to_string(), "done");
    }

    #[test]
    fn set_error_then_close_keeps_error() {
        let channel = Channel::with_size(1);
        channel.set_error(anyhow::anyhow!("early"));
        // still writable and readable
        channel.write(1).block();
        assert_eq!(channel.read().block().unwrap(), 1);
        assert_eq!(channel.err().unwrap().to_string(), "early");
        channel.close();
        assert_eq!(channel.read().block().unwrap_err().to_string(), "early");
    }

    #[test]
    #[should_panic(expected = "write to closed channel")]
    fn write_after_close_panics() {
        let channel = Channel::with_size(1);
        channel.close();
        let _ = channel.write(1);
    }

    #[test]
    #[should_panic(expected = "setting error on an already errored channel")]
    fn set_error_twice_panics() {
        let channel = Channel::<()>::new();
        channel.set_error(anyhow::anyhow!("a"));
        channel.set_error(anyhow::anyhow!("b"));
    }

    #[test]
    #[should_panic(expected = "close of closed channel")]
    fn close_twice_panics() {
        let channel = Channel::<()>::new();
        channel.close();
        channel.close();
    }

    #[test]
    #[should_panic(expected = "close of closed channel")]
    fn close_with_error_after_close_panics() {
        let channel = Channel::<()>::new();
        channel.close();
        channel.close_with_error(anyhow::anyhow!("late"));
    }

    #[test]
    fn capacity_semantics() {
        let channel = Channel::with_size(3);
        for i in 0..3 {
            channel.write(i).try_now().unwrap();
        }
        let rejected = channel.write(3).try_now().unwrap_err();
        assert_eq!(rejected.msg, 3);
        assert_eq!(channel.len(), 3);
        assert_eq!(channel.cap(), 3);
        assert_eq!(channel.read().block().unwrap(), 0);
        channel.write(3).try_now().unwrap();
        assert_eq!(channel.cap(), 3);
    }

    #[test]
    fn zero_capacity_needs_reader() {
        let channel = Channel::new();
        assert_eq!(channel.write(1).try_now().unwrap_err().msg, 1);
        assert!(matches!(channel.read().try_now(), Err(TryReadError::WouldBlock(_))));

        let recv = channel.read_only();
        let join = thread::spawn(move || recv.read().block().unwrap());
        channel.write(7).block();
        assert_eq!(join.join().unwrap(), 7);
        assert_eq!(channel.len(), 0);
    }

    #[test]
    fn block_timeout_gives_up() {
        let channel = Channel::<i32>::new();
        let mut read = channel.read();
        assert!(matches!(
            read.block_timeout(Duration::from_millis(10)),
            Err(TryReadError::WouldBlock(_)),
        ));
        assert!(read.is_terminated());
        let rejected = channel.write(5).block_timeout(Duration::from_millis(10)).unwrap_err();
        assert_eq!(rejected.msg, 5);
    }

    #[test]
    fn drain_terminates() {
        let channel = Channel::with_size(5);
        for i in 0..5 {
            channel.write(i).block();
        }
        channel.close();
        block_on(channel.drain());
        assert_eq!(channel.len(), 0);
        assert!(channel.read().block().unwrap_err().is_end_of_stream());
    }

    #[test]
    fn drain_unblocks_writer() {
        let channel = producer(10, true);
        block_on(channel.drain());
        assert!(channel.err().unwrap().is_end_of_stream());
    }

    #[test]
    fn debug_shows_state() {
        let channel = Channel::with_size(2);
        channel.write('x').block();
        let debug = format!("{:?}", channel);
        assert!(debug.contains("len: 1"), "{}", debug);
        assert!(debug.contains("cap: 2"), "{}", debug);
    }

    // block the thread on a future with the crate's own polling.
    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        let mut fut = Box::pin(fut);
        crate::channel::polling::poll(&mut fut, crate::channel::polling::Timeout::Never)
            .expect("poll timed out with Timeout::Never")
    }

    #[tokio::test]
    async fn for_each_visits_all() {
        let channel = producer(2, true);
        let mut all = Vec::new();
        let result: Result<(), StickyError> = channel
            .for_each(|v| {
                all.push(v);
                Ok(())
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(all, vec![1, 2]);
    }

    #[tokio::test]
    async fn for_each_returns_callback_error() {
        let channel = producer(2, true);
        let result = channel
            .for_each(|_| -> anyhow::Result<()> { anyhow::bail!("unexpected eof") })
            .await;
        assert_eq!(result.unwrap_err().to_string(), "unexpected eof");
        channel.drain().await;
    }

    #[tokio::test]
    async fn for_each_returns_sticky_error() {
        let channel = Channel::<i32>::with_error(anyhow::anyhow!("unexpected eof"));
        let result: anyhow::Result<()> = channel
            .for_each(|_| panic!("should be unreachable"))
            .await;
        assert_eq!(result.unwrap_err().to_string(), "unexpected eof");
    }

    #[tokio::test]
    async fn collect_rest_keeps_partial_results() {
        let channel = Channel::with_size(3);
        channel.write(1).await;
        channel.write(2).await;
        channel.close_with_error(anyhow::anyhow!("boom"));
        let error = channel.collect_rest().await.unwrap_err();
        assert_eq!(error.values, vec![1, 2]);
        assert_eq!(error.cause.to_string(), "boom");
    }

    #[tokio::test]
    async fn cancelled_read_does_not_consume() {
        let channel = Channel::with_size(1);
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            channel.read_with_cancellation(&token).await,
            Err(CancellableReadError::Cancelled(CancelledError)),
        ));
        channel.write(5).await;
        // an already-cancelled token wins even if a message is ready
        assert!(matches!(
            channel.read_with_cancellation(&token).await,
            Err(CancellableReadError::Cancelled(CancelledError)),
        ));
        assert_eq!(channel.len(), 1);
        assert!(channel.err().is_none());
        assert_eq!(channel.read().await.unwrap(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancellation_unblocks_pending_read() {
        let channel = Channel::<i32>::new();
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        assert!(matches!(
            channel.read_with_cancellation(&token).await,
            Err(CancellableReadError::Cancelled(_)),
        ));
        assert!(!channel.is_closed());
    }

    #[tokio::test]
    async fn read_with_cancellation_observes_terminal() {
        let channel = Channel::<i32>::with_error(None::<StickyError>);
        let token = CancellationToken::new();
        assert!(matches!(
            channel.read_with_cancellation(&token).await,
            Err(CancellableReadError::Terminal(Terminal::EndOfStream)),
        ));
    }

    #[tokio::test]
    async fn cancelled_write_is_not_delivered() {
        let channel = Channel::new();
        let token = CancellationToken::new();
        token.cancel();
        let error = channel.write_with_cancellation(&token, 9).await.unwrap_err();
        assert_eq!(error.msg, 9);
        assert!(matches!(channel.read().try_now(), Err(TryReadError::WouldBlock(_))));
        assert!(!channel.is_closed());
    }

    #[tokio::test]
    async fn write_with_cancellation_delivers() {
        let channel = Channel::with_size(1);
        let token = CancellationToken::new();
        channel.write_with_cancellation(&token, 1).await.unwrap();
        assert_eq!(channel.read().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn collect_rest_with_cancellation_keeps_partial_results() {
        let channel = Channel::with_size(2);
        channel.write(1).await;
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        let error = channel.collect_rest_with_cancellation(&token).await.unwrap_err();
        assert_eq!(error.values, vec![1]);
        assert!(matches!(error.cause, CancellableError::Cancelled(_)));
        assert!(!channel.is_closed());
    }

    #[tokio::test]
    async fn for_each_with_cancellation_stops() {
        let channel = Channel::<i32>::new();
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<(), CancellableError> = channel
            .for_each_with_cancellation(&token, |_| Ok(()))
            .await;
        assert!(matches!(result, Err(CancellableError::Cancelled(_))));
    }

    #[tokio::test]
    async fn drain_with_cancellation() {
        let channel = Channel::with_size(2);
        channel.write(1).await;
        channel.write(2).await;
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        assert_eq!(channel.drain_with_cancellation(&token).await, Err(CancelledError));
        assert_eq!(channel.len(), 0);

        channel.close();
        assert_eq!(channel.drain_with_cancellation(&CancellationToken::new()).await, Ok(()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn read_fut_in_select() {
        let channel = Channel::<i32>::with_size(1);
        let send = channel.write_only();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            send.write(3).await;
        });
        let received = tokio::select! {
            result = channel.read() => result.unwrap(),
            () = tokio::time::sleep(Duration::from_secs(10)) => panic!("timed out"),
        };
        assert_eq!(received, 3);
    }

    #[cfg(feature = "futures")]
    #[tokio::test]
    async fn stream_yields_error_once() {
        use futures::StreamExt;

        let channel = Channel::with_size(2);
        channel.write(1).await;
        channel.close_with_error(anyhow::anyhow!("boom"));
        let items = channel.into_stream().collect::<Vec<_>>().await;
        assert_eq!(items.len(), 2);
        assert_eq!(*items[0].as_ref().unwrap(), 1);
        assert_eq!(items[1].as_ref().unwrap_err().to_string(), "boom");
    }

    #[test]
    fn stochastic_fifo() {
        for seed in 0..20 {
            let mut rng = new_rng(seed);
            let cap = rng.gen_range(0..4);
            let readers = rng.gen_range(1..4);
            let channel = Channel::with_size(cap);

            let joins = (0..readers)
                .map(|i| {
                    let recv = channel.read_only();
                    let mut rng = new_rng(seed * 100 + i);
                    thread::spawn(move || {
                        let mut got = Vec::new();
                        loop {
                            if rng.gen_ratio(1, 4) {
                                thread::yield_now();
                            }
                            match recv.read().block() {
                                Ok(v) => got.push(v),
                                Err(terminal) => {
                                    assert!(terminal.is_end_of_stream());
                                    return got;
                                }
                            }
                        }
                    })
                })
                .collect::<Vec<_>>();

            for i in 0..500 {
                if rng.gen_ratio(1, 4) {
                    thread::yield_now();
                }
                channel.write(i).block();
            }
            channel.close();

            let mut all = Vec::new();
            for join in joins {
                let got = join.join().unwrap();
                // each reader sees messages in write order
                assert!(got.windows(2).all(|w| w[0] < w[1]), "seed {}", seed);
                all.extend(got);
            }
            all.sort();
            assert_eq!(all, (0..500).collect::<Vec<_>>(), "seed {}", seed);
        }
    }
}
