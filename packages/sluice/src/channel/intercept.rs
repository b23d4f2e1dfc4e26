// piping one channel into another through a callback.

use super::{
    api::Channel,
    view::ReadOnly,
    error::*,
    polling::{Timeout, poll},
};
use crate::util::close_on_drop::CloseOnDrop;
use std::thread;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;


impl<T: Send + 'static> Channel<T> {
    /// Pipe this channel's messages through `f` into a new channel
    ///
    /// Spawns a detached tokio task which reads every message from this channel, passes it to `f`
    /// and, if `f` accepts it, writes it into a new zero-capacity channel, whose read side is
    /// returned.
    ///
    /// - If `f` returns an error, the relay stops, the message `f` rejected is not forwarded, and
    ///   the new channel is closed with that error. Returning [`Terminal::EndOfStream`] stops the
    ///   relay without an error.
    /// - Once this channel is closed and drained, the new channel is closed with the same
    ///   terminal state, that is, with the very same [`StickyError`] instance if there is one.
    /// - If the relay task panics, the new channel is closed with an explicit error.
    ///
    /// Within a tokio runtime the relay is spawned onto it. Otherwise it runs on a dedicated
    /// thread, so this can also be used from plain threads.
    ///
    /// The relay holds a handle to this channel and blocks writing into the new one. If all
    /// readers of the new channel are dropped while the relay is blocked, the relay stays blocked
    /// until the runtime shuts down, or forever if it runs on its own thread.
    pub fn intercept<F, E>(&self, f: F) -> ReadOnly<T>
    where
        F: FnMut(&T) -> Result<(), E> + Send + 'static,
        E: Into<Terminal>,
    {
        spawn_relay(self.clone(), None, f)
    }

    /// Pipe this channel's messages through `f` into a new channel, until the cancellation token
    /// fires
    ///
    /// Same as [`intercept`](Self::intercept), except that reads and writes of the relay are
    /// cancellable. If the token fires, the new channel is closed with an error wrapping
    /// [`CancelledError`], and this channel is left open. A message already accepted by `f` is
    /// lost if the token fires while it is being written.
    pub fn intercept_with_cancellation<F, E>(&self, token: CancellationToken, f: F) -> ReadOnly<T>
    where
        F: FnMut(&T) -> Result<(), E> + Send + 'static,
        E: Into<Terminal>,
    {
        spawn_relay(self.clone(), Some(token), f)
    }
}

impl<T: Send + 'static> ReadOnly<T> {
    /// See [`Channel::intercept`]
    pub fn intercept<F, E>(&self, f: F) -> ReadOnly<T>
    where
        F: FnMut(&T) -> Result<(), E> + Send + 'static,
        E: Into<Terminal>,
    {
        self.channel().intercept(f)
    }

    /// See [`Channel::intercept_with_cancellation`]
    pub fn intercept_with_cancellation<F, E>(&self, token: CancellationToken, f: F) -> ReadOnly<T>
    where
        F: FnMut(&T) -> Result<(), E> + Send + 'static,
        E: Into<Terminal>,
    {
        self.channel().intercept_with_cancellation(token, f)
    }
}

// create the downstream channel and spawn the task relaying into it.
fn spawn_relay<T, F, E>(
    upstream: Channel<T>,
    token: Option<CancellationToken>,
    f: F,
) -> ReadOnly<T>
where
    T: Send + 'static,
    F: FnMut(&T) -> Result<(), E> + Send + 'static,
    E: Into<Terminal>,
{
    let downstream = Channel::new();
    let output = CloseOnDrop::new(downstream.clone());
    let task = async move {
        trace!(cancellable = token.is_some(), "intercept relay started");
        let terminal = relay(&upstream, &output, token.as_ref(), f).await;
        trace!(%terminal, "intercept relay finished");
        output.close(terminal);
    };
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => {
            // outside a runtime, the relay gets a thread of its own
            trace!("no tokio runtime, relaying on a dedicated thread");
            thread::spawn(move || {
                let mut task = Box::pin(task);
                poll(&mut task, Timeout::Never);
            });
        }
    }
    downstream.read_only()
}

// relay messages until one side terminates, returning the terminal state for the output.
async fn relay<T, F, E>(
    upstream: &Channel<T>,
    output: &CloseOnDrop<T>,
    token: Option<&CancellationToken>,
    mut f: F,
) -> Terminal
where
    F: FnMut(&T) -> Result<(), E>,
    E: Into<Terminal>,
{
    loop {
        let read = match token {
            Some(token) => upstream.read_with_cancellation(token).await,
            None => upstream.read().await.map_err(CancellableReadError::from),
        };
        let msg = match read {
            Ok(msg) => msg,
            Err(CancellableReadError::Terminal(terminal)) => return terminal,
            Err(CancellableReadError::Cancelled(e)) => return e.into(),
        };

        let accepted: Result<(), Terminal> = f(&msg).map_err(Into::into);
        if let Err(terminal) = accepted {
            return terminal;
        }

        match token {
            Some(token) => {
                if let Err(e) = output.channel().write_with_cancellation(token, msg).await {
                    return e.cause.into();
                }
            }
            None => output.channel().write(msg).await,
        }
    }
}
