//! Drop guard for channels owned by a detached task.

use crate::{
    Channel,
    Terminal,
    StickyError,
};


/// Wrapper around a channel that closes it if dropped.
///
/// The owning task should end by calling [`close`](Self::close). If the guard is dropped instead,
/// which happens when the task panics or is dropped by the runtime, the channel is closed with an
/// explicit error, so that its readers never wait on a task that no longer exists.
pub(crate) struct CloseOnDrop<T>(Option<Channel<T>>);

impl<T> CloseOnDrop<T> {
    /// Wrap the channel.
    pub(crate) fn new(channel: Channel<T>) -> Self {
        CloseOnDrop(Some(channel))
    }

    /// Borrow the wrapped channel.
    pub(crate) fn channel(&self) -> &Channel<T> {
        self.0.as_ref().expect("CloseOnDrop channel taken before drop (internal bug)")
    }

    /// Close the channel with the given terminal state, disarming the guard.
    pub(crate) fn close(mut self, terminal: Terminal) {
        if let Some(channel) = self.0.take() {
            if !channel.try_close(terminal) {
                warn!("channel guarded by CloseOnDrop was already closed");
            }
        }
    }
}

impl<T> Drop for CloseOnDrop<T> {
    fn drop(&mut self) {
        if let Some(channel) = self.0.take() {
            warn!("task owning channel ended without closing it");
            channel.try_close(StickyError::msg(ABANDONED).into());
        }
    }
}

pub(crate) const ABANDONED: &str = "intercept relay task ended without closing its output";
