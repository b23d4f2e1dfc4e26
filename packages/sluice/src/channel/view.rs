// read-only and write-only projections of a channel.

use super::{
    api::{
        future::*,
        Channel,
    },
    error::*,
};
use std::fmt::{self, Debug, Formatter};
use tokio_util::sync::CancellationToken;


/// Read side of a [`Channel`]
///
/// Obtained with [`Channel::read_only`]. Exposes the read operations, the bulk reading helpers,
/// and introspection, but none of the write or termination operations. The view is a handle to
/// the same channel: it observes the same buffer and the same sticky terminal state.
pub struct ReadOnly<T>(Channel<T>);

impl<T> ReadOnly<T> {
    pub(crate) fn new(channel: Channel<T>) -> Self {
        ReadOnly(channel)
    }

    /// See [`Channel::read`]
    pub fn read(&self) -> ReadFut<T> {
        self.0.read()
    }

    /// See [`Channel::read_with_cancellation`]
    pub async fn read_with_cancellation(
        &self,
        token: &CancellationToken,
    ) -> Result<T, CancellableReadError> {
        self.0.read_with_cancellation(token).await
    }

    /// See [`Channel::for_each`]
    pub async fn for_each<F, E>(&self, f: F) -> Result<(), E>
    where
        F: FnMut(T) -> Result<(), E>,
        E: From<StickyError>,
    {
        self.0.for_each(f).await
    }

    /// See [`Channel::for_each_with_cancellation`]
    pub async fn for_each_with_cancellation<F, E>(
        &self,
        token: &CancellationToken,
        f: F,
    ) -> Result<(), E>
    where
        F: FnMut(T) -> Result<(), E>,
        E: From<StickyError> + From<CancelledError>,
    {
        self.0.for_each_with_cancellation(token, f).await
    }

    /// See [`Channel::collect_rest`]
    pub async fn collect_rest(&self) -> Result<Vec<T>, CollectError<T, StickyError>> {
        self.0.collect_rest().await
    }

    /// See [`Channel::collect_rest_with_cancellation`]
    pub async fn collect_rest_with_cancellation(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<T>, CollectError<T, CancellableError>> {
        self.0.collect_rest_with_cancellation(token).await
    }

    /// See [`Channel::drain`]
    pub async fn drain(&self) {
        self.0.drain().await
    }

    /// See [`Channel::drain_with_cancellation`]
    pub async fn drain_with_cancellation(
        &self,
        token: &CancellationToken,
    ) -> Result<(), CancelledError> {
        self.0.drain_with_cancellation(token).await
    }

    /// See [`Channel::into_stream`]
    #[cfg(feature = "futures")]
    pub fn into_stream(self) -> impl futures::Stream<Item = Result<T, StickyError>> {
        self.0.into_stream()
    }

    /// See [`Channel::len`]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// See [`Channel::is_empty`]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// See [`Channel::cap`]
    pub fn cap(&self) -> usize {
        self.0.cap()
    }

    /// See [`Channel::err`]
    pub fn err(&self) -> Option<Terminal> {
        self.0.err()
    }

    /// See [`Channel::is_closed`]
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    pub(crate) fn channel(&self) -> &Channel<T> {
        &self.0
    }
}

impl<T> Clone for ReadOnly<T> {
    fn clone(&self) -> Self {
        ReadOnly(self.0.clone())
    }
}

impl<T> Debug for ReadOnly<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_tuple("ReadOnly").field(&self.0).finish()
    }
}


/// Write side of a [`Channel`]
///
/// Obtained with [`Channel::write_only`]. Exposes the write and termination operations and
/// introspection, but none of the read operations.
pub struct WriteOnly<T>(Channel<T>);

impl<T> WriteOnly<T> {
    pub(crate) fn new(channel: Channel<T>) -> Self {
        WriteOnly(channel)
    }

    /// See [`Channel::write`]
    pub fn write(&self, msg: T) -> WriteFut<T> {
        self.0.write(msg)
    }

    /// See [`Channel::write_with_cancellation`]
    pub async fn write_with_cancellation(
        &self,
        token: &CancellationToken,
        msg: T,
    ) -> Result<(), WriteError<T, CancelledError>> {
        self.0.write_with_cancellation(token, msg).await
    }

    /// See [`Channel::set_error`]
    pub fn set_error(&self, error: impl Into<Terminal>) {
        self.0.set_error(error)
    }

    /// See [`Channel::close`]
    pub fn close(&self) {
        self.0.close()
    }

    /// See [`Channel::close_with_error`]
    pub fn close_with_error(&self, error: impl Into<Terminal>) {
        self.0.close_with_error(error)
    }

    /// See [`Channel::len`]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// See [`Channel::is_empty`]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// See [`Channel::cap`]
    pub fn cap(&self) -> usize {
        self.0.cap()
    }

    /// See [`Channel::err`]
    pub fn err(&self) -> Option<Terminal> {
        self.0.err()
    }

    /// See [`Channel::is_closed`]
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

impl<T> Clone for WriteOnly<T> {
    fn clone(&self) -> Self {
        WriteOnly(self.0.clone())
    }
}

impl<T> Debug for WriteOnly<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_tuple("WriteOnly").field(&self.0).finish()
    }
}
