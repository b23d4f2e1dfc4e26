// channel error types.

use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
    sync::Arc,
};


// ==== base error types ====


/// Error for an operation abandoned because its cancellation token fired
///
/// Cancellation is local to the operation that observed it: it is never stored on a channel, and
/// never closes one.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, thiserror::Error)]
#[error("operation cancelled")]
pub struct CancelledError;

/// Error for attempting to use a channel with no or limited blocking, and the operation not
/// completing immediately or by the specified deadline
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, thiserror::Error)]
#[error("operation would block")]
pub struct WouldBlockError;

/// Explicit error a channel was terminated with
///
/// Sticky errors are shared: every reader of the channel observes the same instance, which can be
/// checked with [`ptr_eq`](Self::ptr_eq). Cloning is cheap.
#[derive(Clone)]
pub struct StickyError(Arc<anyhow::Error>);

impl StickyError {
    /// Wrap an error
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        StickyError(Arc::new(anyhow::Error::new(error)))
    }

    /// Construct from a printable message
    pub fn msg<M>(message: M) -> Self
    where
        M: Display + Debug + Send + Sync + 'static,
    {
        StickyError(Arc::new(anyhow::Error::msg(message)))
    }

    /// Whether the wrapped error is of type `E`
    pub fn is<E>(&self) -> bool
    where
        E: Display + Debug + Send + Sync + 'static,
    {
        self.0.is::<E>()
    }

    /// Borrow the wrapped error as `E`, if it is one
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: Display + Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Whether `self` and `other` are the same error instance
    pub fn ptr_eq(&self, other: &StickyError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Borrow the wrapped [`anyhow::Error`]
    pub fn as_anyhow(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<anyhow::Error> for StickyError {
    fn from(error: anyhow::Error) -> Self {
        StickyError(Arc::new(error))
    }
}

impl From<CancelledError> for StickyError {
    fn from(error: CancelledError) -> Self {
        StickyError::new(error)
    }
}

impl Debug for StickyError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Debug::fmt(&*self.0, f)
    }
}

impl Display for StickyError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Display::fmt(&*self.0, f)
    }
}

impl Error for StickyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}


// ==== compound error types ====


macro_rules! compound_from {
    ($compound:ident {$(
        $variant:ident($inner:ty),
    )*})=>{$(
        impl From<$inner> for $compound {
            fn from(inner: $inner) -> Self {
                Self::$variant(inner)
            }
        }
    )*};
}

/// Terminal state of a channel
///
/// Once set, this never changes, and every read of the channel that finds no more buffered
/// messages returns it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Terminal {
    /// The channel was closed without an explicit error
    #[error("end of stream")]
    EndOfStream,
    /// The channel was closed with an explicit error
    #[error(transparent)]
    Failed(StickyError),
}

compound_from!(Terminal {
    Failed(StickyError),
});

impl From<anyhow::Error> for Terminal {
    fn from(error: anyhow::Error) -> Self {
        Terminal::Failed(error.into())
    }
}

impl From<CancelledError> for Terminal {
    fn from(error: CancelledError) -> Self {
        Terminal::Failed(error.into())
    }
}

/// `None` is treated as end-of-stream
impl From<Option<StickyError>> for Terminal {
    fn from(error: Option<StickyError>) -> Self {
        error.map(Terminal::Failed).unwrap_or(Terminal::EndOfStream)
    }
}

impl Terminal {
    /// Whether this is the end-of-stream state
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Terminal::EndOfStream)
    }

    /// Borrow the explicit error, if there is one
    pub fn error(&self) -> Option<&StickyError> {
        match self {
            Terminal::EndOfStream => None,
            Terminal::Failed(error) => Some(error),
        }
    }

    /// Convert into a result, wherein end-of-stream counts as success
    pub fn into_result(self) -> Result<(), StickyError> {
        match self {
            Terminal::EndOfStream => Ok(()),
            Terminal::Failed(error) => Err(error),
        }
    }
}

/// Error for reading from a channel with a cancellation token
#[derive(Debug, Clone, thiserror::Error)]
pub enum CancellableReadError {
    /// The channel has entered its terminal state and no buffered messages remain
    #[error(transparent)]
    Terminal(Terminal),
    /// The cancellation token fired first
    #[error(transparent)]
    Cancelled(CancelledError),
}

compound_from!(CancellableReadError {
    Terminal(Terminal),
    Cancelled(CancelledError),
});

/// Error for reading from a channel with no or limited blocking
#[derive(Debug, Clone, thiserror::Error)]
pub enum TryReadError {
    /// The channel has entered its terminal state and no buffered messages remain
    #[error(transparent)]
    Terminal(Terminal),
    /// The operation could not be resolved immediately or by the specified deadline
    #[error(transparent)]
    WouldBlock(WouldBlockError),
}

compound_from!(TryReadError {
    Terminal(Terminal),
    WouldBlock(WouldBlockError),
});

/// Error for a cancellable bulk operation
///
/// End-of-stream is not an error for bulk operations, so only an explicit sticky error or the
/// cancellation remain.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CancellableError {
    /// The channel was closed with an explicit error
    #[error(transparent)]
    Failed(StickyError),
    /// The cancellation token fired first
    #[error(transparent)]
    Cancelled(CancelledError),
}

compound_from!(CancellableError {
    Failed(StickyError),
    Cancelled(CancelledError),
});


// ==== error types carrying data ====


/// Error for a write which did not deliver its message
///
/// The message is guaranteed to not have been delivered to any reader, and is handed back.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WriteError<T, E> {
    /// The message that was not written
    pub msg: T,
    /// The reason the message was not written
    pub cause: E,
}

impl<T, E: Debug> Debug for WriteError<T, E> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("WriteError")
            .field("msg", &format_args!(".."))
            .field("cause", &self.cause)
            .finish()
    }
}

impl<T, E: Display> Display for WriteError<T, E> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "message not written: {}", self.cause)
    }
}

impl<T, E: Error + 'static> Error for WriteError<T, E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.cause)
    }
}

/// Error for collecting the rest of a channel's messages
///
/// The messages read before the error occurred are not discarded.
#[derive(Clone)]
pub struct CollectError<T, E> {
    /// The messages read before the error occurred, in order
    pub values: Vec<T>,
    /// The error which stopped the collection
    pub cause: E,
}

impl<T, E: Debug> Debug for CollectError<T, E> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("CollectError")
            .field("values", &format_args!("[..; {}]", self.values.len()))
            .field("cause", &self.cause)
            .finish()
    }
}

impl<T, E: Display> Display for CollectError<T, E> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "collection stopped after {} messages: {}", self.values.len(), self.cause)
    }
}

impl<T, E: Error + 'static> Error for CollectError<T, E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.cause)
    }
}
