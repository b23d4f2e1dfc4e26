//! Channels with a sticky terminal state.
//!
//! A [`Channel`] is a bounded (or zero-capacity, rendezvous) FIFO queue between concurrent tasks.
//! Once closed, every past, present, and future reader observes the same terminal state: either
//! [`Terminal::EndOfStream`], or an explicit [`StickyError`] shared by all of them. Reading and
//! writing is possible both from async code (the read and write operations are futures) and from
//! plain threads (by blocking on those futures).
//!
//! ```no_run
//! # async fn demo() {
//! use sluice::Channel;
//!
//! let channel = Channel::with_size(3);
//! let (send, recv) = (channel.write_only(), channel.read_only());
//!
//! send.write(1).await;
//! send.write(2).await;
//! send.close_with_error(anyhow::anyhow!("no more numbers"));
//!
//! let err = recv.collect_rest().await.unwrap_err();
//! assert_eq!(err.values, vec![1, 2]);
//! // the error is sticky: every reader sees it, forever
//! assert!(recv.err().unwrap().error().unwrap().ptr_eq(&err.cause));
//! # }
//! ```

#[macro_use]
extern crate tracing;

pub extern crate tokio_util;

mod channel;
mod util;

pub use crate::channel::{
    api::*,
    view::*,
};

/// Error types
pub mod error {
    pub use crate::channel::error::*;
}

/// Future types
pub mod future {
    pub use crate::channel::api::future::*;
}

pub use crate::error::{StickyError, Terminal};
pub use tokio_util::sync::CancellationToken;
