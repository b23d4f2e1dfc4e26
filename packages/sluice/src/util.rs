//! Internal utilities.

pub(crate) mod close_on_drop;
