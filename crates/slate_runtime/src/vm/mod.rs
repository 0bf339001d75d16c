//! Stack-machine execution: activation frames and the dispatch loop.

mod dispatch;
mod frame;

pub(crate) use dispatch::run_object;

/// Name of the frame-private dynamic variable the argument list of a
/// call is bound to.
pub const ARGS_VAR: &str = "...";
