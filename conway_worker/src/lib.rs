//! Runs a service on an isolated worker thread and calls it asynchronously.
//!
//! The host talks to the worker only through JSON frames on channels: call
//! frames out, reply frames back, and a separate stream of property-change
//! notifications. [`Bridge`] is the untyped gateway; [`BoardClient`] is the
//! typed stub for a Game of Life [`conway::GridEngine`].
//!
//! ```no_run
//! use conway::GridConstraints;
//! use conway_worker::{BoardClient, BoardService, WorkerOptions};
//!
//! # async fn run() -> Result<(), conway_worker::BridgeError> {
//! let board = BoardClient::spawn(GridConstraints::bounded(32, 32), WorkerOptions::default())?;
//! board.randomize().await?;
//! board.tick().await?;
//! let cells = board.state().await?;
//! assert_eq!(cells.len(), 32 * 32);
//! # Ok(())
//! # }
//! ```

mod board;
mod bridge;
pub mod envelope;
mod error;
mod kernel;

pub use board::{BoardClient, BoardService, render_board};
pub use bridge::{Bridge, PendingCall, PropertyWatch, WorkerOptions};
pub use error::{ArgError, BridgeError};
pub use kernel::{
    Args, Completion, HandlerResult, Kernel, MethodTable, Notifier, Service, UnknownMethodPolicy,
};
