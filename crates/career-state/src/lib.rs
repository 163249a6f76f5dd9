//! # Career State
//!
//! Single-threaded reactive primitives and the world state they observe.
//!
//! - [`Handler`] - A callback with a stable identity
//! - [`Signal`] - Stateless multicast event
//! - [`Observable`] - State cell that pushes its value to subscribers and
//!   reports first/last subscriber transitions
//! - [`WorldState`] - Keyed store of observable counters

pub mod observable;
pub mod signal;
pub mod store;

pub use observable::{Lifecycle, Observable};
pub use signal::{Handler, Signal};
pub use store::{WorldSnapshot, WorldState};
