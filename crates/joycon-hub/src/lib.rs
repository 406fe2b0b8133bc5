//! Connection and protocol management for JoyCon-family controllers.
//!
//! The entry point is [`Manager`]: feed it [`TransportEvent`]s from one
//! delivery thread, call [`Manager::poll`] when a deadline it returned
//! expires, and receive decoded state through an [`EventSink`].
//!
//! The manager serializes controller initialization system-wide: two
//! controllers pairing at the same instant never interleave their
//! subcommand traffic, which is the main failure mode of the shared
//! transport.

mod calibration;
mod controller;
mod engine;
mod error;
mod hid;
mod monitor;
mod registry;
mod scheduler;
mod transport;

pub use calibration::*;
pub use controller::*;
pub use error::*;
pub use hid::*;
pub use monitor::*;
pub use transport::*;

pub use joycon_wire;
