//! Bluetooth Module
//!
//! BLE communication with the desk's motor controller.
//!
//! ## Modules
//!
//! - [`protocol`] - endpoint UUIDs, command codes, and the telemetry codec
//! - [`scanner`] - adapter selection and device discovery
//! - [`session`] - the desk session owning the connection and all commands

pub mod protocol;
pub mod scanner;
pub mod session;

pub use session::DeskSession;
