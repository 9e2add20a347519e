//! debugsk daemon - background HTTP collector for debug events
//!
//! Two halves share this module:
//! - the ingest service that runs inside the daemon (`debugsk run`)
//! - the controller that starts, inspects and stops it from the CLI
//!
//! # Architecture
//!
//! The controller and the daemon never talk directly. They coordinate
//! through files in the logs directory.
//!
//! ```text
//! ┌──────────────┐   spawn (setsid)   ┌──────────────────────────────┐
//! │  Controller  │ ─────────────────► │        IngestServer          │
//! │ start/status │                    │  router │ idle │ shutdown    │
//! │     stop     │ ◄── runtime.json ─ ├──────────────────────────────┤
//! └──────────────┘     server.pid     │ <session>-<run>.jsonl appends│
//!                                     └──────────────────────────────┘
//! ```

pub mod controller;
pub mod idle;
pub mod ingest;
pub mod net;
pub mod paths;
pub mod process;
pub mod runtime;
pub mod server;
pub mod shutdown;

pub use controller::{Controller, StartOutcome, StatusReport, StopOutcome};
pub use runtime::{Descriptor, RuntimeInfo};
pub use server::{run_foreground, IngestServer};
pub use shutdown::{ShutdownCoordinator, ShutdownHandle, ShutdownReason};
