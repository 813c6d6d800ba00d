//! Ready-made components built on the runtime.

pub mod cron;
pub mod http;

pub use cron::{Job, Schedule};
pub use http::{HttpServer, ServerHandle};
