//! Control-message surface
//!
//! Requests are JSON objects with a required `request` field, optionally
//! accompanied by a JSEP envelope. Protocol violations map to the fixed
//! error codes (411-420, 499) and never mutate state. `list`, `update` and
//! `configure` are answered synchronously; everything else is queued to the
//! dispatcher worker and answered through the gateway's event channel.

pub mod dispatcher;
pub mod request;
pub mod response;

pub use dispatcher::ControlMessage;
pub use request::{Jsep, RecordParams, Request};
