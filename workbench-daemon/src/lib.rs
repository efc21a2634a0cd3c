//! Session runtime: channel transports, HTTP services and the control socket.

pub mod channels;
mod error;
pub mod http;
pub mod paths;
pub mod protocol;
mod runtime;

pub use channels::{pump, run_channel, ChannelEndpoint, PumpEnd};
pub use error::DaemonError;
pub use http::{status_error, HttpContainer, HttpStorage};
pub use protocol::{
    attach, request, request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
    TerminalChunk,
};
pub use runtime::{run, start_blocking, SessionLinks};
