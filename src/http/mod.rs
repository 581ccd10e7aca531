//! HTTP/1.1 over raw peer streams.
//!
//! # Data Flow
//! ```text
//! peer stream bytes
//!     → request.rs (request line, headers, body → Request<Bytes>)
//!     → [forwarding handler writes into sink.rs]
//!     → sink.rs (status, headers, body captured in memory)
//!     → response.rs (CapturedResponse → HTTP/1.1 bytes)
//!     → peer stream bytes
//!
//! Dialing side:
//!     client.rs (write request, read response)
//! ```
//!
//! # Design Decisions
//! - No hyper connection is involved; framing is done with httparse
//! - Bodies are fully buffered in both directions
//! - framing.rs holds the body rules shared by the server and client sides

pub mod client;
mod framing;
pub mod request;
pub mod response;
pub mod sink;

pub use client::{encode_request, fetch};
pub use request::{decode_request, DecodeLimits, DecodedRequest};
pub use response::encode_response;
pub use sink::{CapturedResponse, ResponseSink};
