//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound stream from a remote peer
//!     → iroh.rs (accept loop per connection, one task per stream)
//!     → stream.rs (byte stream tagged with the remote identity)
//!     → session.rs (authorize, decode, forward, encode, close)
//!     → connection.rs (session ids, active-session tracking)
//!
//! Session States:
//!     Opened → Authorizing → Decoding → Forwarding → Encoding → Closed
//! ```
//!
//! # Design Decisions
//! - Sessions share nothing but the allow list and the forwarding handler
//! - The transport is a seam: anything producing a `PeerStream` can feed a `Bridge`

pub mod connection;
pub mod iroh;
pub mod session;
pub mod stream;

pub use connection::{SessionGuard, SessionId, SessionTracker};
pub use session::{Bridge, SessionOutcome, SessionSettings, SessionState};
pub use stream::{IdentifiedStream, PeerIdentity, PeerStream};
