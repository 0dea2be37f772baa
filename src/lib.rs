//! Development-time network and log capture.
//!
//! The producer side wraps an application's outbound HTTP client, socket
//! connector and logging entry points, encodes what it sees into envelopes
//! and ships them over a relay to an observer process. The observer side
//! rebuilds a live record set from that stream.

pub mod capture;
pub mod config;
pub mod envelope;
pub mod error;
pub mod intercept;
pub mod observer;
pub mod sdk;
pub mod transport;
pub mod types;
pub mod util;

pub use envelope::Envelope;
pub use sdk::DevLens;
