// SPDX-License-Identifier: MIT OR Apache-2.0
//! jct-relay
//!
//! Client for an externally hosted push-notification relay. A
//! [`RelayChannel`] allocates a channel URL, keeps one long-lived
//! server-sent-events read open in a background task, and appends every
//! received payload to an [`EventBuffer`] that test bodies poll with
//! soft deadlines.
//!
//! [`EventStream`] is the pull-based counterpart used for a server's own
//! event-source endpoint.
//!
//! The relay is best effort: failing to reach it yields no channel rather
//! than an error, and waits return what they have at the deadline.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod cancel;
mod channel;
mod frame;
mod stream;

pub use buffer::{EventBuffer, POLL_INTERVAL};
pub use cancel::CancellationToken;
pub use channel::{READY_TIMEOUT, RelayChannel};
pub use frame::{Frame, FrameParser};
pub use stream::{EventStream, decode_frames};

/// Errors raised while talking to the relay.
///
/// These never escape [`RelayChannel::connect`]; they are logged and the
/// channel is treated as unavailable.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The relay could not be reached or the stream broke.
    #[error("relay request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The relay answered without handing out a channel.
    #[error("relay returned status {status} without a channel location")]
    NoChannel {
        /// HTTP status of the allocation response.
        status: u16,
    },
    /// The `Location` header was not a usable URL.
    #[error("relay channel location is invalid: {0}")]
    BadLocation(String),
}
