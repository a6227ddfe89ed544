// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::buffer::EventBuffer;
use crate::cancel::CancellationToken;
use crate::frame::FrameParser;
use crate::RelayError;
use futures::StreamExt;
use reqwest::header::{ACCEPT, LOCATION};
use reqwest::redirect::Policy;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// How long [`RelayChannel::connect`] waits for the `ready` frame.
pub const READY_TIMEOUT: Duration = Duration::from_millis(5000);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("jmap-test-relay/", env!("CARGO_PKG_VERSION"));

/// A live subscription to one relay channel.
///
/// Dropping the channel cancels the background reader.
#[derive(Debug)]
pub struct RelayChannel {
    url: String,
    buffer: EventBuffer,
    cancel: CancellationToken,
}

impl RelayChannel {
    /// Allocate a channel on `relay_base` and start reading it.
    ///
    /// Returns `None` when the relay cannot be reached or hands out no
    /// channel.
    pub async fn connect(relay_base: &str) -> Option<Self> {
        Self::connect_with(relay_base, READY_TIMEOUT).await
    }

    /// [`connect`](Self::connect) with an explicit `ready` wait.
    pub async fn connect_with(relay_base: &str, ready_timeout: Duration) -> Option<Self> {
        match Self::open(relay_base, ready_timeout).await {
            Ok(channel) => Some(channel),
            Err(err) => {
                warn!(target: "jct.relay", relay = relay_base, error = %err, "push relay unavailable");
                None
            }
        }
    }

    async fn open(relay_base: &str, ready_timeout: Duration) -> Result<Self, RelayError> {
        let url = allocate(relay_base).await?;
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        let buffer = EventBuffer::new();
        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(read_loop(
            http,
            url.clone(),
            buffer.clone(),
            cancel.clone(),
            ready_tx,
        ));
        match tokio::time::timeout(ready_timeout, ready_rx).await {
            Ok(Ok(())) => info!(target: "jct.relay", channel = %url, "relay channel ready"),
            Ok(Err(_)) => debug!(target: "jct.relay", channel = %url, "relay stream ended before ready"),
            Err(_) => warn!(target: "jct.relay", channel = %url, "relay not ready in time, continuing"),
        }
        Ok(Self { url, buffer, cancel })
    }

    /// The channel URL servers should post to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Every event received so far.
    pub fn events(&self) -> Vec<Value> {
        self.buffer.snapshot()
    }

    /// The shared event buffer.
    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    /// Forget every buffered event.
    pub fn clear(&self) {
        self.buffer.clear();
    }

    /// See [`EventBuffer::wait_for_count`].
    pub async fn wait_for_count(&self, count: usize, timeout: Duration) -> Vec<Value> {
        self.buffer.wait_for_count(count, timeout).await
    }

    /// See [`EventBuffer::wait_for_match`].
    pub async fn wait_for_match<F>(&self, predicate: F, timeout: Duration) -> Option<Value>
    where
        F: Fn(&Value) -> bool,
    {
        self.buffer.wait_for_match(predicate, timeout).await
    }

    /// Stop the background reader. Idempotent.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            debug!(target: "jct.relay", channel = %self.url, "closing relay channel");
        }
        self.cancel.cancel();
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for RelayChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// `GET {base}/new` without following redirects; the `Location` header names
/// the channel.
async fn allocate(relay_base: &str) -> Result<String, RelayError> {
    let http = reqwest::Client::builder()
        .redirect(Policy::none())
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(CONNECT_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()?;
    let resp = http
        .get(format!("{}/new", relay_base.trim_end_matches('/')))
        .send()
        .await?;
    let status = resp.status();
    if let Some(location) = resp.headers().get(LOCATION) {
        let location = location
            .to_str()
            .map_err(|e| RelayError::BadLocation(e.to_string()))?;
        let url = resp
            .url()
            .join(location)
            .map_err(|e| RelayError::BadLocation(e.to_string()))?;
        return Ok(url.to_string());
    }
    if status.is_success() {
        return Ok(resp.url().to_string());
    }
    Err(RelayError::NoChannel {
        status: status.as_u16(),
    })
}

async fn read_loop(
    http: reqwest::Client,
    url: String,
    buffer: EventBuffer,
    cancel: CancellationToken,
    ready: oneshot::Sender<()>,
) {
    let mut ready = Some(ready);
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(target: "jct.relay", channel = %url, "relay reader cancelled");
        }
        outcome = pump(&http, &url, &buffer, &mut ready) => match outcome {
            Ok(()) => debug!(target: "jct.relay", channel = %url, "relay stream closed"),
            Err(err) if cancel.is_cancelled() => {
                debug!(target: "jct.relay", error = %err, "relay read interrupted by close");
            }
            Err(err) => warn!(target: "jct.relay", channel = %url, error = %err, "relay stream failed"),
        },
    }
}

async fn pump(
    http: &reqwest::Client,
    url: &str,
    buffer: &EventBuffer,
    ready: &mut Option<oneshot::Sender<()>>,
) -> Result<(), RelayError> {
    let resp = http
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await?
        .error_for_status()?;
    let mut stream = resp.bytes_stream();
    let mut parser = FrameParser::new();
    while let Some(chunk) = stream.next().await {
        for frame in parser.push(&chunk?) {
            if frame.is_ready() {
                if let Some(tx) = ready.take() {
                    let _ = tx.send(());
                }
                continue;
            }
            match frame.payload() {
                Some(event) => {
                    debug!(target: "jct.relay", "relay event received");
                    buffer.push(event);
                }
                None => debug!(target: "jct.relay", "skipping non-JSON relay frame"),
            }
        }
    }
    Ok(())
}
