// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::frame::{Frame, FrameParser};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// An open server-sent-events response read frame by frame.
///
/// Unlike [`RelayChannel`](crate::RelayChannel) nothing runs in the
/// background: frames are pulled when the caller asks for them, and
/// dropping the stream hangs up.
pub struct EventStream {
    status: u16,
    content_type: String,
    frames: BoxStream<'static, Frame>,
    finished: bool,
}

impl EventStream {
    /// Wrap a response's status, content type and frame stream.
    pub fn new<S>(status: u16, content_type: impl Into<String>, frames: S) -> Self
    where
        S: Stream<Item = Frame> + Send + 'static,
    {
        Self {
            status,
            content_type: content_type.into(),
            frames: frames.boxed(),
            finished: false,
        }
    }

    /// HTTP status of the response.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// `Content-Type` of the response, empty when absent.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Returns `true` once the server has ended the response.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The next frame, or `None` when `timeout` passes first or the
    /// response ends.
    pub async fn next_frame(&mut self, timeout: Duration) -> Option<Frame> {
        if self.finished {
            return None;
        }
        match tokio::time::timeout(timeout, self.frames.next()).await {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(_) => None,
        }
    }

    /// The next frame whose `event:` field is `event`, skipping others.
    /// Gives up at the deadline or when the response ends.
    pub async fn next_named(&mut self, event: &str, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return None;
            }
            let frame = self.next_frame(left).await?;
            if frame.event.as_deref() == Some(event) {
                return Some(frame);
            }
        }
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Turn a stream of raw body chunks into SSE frames. The frame stream ends
/// when the chunk stream ends or yields an error.
pub fn decode_frames<S, B, E>(chunks: S) -> impl Stream<Item = Frame> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Send + 'static,
{
    let state = (chunks, FrameParser::new(), VecDeque::new());
    stream::unfold(state, |(mut chunks, mut parser, mut ready)| async move {
        loop {
            if let Some(frame) = ready.pop_front() {
                return Some((frame, (chunks, parser, ready)));
            }
            match chunks.next().await {
                Some(Ok(chunk)) => ready.extend(parser.push(chunk.as_ref())),
                Some(Err(_)) | None => return None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<&'static [u8], ()>> + Send + Unpin {
        stream::iter(parts.iter().map(|p| Ok(p.as_bytes())).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn frames_decode_across_chunk_boundaries() {
        let frames = decode_frames(chunks(&["event: state\nda", "ta: {\"a\":1}\n\nevent: ping\ndata: {}\n\n"]));
        let mut es = EventStream::new(200, "text/event-stream", frames);
        let first = es.next_frame(Duration::from_secs(1)).await.unwrap();
        assert_eq!(first.event.as_deref(), Some("state"));
        assert_eq!(first.data, "{\"a\":1}");
        assert!(es.next_frame(Duration::from_secs(1)).await.is_some());
        assert!(es.next_frame(Duration::from_secs(1)).await.is_none());
        assert!(es.is_finished());
    }

    #[tokio::test]
    async fn named_wait_skips_other_events() {
        let frames = decode_frames(chunks(&["event: ping\ndata: {}\n\nevent: state\ndata: {}\n\n"]));
        let mut es = EventStream::new(200, "text/event-stream", frames);
        let state = es.next_named("state", Duration::from_secs(1)).await.unwrap();
        assert_eq!(state.event.as_deref(), Some("state"));
    }

    #[tokio::test]
    async fn idle_stream_times_out_without_finishing() {
        let mut es = EventStream::new(200, "text/event-stream", stream::pending::<Frame>());
        assert!(es.next_frame(Duration::from_millis(20)).await.is_none());
        assert!(!es.is_finished());
    }

    #[tokio::test]
    async fn chunk_error_ends_the_stream() {
        let failing = stream::iter(vec![Ok::<&[u8], &str>(b"data: 1\n\n"), Err("reset")]);
        let mut es = EventStream::new(200, "", decode_frames(failing));
        assert!(es.next_frame(Duration::from_secs(1)).await.is_some());
        assert!(es.next_frame(Duration::from_secs(1)).await.is_none());
        assert!(es.is_finished());
    }
}
