// SPDX-License-Identifier: MIT OR Apache-2.0
use serde_json::Value;

/// One server-sent-events frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// The `event:` field, if present.
    pub event: Option<String>,
    /// Every `data:` line, joined with `\n`.
    pub data: String,
}

impl Frame {
    /// Returns `true` for the relay's `ready` control frame.
    pub fn is_ready(&self) -> bool {
        self.event.as_deref() == Some("ready")
    }

    /// The event payload: the envelope's `body` when present, otherwise the
    /// whole JSON document. `None` when `data` is not JSON.
    pub fn payload(&self) -> Option<Value> {
        let doc: Value = serde_json::from_str(&self.data).ok()?;
        match doc.get("body") {
            Some(body) => Some(body.clone()),
            None => Some(doc),
        }
    }

    fn parse(block: &str) -> Option<Self> {
        let mut frame = Frame::default();
        let mut data_lines: Vec<&str> = Vec::new();
        for line in block.split('\n') {
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => frame.event = Some(value.to_string()),
                "data" => data_lines.push(value),
                _ => {}
            }
        }
        if frame.event.is_none() && data_lines.is_empty() {
            return None;
        }
        frame.data = data_lines.join("\n");
        Some(frame)
    }
}

/// Incremental SSE parser fed with raw chunks from the wire.
#[derive(Debug, Default)]
pub struct FrameParser {
    pending: Vec<u8>,
}

impl FrameParser {
    /// A parser with nothing buffered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.pending.extend(chunk.iter().copied().filter(|b| *b != b'\r'));
        let mut frames = Vec::new();
        while let Some(end) = self.pending.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.pending.drain(..end + 2).collect();
            let text = String::from_utf8_lossy(&block[..end]);
            if let Some(frame) = Frame::parse(&text) {
                frames.push(frame);
            }
        }
        frames
    }
}
