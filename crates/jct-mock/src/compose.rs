// SPDX-License-Identifier: MIT OR Apache-2.0
//! Render an `Email/set` create object as message bytes.

use crate::state::Blob;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Why a create object could not be rendered, as a SetError type and
/// description.
pub(crate) type ComposeError = (&'static str, String);

struct Writer<'a> {
    body_values: Option<&'a Map<String, Value>>,
    blobs: &'a BTreeMap<String, Blob>,
    boundaries: usize,
    out: String,
}

/// Render `props` to RFC 5322 bytes. `message_id` is used when the object
/// sets none.
pub(crate) fn compose(
    props: &Map<String, Value>,
    blobs: &BTreeMap<String, Blob>,
    message_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<u8>, ComposeError> {
    let mut w = Writer {
        body_values: props.get("bodyValues").and_then(Value::as_object),
        blobs,
        boundaries: 0,
        out: String::new(),
    };
    for (prop, header) in [
        ("from", "From"),
        ("sender", "Sender"),
        ("to", "To"),
        ("cc", "Cc"),
        ("bcc", "Bcc"),
        ("replyTo", "Reply-To"),
    ] {
        if let Some(list) = props.get(prop).and_then(Value::as_array) {
            w.header(header, &format_addresses(list));
        }
    }
    if let Some(subject) = props.get("subject").and_then(Value::as_str) {
        w.header("Subject", subject);
    }
    let sent_at = props
        .get("sentAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.to_rfc2822())
        .unwrap_or_else(|| now.to_rfc2822());
    w.header("Date", &sent_at);
    let ids = |prop: &str| -> Option<String> {
        let list = props.get(prop)?.as_array()?;
        let ids: Vec<String> = list
            .iter()
            .filter_map(Value::as_str)
            .map(|id| format!("<{id}>"))
            .collect();
        (!ids.is_empty()).then(|| ids.join(" "))
    };
    let own_id = ids("messageId").unwrap_or_else(|| format!("<{message_id}>"));
    w.header("Message-ID", &own_id);
    if let Some(parent) = ids("inReplyTo") {
        w.header("In-Reply-To", &parent);
    }
    if let Some(refs) = ids("references") {
        w.header("References", &refs);
    }
    for (key, value) in props {
        if let (Some(name), Some(text)) = (key.strip_prefix("header:"), value.as_str()) {
            let name = name.split(':').next().unwrap_or(name);
            w.header(name, text.trim());
        }
    }
    w.header("MIME-Version", "1.0");

    let structure = match props.get("bodyStructure") {
        Some(tree) if tree.is_object() => tree.clone(),
        _ => shorthand_structure(props)?,
    };
    w.entity(&structure)?;
    Ok(w.out.into_bytes())
}

/// Build a body structure out of `textBody`, `htmlBody` and `attachments`.
fn shorthand_structure(props: &Map<String, Value>) -> Result<Value, ComposeError> {
    let first = |prop: &str| {
        props
            .get(prop)
            .and_then(Value::as_array)
            .and_then(|parts| parts.first())
            .cloned()
    };
    let text = first("textBody");
    let html = first("htmlBody");
    let body = match (text, html) {
        (Some(text), Some(html)) => serde_json::json!({
            "type": "multipart/alternative",
            "subParts": [text, html],
        }),
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => {
            return Err(("invalidProperties", "email has no body".into()));
        }
    };
    let attachments = props
        .get("attachments")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if attachments.is_empty() {
        return Ok(body);
    }
    let mut sub_parts = vec![body];
    sub_parts.extend(attachments);
    Ok(serde_json::json!({ "type": "multipart/mixed", "subParts": sub_parts }))
}

impl Writer<'_> {
    fn header(&mut self, name: &str, value: &str) {
        self.out.push_str(name);
        self.out.push_str(": ");
        self.out.push_str(value);
        self.out.push_str("\r\n");
    }

    fn entity(&mut self, part: &Value) -> Result<(), ComposeError> {
        let mime_type = part
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("text/plain")
            .to_ascii_lowercase();
        if let Some(children) = part.get("subParts").and_then(Value::as_array) {
            self.boundaries += 1;
            let boundary = format!("=_part_{}", self.boundaries);
            self.header("Content-Type", &format!("{mime_type}; boundary=\"{boundary}\""));
            self.out.push_str("\r\n");
            for child in children {
                self.out.push_str(&format!("--{boundary}\r\n"));
                self.entity(child)?;
                self.out.push_str("\r\n");
            }
            self.out.push_str(&format!("--{boundary}--\r\n"));
            return Ok(());
        }
        let name = part.get("name").and_then(Value::as_str);
        let disposition = part.get("disposition").and_then(Value::as_str);
        if let Some(cid) = part.get("cid").and_then(Value::as_str) {
            self.header("Content-ID", &format!("<{cid}>"));
        }
        if let Some(part_id) = part.get("partId").and_then(Value::as_str) {
            let text = self
                .body_values
                .and_then(|values| values.get(part_id))
                .and_then(|v| v.get("value"))
                .and_then(Value::as_str)
                .ok_or_else(|| ("invalidProperties", format!("no bodyValue for part {part_id}")))?
                .to_string();
            self.header("Content-Type", &format!("{mime_type}; charset=utf-8"));
            let encoding = if text.is_ascii() { "7bit" } else { "8bit" };
            self.header("Content-Transfer-Encoding", encoding);
            if let Some(disposition) = disposition {
                self.header("Content-Disposition", disposition);
            }
            self.out.push_str("\r\n");
            self.out.push_str(&text);
            return Ok(());
        }
        let blob_id = part
            .get("blobId")
            .and_then(Value::as_str)
            .ok_or_else(|| ("invalidProperties", "body part needs partId or blobId".to_string()))?;
        let blob = self
            .blobs
            .get(blob_id)
            .ok_or_else(|| ("blobNotFound", format!("no blob {blob_id}")))?;
        match name {
            Some(name) => self.header("Content-Type", &format!("{mime_type}; name=\"{name}\"")),
            None => self.header("Content-Type", &mime_type),
        }
        self.header("Content-Transfer-Encoding", "base64");
        match (disposition, name) {
            (Some(d), Some(n)) => self.header("Content-Disposition", &format!("{d}; filename=\"{n}\"")),
            (Some(d), None) => self.header("Content-Disposition", d),
            (None, Some(n)) => self.header("Content-Disposition", &format!("attachment; filename=\"{n}\"")),
            (None, None) => {}
        }
        self.out.push_str("\r\n");
        let encoded = STANDARD.encode(&blob.data);
        for line in encoded.as_bytes().chunks(76) {
            self.out.push_str(&String::from_utf8_lossy(line));
            self.out.push_str("\r\n");
        }
        Ok(())
    }
}

fn format_addresses(list: &[Value]) -> String {
    list.iter()
        .filter_map(|a| {
            let email = a.get("email").and_then(Value::as_str)?;
            Some(match a.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) {
                Some(name) => format!("\"{name}\" <{email}>"),
                None => format!("<{email}>"),
            })
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime::Message;
    use serde_json::json;

    fn props(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn shorthand_bodies_become_an_alternative() {
        let p = props(json!({
            "from": [{"name": "Me", "email": "me@example.com"}],
            "to": [{"email": "you@example.com"}],
            "subject": "Hello",
            "textBody": [{"partId": "t", "type": "text/plain"}],
            "htmlBody": [{"partId": "h", "type": "text/html"}],
            "bodyValues": {"t": {"value": "plain"}, "h": {"value": "<b>rich</b>"}},
        }));
        let raw = compose(&p, &BTreeMap::new(), "m1@mock", Utc::now()).unwrap();
        let msg = Message::parse(&raw);
        assert_eq!(msg.subject().as_deref(), Some("Hello"));
        assert_eq!(msg.addresses("from")[0].name.as_deref(), Some("Me"));
        assert_eq!(msg.message_id().as_deref(), Some("<m1@mock>"));
        assert_eq!(msg.text_body.len(), 1);
        assert_eq!(msg.html_body.len(), 1);
        assert_eq!(msg.parts[msg.text_body[0]].text.as_deref(), Some("plain"));
    }

    #[test]
    fn blob_parts_are_attached() {
        let blobs = BTreeMap::from([(
            "B9".to_string(),
            Blob {
                content_type: "application/pdf".into(),
                data: b"%PDF-1.4".to_vec(),
            },
        )]);
        let p = props(json!({
            "bodyStructure": {"type": "multipart/mixed", "subParts": [
                {"partId": "t", "type": "text/plain"},
                {"blobId": "B9", "type": "application/pdf", "name": "a.pdf", "disposition": "attachment"}
            ]},
            "bodyValues": {"t": {"value": "see attached"}},
        }));
        let msg = Message::parse(&compose(&p, &blobs, "m2@mock", Utc::now()).unwrap());
        assert!(msg.has_attachment());
        assert_eq!(msg.parts[1].size, 8);
        assert_eq!(msg.parts[1].name.as_deref(), Some("a.pdf"));
    }

    #[test]
    fn missing_blob_and_missing_body_are_refused() {
        let unknown = props(json!({"bodyStructure": {"type": "image/png", "blobId": "nope"}}));
        let err = compose(&unknown, &BTreeMap::new(), "x@mock", Utc::now()).unwrap_err();
        assert_eq!(err.0, "blobNotFound");
        let bodiless = props(json!({"subject": "x"}));
        let err = compose(&bodiless, &BTreeMap::new(), "x@mock", Utc::now()).unwrap_err();
        assert_eq!(err.0, "invalidProperties");
    }
}
