// SPDX-License-Identifier: MIT OR Apache-2.0
//! Just enough RFC 5322 / MIME reading to serve `Email` properties.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value, json};

/// A header field with its value unfolded.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Header {
    pub name: String,
    pub value: String,
}

/// A mailbox from an address-list header.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Address {
    pub name: Option<String>,
    pub email: String,
}

impl Address {
    fn to_json(&self) -> Value {
        json!({ "name": self.name, "email": self.email })
    }

    /// What address sorts compare: the display name, else the address.
    pub fn sort_key(&self) -> String {
        self.name.as_deref().unwrap_or(&self.email).to_lowercase()
    }
}

/// A leaf body part.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Part {
    pub part_id: String,
    pub headers: Vec<Header>,
    pub mime_type: String,
    pub charset: Option<String>,
    pub disposition: Option<String>,
    pub name: Option<String>,
    pub cid: Option<String>,
    pub size: u64,
    pub text: Option<String>,
    /// The decoded bytes were not valid in the declared charset.
    pub encoding_problem: bool,
}

impl Part {
    fn is_attachment(&self) -> bool {
        self.disposition.as_deref() == Some("attachment")
    }

    fn is_text(&self) -> bool {
        self.mime_type.starts_with("text/")
    }

    fn to_json(&self, blob_id: &str) -> Value {
        json!({
            "partId": self.part_id,
            "blobId": format!("{blob_id}-{}", self.part_id),
            "size": self.size,
            "headers": headers_json(&self.headers),
            "name": self.name,
            "type": self.mime_type,
            "charset": self.charset,
            "disposition": self.disposition,
            "cid": self.cid,
            "language": null,
            "location": null,
        })
    }
}

/// Structure of a body: leaves carry a part index into [`Message::parts`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Leaf(usize),
    Multipart { mime_type: String, children: Vec<Node> },
}

/// A parsed message.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Message {
    pub headers: Vec<Header>,
    pub parts: Vec<Part>,
    pub tree: Option<Node>,
    pub text_body: Vec<usize>,
    pub html_body: Vec<usize>,
    pub attachments: Vec<usize>,
}

/// Which body values an `Email/get` or `Email/parse` asked for.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BodyFetch {
    pub text: bool,
    pub html: bool,
    pub all: bool,
    /// `maxBodyValueBytes`; values longer than this are cut on a char boundary.
    pub max_bytes: Option<usize>,
}

impl BodyFetch {
    pub fn from_args(args: &Value) -> Self {
        let flag = |name: &str| args.get(name).and_then(Value::as_bool).unwrap_or(false);
        Self {
            text: flag("fetchTextBodyValues"),
            html: flag("fetchHTMLBodyValues"),
            all: flag("fetchAllBodyValues"),
            max_bytes: args
                .get("maxBodyValueBytes")
                .and_then(Value::as_u64)
                .filter(|n| *n > 0)
                .and_then(|n| usize::try_from(n).ok()),
        }
    }
}

/// Returns `true` when `raw` opens with at least one header field.
pub(crate) fn is_parsable(raw: &[u8]) -> bool {
    let (head, _) = split_head(raw);
    let text = String::from_utf8_lossy(head);
    text.lines().next().is_some_and(|line| {
        line.split_once(':')
            .is_some_and(|(name, _)| !name.is_empty() && !name.contains(' '))
    })
}

impl Message {
    pub fn parse(raw: &[u8]) -> Self {
        let mut msg = Message::default();
        let (head, body) = split_head(raw);
        msg.headers = parse_header_block(head);
        let headers = msg.headers.clone();
        let tree = msg.read_entity(&headers, body, "");
        msg.classify(&tree, false);
        msg.tree = Some(tree);
        msg
    }

    fn read_entity(&mut self, headers: &[Header], body: &[u8], prefix: &str) -> Node {
        let content_type = find(headers, "content-type").unwrap_or("text/plain");
        let (mime_type, params) = parse_params(content_type);
        if let Some(boundary) = mime_type
            .starts_with("multipart/")
            .then(|| param(&params, "boundary"))
            .flatten()
        {
            let mut children = Vec::new();
            for (i, chunk) in split_multipart(body, &boundary).into_iter().enumerate() {
                let (head, inner) = split_head(chunk);
                let part_headers = parse_header_block(head);
                let child_prefix = if prefix.is_empty() {
                    format!("{}", i + 1)
                } else {
                    format!("{prefix}.{}", i + 1)
                };
                children.push(self.read_entity(&part_headers, inner, &child_prefix));
            }
            return Node::Multipart { mime_type, children };
        }
        let decoded = decode_transfer(find(headers, "content-transfer-encoding"), body);
        let (disposition, disposition_params) = find(headers, "content-disposition")
            .map(parse_params)
            .map(|(d, p)| (Some(d), p))
            .unwrap_or((None, Vec::new()));
        let name = param(&disposition_params, "filename").or_else(|| param(&params, "name"));
        let charset = param(&params, "charset").or_else(|| {
            mime_type
                .starts_with("text/")
                .then(|| "us-ascii".to_string())
        });
        let text = mime_type
            .starts_with("text/")
            .then(|| String::from_utf8_lossy(&decoded).into_owned());
        let encoding_problem = text.is_some() && std::str::from_utf8(&decoded).is_err();
        let part_id = if prefix.is_empty() { "1".to_string() } else { prefix.to_string() };
        self.parts.push(Part {
            part_id,
            headers: headers.to_vec(),
            mime_type,
            charset,
            disposition,
            name,
            cid: find(headers, "content-id").map(|c| c.trim_matches(['<', '>']).to_string()),
            size: decoded.len() as u64,
            text,
            encoding_problem,
        });
        Node::Leaf(self.parts.len() - 1)
    }

    /// Fill the text, HTML and attachment lists the way a reader would
    /// pick bodies: alternatives split by type, everything else shared.
    fn classify(&mut self, node: &Node, in_alternative: bool) {
        match node {
            Node::Leaf(i) => {
                let part = &self.parts[*i];
                if part.is_attachment() || !part.is_text() {
                    self.attachments.push(*i);
                } else if part.mime_type == "text/html" {
                    self.html_body.push(*i);
                    if !in_alternative {
                        self.text_body.push(*i);
                    }
                } else {
                    self.text_body.push(*i);
                    if !in_alternative {
                        self.html_body.push(*i);
                    }
                }
            }
            Node::Multipart { mime_type, children } => {
                let alternative = mime_type == "multipart/alternative";
                for child in children {
                    self.classify(child, alternative);
                }
                if alternative {
                    self.fill_missing_alternative(children);
                }
            }
        }
    }

    /// An alternative with only one flavour serves it as both.
    fn fill_missing_alternative(&mut self, children: &[Node]) {
        let leaves: Vec<usize> = children
            .iter()
            .filter_map(|c| match c {
                Node::Leaf(i) => Some(*i),
                Node::Multipart { .. } => None,
            })
            .collect();
        let has_text = leaves.iter().any(|i| self.text_body.contains(i));
        let has_html = leaves.iter().any(|i| self.html_body.contains(i));
        for i in leaves {
            if !has_text && self.html_body.contains(&i) {
                self.text_body.push(i);
            }
            if !has_html && self.text_body.contains(&i) && !self.html_body.contains(&i) {
                self.html_body.push(i);
            }
        }
    }

    /// First value of header `name`, unfolded and trimmed.
    pub fn header(&self, name: &str) -> Option<&str> {
        find(&self.headers, name)
    }

    pub fn subject(&self) -> Option<String> {
        self.header("subject").map(decode_words)
    }

    pub fn message_id(&self) -> Option<String> {
        self.header("message-id").map(str::to_string)
    }

    pub fn in_reply_to(&self) -> Option<String> {
        self.header("in-reply-to").map(str::to_string)
    }

    pub fn addresses(&self, name: &str) -> Vec<Address> {
        self.header(name).map(parse_addresses).unwrap_or_default()
    }

    pub fn sent_at(&self) -> Option<DateTime<FixedOffset>> {
        self.header("date")
            .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
    }

    pub fn has_attachment(&self) -> bool {
        self.parts.iter().any(Part::is_attachment)
    }

    /// Every text part's content, for body searches.
    pub fn body_text(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let Some(text) = part.text.as_deref().filter(|_| !part.is_attachment()) {
                if part.mime_type == "text/html" {
                    out.push_str(&strip_tags(text));
                } else {
                    out.push_str(text);
                }
                out.push('\n');
            }
        }
        out
    }

    /// Plain-text preview, at most 256 characters.
    pub fn preview(&self) -> String {
        let source = self
            .text_body
            .first()
            .and_then(|i| self.parts.get(*i))
            .and_then(|p| {
                let text = p.text.as_deref()?;
                Some(if p.mime_type == "text/html" {
                    strip_tags(text)
                } else {
                    text.to_string()
                })
            })
            .unwrap_or_default();
        let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.chars().take(256).collect()
    }

    fn address_json(&self, name: &str) -> Value {
        match self.header(name) {
            None => Value::Null,
            Some(raw) => Value::Array(
                parse_addresses(&decode_words(raw))
                    .iter()
                    .map(Address::to_json)
                    .collect(),
            ),
        }
    }

    fn id_list(&self, name: &str) -> Value {
        match self.header(name) {
            None => Value::Null,
            Some(raw) => json!(
                raw.split_whitespace()
                    .map(|id| id.trim_matches(['<', '>']))
                    .filter(|id| !id.is_empty())
                    .collect::<Vec<_>>()
            ),
        }
    }

    /// The header-derived and body properties of an `Email` object.
    /// `blob_id` names the message blob that part blob ids derive from.
    pub fn properties(&self, blob_id: &str, fetch: BodyFetch, body_properties: Option<&Value>) -> Map<String, Value> {
        let parts = |list: &[usize]| -> Value {
            Value::Array(
                list.iter()
                    .filter_map(|i| self.parts.get(*i))
                    .map(|p| project_part(p.to_json(blob_id), body_properties))
                    .collect(),
            )
        };
        let mut values = Map::new();
        for (i, part) in self.parts.iter().enumerate() {
            let wanted = fetch.all
                || (fetch.text && self.text_body.contains(&i))
                || (fetch.html && self.html_body.contains(&i));
            if let Some(text) = part.text.as_deref().filter(|_| wanted) {
                let (value, truncated) = truncate(text, fetch.max_bytes);
                values.insert(
                    part.part_id.clone(),
                    json!({
                        "value": value,
                        "isEncodingProblem": part.encoding_problem,
                        "isTruncated": truncated,
                    }),
                );
            }
        }
        let mut out = Map::new();
        out.insert("headers".into(), headers_json(&self.headers));
        out.insert("messageId".into(), self.id_list("message-id"));
        out.insert("inReplyTo".into(), self.id_list("in-reply-to"));
        out.insert("references".into(), self.id_list("references"));
        for (prop, header) in [
            ("sender", "sender"),
            ("from", "from"),
            ("to", "to"),
            ("cc", "cc"),
            ("bcc", "bcc"),
            ("replyTo", "reply-to"),
        ] {
            out.insert(prop.into(), self.address_json(header));
        }
        out.insert("subject".into(), json!(self.subject()));
        out.insert(
            "sentAt".into(),
            json!(self.sent_at().map(|d| d.format("%Y-%m-%dT%H:%M:%S%:z").to_string())),
        );
        out.insert("hasAttachment".into(), json!(self.has_attachment()));
        out.insert("preview".into(), json!(self.preview()));
        out.insert("bodyValues".into(), Value::Object(values));
        out.insert("textBody".into(), parts(&self.text_body));
        out.insert("htmlBody".into(), parts(&self.html_body));
        out.insert("attachments".into(), parts(&self.attachments));
        out.insert(
            "bodyStructure".into(),
            self.tree
                .as_ref()
                .map(|t| self.structure_json(t, blob_id, body_properties))
                .unwrap_or(Value::Null),
        );
        out
    }

    fn structure_json(&self, node: &Node, blob_id: &str, body_properties: Option<&Value>) -> Value {
        match node {
            Node::Leaf(i) => self
                .parts
                .get(*i)
                .map(|p| project_part(p.to_json(blob_id), body_properties))
                .unwrap_or(Value::Null),
            Node::Multipart { mime_type, children } => json!({
                "partId": null,
                "type": mime_type,
                "subParts": children
                    .iter()
                    .map(|c| self.structure_json(c, blob_id, body_properties))
                    .collect::<Vec<_>>(),
            }),
        }
    }

    /// `header:Name[:form][:all]` property values.
    pub fn header_property(&self, spec: &str) -> Option<Value> {
        let rest = spec.strip_prefix("header:")?;
        let mut pieces = rest.split(':');
        let name = pieces.next()?;
        let mut all = false;
        let mut form = HeaderForm::Raw;
        for piece in pieces {
            match piece {
                "all" => all = true,
                other => form = HeaderForm::parse(other)?,
            }
        }
        let values: Vec<Value> = self
            .headers
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| form.apply(&h.value))
            .collect();
        Some(if all {
            Value::Array(values)
        } else {
            values.into_iter().last().unwrap_or(Value::Null)
        })
    }
}

/// The parsed forms a `header:` property may ask for.
#[derive(Debug, Clone, Copy, PartialEq)]
enum HeaderForm {
    Raw,
    Text,
    Addresses,
    GroupedAddresses,
    MessageIds,
    Date,
    Urls,
}

impl HeaderForm {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "asRaw" => Self::Raw,
            "asText" => Self::Text,
            "asAddresses" => Self::Addresses,
            "asGroupedAddresses" => Self::GroupedAddresses,
            "asMessageIds" => Self::MessageIds,
            "asDate" => Self::Date,
            "asURLs" => Self::Urls,
            _ => return None,
        })
    }

    fn apply(self, value: &str) -> Value {
        let addresses = || -> Vec<Value> {
            parse_addresses(&decode_words(value))
                .iter()
                .map(Address::to_json)
                .collect()
        };
        match self {
            Self::Raw => json!(format!(" {value}")),
            Self::Text => json!(decode_words(value)),
            Self::Addresses => Value::Array(addresses()),
            Self::GroupedAddresses => json!([{ "name": null, "addresses": addresses() }]),
            Self::MessageIds => json!(
                value
                    .split_whitespace()
                    .map(|id| id.trim_matches(['<', '>']))
                    .filter(|id| !id.is_empty())
                    .collect::<Vec<_>>()
            ),
            Self::Date => json!(
                DateTime::parse_from_rfc2822(value)
                    .ok()
                    .map(|d| d.format("%Y-%m-%dT%H:%M:%S%:z").to_string())
            ),
            Self::Urls => json!(
                value
                    .split(',')
                    .map(|u| u.trim().trim_matches(['<', '>']))
                    .filter(|u| !u.is_empty())
                    .collect::<Vec<_>>()
            ),
        }
    }
}

/// Cut `text` to at most `max` bytes without splitting a character.
fn truncate(text: &str, max: Option<usize>) -> (&str, bool) {
    match max {
        Some(max) if text.len() > max => {
            let mut end = max;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            (&text[..end], true)
        }
        _ => (text, false),
    }
}

fn project_part(part: Value, body_properties: Option<&Value>) -> Value {
    let Some(keep) = body_properties.and_then(Value::as_array) else {
        return match part {
            Value::Object(mut map) => {
                map.remove("headers");
                Value::Object(map)
            }
            other => other,
        };
    };
    match part {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| keep.iter().any(|p| p.as_str() == Some(k.as_str())))
                .collect(),
        ),
        other => other,
    }
}

fn headers_json(headers: &[Header]) -> Value {
    Value::Array(
        headers
            .iter()
            .map(|h| json!({ "name": h.name, "value": format!(" {}", h.value) }))
            .collect(),
    )
}

fn find<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Split at the first empty line into header block and body.
fn split_head(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(body) = raw.strip_prefix(b"\r\n") {
        return (&[], body);
    }
    for (i, w) in raw.windows(2).enumerate() {
        if w == b"\n\n" {
            return (&raw[..i], &raw[i + 2..]);
        }
        if w == b"\r\n" && raw[i + 2..].starts_with(b"\r\n") {
            return (&raw[..i], &raw[i + 4..]);
        }
    }
    (raw, &[])
}

fn parse_header_block(head: &[u8]) -> Vec<Header> {
    let text = String::from_utf8_lossy(head);
    let mut out: Vec<Header> = Vec::new();
    for line in text.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some(last) = out.last_mut() {
                last.value.push(' ');
                last.value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            out.push(Header {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            });
        }
    }
    out
}

/// `type/subtype; key=value; ...` split into the lowercased type and its
/// parameters.
fn parse_params(value: &str) -> (String, Vec<(String, String)>) {
    let mut pieces = value.split(';');
    let head = pieces.next().unwrap_or_default().trim().to_ascii_lowercase();
    let params = pieces
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().trim_matches('"').to_string()))
        .collect();
    (head, params)
}

fn param(params: &[(String, String)], key: &str) -> Option<String> {
    params.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
}

fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let text_positions = line_starts(body);
    let mut marks = Vec::new();
    for (start, end) in text_positions {
        let line = &body[start..end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line == delimiter.as_bytes() {
            marks.push((start, end, false));
        } else if line == format!("{delimiter}--").as_bytes() {
            marks.push((start, end, true));
            break;
        }
    }
    let mut parts = Vec::new();
    for pair in marks.windows(2) {
        let (_, open_end, closing) = pair[0];
        if closing {
            break;
        }
        let next_start = pair[1].0;
        let from = (open_end + 1).min(next_start);
        let mut chunk = &body[from..next_start];
        chunk = chunk.strip_suffix(b"\n").unwrap_or(chunk);
        chunk = chunk.strip_suffix(b"\r").unwrap_or(chunk);
        parts.push(chunk);
    }
    parts
}

/// `(start, end)` of each line, `end` excluding the newline.
fn line_starts(body: &[u8]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, b) in body.iter().enumerate() {
        if *b == b'\n' {
            out.push((start, i));
            start = i + 1;
        }
    }
    if start < body.len() {
        out.push((start, body.len()));
    }
    out
}

fn decode_transfer(encoding: Option<&str>, body: &[u8]) -> Vec<u8> {
    match encoding.map(str::to_ascii_lowercase).as_deref() {
        Some("base64") => {
            let compact: Vec<u8> = body.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
            STANDARD.decode(compact).unwrap_or_else(|_| body.to_vec())
        }
        Some("quoted-printable") => decode_quoted_printable(body),
        _ => body.to_vec(),
    }
}

fn decode_quoted_printable(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        if body[i] == b'=' {
            let rest = &body[i + 1..];
            if rest.starts_with(b"\r\n") {
                i += 3;
                continue;
            }
            if rest.starts_with(b"\n") {
                i += 2;
                continue;
            }
            if let Some(byte) = rest
                .get(..2)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
            {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(body[i]);
        i += 1;
    }
    out
}

/// Decode RFC 2047 encoded words in UTF-8 or ASCII; others pass through.
pub(crate) fn decode_words(value: &str) -> String {
    let mut out = String::new();
    let mut rest = value;
    let mut last_was_word = false;
    while let Some(start) = rest.find("=?") {
        let (before, tail) = rest.split_at(start);
        let decoded = tail[2..].find("?=").and_then(|end| {
            let word = &tail[2..2 + end];
            let mut fields = word.splitn(3, '?');
            let charset = fields.next()?.to_ascii_lowercase();
            let encoding = fields.next()?.to_ascii_lowercase();
            let text = fields.next()?;
            if !matches!(charset.as_str(), "utf-8" | "us-ascii") {
                return None;
            }
            let bytes = match encoding.as_str() {
                "b" => STANDARD.decode(text).ok()?,
                "q" => decode_quoted_printable(text.replace('_', " ").as_bytes()),
                _ => return None,
            };
            Some((String::from_utf8_lossy(&bytes).into_owned(), 2 + end + 2))
        });
        match decoded {
            Some((text, consumed)) => {
                if !(last_was_word && before.trim().is_empty()) {
                    out.push_str(before);
                }
                out.push_str(&text);
                rest = &tail[consumed..];
                last_was_word = true;
            }
            None => {
                out.push_str(before);
                out.push_str("=?");
                rest = &tail[2..];
                last_was_word = false;
            }
        }
    }
    out.push_str(rest);
    out
}

fn parse_addresses(raw: &str) -> Vec<Address> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut angle = false;
    for c in raw.chars() {
        match c {
            '"' => quoted = !quoted,
            '<' if !quoted => angle = true,
            '>' if !quoted => angle = false,
            ',' if !quoted && !angle => {
                items.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    items.push(current);
    items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| match (item.rfind('<'), item.rfind('>')) {
            (Some(open), Some(close)) if open < close => {
                let name = decode_words(item[..open].trim().trim_matches('"').trim());
                Address {
                    name: (!name.is_empty()).then_some(name),
                    email: item[open + 1..close].trim().to_string(),
                }
            }
            _ => Address {
                name: None,
                email: item.to_string(),
            },
        })
        .collect()
}

pub(crate) fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = "From: \"Bob Smith\" <bob@example.org>, carol@example.net\r\n\
Subject: =?UTF-8?B?SMOpbGxv?= world\r\n\
Date: Mon, 2 Mar 2026 10:00:00 +0100\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=alt\r\n\
\r\n\
--alt\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
plain words\r\n\
--alt\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>html words</p>\r\n\
--alt--\r\n\
--outer\r\n\
Content-Type: application/pdf; name=report.pdf\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERg==\r\n\
--outer--\r\n";

    #[test]
    fn multipart_bodies_are_classified() {
        let msg = Message::parse(MIXED.as_bytes());
        assert_eq!(msg.parts.len(), 3);
        assert_eq!(msg.parts[0].part_id, "1.1");
        assert_eq!(msg.parts[2].part_id, "2");
        assert_eq!(msg.text_body, vec![0]);
        assert_eq!(msg.html_body, vec![1]);
        assert_eq!(msg.attachments, vec![2]);
        assert!(msg.has_attachment());
        assert_eq!(msg.parts[2].size, 4);
        assert_eq!(msg.parts[2].name.as_deref(), Some("report.pdf"));
        assert_eq!(msg.preview(), "plain words");
    }

    #[test]
    fn headers_decode_addresses_and_words() {
        let msg = Message::parse(MIXED.as_bytes());
        assert_eq!(msg.subject().as_deref(), Some("Héllo world"));
        let from = msg.addresses("from");
        assert_eq!(from.len(), 2);
        assert_eq!(from[0].name.as_deref(), Some("Bob Smith"));
        assert_eq!(from[1].email, "carol@example.net");
        assert_eq!(msg.sent_at().map(|d| d.to_rfc3339()).as_deref(), Some("2026-03-02T10:00:00+01:00"));
    }

    #[test]
    fn single_part_is_both_text_and_html_body() {
        let msg = Message::parse(b"Subject: x\r\n\r\nhello\r\n");
        assert_eq!(msg.text_body, vec![0]);
        assert_eq!(msg.html_body, vec![0]);
        assert!(msg.attachments.is_empty());
        let props = msg.properties("B1", BodyFetch { text: true, ..BodyFetch::default() }, None);
        assert_eq!(props["bodyValues"]["1"]["value"], "hello\r\n");
        assert_eq!(props["textBody"][0]["blobId"], "B1-1");
    }

    #[test]
    fn folded_headers_are_unfolded() {
        let msg = Message::parse(b"Subject: one\r\n two\r\nX-Custom: v\r\n\r\n");
        assert_eq!(msg.subject().as_deref(), Some("one two"));
        assert_eq!(msg.header_property("header:X-Custom:asText"), Some(json!("v")));
        assert_eq!(msg.header_property("header:X-Custom:all"), Some(json!([" v"])));
    }

    #[test]
    fn header_forms_parse_structured_values() {
        let msg = Message::parse(
            b"From: \"Ann\" <ann@example.com>\r\n\
References: <a@test> <b@test>\r\n\
List-Unsubscribe: <https://example.com/unsub>, <mailto:u@example.com>\r\n\
Date: Mon, 2 Mar 2026 10:00:00 +0100\r\n\r\nbody",
        );
        assert_eq!(
            msg.header_property("header:From:asAddresses"),
            Some(json!([{ "name": "Ann", "email": "ann@example.com" }]))
        );
        assert_eq!(
            msg.header_property("header:from:asGroupedAddresses").unwrap()[0]["addresses"][0]["email"],
            "ann@example.com"
        );
        assert_eq!(msg.header_property("header:References:asMessageIds"), Some(json!(["a@test", "b@test"])));
        assert_eq!(
            msg.header_property("header:List-Unsubscribe:asURLs"),
            Some(json!(["https://example.com/unsub", "mailto:u@example.com"]))
        );
        assert_eq!(msg.header_property("header:Date:asDate"), Some(json!("2026-03-02T10:00:00+01:00")));
        assert_eq!(msg.header_property("header:Date:asNonsense"), None);
    }

    #[test]
    fn body_values_truncate_and_flag_bad_bytes() {
        let msg = Message::parse("Subject: x\r\n\r\nh\u{e9}llo world".as_bytes());
        let fetch = BodyFetch { text: true, max_bytes: Some(2), ..BodyFetch::default() };
        let props = msg.properties("B1", fetch, None);
        assert_eq!(props["bodyValues"]["1"]["value"], "h");
        assert_eq!(props["bodyValues"]["1"]["isTruncated"], true);
        assert_eq!(props["bodyValues"]["1"]["isEncodingProblem"], false);

        let latin = Message::parse(b"Content-Type: text/plain; charset=iso-8859-1\r\n\r\ncaf\xe9");
        let props = latin.properties("B2", BodyFetch { text: true, ..BodyFetch::default() }, None);
        assert_eq!(props["bodyValues"]["1"]["isEncodingProblem"], true);
        assert_eq!(props["bodyValues"]["1"]["isTruncated"], false);
    }

    #[test]
    fn plain_text_is_not_a_message() {
        assert!(!is_parsable(b"this is not an email at all, just random text"));
        assert!(is_parsable(b"Subject: hi\r\n\r\nbody"));
    }
}
