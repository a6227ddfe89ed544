// SPDX-License-Identifier: MIT OR Apache-2.0
//! `Email/*` and `SearchSnippet/get`.

use crate::compose::compose;
use crate::methods::{
    MethodResult, eval_filter, id_list, invalid_arguments, method_error, non_empty, requested_destroy,
    requested_ids, resolve, set_error,
};
use crate::mime::{Address, BodyFetch, Message, decode_words, is_parsable};
use crate::state::{AccountState, Email, Op};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Properties `Email/get` returns when none are named.
const DEFAULT_PROPERTIES: &[&str] = &[
    "id", "blobId", "threadId", "mailboxIds", "keywords", "size", "receivedAt", "messageId",
    "inReplyTo", "references", "sender", "from", "to", "cc", "bcc", "replyTo", "subject", "sentAt",
    "hasAttachment", "preview", "bodyValues", "textBody", "htmlBody", "attachments",
];

/// Properties `Email/parse` returns when none are named.
const DEFAULT_PARSE_PROPERTIES: &[&str] = &[
    "messageId", "inReplyTo", "references", "sender", "from", "to", "cc", "bcc", "replyTo",
    "subject", "sentAt", "hasAttachment", "preview", "bodyValues", "textBody", "htmlBody",
    "attachments",
];

/// Pick `properties` (or `defaults`) out of a full object, answering
/// `header:` forms from the message.
fn select(full: Map<String, Value>, message: &Message, properties: Option<&Value>, defaults: &[&str]) -> Value {
    let names: Vec<&str> = match properties.and_then(Value::as_array) {
        Some(list) => list.iter().filter_map(Value::as_str).collect(),
        None => defaults.to_vec(),
    };
    let mut out = Map::new();
    for name in names {
        if name.starts_with("header:") {
            if let Some(v) = message.header_property(name) {
                out.insert(name.to_string(), v);
            }
        } else if let Some(v) = full.get(name) {
            out.insert(name.to_string(), v.clone());
        }
    }
    Value::Object(out)
}

pub(crate) fn get(st: &AccountState, account_id: &str, args: &Value) -> Value {
    let fetch = BodyFetch::from_args(args);
    let body_properties = args.get("bodyProperties");
    let mut list = Vec::new();
    let mut not_found = Vec::new();
    for id in requested_ids(args).unwrap_or_default() {
        let Some(e) = st.emails.get(&id) else {
            not_found.push(id);
            continue;
        };
        let full = match st.email_json(e, fetch, body_properties) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut obj = select(full, &e.message, args.get("properties"), DEFAULT_PROPERTIES);
        obj["id"] = json!(e.id);
        list.push(obj);
    }
    json!({ "accountId": account_id, "state": st.state(), "list": list, "notFound": not_found })
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

fn date_arg(value: &Value) -> Result<DateTime<Utc>, Value> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .ok_or_else(|| invalid_arguments("dates must be RFC 3339 UTCDate values"))
}

fn str_arg(value: &Value) -> Result<&str, Value> {
    value
        .as_str()
        .ok_or_else(|| invalid_arguments("filter value must be a string"))
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn header_text(e: &Email, name: &str) -> String {
    e.message.header(name).map(decode_words).unwrap_or_default()
}

fn email_condition(st: &AccountState, e: &Email, cond: &Map<String, Value>) -> Result<bool, Value> {
    for (key, value) in cond {
        let ok = match key.as_str() {
            "inMailbox" => e.mailbox_ids.contains(str_arg(value)?),
            "inMailboxOtherThan" => {
                let excluded: BTreeSet<&str> = value
                    .as_array()
                    .ok_or_else(|| invalid_arguments("inMailboxOtherThan must be a list"))?
                    .iter()
                    .filter_map(Value::as_str)
                    .collect();
                e.mailbox_ids.iter().any(|m| !excluded.contains(m.as_str()))
            }
            "before" => e.received_at < date_arg(value)?,
            "after" => e.received_at >= date_arg(value)?,
            "minSize" => value.as_u64().is_some_and(|n| e.size >= n),
            "maxSize" => value.as_u64().is_some_and(|n| e.size < n),
            "hasKeyword" => e.has_keyword(str_arg(value)?),
            "notKeyword" => !e.has_keyword(str_arg(value)?),
            "allInThreadHaveKeyword" => {
                let kw = str_arg(value)?;
                st.thread_members(&e.thread_id).iter().all(|m| m.has_keyword(kw))
            }
            "someInThreadHaveKeyword" => {
                let kw = str_arg(value)?;
                st.thread_members(&e.thread_id).iter().any(|m| m.has_keyword(kw))
            }
            "noneInThreadHaveKeyword" => {
                let kw = str_arg(value)?;
                !st.thread_members(&e.thread_id).iter().any(|m| m.has_keyword(kw))
            }
            "hasAttachment" => value.as_bool() == Some(e.message.has_attachment()),
            "from" | "to" | "cc" | "bcc" | "subject" => contains_ci(&header_text(e, key), str_arg(value)?),
            "body" => contains_ci(&e.message.body_text(), str_arg(value)?),
            "text" => {
                let needle = str_arg(value)?;
                ["from", "to", "cc", "bcc", "subject"]
                    .iter()
                    .any(|h| contains_ci(&header_text(e, h), needle))
                    || contains_ci(&e.message.body_text(), needle)
            }
            "header" => {
                let spec = value
                    .as_array()
                    .ok_or_else(|| invalid_arguments("header filter must be a list"))?;
                let name = spec.first().and_then(Value::as_str).unwrap_or_default();
                match (e.message.header(name), spec.get(1).and_then(Value::as_str)) {
                    (None, _) => false,
                    (Some(_), None) => true,
                    (Some(found), Some(wanted)) => contains_ci(&decode_words(found), wanted),
                }
            }
            _ => return Err(method_error("unsupportedFilter")),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

#[derive(Debug, Clone)]
enum SortKey {
    ReceivedAt,
    SentAt,
    Size,
    From,
    To,
    Subject,
    HasKeyword(String),
    AllInThread(String),
    SomeInThread(String),
}

fn parse_sort(sort: Option<&Value>) -> Result<Vec<(SortKey, bool)>, Value> {
    let mut keys = Vec::new();
    for comparator in sort.and_then(Value::as_array).into_iter().flatten() {
        let ascending = comparator.get("isAscending").and_then(Value::as_bool).unwrap_or(true);
        let keyword = || {
            comparator
                .get("keyword")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| invalid_arguments("keyword sorts need a keyword"))
        };
        let key = match comparator.get("property").and_then(Value::as_str) {
            Some("receivedAt") => SortKey::ReceivedAt,
            Some("sentAt") => SortKey::SentAt,
            Some("size") => SortKey::Size,
            Some("from") => SortKey::From,
            Some("to") => SortKey::To,
            Some("subject") => SortKey::Subject,
            Some("hasKeyword") => SortKey::HasKeyword(keyword()?),
            Some("allInThreadHaveKeyword") => SortKey::AllInThread(keyword()?),
            Some("someInThreadHaveKeyword") => SortKey::SomeInThread(keyword()?),
            _ => return Err(method_error("unsupportedSort")),
        };
        keys.push((key, ascending));
    }
    if keys.is_empty() {
        keys.push((SortKey::ReceivedAt, false));
    }
    Ok(keys)
}

fn first_address(e: &Email, header: &str) -> String {
    e.message
        .addresses(header)
        .first()
        .map(Address::sort_key)
        .unwrap_or_default()
}

fn compare(st: &AccountState, a: &Email, b: &Email, keys: &[(SortKey, bool)]) -> Ordering {
    let thread_flag = |e: &Email, kw: &str, all: bool| {
        let members = st.thread_members(&e.thread_id);
        if all {
            members.iter().all(|m| m.has_keyword(kw))
        } else {
            members.iter().any(|m| m.has_keyword(kw))
        }
    };
    for (key, ascending) in keys {
        let ord = match key {
            SortKey::ReceivedAt => a.received_at.cmp(&b.received_at),
            SortKey::SentAt => a.message.sent_at().cmp(&b.message.sent_at()),
            SortKey::Size => a.size.cmp(&b.size),
            SortKey::From => first_address(a, "from").cmp(&first_address(b, "from")),
            SortKey::To => first_address(a, "to").cmp(&first_address(b, "to")),
            SortKey::Subject => {
                let subject = |e: &Email| e.message.subject().unwrap_or_default().to_lowercase();
                subject(a).cmp(&subject(b))
            }
            SortKey::HasKeyword(kw) => a.has_keyword(kw).cmp(&b.has_keyword(kw)),
            SortKey::AllInThread(kw) => thread_flag(a, kw, true).cmp(&thread_flag(b, kw, true)),
            SortKey::SomeInThread(kw) => thread_flag(a, kw, false).cmp(&thread_flag(b, kw, false)),
        };
        let ord = if *ascending { ord } else { ord.reverse() };
        if ord.is_ne() {
            return ord;
        }
    }
    b.received_at.cmp(&a.received_at).then_with(|| a.id.cmp(&b.id))
}

/// Every email matching the query's filter, in sort order, one per thread
/// when collapsing.
pub(crate) fn query_ids(st: &AccountState, args: &Value) -> Result<Vec<String>, Value> {
    let filter = args.get("filter").unwrap_or(&Value::Null);
    let keys = parse_sort(args.get("sort"))?;
    let mut matched = Vec::new();
    for e in st.emails.values() {
        let condition = |cond: &Map<String, Value>| email_condition(st, e, cond);
        if eval_filter(filter, &condition)? {
            matched.push(e);
        }
    }
    matched.sort_by(|a, b| compare(st, a, b, &keys));
    if args.get("collapseThreads").and_then(Value::as_bool) == Some(true) {
        let mut seen = BTreeSet::new();
        matched.retain(|e| seen.insert(e.thread_id.as_str()));
    }
    Ok(matched.into_iter().map(|e| e.id.clone()).collect())
}

// ---------------------------------------------------------------------------
// Set and import
// ---------------------------------------------------------------------------

fn keyword_map(value: Option<&Value>) -> BTreeMap<String, bool> {
    value
        .and_then(Value::as_object)
        .map(|kw| {
            kw.iter()
                .filter(|(_, v)| v.as_bool() == Some(true))
                .map(|(k, _)| (k.clone(), true))
                .collect()
        })
        .unwrap_or_default()
}

/// `mailboxIds` with creation references resolved; `None` when empty or
/// naming an unknown mailbox.
fn mailbox_set_arg(
    st: &AccountState,
    value: Option<&Value>,
    created_ids: &BTreeMap<String, String>,
) -> Option<BTreeSet<String>> {
    let ids: BTreeSet<String> = value
        .and_then(Value::as_object)?
        .iter()
        .filter(|(_, v)| v.as_bool() == Some(true))
        .map(|(k, _)| resolve(k, created_ids))
        .collect::<Option<_>>()?;
    (!ids.is_empty() && ids.iter().all(|m| st.mailboxes.contains_key(m))).then_some(ids)
}

fn invalid_mailboxes() -> Value {
    json!({
        "type": "invalidProperties",
        "description": "mailboxIds must name at least one existing mailbox",
        "properties": ["mailboxIds"],
    })
}

fn received_at_arg(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn created_json(st: &AccountState, id: &str) -> Value {
    match st.emails.get(id) {
        Some(e) => json!({ "id": e.id, "blobId": e.blob_id, "threadId": e.thread_id, "size": e.size }),
        None => json!({ "id": id }),
    }
}

fn create_email(
    st: &mut AccountState,
    props: &Value,
    created_ids: &BTreeMap<String, String>,
) -> Result<String, Value> {
    let props = props
        .as_object()
        .ok_or_else(|| set_error("invalidProperties", "create must be an object"))?;
    for server_set in ["id", "blobId", "threadId", "size"] {
        if props.contains_key(server_set) {
            return Err(json!({
                "type": "invalidProperties",
                "description": format!("{server_set} is set by the server"),
                "properties": [server_set],
            }));
        }
    }
    let mailbox_ids = mailbox_set_arg(st, props.get("mailboxIds"), created_ids).ok_or_else(invalid_mailboxes)?;
    let message_id = format!("{}@mock.jmap", st.fresh_id("m"));
    let raw = compose(props, &st.blobs, &message_id, Utc::now()).map_err(|(kind, description)| set_error(kind, &description))?;
    let blob_id = st.store_blob("message/rfc822", raw);
    Ok(st.add_email(
        &blob_id,
        mailbox_ids,
        keyword_map(props.get("keywords")),
        received_at_arg(props.get("receivedAt")),
    ))
}

/// Apply a patch to a copy of `email`; the caller stores it.
fn patched(
    st: &AccountState,
    email: &Email,
    patch: &Map<String, Value>,
    created_ids: &BTreeMap<String, String>,
) -> Result<Email, Value> {
    let mut next = email.clone();
    for (path, value) in patch {
        if path == "keywords" {
            next.keywords = keyword_map(Some(value));
        } else if let Some(kw) = path.strip_prefix("keywords/") {
            if value.as_bool() == Some(true) {
                next.keywords.insert(kw.to_string(), true);
            } else {
                next.keywords.remove(kw);
            }
        } else if path == "mailboxIds" {
            next.mailbox_ids = mailbox_set_arg(st, Some(value), created_ids).ok_or_else(invalid_mailboxes)?;
        } else if let Some(raw) = path.strip_prefix("mailboxIds/") {
            let mailbox = resolve(raw, created_ids)
                .filter(|m| st.mailboxes.contains_key(m))
                .ok_or_else(invalid_mailboxes)?;
            if value.as_bool() == Some(true) {
                next.mailbox_ids.insert(mailbox);
            } else {
                next.mailbox_ids.remove(&mailbox);
            }
        } else {
            return Err(json!({
                "type": "invalidProperties",
                "description": format!("{path} cannot be changed"),
                "properties": [path],
            }));
        }
    }
    if next.mailbox_ids.is_empty() {
        return Err(invalid_mailboxes());
    }
    Ok(next)
}

pub(crate) fn set(
    st: &mut AccountState,
    account_id: &str,
    args: &Value,
    created_ids: &mut BTreeMap<String, String>,
) -> Value {
    let old_state = st.state();
    let mut created = Map::new();
    let mut not_created = Map::new();
    let mut updated = Map::new();
    let mut not_updated = Map::new();
    let mut destroyed = Vec::new();
    let mut not_destroyed = Map::new();

    if let Some(create) = args.get("create").and_then(Value::as_object) {
        for (cid, props) in create {
            match create_email(st, props, created_ids) {
                Ok(id) => {
                    created_ids.insert(cid.clone(), id.clone());
                    created.insert(cid.clone(), created_json(st, &id));
                }
                Err(error) => {
                    not_created.insert(cid.clone(), error);
                }
            }
        }
    }
    if let Some(update) = args.get("update").and_then(Value::as_object) {
        for (raw_id, patch) in update {
            let id = resolve(raw_id, created_ids).unwrap_or_else(|| raw_id.clone());
            let Some(email) = st.emails.get(&id) else {
                not_updated.insert(raw_id.clone(), set_error("notFound", "no such email"));
                continue;
            };
            let Some(patch) = patch.as_object() else {
                not_updated.insert(raw_id.clone(), set_error("invalidPatch", "patch must be an object"));
                continue;
            };
            match patched(st, email, patch, created_ids) {
                Ok(next) => {
                    let seen_changed = email.has_keyword("$seen") != next.has_keyword("$seen");
                    let touched: Vec<String> = if seen_changed {
                        email.mailbox_ids.union(&next.mailbox_ids).cloned().collect()
                    } else {
                        email.mailbox_ids.symmetric_difference(&next.mailbox_ids).cloned().collect()
                    };
                    st.emails.insert(id.clone(), next);
                    st.touch("Email", &id, Op::Updated);
                    for mailbox in touched {
                        st.touch("Mailbox", &mailbox, Op::Updated);
                    }
                    updated.insert(raw_id.clone(), Value::Null);
                }
                Err(error) => {
                    not_updated.insert(raw_id.clone(), error);
                }
            }
        }
    }
    for raw_id in requested_destroy(args) {
        let id = resolve(&raw_id, created_ids).unwrap_or_else(|| raw_id.clone());
        if st.remove_email(&id).is_some() {
            destroyed.push(raw_id);
        } else {
            not_destroyed.insert(raw_id, set_error("notFound", "no such email"));
        }
    }
    st.commit();
    json!({
        "accountId": account_id,
        "oldState": old_state,
        "newState": st.state(),
        "created": non_empty(created),
        "updated": non_empty(updated),
        "destroyed": id_list(destroyed),
        "notCreated": non_empty(not_created),
        "notUpdated": non_empty(not_updated),
        "notDestroyed": non_empty(not_destroyed),
    })
}

pub(crate) fn import(
    st: &mut AccountState,
    account_id: &str,
    args: &Value,
    created_ids: &mut BTreeMap<String, String>,
) -> Value {
    let old_state = st.state();
    let mut created = Map::new();
    let mut not_created = Map::new();
    let empty = Map::new();
    let requests = args.get("emails").and_then(Value::as_object).unwrap_or(&empty);

    for (cid, spec) in requests {
        let Some(blob_id) = spec.get("blobId").and_then(Value::as_str) else {
            not_created.insert(cid.clone(), set_error("invalidProperties", "blobId is required"));
            continue;
        };
        let Some(blob) = st.blobs.get(blob_id) else {
            not_created.insert(cid.clone(), set_error("blobNotFound", "no such blob"));
            continue;
        };
        if st
            .rejected_import_markers
            .iter()
            .any(|marker| contains_bytes(&blob.data, marker.as_bytes()))
        {
            not_created.insert(cid.clone(), set_error("invalidEmail", "message rejected"));
            continue;
        }
        let Some(mailbox_ids) = mailbox_set_arg(st, spec.get("mailboxIds"), created_ids) else {
            not_created.insert(cid.clone(), invalid_mailboxes());
            continue;
        };
        let id = st.add_email(
            blob_id,
            mailbox_ids,
            keyword_map(spec.get("keywords")),
            received_at_arg(spec.get("receivedAt")),
        );
        created_ids.insert(cid.clone(), id.clone());
        created.insert(cid.clone(), created_json(st, &id));
    }
    st.commit();
    json!({
        "accountId": account_id,
        "oldState": old_state,
        "newState": st.state(),
        "created": non_empty(created),
        "notCreated": non_empty(not_created),
    })
}

/// Only one account exists, so every copy source is either this account or
/// unknown.
pub(crate) fn copy(account_id: &str, args: &Value) -> MethodResult {
    match args.get("fromAccountId").and_then(Value::as_str) {
        None => Err(invalid_arguments("fromAccountId is required")),
        Some(from) if from == account_id => Err(invalid_arguments("fromAccountId must differ from accountId")),
        Some(_) => Err(method_error("fromAccountNotFound")),
    }
}

pub(crate) fn parse(st: &AccountState, account_id: &str, args: &Value) -> MethodResult {
    let blob_ids = args
        .get("blobIds")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid_arguments("blobIds is required"))?;
    let fetch = BodyFetch::from_args(args);
    let mut parsed = Map::new();
    let mut not_parsable = Vec::new();
    let mut not_found = Vec::new();
    for blob_id in blob_ids.iter().filter_map(Value::as_str) {
        let Some(blob) = st.blobs.get(blob_id) else {
            not_found.push(blob_id);
            continue;
        };
        if !is_parsable(&blob.data) {
            not_parsable.push(blob_id);
            continue;
        }
        let message = Message::parse(&blob.data);
        let mut full = message.properties(blob_id, fetch, args.get("bodyProperties"));
        for null_metadata in ["id", "threadId", "mailboxIds", "keywords", "receivedAt"] {
            full.insert(null_metadata.into(), Value::Null);
        }
        full.insert("blobId".into(), json!(blob_id));
        full.insert("size".into(), json!(blob.data.len()));
        parsed.insert(
            blob_id.to_string(),
            select(full, &message, args.get("properties"), DEFAULT_PARSE_PROPERTIES),
        );
    }
    Ok(json!({
        "accountId": account_id,
        "parsed": non_empty(parsed),
        "notParsable": not_parsable,
        "notFound": not_found,
    }))
}

// ---------------------------------------------------------------------------
// SearchSnippet
// ---------------------------------------------------------------------------

/// Terms a filter searches subjects and bodies for.
fn collect_terms(filter: &Value, subject: &mut Vec<String>, body: &mut Vec<String>) {
    let Some(map) = filter.as_object() else {
        return;
    };
    if map.get("operator").and_then(Value::as_str) == Some("NOT") {
        return;
    }
    for c in map.get("conditions").and_then(Value::as_array).into_iter().flatten() {
        collect_terms(c, subject, body);
    }
    let term = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
    if let Some(t) = term("text") {
        subject.push(t.clone());
        body.push(t);
    }
    if let Some(t) = term("subject") {
        subject.push(t);
    }
    if let Some(t) = term("body") {
        body.push(t);
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// `text` with every occurrence of a term wrapped in `<mark>`, or `None`
/// when nothing matches.
fn highlight(text: &str, terms: &[String]) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for term in terms.iter().map(|t| t.to_ascii_lowercase()).filter(|t| !t.is_empty()) {
        let mut from = 0;
        while let Some(pos) = lower[from..].find(&term) {
            let start = from + pos;
            ranges.push((start, start + term.len()));
            from = start + term.len();
        }
    }
    if ranges.is_empty() {
        return None;
    }
    ranges.sort_unstable();
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (start, end) in ranges {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    let mut out = String::new();
    let mut at = 0;
    for (start, end) in merged {
        out.push_str(&escape(&text[at..start]));
        out.push_str("<mark>");
        out.push_str(&escape(&text[start..end]));
        out.push_str("</mark>");
        at = end;
    }
    out.push_str(&escape(&text[at..]));
    Some(out)
}

fn floor_boundary(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Up to 255 bytes of body around the first match, highlighted.
fn excerpt(body: &str, terms: &[String]) -> Option<String> {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    let lower = flat.to_ascii_lowercase();
    let first = terms
        .iter()
        .filter(|t| !t.is_empty())
        .filter_map(|t| lower.find(&t.to_ascii_lowercase()))
        .min()?;
    let start = floor_boundary(&flat, first.saturating_sub(60));
    let end = floor_boundary(&flat, (start + 255).min(flat.len()));
    highlight(&flat[start..end], terms)
}

pub(crate) fn search_snippets(st: &AccountState, account_id: &str, args: &Value) -> MethodResult {
    let ids = args
        .get("emailIds")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid_arguments("emailIds is required"))?;
    let mut subject_terms = Vec::new();
    let mut body_terms = Vec::new();
    collect_terms(args.get("filter").unwrap_or(&Value::Null), &mut subject_terms, &mut body_terms);
    let mut list = Vec::new();
    let mut not_found = Vec::new();
    for id in ids.iter().filter_map(Value::as_str) {
        let Some(e) = st.emails.get(id) else {
            not_found.push(id.to_string());
            continue;
        };
        let subject = e.message.subject().and_then(|s| highlight(&s, &subject_terms));
        let preview = excerpt(&e.message.body_text(), &body_terms);
        list.push(json!({ "emailId": id, "subject": subject, "preview": preview }));
    }
    Ok(json!({ "accountId": account_id, "list": list, "notFound": id_list(not_found) }))
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::dispatch;

    fn call(st: &mut AccountState, name: &str, mut args: Value) -> Value {
        args["accountId"] = json!("A1");
        match dispatch(st, "A1", name, &args, &mut BTreeMap::new()) {
            Ok(v) | Err(v) => v,
        }
    }

    fn seeded() -> (AccountState, String) {
        let mut st = AccountState::default();
        let inbox = st.add_mailbox("Inbox", Some("inbox"), None);
        let messages = [
            ("2026-01-01T00:00:00Z", "From: Zed <zed@example.com>\r\nSubject: Budget review\r\nMessage-ID: <a@t>\r\n\r\nquarterly numbers\r\n"),
            ("2026-01-02T00:00:00Z", "From: Amy <amy@example.com>\r\nSubject: Re: Budget review\r\nMessage-ID: <b@t>\r\nIn-Reply-To: <a@t>\r\n\r\nlooks fine\r\n"),
            ("2026-01-03T00:00:00Z", "From: Bob <bob@example.com>\r\nSubject: Lunch\r\nX-Tag: blue\r\n\r\npizza today?\r\n"),
        ];
        for (at, raw) in messages {
            st.insert_email(&inbox, raw.as_bytes().to_vec(), at);
        }
        (st, inbox)
    }

    fn subjects(st: &AccountState, ids: &Value) -> Vec<String> {
        ids.as_array()
            .unwrap()
            .iter()
            .map(|id| st.emails[id.as_str().unwrap()].message.subject().unwrap())
            .collect()
    }

    #[test]
    fn filters_combine_with_operators() {
        let (mut st, _) = seeded();
        let r = call(&mut st, "Email/query", json!({"filter": {"operator": "OR", "conditions": [
            {"from": "zed"}, {"header": ["X-Tag", "BLUE"]}
        ]}}));
        assert_eq!(subjects(&st, &r["ids"]), ["Lunch", "Budget review"]);
        let r = call(&mut st, "Email/query", json!({"filter": {"operator": "NOT", "conditions": [{"text": "budget"}]}}));
        assert_eq!(subjects(&st, &r["ids"]), ["Lunch"]);
        let r = call(&mut st, "Email/query", json!({"filter": {"body": "pizza", "before": "2026-01-02T12:00:00Z"}}));
        assert_eq!(r["ids"], json!([]));
        let r = call(&mut st, "Email/query", json!({"filter": {"nope": 1}}));
        assert_eq!(r["type"], "unsupportedFilter");
    }

    #[test]
    fn sorts_and_collapses() {
        let (mut st, _) = seeded();
        let r = call(&mut st, "Email/query", json!({"sort": [{"property": "from", "isAscending": true}]}));
        assert_eq!(subjects(&st, &r["ids"]), ["Re: Budget review", "Lunch", "Budget review"]);
        let r = call(&mut st, "Email/query", json!({"collapseThreads": true, "calculateTotal": true}));
        assert_eq!(subjects(&st, &r["ids"]), ["Lunch", "Re: Budget review"]);
        assert_eq!(r["total"], 2);
        let r = call(&mut st, "Email/query", json!({"sort": [{"property": "color"}]}));
        assert_eq!(r["type"], "unsupportedSort");
    }

    #[test]
    fn create_builds_a_message_and_links_references() {
        let (mut st, inbox) = seeded();
        let r = call(&mut st, "Email/set", json!({"create": {"draft": {
            "mailboxIds": {&inbox: true},
            "keywords": {"$draft": true},
            "subject": "Fresh",
            "textBody": [{"partId": "1", "type": "text/plain"}],
            "bodyValues": {"1": {"value": "hello there"}},
        }}}));
        let id = r["created"]["draft"]["id"].as_str().unwrap().to_string();
        assert!(r["created"]["draft"]["size"].as_u64().unwrap() > 0);
        let got = call(&mut st, "Email/get", json!({"ids": [&id], "properties": ["subject", "keywords", "preview"]}));
        assert_eq!(got["list"][0]["subject"], "Fresh");
        assert_eq!(got["list"][0]["preview"], "hello there");
        assert_eq!(got["list"][0]["keywords"], json!({"$draft": true}));
        let refused = call(&mut st, "Email/set", json!({"create": {"x": {"mailboxIds": {}, "subject": "x"}}}));
        assert_eq!(refused["notCreated"]["x"]["properties"], json!(["mailboxIds"]));
    }

    #[test]
    fn parse_reports_each_blob() {
        let (mut st, _) = seeded();
        let good = st.store_blob("message/rfc822", b"Subject: parsed\r\n\r\nbody".to_vec());
        let junk = st.store_blob("text/plain", b"just some words".to_vec());
        let r = call(&mut st, "Email/parse", json!({"blobIds": [&good, &junk, "missing"], "properties": ["subject", "mailboxIds"]}));
        assert_eq!(r["parsed"][&good]["subject"], "parsed");
        assert!(r["parsed"][&good]["mailboxIds"].is_null());
        assert_eq!(r["notParsable"], json!([junk]));
        assert_eq!(r["notFound"], json!(["missing"]));
    }

    #[test]
    fn snippets_mark_matches() {
        let (mut st, _) = seeded();
        let ids: Vec<String> = st.emails.keys().cloned().collect();
        let r = call(&mut st, "SearchSnippet/get", json!({"emailIds": [&ids[0], "nope"], "filter": {"text": "budget"}}));
        assert_eq!(r["list"][0]["subject"], "<mark>Budget</mark> review");
        assert!(r["list"][0]["preview"].is_null());
        assert_eq!(r["notFound"], json!(["nope"]));
        assert_eq!(highlight("a < b", &["b".into()]).as_deref(), Some("a &lt; <mark>b</mark>"));
    }
}
