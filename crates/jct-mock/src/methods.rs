// SPDX-License-Identifier: MIT OR Apache-2.0
//! Method handlers. Each returns the response arguments or the arguments of
//! an `error` response.

use crate::state::{AccountState, Op};
use crate::{email, submission};
use jct_core::{CAP_CORE, CAP_MAIL, CAP_SUBMISSION, CAP_VACATION};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};

pub(crate) type MethodResult = Result<Value, Value>;

/// Every method the mock answers.
const METHODS: &[&str] = &[
    "Core/echo",
    "Blob/copy",
    "Mailbox/get",
    "Mailbox/changes",
    "Mailbox/query",
    "Mailbox/queryChanges",
    "Mailbox/set",
    "Thread/get",
    "Thread/changes",
    "Email/get",
    "Email/changes",
    "Email/query",
    "Email/queryChanges",
    "Email/set",
    "Email/copy",
    "Email/import",
    "Email/parse",
    "SearchSnippet/get",
    "Identity/get",
    "Identity/changes",
    "Identity/set",
    "EmailSubmission/get",
    "EmailSubmission/changes",
    "EmailSubmission/query",
    "EmailSubmission/queryChanges",
    "EmailSubmission/set",
    "VacationResponse/get",
    "VacationResponse/set",
];

pub(crate) fn method_error(kind: &str) -> Value {
    json!({ "type": kind })
}

pub(crate) fn invalid_arguments(description: &str) -> Value {
    json!({ "type": "invalidArguments", "description": description })
}

pub(crate) fn set_error(kind: &str, description: &str) -> Value {
    json!({ "type": kind, "description": description })
}

pub(crate) fn non_empty(map: Map<String, Value>) -> Value {
    if map.is_empty() { Value::Null } else { Value::Object(map) }
}

pub(crate) fn id_list(ids: Vec<String>) -> Value {
    if ids.is_empty() { Value::Null } else { json!(ids) }
}

/// Resolve `#creationId` references made earlier in the same request.
pub(crate) fn resolve(id: &str, created: &BTreeMap<String, String>) -> Option<String> {
    match id.strip_prefix('#') {
        Some(cid) => created.get(cid).cloned(),
        None => Some(id.to_string()),
    }
}

/// Capability a request must be `using` to call `name`.
pub(crate) fn capability_for(name: &str) -> Option<&'static str> {
    match name.split_once('/')?.0 {
        "Core" | "Blob" | "PushSubscription" => Some(CAP_CORE),
        "Mailbox" | "Thread" | "Email" | "SearchSnippet" => Some(CAP_MAIL),
        "Identity" | "EmailSubmission" => Some(CAP_SUBMISSION),
        "VacationResponse" => Some(CAP_VACATION),
        _ => None,
    }
}

pub(crate) fn dispatch(
    st: &mut AccountState,
    account_id: &str,
    name: &str,
    args: &Value,
    created: &mut BTreeMap<String, String>,
) -> MethodResult {
    st.method_log.push(name.to_string());
    if let Some(kind) = st.failing_methods.get(name) {
        return Err(method_error(kind));
    }
    if !METHODS.contains(&name) {
        return Err(method_error("unknownMethod"));
    }
    validate(st, account_id, name, args)?;
    let reply = route(st, account_id, name, args, created);
    st.commit();
    reply
}

/// Argument checks shared by every method of a kind.
fn validate(st: &AccountState, account_id: &str, name: &str, args: &Value) -> Result<(), Value> {
    if !args.is_object() {
        return Err(invalid_arguments("arguments must be an object"));
    }
    let (type_name, method) = name.split_once('/').unwrap_or((name, ""));
    if type_name != "Core" {
        match args.get("accountId") {
            None | Some(Value::Null) => return Err(invalid_arguments("accountId is required")),
            Some(Value::String(id)) if id == account_id => {}
            Some(Value::String(_)) => return Err(method_error("accountNotFound")),
            Some(_) => return Err(invalid_arguments("accountId must be a string")),
        }
    }
    if method == "get"
        && let Some(ids) = args.get("ids")
        && !(ids.is_null() || ids.is_array())
    {
        return Err(invalid_arguments("ids must be an array or null"));
    }
    if matches!(method, "set" | "import" | "copy")
        && let Some(expected) = args.get("ifInState").and_then(Value::as_str)
        && expected != st.state()
    {
        return Err(method_error("stateMismatch"));
    }
    Ok(())
}

fn route(
    st: &mut AccountState,
    account_id: &str,
    name: &str,
    args: &Value,
    created: &mut BTreeMap<String, String>,
) -> MethodResult {
    match name {
        "Core/echo" => Ok(args.clone()),
        "Blob/copy" => blob_copy(account_id, args),
        "Mailbox/get" => Ok(mailbox_get(st, account_id, args)),
        "Mailbox/changes" => changes(st, account_id, "Mailbox", args),
        "Mailbox/query" => {
            let ids = mailbox_query_ids(st, args)?;
            query_response(st, account_id, "Mailbox", args, ids)
        }
        "Mailbox/queryChanges" => {
            let ids = mailbox_query_ids(st, args)?;
            query_changes(st, account_id, "Mailbox", args, ids)
        }
        "Mailbox/set" => Ok(mailbox_set(st, account_id, args, created)),
        "Thread/get" => Ok(thread_get(st, account_id, args)),
        "Thread/changes" => changes(st, account_id, "Thread", args),
        "Email/get" => Ok(email::get(st, account_id, args)),
        "Email/changes" => changes(st, account_id, "Email", args),
        "Email/query" => {
            let ids = email::query_ids(st, args)?;
            query_response(st, account_id, "Email", args, ids)
        }
        "Email/queryChanges" => {
            let ids = email::query_ids(st, args)?;
            query_changes(st, account_id, "Email", args, ids)
        }
        "Email/set" => Ok(email::set(st, account_id, args, created)),
        "Email/copy" => email::copy(account_id, args),
        "Email/import" => Ok(email::import(st, account_id, args, created)),
        "Email/parse" => email::parse(st, account_id, args),
        "SearchSnippet/get" => email::search_snippets(st, account_id, args),
        "Identity/get" => Ok(submission::identity_get(st, account_id, args)),
        "Identity/changes" => changes(st, account_id, "Identity", args),
        "Identity/set" => Ok(submission::identity_set(st, account_id, args, created)),
        "EmailSubmission/get" => Ok(submission::submission_get(st, account_id, args)),
        "EmailSubmission/changes" => changes(st, account_id, "EmailSubmission", args),
        "EmailSubmission/query" => {
            let ids = submission::submission_query_ids(st, args)?;
            query_response(st, account_id, "EmailSubmission", args, ids)
        }
        "EmailSubmission/queryChanges" => {
            let ids = submission::submission_query_ids(st, args)?;
            query_changes(st, account_id, "EmailSubmission", args, ids)
        }
        "EmailSubmission/set" => Ok(submission::submission_set(st, account_id, args, created)),
        "VacationResponse/get" => Ok(submission::vacation_get(st, account_id, args)),
        "VacationResponse/set" => Ok(submission::vacation_set(st, account_id, args)),
        _ => Err(method_error("unknownMethod")),
    }
}

pub(crate) fn requested_ids(args: &Value) -> Option<Vec<String>> {
    args.get("ids").and_then(Value::as_array).map(|ids| {
        ids.iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

pub(crate) fn project(obj: Value, properties: Option<&Value>) -> Value {
    let Some(props) = properties.and_then(Value::as_array) else {
        return obj;
    };
    let keep: BTreeSet<&str> = props.iter().filter_map(Value::as_str).collect();
    match obj {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| k == "id" || keep.contains(k.as_str()))
                .collect(),
        ),
        other => other,
    }
}

pub(crate) fn requested_destroy(args: &Value) -> Vec<String> {
    args.get("destroy")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Filters, queries and changes
// ---------------------------------------------------------------------------

/// Evaluate a filter tree: operators combine, anything else is a
/// condition handed to `condition`. A null filter matches everything.
pub(crate) fn eval_filter<F>(filter: &Value, condition: &F) -> Result<bool, Value>
where
    F: Fn(&Map<String, Value>) -> Result<bool, Value>,
{
    match filter {
        Value::Null => Ok(true),
        Value::Object(map) => match map.get("operator") {
            None => condition(map),
            Some(op) => {
                let conditions = map
                    .get("conditions")
                    .and_then(Value::as_array)
                    .ok_or_else(|| invalid_arguments("operator needs conditions"))?;
                let mut results = Vec::with_capacity(conditions.len());
                for c in conditions {
                    results.push(eval_filter(c, condition)?);
                }
                match op.as_str() {
                    Some("AND") => Ok(results.iter().all(|r| *r)),
                    Some("OR") => Ok(results.iter().any(|r| *r)),
                    Some("NOT") => Ok(!results.iter().any(|r| *r)),
                    _ => Err(invalid_arguments("unknown filter operator")),
                }
            }
        },
        _ => Err(invalid_arguments("filter must be an object")),
    }
}

fn query_key(kind: &str, args: &Value) -> String {
    let norm = |v: Option<&Value>| match v {
        None | Some(Value::Null) => String::new(),
        Some(Value::Object(m)) if m.is_empty() => String::new(),
        Some(Value::Array(a)) if a.is_empty() => String::new(),
        Some(v) => v.to_string(),
    };
    format!(
        "{kind}|{}|{}|{}",
        norm(args.get("filter")),
        norm(args.get("sort")),
        args.get("collapseThreads").and_then(Value::as_bool).unwrap_or(false)
    )
}

fn query_window(args: &Value, ids: &[String]) -> Result<(usize, Vec<String>), Value> {
    let limit = match args.get("limit") {
        None | Some(Value::Null) => usize::MAX,
        Some(v) => v
            .as_u64()
            .ok_or_else(|| invalid_arguments("limit must be a non-negative integer"))? as usize,
    };
    let start = match args.get("anchor").and_then(Value::as_str) {
        Some(anchor) => {
            let index = ids
                .iter()
                .position(|id| id == anchor)
                .ok_or_else(|| method_error("anchorNotFound"))?;
            let offset = args.get("anchorOffset").and_then(Value::as_i64).unwrap_or(0);
            (index as i64 + offset).max(0) as usize
        }
        None => {
            let position = match args.get("position") {
                None | Some(Value::Null) => 0,
                Some(v) => v
                    .as_i64()
                    .ok_or_else(|| invalid_arguments("position must be an integer"))?,
            };
            if position < 0 {
                (ids.len() as i64 + position).max(0) as usize
            } else {
                position as usize
            }
        }
    };
    Ok((start, ids.iter().skip(start).take(limit).cloned().collect()))
}

/// Answer a `*/query` from the full ordered result, remembering it for
/// later `*/queryChanges`.
pub(crate) fn query_response(
    st: &mut AccountState,
    account_id: &str,
    kind: &str,
    args: &Value,
    ids: Vec<String>,
) -> MethodResult {
    let (position, window) = query_window(args, &ids)?;
    let total = ids.len();
    st.remember_query(query_key(kind, args), ids);
    let mut out = json!({
        "accountId": account_id,
        "queryState": st.state(),
        "canCalculateChanges": true,
        "position": position,
        "ids": window,
    });
    if args.get("calculateTotal").and_then(Value::as_bool) == Some(true) {
        out["total"] = json!(total);
    }
    Ok(out)
}

pub(crate) fn query_changes(
    st: &mut AccountState,
    account_id: &str,
    kind: &str,
    args: &Value,
    current: Vec<String>,
) -> MethodResult {
    let since = args
        .get("sinceQueryState")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_arguments("sinceQueryState is required"))?;
    let key = query_key(kind, args);
    let old = st
        .recall_query(&key, since)
        .ok_or_else(|| method_error("cannotCalculateChanges"))?
        .to_vec();
    let removed: Vec<&String> = old.iter().filter(|id| !current.contains(id)).collect();
    let added: Vec<Value> = current
        .iter()
        .enumerate()
        .filter(|(_, id)| !old.contains(id))
        .map(|(index, id)| json!({ "id": id, "index": index }))
        .collect();
    let mut out = json!({
        "accountId": account_id,
        "oldQueryState": since,
        "newQueryState": st.state(),
        "removed": removed,
        "added": added,
    });
    if args.get("calculateTotal").and_then(Value::as_bool) == Some(true) {
        out["total"] = json!(current.len());
    }
    st.remember_query(key, current);
    Ok(out)
}

/// `*/changes` for `kind`, folded per record.
pub(crate) fn changes(st: &AccountState, account_id: &str, kind: &'static str, args: &Value) -> MethodResult {
    let since_label = args
        .get("sinceState")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_arguments("sinceState is required"))?;
    let since = st
        .parse_state(since_label)
        .ok_or_else(|| method_error("cannotCalculateChanges"))?;
    let max = match args.get("maxChanges") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_u64()
                .filter(|n| *n > 0)
                .ok_or_else(|| invalid_arguments("maxChanges must be a positive integer"))? as usize,
        ),
    };
    let relevant: Vec<_> = st
        .changes
        .iter()
        .filter(|c| c.kind == kind && c.seq > since)
        .collect();

    let mut upto: Option<u64> = None;
    if let Some(max) = max {
        let seqs: BTreeSet<u64> = relevant.iter().map(|c| c.seq).collect();
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut last = since;
        for seq in seqs {
            let mut next = seen.clone();
            next.extend(relevant.iter().filter(|c| c.seq == seq).map(|c| c.id.as_str()));
            if next.len() > max && last != since {
                upto = Some(last);
                break;
            }
            seen = next;
            last = seq;
        }
    }

    let mut order: Vec<&str> = Vec::new();
    let mut ops: BTreeMap<&str, (Op, Op)> = BTreeMap::new();
    for change in relevant.iter().filter(|c| upto.is_none_or(|u| c.seq <= u)) {
        match ops.get_mut(change.id.as_str()) {
            Some(entry) => entry.1 = change.op,
            None => {
                order.push(change.id.as_str());
                ops.insert(change.id.as_str(), (change.op, change.op));
            }
        }
    }
    let mut created = Vec::new();
    let mut updated = Vec::new();
    let mut destroyed = Vec::new();
    for id in order {
        match ops[id] {
            (Op::Created, Op::Destroyed) => {}
            (Op::Created, _) => created.push(id),
            (_, Op::Destroyed) => destroyed.push(id),
            _ => updated.push(id),
        }
    }
    let mut out = json!({
        "accountId": account_id,
        "oldState": since_label,
        "newState": upto.map(|u| format!("s{u}")).unwrap_or_else(|| st.state()),
        "hasMoreChanges": upto.is_some(),
        "created": created,
        "updated": updated,
        "destroyed": destroyed,
    });
    if kind == "Mailbox" {
        out["updatedProperties"] = Value::Null;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Mailbox
// ---------------------------------------------------------------------------

fn mailbox_get(st: &AccountState, account_id: &str, args: &Value) -> Value {
    let props = args.get("properties");
    let (list, not_found): (Vec<Value>, Vec<String>) = match requested_ids(args) {
        None => (
            st.mailboxes
                .values()
                .map(|m| project(st.mailbox_json(m), props))
                .collect(),
            Vec::new(),
        ),
        Some(ids) => {
            let mut list = Vec::new();
            let mut missing = Vec::new();
            for id in ids {
                match st.mailboxes.get(&id) {
                    Some(m) => list.push(project(st.mailbox_json(m), props)),
                    None => missing.push(id),
                }
            }
            (list, missing)
        }
    };
    json!({ "accountId": account_id, "state": st.state(), "list": list, "notFound": not_found })
}

fn mailbox_query_ids(st: &AccountState, args: &Value) -> Result<Vec<String>, Value> {
    let filter = args.get("filter").unwrap_or(&Value::Null);
    let mut matched = Vec::new();
    for m in st.mailboxes.values() {
        let condition = |cond: &Map<String, Value>| -> Result<bool, Value> {
            for (key, value) in cond {
                let ok = match key.as_str() {
                    "parentId" => m.parent_id.as_deref() == value.as_str(),
                    "name" => value
                        .as_str()
                        .is_some_and(|n| m.name.to_lowercase().contains(&n.to_lowercase())),
                    "role" => m.role.as_deref() == value.as_str(),
                    "hasAnyRole" => Some(m.role.is_some()) == value.as_bool(),
                    "isSubscribed" => value.as_bool() == Some(true),
                    _ => return Err(method_error("unsupportedFilter")),
                };
                if !ok {
                    return Ok(false);
                }
            }
            Ok(true)
        };
        if eval_filter(filter, &condition)? {
            matched.push(m);
        }
    }
    let mut keys: Vec<(&str, bool)> = Vec::new();
    for comparator in args.get("sort").and_then(Value::as_array).into_iter().flatten() {
        let ascending = comparator.get("isAscending").and_then(Value::as_bool).unwrap_or(true);
        match comparator.get("property").and_then(Value::as_str) {
            Some(p @ ("name" | "sortOrder")) => keys.push((p, ascending)),
            _ => return Err(method_error("unsupportedSort")),
        }
    }
    if keys.is_empty() {
        keys = vec![("sortOrder", true), ("name", true)];
    }
    matched.sort_by(|a, b| {
        keys.iter()
            .map(|(key, ascending)| {
                let ord = match *key {
                    "name" => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
                    _ => a.sort_order.cmp(&b.sort_order),
                };
                if *ascending { ord } else { ord.reverse() }
            })
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a.id.cmp(&b.id))
    });
    Ok(matched.into_iter().map(|m| m.id.clone()).collect())
}

fn mailbox_set(
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
            let Some(name) = props.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) else {
                not_created.insert(cid.clone(), set_error("invalidProperties", "name is required"));
                continue;
            };
            let parent = match props.get("parentId").and_then(Value::as_str) {
                None => None,
                Some(raw) => match resolve(raw, created_ids).filter(|p| st.mailboxes.contains_key(p)) {
                    Some(p) => Some(p),
                    None => {
                        not_created.insert(cid.clone(), set_error("invalidProperties", "unknown parentId"));
                        continue;
                    }
                },
            };
            let id = st.add_mailbox(name, None, parent);
            if let (Some(order), Some(m)) = (
                props.get("sortOrder").and_then(Value::as_u64),
                st.mailboxes.get_mut(&id),
            ) {
                m.sort_order = order;
            }
            created_ids.insert(cid.clone(), id.clone());
            created.insert(cid.clone(), json!({ "id": id, "sortOrder": 0, "isSubscribed": true }));
        }
    }

    if let Some(update) = args.get("update").and_then(Value::as_object) {
        for (id, patch) in update {
            if !st.mailboxes.contains_key(id) {
                not_updated.insert(id.clone(), set_error("notFound", "no such mailbox"));
                continue;
            }
            let parent = match patch.get("parentId") {
                None => None,
                Some(Value::Null) => Some(None),
                Some(raw) => match raw
                    .as_str()
                    .and_then(|p| resolve(p, created_ids))
                    .filter(|p| st.mailboxes.contains_key(p) && p != id)
                {
                    Some(p) => Some(Some(p)),
                    None => {
                        not_updated.insert(id.clone(), set_error("invalidProperties", "unknown parentId"));
                        continue;
                    }
                },
            };
            if patch.get("name").is_some_and(|n| n.as_str().is_none_or(str::is_empty)) {
                not_updated.insert(id.clone(), set_error("invalidProperties", "name must be a non-empty string"));
                continue;
            }
            if let Some(m) = st.mailboxes.get_mut(id) {
                if let Some(name) = patch.get("name").and_then(Value::as_str) {
                    m.name = name.to_string();
                }
                if let Some(order) = patch.get("sortOrder").and_then(Value::as_u64) {
                    m.sort_order = order;
                }
                if let Some(parent) = parent {
                    m.parent_id = parent;
                }
            }
            st.touch("Mailbox", id, Op::Updated);
            updated.insert(id.clone(), Value::Null);
        }
    }

    let remove_emails = args
        .get("onDestroyRemoveEmails")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    for id in requested_destroy(args) {
        let Some(mailbox) = st.mailboxes.get(&id) else {
            not_destroyed.insert(id, set_error("notFound", "no such mailbox"));
            continue;
        };
        if mailbox.role.is_some() || st.undeletable_mailboxes.contains(&mailbox.name) {
            not_destroyed.insert(id, set_error("forbidden", "mailbox may not be destroyed"));
            continue;
        }
        if st.has_children(&id) {
            not_destroyed.insert(id, set_error("mailboxHasChild", "mailbox has children"));
            continue;
        }
        let holds_email = st.emails.values().any(|e| e.mailbox_ids.contains(&id));
        if holds_email && !remove_emails {
            not_destroyed.insert(id, set_error("mailboxHasEmail", "mailbox is not empty"));
            continue;
        }
        st.mailboxes.remove(&id);
        st.touch("Mailbox", &id, Op::Destroyed);
        let mut orphaned = Vec::new();
        for e in st.emails.values_mut() {
            if e.mailbox_ids.remove(&id) && e.mailbox_ids.is_empty() {
                orphaned.push(e.id.clone());
            }
        }
        for email_id in orphaned {
            st.remove_email(&email_id);
        }
        destroyed.push(id);
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

// ---------------------------------------------------------------------------
// Thread and Blob
// ---------------------------------------------------------------------------

fn thread_get(st: &AccountState, account_id: &str, args: &Value) -> Value {
    let mut list = Vec::new();
    let mut not_found = Vec::new();
    for id in requested_ids(args).unwrap_or_default() {
        let members = st.thread_members(&id);
        if members.is_empty() {
            not_found.push(id);
            continue;
        }
        let email_ids: Vec<&str> = members.iter().map(|e| e.id.as_str()).collect();
        list.push(json!({ "id": id, "emailIds": email_ids }));
    }
    json!({ "accountId": account_id, "state": st.state(), "list": list, "notFound": not_found })
}

/// Only one account exists, so every copy source is either this account or
/// unknown.
fn blob_copy(account_id: &str, args: &Value) -> MethodResult {
    match args.get("fromAccountId").and_then(Value::as_str) {
        Some(from) if from == account_id => Err(set_error(
            "invalidArguments",
            "fromAccountId must differ from accountId",
        )),
        _ => Err(method_error("fromAccountNotFound")),
    }
}
