// SPDX-License-Identifier: MIT OR Apache-2.0
//! `Identity/*`, `EmailSubmission/*` and `VacationResponse/*`.

use crate::email;
use crate::methods::{
    eval_filter, id_list, invalid_arguments, method_error, non_empty, project, requested_destroy,
    requested_ids, resolve, set_error,
};
use crate::state::{AccountState, Op};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};

const VACATION_ID: &str = "singleton";

fn get_response<'a>(
    st: &AccountState,
    account_id: &str,
    args: &Value,
    records: impl Iterator<Item = &'a Value>,
) -> Value {
    let records: Vec<&Value> = records.collect();
    let props = args.get("properties");
    let (list, not_found): (Vec<Value>, Vec<String>) = match requested_ids(args) {
        None => (records.iter().map(|r| project((*r).clone(), props)).collect(), Vec::new()),
        Some(ids) => {
            let mut list = Vec::new();
            let mut missing = Vec::new();
            for id in ids {
                match records.iter().find(|r| r["id"].as_str() == Some(id.as_str())) {
                    Some(r) => list.push(project((*r).clone(), props)),
                    None => missing.push(id),
                }
            }
            (list, missing)
        }
    };
    json!({ "accountId": account_id, "state": st.state(), "list": list, "notFound": not_found })
}

fn invalid_property(name: &str, description: &str) -> Value {
    json!({ "type": "invalidProperties", "description": description, "properties": [name] })
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

pub(crate) fn identity_get(st: &AccountState, account_id: &str, args: &Value) -> Value {
    get_response(st, account_id, args, st.identities.iter())
}

/// Apply the writable identity fields of `patch` to `identity`.
fn patch_identity(identity: &mut Value, patch: &Map<String, Value>) -> Result<(), Value> {
    for (key, value) in patch {
        let valid = match key.as_str() {
            "name" | "textSignature" | "htmlSignature" => value.is_string(),
            "replyTo" | "bcc" => value.is_null() || value.is_array(),
            _ => return Err(invalid_property(key, "property cannot be set")),
        };
        if !valid {
            return Err(invalid_property(key, "wrong type"));
        }
        identity[key.as_str()] = value.clone();
    }
    Ok(())
}

pub(crate) fn identity_set(
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
            let Some(address) = props.get("email").and_then(Value::as_str) else {
                not_created.insert(cid.clone(), invalid_property("email", "email is required"));
                continue;
            };
            let id = st.fresh_id("I");
            let mut identity = json!({
                "id": id,
                "name": "",
                "email": address,
                "replyTo": null,
                "bcc": null,
                "textSignature": "",
                "htmlSignature": "",
                "mayDelete": true,
            });
            let mut writable = props.as_object().cloned().unwrap_or_default();
            writable.remove("email");
            if let Err(error) = patch_identity(&mut identity, &writable) {
                not_created.insert(cid.clone(), error);
                continue;
            }
            st.identities.push(identity);
            st.touch("Identity", &id, Op::Created);
            created_ids.insert(cid.clone(), id.clone());
            created.insert(cid.clone(), json!({ "id": id, "mayDelete": true }));
        }
    }
    if let Some(update) = args.get("update").and_then(Value::as_object) {
        for (id, patch) in update {
            let Some(identity) = st.identities.iter_mut().find(|i| i["id"].as_str() == Some(id.as_str())) else {
                not_updated.insert(id.clone(), set_error("notFound", "no such identity"));
                continue;
            };
            let Some(patch) = patch.as_object() else {
                not_updated.insert(id.clone(), set_error("invalidPatch", "patch must be an object"));
                continue;
            };
            let mut next = identity.clone();
            match patch_identity(&mut next, patch) {
                Ok(()) => {
                    *identity = next;
                    st.touch("Identity", id, Op::Updated);
                    updated.insert(id.clone(), Value::Null);
                }
                Err(error) => {
                    not_updated.insert(id.clone(), error);
                }
            }
        }
    }
    for id in requested_destroy(args) {
        let before = st.identities.len();
        st.identities.retain(|i| i["id"].as_str() != Some(id.as_str()));
        if st.identities.len() < before {
            st.touch("Identity", &id, Op::Destroyed);
            destroyed.push(id);
        } else {
            not_destroyed.insert(id, set_error("notFound", "no such identity"));
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

// ---------------------------------------------------------------------------
// VacationResponse
// ---------------------------------------------------------------------------

fn vacation(st: &AccountState) -> Value {
    st.vacation.clone().unwrap_or_else(|| {
        json!({
            "id": VACATION_ID,
            "isEnabled": false,
            "fromDate": null,
            "toDate": null,
            "subject": null,
            "textBody": null,
            "htmlBody": null,
        })
    })
}

pub(crate) fn vacation_get(st: &AccountState, account_id: &str, args: &Value) -> Value {
    let record = vacation(st);
    get_response(st, account_id, args, std::iter::once(&record))
}

fn patch_vacation(record: &mut Value, patch: &Map<String, Value>) -> Result<(), Value> {
    for (key, value) in patch {
        let valid = match key.as_str() {
            "isEnabled" => value.is_boolean(),
            "subject" | "textBody" | "htmlBody" => value.is_null() || value.is_string(),
            "fromDate" | "toDate" => {
                value.is_null() || value.as_str().is_some_and(|d| DateTime::parse_from_rfc3339(d).is_ok())
            }
            _ => return Err(invalid_property(key, "property cannot be set")),
        };
        if !valid {
            return Err(invalid_property(key, "wrong type"));
        }
        record[key.as_str()] = value.clone();
    }
    Ok(())
}

pub(crate) fn vacation_set(st: &mut AccountState, account_id: &str, args: &Value) -> Value {
    let old_state = st.state();
    let mut updated = Map::new();
    let mut not_updated = Map::new();
    let mut not_created = Map::new();
    let mut not_destroyed = Map::new();

    if let Some(create) = args.get("create").and_then(Value::as_object) {
        for cid in create.keys() {
            not_created.insert(cid.clone(), set_error("singleton", "the vacation response always exists"));
        }
    }
    if let Some(update) = args.get("update").and_then(Value::as_object) {
        for (id, patch) in update {
            if id != VACATION_ID {
                not_updated.insert(id.clone(), set_error("notFound", "only singleton exists"));
                continue;
            }
            let Some(patch) = patch.as_object() else {
                not_updated.insert(id.clone(), set_error("invalidPatch", "patch must be an object"));
                continue;
            };
            let mut record = vacation(st);
            match patch_vacation(&mut record, patch) {
                Ok(()) => {
                    st.vacation = Some(record);
                    st.touch("VacationResponse", VACATION_ID, Op::Updated);
                    updated.insert(id.clone(), Value::Null);
                }
                Err(error) => {
                    not_updated.insert(id.clone(), error);
                }
            }
        }
    }
    for id in requested_destroy(args) {
        not_destroyed.insert(id, set_error("singleton", "the vacation response cannot be destroyed"));
    }
    st.commit();
    json!({
        "accountId": account_id,
        "oldState": old_state,
        "newState": st.state(),
        "created": null,
        "updated": non_empty(updated),
        "destroyed": null,
        "notCreated": non_empty(not_created),
        "notUpdated": non_empty(not_updated),
        "notDestroyed": non_empty(not_destroyed),
    })
}

// ---------------------------------------------------------------------------
// EmailSubmission
// ---------------------------------------------------------------------------

pub(crate) fn submission_get(st: &AccountState, account_id: &str, args: &Value) -> Value {
    get_response(st, account_id, args, st.submissions.values())
}

pub(crate) fn submission_query_ids(st: &AccountState, args: &Value) -> Result<Vec<String>, Value> {
    let filter = args.get("filter").unwrap_or(&Value::Null);
    let mut matched = Vec::new();
    for sub in st.submissions.values() {
        let condition = |cond: &Map<String, Value>| -> Result<bool, Value> {
            for (key, value) in cond {
                let in_list = |field: &str| {
                    value
                        .as_array()
                        .is_some_and(|ids| ids.iter().any(|id| *id == sub[field]))
                };
                let ok = match key.as_str() {
                    "identityIds" => in_list("identityId"),
                    "emailIds" => in_list("emailId"),
                    "threadIds" => in_list("threadId"),
                    "undoStatus" => *value == sub["undoStatus"],
                    "before" | "after" => {
                        let bound = value
                            .as_str()
                            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                            .ok_or_else(|| invalid_arguments("dates must be RFC 3339 UTCDate values"))?;
                        let sent = sub["sendAt"]
                            .as_str()
                            .and_then(|d| DateTime::parse_from_rfc3339(d).ok());
                        match sent {
                            Some(sent) if key == "before" => sent < bound,
                            Some(sent) => sent >= bound,
                            None => false,
                        }
                    }
                    _ => return Err(method_error("unsupportedFilter")),
                };
                if !ok {
                    return Ok(false);
                }
            }
            Ok(true)
        };
        if eval_filter(filter, &condition)? {
            matched.push(sub);
        }
    }
    let mut keys: Vec<(&str, bool)> = Vec::new();
    for comparator in args.get("sort").and_then(Value::as_array).into_iter().flatten() {
        let ascending = comparator.get("isAscending").and_then(Value::as_bool).unwrap_or(true);
        match comparator.get("property").and_then(Value::as_str) {
            Some("emailId") => keys.push(("emailId", ascending)),
            Some("threadId") => keys.push(("threadId", ascending)),
            Some("sentAt") => keys.push(("sendAt", ascending)),
            _ => return Err(method_error("unsupportedSort")),
        }
    }
    matched.sort_by(|a, b| {
        keys.iter()
            .map(|(field, ascending)| {
                let ord = a[*field].as_str().cmp(&b[*field].as_str());
                if *ascending { ord } else { ord.reverse() }
            })
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a["id"].as_str().cmp(&b["id"].as_str()))
    });
    Ok(matched
        .into_iter()
        .filter_map(|s| s["id"].as_str().map(str::to_string))
        .collect())
}

fn address_entries(list: &Value) -> Vec<Value> {
    list.as_array()
        .into_iter()
        .flatten()
        .filter_map(|a| a.get("email").and_then(Value::as_str))
        .map(|email| json!({ "email": email, "parameters": null }))
        .collect()
}

/// Validate and store one submission, returning its id.
fn create_submission(
    st: &mut AccountState,
    props: &Value,
    created_ids: &BTreeMap<String, String>,
) -> Result<String, Value> {
    let identity_id = props
        .get("identityId")
        .and_then(Value::as_str)
        .and_then(|id| resolve(id, created_ids))
        .ok_or_else(|| invalid_property("identityId", "identityId is required"))?;
    let identity_email = st
        .identities
        .iter()
        .find(|i| i["id"].as_str() == Some(identity_id.as_str()))
        .and_then(|i| i["email"].as_str())
        .map(str::to_string)
        .ok_or_else(|| invalid_property("identityId", "no such identity"))?;
    let email_id = props
        .get("emailId")
        .and_then(Value::as_str)
        .and_then(|id| resolve(id, created_ids))
        .ok_or_else(|| invalid_property("emailId", "emailId is required"))?;
    let email = st
        .emails
        .get(&email_id)
        .ok_or_else(|| invalid_property("emailId", "no such email"))?;
    let (mail_from, rcpt_to) = match props.get("envelope").filter(|e| !e.is_null()) {
        Some(envelope) => (
            envelope["mailFrom"]["email"]
                .as_str()
                .unwrap_or(&identity_email)
                .to_string(),
            address_entries(&envelope["rcptTo"]),
        ),
        None => {
            let full = st.email_json(email, Default::default(), None);
            let mut seen = BTreeSet::new();
            let rcpt: Vec<Value> = ["to", "cc", "bcc"]
                .iter()
                .flat_map(|field| address_entries(&full[*field]))
                .filter(|r| seen.insert(r["email"].to_string()))
                .collect();
            (identity_email.clone(), rcpt)
        }
    };
    if rcpt_to.is_empty() {
        return Err(set_error("noRecipients", "the submission has no recipients"));
    }
    let thread_id = email.thread_id.clone();
    let id = st.fresh_id("S");
    let delivery: Map<String, Value> = rcpt_to
        .iter()
        .filter_map(|r| r["email"].as_str())
        .map(|addr| {
            (
                addr.to_string(),
                json!({ "smtpReply": "250 2.0.0 OK", "delivered": "yes", "displayed": "unknown" }),
            )
        })
        .collect();
    st.submissions.insert(
        id.clone(),
        json!({
            "id": id,
            "identityId": identity_id,
            "emailId": email_id,
            "threadId": thread_id,
            "envelope": { "mailFrom": { "email": mail_from, "parameters": null }, "rcptTo": rcpt_to },
            "sendAt": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "undoStatus": "final",
            "deliveryStatus": delivery,
            "dsnBlobIds": [],
            "mdnBlobIds": [],
        }),
    );
    st.touch("EmailSubmission", &id, Op::Created);
    Ok(id)
}

pub(crate) fn submission_set(
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
    // Submission id (and `#creationId` alias) to email id, for the
    // onSuccess follow-up.
    let mut succeeded: BTreeMap<String, String> = BTreeMap::new();

    if let Some(create) = args.get("create").and_then(Value::as_object) {
        for (cid, props) in create {
            match create_submission(st, props, created_ids) {
                Ok(id) => {
                    let record = st.submissions.get(&id).cloned().unwrap_or_default();
                    if let Some(email_id) = record["emailId"].as_str() {
                        succeeded.insert(format!("#{cid}"), email_id.to_string());
                        succeeded.insert(id.clone(), email_id.to_string());
                    }
                    created_ids.insert(cid.clone(), id.clone());
                    created.insert(
                        cid.clone(),
                        json!({
                            "id": id,
                            "threadId": record["threadId"],
                            "sendAt": record["sendAt"],
                            "undoStatus": record["undoStatus"],
                        }),
                    );
                }
                Err(error) => {
                    not_created.insert(cid.clone(), error);
                }
            }
        }
    }
    if let Some(update) = args.get("update").and_then(Value::as_object) {
        for (id, patch) in update {
            let Some(record) = st.submissions.get(id) else {
                not_updated.insert(id.clone(), set_error("notFound", "no such submission"));
                continue;
            };
            let error = match patch.get("undoStatus").and_then(Value::as_str) {
                Some("canceled") => set_error("cannotUnsend", "the message has already been sent"),
                _ => invalid_property("undoStatus", "only undoStatus may be changed, to canceled"),
            };
            if patch.as_object().is_some_and(Map::is_empty) {
                if let Some(email_id) = record["emailId"].as_str() {
                    succeeded.insert(id.clone(), email_id.to_string());
                }
                updated.insert(id.clone(), Value::Null);
            } else {
                not_updated.insert(id.clone(), error);
            }
        }
    }
    for id in requested_destroy(args) {
        match st.submissions.remove(&id) {
            Some(record) => {
                if let Some(email_id) = record["emailId"].as_str() {
                    succeeded.insert(id.clone(), email_id.to_string());
                }
                st.touch("EmailSubmission", &id, Op::Destroyed);
                destroyed.push(id);
            }
            None => {
                not_destroyed.insert(id, set_error("notFound", "no such submission"));
            }
        }
    }
    st.commit();
    let response = json!({
        "accountId": account_id,
        "oldState": old_state,
        "newState": st.state(),
        "created": non_empty(created),
        "updated": non_empty(updated),
        "destroyed": id_list(destroyed),
        "notCreated": non_empty(not_created),
        "notUpdated": non_empty(not_updated),
        "notDestroyed": non_empty(not_destroyed),
    });

    let mut email_update = Map::new();
    for (key, patch) in args
        .get("onSuccessUpdateEmail")
        .and_then(Value::as_object)
        .into_iter()
        .flatten()
    {
        if let Some(email_id) = succeeded.get(key) {
            email_update.insert(email_id.clone(), patch.clone());
        }
    }
    let email_destroy: Vec<&String> = args
        .get("onSuccessDestroyEmail")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter_map(|key| succeeded.get(key))
        .collect();
    if !email_update.is_empty() || !email_destroy.is_empty() {
        let email_args = json!({
            "accountId": account_id,
            "update": non_empty(email_update),
            "destroy": email_destroy,
        });
        let email_response = email::set(st, account_id, &email_args, created_ids);
        st.follow_ups.push(("Email/set".into(), email_response));
    }
    response
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

    fn account() -> (AccountState, String, String, String) {
        let mut st = AccountState::default();
        let drafts = st.add_mailbox("Drafts", Some("drafts"), None);
        let sent = st.add_mailbox("Sent", Some("sent"), None);
        st.identities.push(json!({"id": "I1", "name": "", "email": "me@example.com", "replyTo": null,
            "bcc": null, "textSignature": "", "htmlSignature": "", "mayDelete": true}));
        let email = st.insert_email(
            &drafts,
            b"From: me@example.com\r\nTo: you@example.com\r\nSubject: hi\r\n\r\nx".to_vec(),
            "2026-01-01T00:00:00Z",
        );
        (st, drafts, sent, email)
    }

    #[test]
    fn identity_updates_writable_fields_only() {
        let (mut st, ..) = account();
        let r = call(&mut st, "Identity/set", json!({"update": {
            "I1": {"name": "Me", "textSignature": "-- me"},
            "nope": {"name": "x"}
        }}));
        assert!(r["updated"].get("I1").is_some());
        assert_eq!(r["notUpdated"]["nope"]["type"], "notFound");
        assert_eq!(st.identities[0]["name"], "Me");
        let r = call(&mut st, "Identity/set", json!({"update": {"I1": {"email": "other@example.com"}}}));
        assert_eq!(r["notUpdated"]["I1"]["type"], "invalidProperties");
        assert_eq!(st.identities[0]["email"], "me@example.com");
    }

    #[test]
    fn vacation_is_a_singleton() {
        let (mut st, ..) = account();
        let r = call(&mut st, "VacationResponse/set", json!({
            "create": {"v": {}},
            "update": {"singleton": {"isEnabled": true, "subject": "Away"}},
            "destroy": ["singleton"],
        }));
        assert_eq!(r["notCreated"]["v"]["type"], "singleton");
        assert_eq!(r["notDestroyed"]["singleton"]["type"], "singleton");
        let got = call(&mut st, "VacationResponse/get", json!({"ids": null}));
        assert_eq!(got["list"][0]["isEnabled"], true);
        assert_eq!(got["list"][0]["subject"], "Away");
    }

    #[test]
    fn submission_moves_the_draft_on_success() {
        let (mut st, drafts, sent, email) = account();
        let r = call(&mut st, "EmailSubmission/set", json!({
            "create": {"s": {"identityId": "I1", "emailId": &email}},
            "onSuccessUpdateEmail": {"#s": {
                format!("mailboxIds/{drafts}"): null,
                format!("mailboxIds/{sent}"): true,
                "keywords/$draft": null
            }}
        }));
        assert_eq!(r["created"]["s"]["undoStatus"], "final");
        let (name, follow_up) = st.follow_ups.pop().unwrap();
        assert_eq!(name, "Email/set");
        assert!(follow_up["updated"].get(&email).is_some());
        assert!(st.emails[&email].mailbox_ids.contains(&sent));
        let listed = call(&mut st, "EmailSubmission/query", json!({"filter": {"undoStatus": "final"}}));
        assert_eq!(listed["ids"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn submission_without_recipients_is_refused() {
        let (mut st, drafts, ..) = account();
        let lonely = st.insert_email(&drafts, b"From: me@example.com\r\nSubject: none\r\n\r\nx".to_vec(), "2026-01-02T00:00:00Z");
        let r = call(&mut st, "EmailSubmission/set", json!({"create": {"s": {"identityId": "I1", "emailId": lonely}}}));
        assert_eq!(r["notCreated"]["s"]["type"], "noRecipients");
        let r = call(&mut st, "EmailSubmission/set", json!({"create": {"s": {"identityId": "I9", "emailId": "E1"}}}));
        assert_eq!(r["notCreated"]["s"]["properties"], json!(["identityId"]));
    }
}
