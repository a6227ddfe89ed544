// SPDX-License-Identifier: MIT OR Apache-2.0
//! Small response helpers shared by the check bodies.

use jct_client::ClientError;
use jct_runtime::assertions::{array, ensure_eq, ensure_type, string};
use jct_runtime::{AssertionFailure, Check, RunContext};
use serde_json::{Map, Value, json};

/// First entry of `resp.list`.
pub(crate) fn first<'a>(resp: &'a Value, what: &str) -> Check<&'a Value> {
    array(&resp["list"], what)?
        .first()
        .ok_or_else(|| AssertionFailure::new(format!("{what}: list is empty")))
}

/// Id assigned to creation key `key` in a `/set` or `/import` response.
pub(crate) fn created_id(resp: &Value, key: &str) -> Check<String> {
    resp["created"][key]["id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            AssertionFailure::new(format!("'{key}' was not created: {}", resp["notCreated"][key]))
        })
}

/// SetError type recorded under `key` in `resp[field]`.
pub(crate) fn set_error_type<'a>(resp: &'a Value, field: &str, key: &str) -> Check<&'a str> {
    resp[field][key]["type"]
        .as_str()
        .ok_or_else(|| AssertionFailure::new(format!("expected {field}['{key}'], got {}", resp[field])))
}

/// `{ id: true }` for every id.
pub(crate) fn id_set<'a>(ids: impl IntoIterator<Item = &'a str>) -> Value {
    Value::Object(
        ids.into_iter()
            .map(|id| (id.to_string(), Value::Bool(true)))
            .collect::<Map<String, Value>>(),
    )
}

/// `Email/set` create object for a plain-text message in `mailbox`.
pub(crate) fn plain_email(mailbox: &str, subject: &str, body: &str) -> Value {
    json!({
        "mailboxIds": id_set([mailbox]),
        "from": [{ "name": "Conformance", "email": "conformance@example.com" }],
        "to": [{ "name": "User", "email": "user@example.com" }],
        "subject": subject,
        "bodyStructure": { "type": "text/plain", "partId": "1" },
        "bodyValues": { "1": { "value": body } },
    })
}

/// Create one email from `props` and return its id.
pub(crate) async fn create_email(ctx: &RunContext, props: Value) -> anyhow::Result<String> {
    let resp = ctx
        .call("Email/set", json!({ "create": { "draft": props } }))
        .await?;
    Ok(created_id(&resp, "draft")?)
}

/// Destroy emails created by a check.
pub(crate) async fn destroy_emails(ctx: &RunContext, ids: &[&str]) -> anyhow::Result<()> {
    ctx.call("Email/set", json!({ "destroy": ids })).await?;
    Ok(())
}

/// `state` from a `/get` with no ids.
pub(crate) async fn get_state(ctx: &RunContext, type_name: &str) -> anyhow::Result<String> {
    let resp = ctx
        .call(&format!("{type_name}/get"), json!({ "ids": [] }))
        .await?;
    Ok(string(&resp["state"], "state")?.to_string())
}

/// `{id}` members of a `/queryChanges` `added` list.
pub(crate) fn added_ids(resp: &Value) -> Vec<String> {
    resp["added"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|a| a["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Require the standard `/changes` response shape.
pub(crate) fn ensure_changes_shape(resp: &Value) -> Check {
    for key in ["accountId", "oldState", "newState"] {
        ensure_type(&resp[key], "string", None)?;
    }
    ensure_type(&resp["hasMoreChanges"], "boolean", None)?;
    for list in ["created", "updated", "destroyed"] {
        ensure_type(&resp[list], "array", None)?;
    }
    Ok(())
}

/// String members of a JSON array; non-strings are dropped.
pub(crate) fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Require a method-level error of type `expected`.
pub(crate) fn expect_method_error(
    result: Result<Value, ClientError>,
    expected: &str,
) -> anyhow::Result<()> {
    match result {
        Ok(resp) => Err(AssertionFailure::new(format!(
            "expected method error '{expected}', call succeeded: {resp}"
        ))
        .into()),
        Err(err) => match err.method_error_type() {
            Some(kind) => {
                ensure_eq(&kind, &expected, None)?;
                Ok(())
            }
            None => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jct_client::MethodError;
    use serde_json::json;

    #[test]
    fn created_id_names_the_set_error() {
        let resp = json!({ "created": null, "notCreated": { "k": { "type": "forbidden" } } });
        let err = created_id(&resp, "k").unwrap_err();
        assert!(err.message.contains("forbidden"));
        let ok = json!({ "created": { "k": { "id": "M1" } } });
        assert_eq!(created_id(&ok, "k").unwrap(), "M1");
    }

    #[test]
    fn method_error_type_is_compared() {
        let err = MethodError::from_args(&json!({ "type": "invalidArguments" }));
        assert!(expect_method_error(Err(err.clone().into()), "invalidArguments").is_ok());
        assert!(expect_method_error(Err(err.into()), "notFound").is_err());
        assert!(expect_method_error(Ok(json!({})), "notFound").is_err());
    }

    #[test]
    fn plain_email_targets_one_mailbox() {
        let email = plain_email("M1", "Hi", "body");
        assert_eq!(email["mailboxIds"], json!({ "M1": true }));
        assert_eq!(email["bodyValues"]["1"]["value"], "body");
    }

    #[test]
    fn changes_shape_requires_every_list() {
        let full = json!({
            "accountId": "A", "oldState": "1", "newState": "2", "hasMoreChanges": false,
            "created": [], "updated": [], "destroyed": [],
        });
        assert!(ensure_changes_shape(&full).is_ok());
        let mut partial = full.clone();
        partial["updated"] = Value::Null;
        assert!(ensure_changes_shape(&partial).is_err());
        assert_eq!(added_ids(&json!({ "added": [{ "id": "e1", "index": 0 }] })), vec!["e1"]);
    }

    #[test]
    fn strings_skips_non_strings() {
        assert_eq!(strings(&json!(["a", 1, "b"])), vec!["a", "b"]);
        assert!(strings(&Value::Null).is_empty());
    }
}
