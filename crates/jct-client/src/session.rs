// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::error::ClientError;
use jct_core::{CAP_CORE, CAP_MAIL, Session};
use serde_json::Value;

/// Properties every session resource must carry.
pub const REQUIRED_SESSION_PROPERTIES: &[&str] = &[
    "capabilities",
    "accounts",
    "primaryAccounts",
    "username",
    "apiUrl",
    "downloadUrl",
    "uploadUrl",
    "eventSourceUrl",
    "state",
];

/// Validate a raw session document and decode it.
pub fn parse_session(raw: Value) -> Result<Session, ClientError> {
    for key in REQUIRED_SESSION_PROPERTIES {
        if raw.get(key).is_none_or(Value::is_null) {
            return Err(ClientError::Session(format!(
                "session resource missing required property: {key}"
            )));
        }
    }
    for key in ["capabilities", "accounts", "primaryAccounts"] {
        if !raw[key].is_object() {
            return Err(ClientError::Session(format!(
                "session '{key}' must be an object"
            )));
        }
    }
    if raw["capabilities"].get(CAP_CORE).is_none() {
        return Err(ClientError::Session(format!(
            "session must advertise {CAP_CORE}"
        )));
    }
    let mut session: Session =
        serde_json::from_value(raw.clone()).map_err(|e| ClientError::Session(e.to_string()))?;
    session.raw = raw;
    Ok(session)
}

/// The primary account for the mail capability, which must also appear in
/// `accounts`.
pub fn mail_account_id(session: &Session) -> Result<String, ClientError> {
    let id = session.primary_account(CAP_MAIL).ok_or_else(|| {
        ClientError::Session(format!("no primary account for {CAP_MAIL}"))
    })?;
    if !session.accounts.contains_key(id) {
        return Err(ClientError::Session(format!(
            "primary mail account {id} not found in session accounts"
        )));
    }
    Ok(id.to_string())
}

/// First mail-capable account other than `primary` visible in the session.
pub fn cross_account_id(session: &Session, primary: &str) -> Option<String> {
    session
        .accounts
        .iter()
        .find(|(id, acct)| {
            id.as_str() != primary && acct.account_capabilities.contains_key(CAP_MAIL)
        })
        .map(|(id, _)| id.clone())
}
