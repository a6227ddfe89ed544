// SPDX-License-Identifier: MIT OR Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// An account entry in the session's `accounts` map.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// User-visible account name.
    #[serde(default)]
    pub name: String,
    /// Whether the account belongs to the authenticated user.
    #[serde(default)]
    pub is_personal: bool,
    /// Whether the whole account is read-only.
    #[serde(default)]
    pub is_read_only: bool,
    /// Per-account capability objects, keyed by capability URI.
    #[serde(default)]
    pub account_capabilities: Map<String, Value>,
}

/// The JMAP session resource.
///
/// The typed fields cover what the harness itself needs; `raw` keeps the
/// document exactly as the server sent it so checks can inspect properties
/// the typed view does not model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Server capabilities, keyed by capability URI.
    pub capabilities: Map<String, Value>,
    /// Accounts the user has access to, keyed by account id.
    pub accounts: BTreeMap<String, Account>,
    /// Capability URI to primary account id.
    pub primary_accounts: BTreeMap<String, String>,
    /// Authenticated username.
    pub username: String,
    /// Endpoint for API requests.
    pub api_url: String,
    /// Download URL template (`{accountId}`, `{blobId}`, `{type}`, `{name}`).
    pub download_url: String,
    /// Upload URL template (`{accountId}`).
    pub upload_url: String,
    /// Event source URL template.
    pub event_source_url: String,
    /// Session state token.
    pub state: String,
    /// The untouched session document.
    #[serde(skip)]
    pub raw: Value,
}

impl Session {
    /// Returns `true` if the server advertises `capability`.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains_key(capability)
    }

    /// The capability object for `capability`, if advertised.
    pub fn capability(&self, capability: &str) -> Option<&Value> {
        self.capabilities.get(capability)
    }

    /// Primary account id for `capability`.
    pub fn primary_account(&self, capability: &str) -> Option<&str> {
        self.primary_accounts.get(capability).map(String::as_str)
    }

    /// Upload URL with the account placeholder expanded.
    pub fn upload_url_for(&self, account_id: &str) -> String {
        self.upload_url.replace("{accountId}", account_id)
    }

    /// Download URL with every placeholder expanded.
    ///
    /// `content_type` and `name` are percent-encoded; ids are JMAP-safe already.
    pub fn download_url_for(
        &self,
        account_id: &str,
        blob_id: &str,
        content_type: &str,
        name: &str,
    ) -> String {
        self.download_url
            .replace("{accountId}", account_id)
            .replace("{blobId}", blob_id)
            .replace("{type}", &encode_component(content_type))
            .replace("{name}", &encode_component(name))
    }

    /// Event-source URL with `types`, `closeafter` and `ping` expanded.
    ///
    /// `types` is `*` or a comma-separated list of type names and is
    /// percent-encoded.
    pub fn event_source_url_for(&self, types: &str, close_after: &str, ping: u32) -> String {
        self.event_source_url
            .replace("{types}", &encode_component(types))
            .replace("{closeafter}", close_after)
            .replace("{ping}", &ping.to_string())
    }
}

fn encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        let unreserved = matches!(b, b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')');
        if b.is_ascii_alphanumeric() || unreserved {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Session {
        let raw = json!({
            "capabilities": { "urn:ietf:params:jmap:core": {}, "urn:ietf:params:jmap:mail": {} },
            "accounts": { "A1": { "name": "alice", "isPersonal": true, "isReadOnly": false,
                                  "accountCapabilities": {} } },
            "primaryAccounts": { "urn:ietf:params:jmap:mail": "A1" },
            "username": "alice",
            "apiUrl": "https://jmap.test/api",
            "downloadUrl": "https://jmap.test/dl/{accountId}/{blobId}/{name}?type={type}",
            "uploadUrl": "https://jmap.test/up/{accountId}",
            "eventSourceUrl": "https://jmap.test/es?types={types}&closeafter={closeafter}&ping={ping}",
            "state": "s1"
        });
        serde_json::from_value(raw).expect("valid session")
    }

    #[test]
    fn expands_download_template() {
        let s = sample();
        assert_eq!(
            s.download_url_for("A1", "B9", "text/plain", "my file.txt"),
            "https://jmap.test/dl/A1/B9/my%20file.txt?type=text%2Fplain"
        );
    }

    #[test]
    fn expands_upload_template() {
        assert_eq!(sample().upload_url_for("A1"), "https://jmap.test/up/A1");
    }

    #[test]
    fn expands_event_source_template() {
        let s = sample();
        assert_eq!(
            s.event_source_url_for("*", "no", 0),
            "https://jmap.test/es?types=*&closeafter=no&ping=0"
        );
        assert_eq!(
            s.event_source_url_for("Email,Mailbox", "state", 30),
            "https://jmap.test/es?types=Email%2CMailbox&closeafter=state&ping=30"
        );
    }

    #[test]
    fn capability_lookup() {
        let s = sample();
        assert!(s.has_capability(crate::CAP_MAIL));
        assert!(!s.has_capability(crate::CAP_SUBMISSION));
        assert_eq!(s.primary_account(crate::CAP_MAIL), Some("A1"));
    }
}
