// SPDX-License-Identifier: MIT OR Apache-2.0
//! The mutable record every check body works against.

use crate::assertions::{AssertionFailure, Check};
use jct_client::JmapApi;
use jct_config::HarnessConfig;
use jct_core::{HttpExchange, Session};
use jct_relay::RelayChannel;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// State shared by one run: account handles, fixture ids and the optional
/// relay channel.
///
/// The runner owns it and lends it to one check body at a time.
pub struct RunContext {
    /// Client for the primary account.
    pub client: Arc<dyn JmapApi>,
    /// Session snapshot taken at bootstrap.
    pub session: Session,
    /// Primary mail account id.
    pub account_id: String,
    /// Configuration in effect.
    pub config: HarnessConfig,
    /// Fixture mailboxes by semantic name (`folderA`, `child1`, ...).
    pub mailbox_ids: BTreeMap<String, String>,
    /// Fixture emails by semantic name (`plain-simple`, ...).
    pub email_ids: BTreeMap<String, String>,
    /// Fixture blobs by semantic name (`pdf`, `jpeg`).
    pub blob_ids: BTreeMap<String, String>,
    /// Server role mailboxes, role to id.
    pub role_mailboxes: BTreeMap<String, String>,
    /// Identity ids of the primary account.
    pub identity_ids: Vec<String>,
    /// Email address of the first primary identity.
    pub identity_email: Option<String>,
    /// Client for the secondary principal, if configured.
    pub secondary: Option<Arc<dyn JmapApi>>,
    /// Email address of the secondary principal's first identity.
    pub secondary_email: Option<String>,
    /// Another mail-capable account reachable by the primary user.
    pub cross_account_id: Option<String>,
    /// Push relay channel, when one could be opened.
    pub relay: Option<RelayChannel>,
}

impl RunContext {
    /// A context with empty fixture maps.
    pub fn new(client: Arc<dyn JmapApi>, config: HarnessConfig) -> Self {
        let session = client.session().clone();
        let account_id = client.account_id().to_string();
        Self {
            client,
            session,
            account_id,
            config,
            mailbox_ids: BTreeMap::new(),
            email_ids: BTreeMap::new(),
            blob_ids: BTreeMap::new(),
            role_mailboxes: BTreeMap::new(),
            identity_ids: Vec::new(),
            identity_email: None,
            secondary: None,
            secondary_email: None,
            cross_account_id: None,
            relay: None,
        }
    }

    /// Attach the secondary principal.
    #[must_use]
    pub fn with_secondary(mut self, secondary: Arc<dyn JmapApi>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Set the cross-account id.
    #[must_use]
    pub fn with_cross_account(mut self, account_id: Option<String>) -> Self {
        self.cross_account_id = account_id;
        self
    }

    /// Exchanges recorded since the last drain: primary first, then
    /// secondary.
    pub fn drain_exchanges(&self) -> Vec<HttpExchange> {
        let mut out = self.client.drain_exchanges();
        if let Some(secondary) = &self.secondary {
            out.extend(secondary.drain_exchanges());
        }
        out
    }

    /// Returns `true` if the session advertises `capability`.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.session.has_capability(capability)
    }

    /// Id of the fixture mailbox `name`.
    pub fn mailbox(&self, name: &str) -> Check<&str> {
        lookup(&self.mailbox_ids, "mailbox", name)
    }

    /// Id of the fixture email `name`.
    pub fn email(&self, name: &str) -> Check<&str> {
        lookup(&self.email_ids, "email", name)
    }

    /// Id of the fixture blob `name`.
    pub fn blob(&self, name: &str) -> Check<&str> {
        lookup(&self.blob_ids, "blob", name)
    }

    /// Id of the mailbox holding `role`.
    pub fn role(&self, role: &str) -> Check<&str> {
        lookup(&self.role_mailboxes, "role mailbox", role)
    }

    /// Call `method` on the primary account with `accountId` filled in.
    pub async fn call(&self, method: &str, mut args: Value) -> anyhow::Result<Value> {
        if let Value::Object(map) = &mut args {
            map.entry("accountId")
                .or_insert_with(|| Value::String(self.account_id.clone()));
        }
        Ok(self.client.call(method, args).await?)
    }
}

fn lookup<'a>(map: &'a BTreeMap<String, String>, kind: &str, name: &str) -> Check<&'a str> {
    map.get(name)
        .map(String::as_str)
        .ok_or_else(|| AssertionFailure::new(format!("fixture {kind} '{name}' was not created")))
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("account_id", &self.account_id)
            .field("mailbox_ids", &self.mailbox_ids)
            .field("email_ids", &self.email_ids)
            .field("blob_ids", &self.blob_ids)
            .field("role_mailboxes", &self.role_mailboxes)
            .field("secondary", &self.secondary.is_some())
            .field("cross_account_id", &self.cross_account_id)
            .field("relay", &self.relay.as_ref().map(RelayChannel::url))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jct_mock::MockAccount;

    #[test]
    fn missing_fixture_is_an_assertion_failure() {
        let ctx = RunContext::new(Arc::new(MockAccount::new()), HarnessConfig::default());
        let err = ctx.mailbox("folderA").unwrap_err();
        assert_eq!(err.message, "fixture mailbox 'folderA' was not created");
    }

    #[tokio::test]
    async fn drain_merges_primary_then_secondary() {
        let primary = Arc::new(MockAccount::new());
        let secondary = Arc::new(MockAccount::named("bob", "B1"));
        let ctx = RunContext::new(primary, HarnessConfig::default()).with_secondary(secondary.clone());
        ctx.call("Core/echo", serde_json::json!({"p": 1})).await.unwrap();
        secondary.call("Core/echo", serde_json::json!({"s": 1})).await.unwrap();
        let ex = ctx.drain_exchanges();
        assert_eq!(ex.len(), 2);
        assert!(ex[0].request.url.starts_with("mock://alice"));
        assert!(ex[1].request.url.starts_with("mock://bob"));
        assert!(ctx.drain_exchanges().is_empty());
    }
}
