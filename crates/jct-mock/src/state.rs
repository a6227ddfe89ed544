// SPDX-License-Identifier: MIT OR Apache-2.0
//! Account data held by the mock.

use crate::mime::Message;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Query results kept for `*/queryChanges`.
const SNAPSHOT_LIMIT: usize = 256;

#[derive(Debug, Clone)]
pub(crate) struct Mailbox {
    pub id: String,
    pub name: String,
    pub role: Option<String>,
    pub parent_id: Option<String>,
    pub sort_order: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct Email {
    pub id: String,
    pub blob_id: String,
    pub thread_id: String,
    pub mailbox_ids: BTreeSet<String>,
    pub keywords: BTreeMap<String, bool>,
    pub received_at: DateTime<Utc>,
    pub size: u64,
    pub message: Message,
}

impl Email {
    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.keywords.contains_key(keyword)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Blob {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// What happened to one record at one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Created,
    Updated,
    Destroyed,
}

#[derive(Debug, Clone)]
pub(crate) struct Change {
    pub seq: u64,
    pub kind: &'static str,
    pub id: String,
    pub op: Op,
}

/// Everything the mock account stores, plus the failure knobs.
#[derive(Debug, Default)]
pub(crate) struct AccountState {
    next_id: u64,
    state_seq: u64,
    pub mailboxes: BTreeMap<String, Mailbox>,
    pub emails: BTreeMap<String, Email>,
    pub blobs: BTreeMap<String, Blob>,
    pub identities: Vec<Value>,
    pub submissions: BTreeMap<String, Value>,
    pub vacation: Option<Value>,
    pub changes: Vec<Change>,
    dirty: BTreeSet<&'static str>,
    committed: BTreeSet<&'static str>,
    snapshots: VecDeque<(String, Vec<String>)>,
    /// Responses a method adds after its own, such as the implicit
    /// `Email/set` of a submission.
    pub follow_ups: Vec<(String, Value)>,
    pub failing_methods: BTreeMap<String, String>,
    pub rejected_import_markers: Vec<String>,
    pub undeletable_mailboxes: BTreeSet<String>,
    pub method_log: Vec<String>,
}

impl AccountState {
    pub fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    pub fn state(&self) -> String {
        format!("s{}", self.state_seq)
    }

    /// Parse a state string this account handed out. `None` for foreign
    /// or future states.
    pub fn parse_state(&self, state: &str) -> Option<u64> {
        state
            .strip_prefix('s')
            .and_then(|n| n.parse::<u64>().ok())
            .filter(|n| *n <= self.state_seq)
    }

    // ------------------------------------------------------------------
    // Change log
    // ------------------------------------------------------------------

    /// Record a change to `kind` record `id`, effective at the next commit.
    pub fn touch(&mut self, kind: &'static str, id: &str, op: Op) {
        self.changes.push(Change {
            seq: self.state_seq + 1,
            kind,
            id: id.to_string(),
            op,
        });
        self.dirty.insert(kind);
    }

    /// Move to a new state if anything was touched since the last commit.
    pub fn commit(&mut self) {
        if self.dirty.is_empty() {
            return;
        }
        self.state_seq += 1;
        self.committed.append(&mut self.dirty);
    }

    /// Types changed since the last call, for push notifications.
    pub fn take_committed(&mut self) -> BTreeSet<&'static str> {
        std::mem::take(&mut self.committed)
    }

    // ------------------------------------------------------------------
    // Query snapshots
    // ------------------------------------------------------------------

    pub fn remember_query(&mut self, key: String, ids: Vec<String>) {
        let key = format!("{key}@{}", self.state());
        if self.snapshots.iter().any(|(k, _)| *k == key) {
            return;
        }
        if self.snapshots.len() == SNAPSHOT_LIMIT {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back((key, ids));
    }

    pub fn recall_query(&self, key: &str, state: &str) -> Option<&[String]> {
        let key = format!("{key}@{state}");
        self.snapshots
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, ids)| ids.as_slice())
    }

    // ------------------------------------------------------------------
    // Mailboxes and blobs
    // ------------------------------------------------------------------

    pub fn add_mailbox(&mut self, name: &str, role: Option<&str>, parent_id: Option<String>) -> String {
        let id = self.fresh_id("M");
        self.mailboxes.insert(
            id.clone(),
            Mailbox {
                id: id.clone(),
                name: name.to_string(),
                role: role.map(str::to_string),
                parent_id,
                sort_order: 0,
            },
        );
        self.touch("Mailbox", &id, Op::Created);
        id
    }

    pub fn mailbox_by_name(&self, name: &str) -> Option<&Mailbox> {
        self.mailboxes.values().find(|m| m.name == name)
    }

    pub fn has_children(&self, id: &str) -> bool {
        self.mailboxes
            .values()
            .any(|m| m.parent_id.as_deref() == Some(id))
    }

    pub fn store_blob(&mut self, content_type: &str, data: Vec<u8>) -> String {
        let id = self.fresh_id("B");
        self.blobs.insert(
            id.clone(),
            Blob {
                content_type: content_type.to_string(),
                data,
            },
        );
        id
    }

    // ------------------------------------------------------------------
    // Emails
    // ------------------------------------------------------------------

    /// Store `raw` as a new message in `mailbox_id`, bypassing the method layer.
    pub fn insert_email(&mut self, mailbox_id: &str, raw: Vec<u8>, received_at: &str) -> String {
        let received_at = DateTime::parse_from_rfc3339(received_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let blob_id = self.store_blob("message/rfc822", raw);
        let id = self.add_email(
            &blob_id,
            BTreeSet::from([mailbox_id.to_string()]),
            BTreeMap::new(),
            received_at,
        );
        self.commit();
        id
    }

    /// Create an email from the message stored in `blob_id`. The caller
    /// checks the blob exists.
    pub fn add_email(
        &mut self,
        blob_id: &str,
        mailbox_ids: BTreeSet<String>,
        keywords: BTreeMap<String, bool>,
        received_at: DateTime<Utc>,
    ) -> String {
        let (message, size) = match self.blobs.get(blob_id) {
            Some(blob) => (Message::parse(&blob.data), blob.data.len() as u64),
            None => (Message::default(), 0),
        };
        let thread_id = self.thread_for(&message);
        let id = self.fresh_id("E");
        let thread_exists = self.emails.values().any(|e| e.thread_id == thread_id);
        self.touch("Email", &id, Op::Created);
        let thread_op = if thread_exists { Op::Updated } else { Op::Created };
        self.touch("Thread", &thread_id, thread_op);
        for mailbox in &mailbox_ids {
            self.touch("Mailbox", mailbox, Op::Updated);
        }
        self.emails.insert(
            id.clone(),
            Email {
                id: id.clone(),
                blob_id: blob_id.to_string(),
                thread_id,
                mailbox_ids,
                keywords,
                received_at,
                size,
                message,
            },
        );
        id
    }

    /// Remove an email and record what that changes.
    pub fn remove_email(&mut self, id: &str) -> Option<Email> {
        let email = self.emails.remove(id)?;
        self.touch("Email", id, Op::Destroyed);
        let thread_left = self.emails.values().any(|e| e.thread_id == email.thread_id);
        let thread_op = if thread_left { Op::Updated } else { Op::Destroyed };
        self.touch("Thread", &email.thread_id, thread_op);
        for mailbox in &email.mailbox_ids {
            self.touch("Mailbox", mailbox, Op::Updated);
        }
        Some(email)
    }

    /// Thread of the message this one replies to, or of a stored reply
    /// to it; a new thread otherwise. Import order within one request is
    /// not significant.
    pub fn thread_for(&mut self, message: &Message) -> String {
        let message_id = message.message_id();
        let in_reply_to = message.in_reply_to();
        let existing = self
            .emails
            .values()
            .find(|e| {
                (in_reply_to.is_some() && e.message.message_id() == in_reply_to)
                    || (message_id.is_some() && e.message.in_reply_to() == message_id)
            })
            .map(|e| e.thread_id.clone());
        existing.unwrap_or_else(|| self.fresh_id("T"))
    }

    /// Members of `thread_id`, oldest first.
    pub fn thread_members(&self, thread_id: &str) -> Vec<&Email> {
        let mut members: Vec<&Email> = self.emails.values().filter(|e| e.thread_id == thread_id).collect();
        members.sort_by(|a, b| a.received_at.cmp(&b.received_at).then(a.id.cmp(&b.id)));
        members
    }

    pub fn mailbox_json(&self, m: &Mailbox) -> Value {
        let in_box: Vec<&Email> = self
            .emails
            .values()
            .filter(|e| e.mailbox_ids.contains(&m.id))
            .collect();
        let unread = in_box.iter().filter(|e| !e.has_keyword("$seen")).count();
        let threads: BTreeSet<&str> = in_box.iter().map(|e| e.thread_id.as_str()).collect();
        let unread_threads: BTreeSet<&str> = in_box
            .iter()
            .filter(|e| !e.has_keyword("$seen"))
            .map(|e| e.thread_id.as_str())
            .collect();
        json!({
            "id": m.id,
            "name": m.name,
            "role": m.role,
            "parentId": m.parent_id,
            "sortOrder": m.sort_order,
            "totalEmails": in_box.len(),
            "unreadEmails": unread,
            "totalThreads": threads.len(),
            "unreadThreads": unread_threads.len(),
            "isSubscribed": true,
            "myRights": {
                "mayReadItems": true, "mayAddItems": true, "mayRemoveItems": true,
                "maySetSeen": true, "maySetKeywords": true, "mayCreateChild": true,
                "mayRename": m.role.is_none(), "mayDelete": m.role.is_none(), "maySubmit": true
            }
        })
    }

    /// Full `Email` object; `Email/get` projects it down.
    pub fn email_json(&self, e: &Email, fetch: crate::mime::BodyFetch, body_properties: Option<&Value>) -> Value {
        let mut obj = e.message.properties(&e.blob_id, fetch, body_properties);
        let mailbox_ids: serde_json::Map<String, Value> = e
            .mailbox_ids
            .iter()
            .map(|id| (id.clone(), Value::Bool(true)))
            .collect();
        obj.insert("id".into(), json!(e.id));
        obj.insert("blobId".into(), json!(e.blob_id));
        obj.insert("threadId".into(), json!(e.thread_id));
        obj.insert("mailboxIds".into(), Value::Object(mailbox_ids));
        obj.insert("keywords".into(), json!(e.keywords));
        obj.insert(
            "receivedAt".into(),
            json!(e.received_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        obj.insert("size".into(), json!(e.size));
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(st: &mut AccountState, raw: &str) -> String {
        st.insert_email("M1", raw.as_bytes().to_vec(), "2026-01-01T00:00:00Z")
    }

    #[test]
    fn replies_join_parent_thread() {
        let mut st = AccountState::default();
        let parent = stored(&mut st, "Message-ID: <p@t>\r\n\r\n");
        let reply = stored(&mut st, "Message-ID: <r@t>\r\nIn-Reply-To: <p@t>\r\n\r\n");
        let other = stored(&mut st, "Message-ID: <o@t>\r\nIn-Reply-To: <other@t>\r\n\r\n");
        assert_eq!(st.emails[&reply].thread_id, st.emails[&parent].thread_id);
        assert_ne!(st.emails[&other].thread_id, st.emails[&parent].thread_id);
    }

    #[test]
    fn parent_stored_after_reply_joins_its_thread() {
        let mut st = AccountState::default();
        let reply = stored(&mut st, "Message-ID: <r@t>\r\nIn-Reply-To: <p@t>\r\n\r\n");
        let parent = stored(&mut st, "Message-ID: <p@t>\r\n\r\n");
        assert_eq!(st.emails[&reply].thread_id, st.emails[&parent].thread_id);
    }

    #[test]
    fn each_commit_moves_the_state_once() {
        let mut st = AccountState::default();
        st.commit();
        assert_eq!(st.state(), "s0");
        let id = stored(&mut st, "Subject: a\r\n\r\n");
        assert_eq!(st.state(), "s1");
        st.remove_email(&id);
        st.commit();
        assert_eq!(st.state(), "s2");
        let kinds: Vec<(&str, Op)> = st.changes.iter().filter(|c| c.seq == 2).map(|c| (c.kind, c.op)).collect();
        assert!(kinds.contains(&("Email", Op::Destroyed)));
        assert!(kinds.contains(&("Thread", Op::Destroyed)));
        assert_eq!(
            st.take_committed(),
            BTreeSet::from(["Email", "Mailbox", "Thread"])
        );
        assert!(st.take_committed().is_empty());
    }

    #[test]
    fn future_states_are_not_ours() {
        let mut st = AccountState::default();
        stored(&mut st, "Subject: a\r\n\r\n");
        assert_eq!(st.parse_state("s1"), Some(1));
        assert_eq!(st.parse_state("s2"), None);
        assert_eq!(st.parse_state("bogus"), None);
    }

    #[test]
    fn snapshots_are_keyed_by_state() {
        let mut st = AccountState::default();
        st.remember_query("Email|x".into(), vec!["E1".into()]);
        assert_eq!(st.recall_query("Email|x", "s0"), Some(&["E1".to_string()][..]));
        assert_eq!(st.recall_query("Email|x", "s1"), None);
    }
}
