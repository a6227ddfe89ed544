// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic RFC 5322 fixtures imported by the seed step.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};

/// Bytes of the `pdf` fixture blob: a PDF signature, a binary marker line
/// and padding.
pub fn pdf_blob() -> Vec<u8> {
    let mut data = b"%PDF-1.4\n%".to_vec();
    data.extend_from_slice(&[0xe2, 0xe3, 0xcf, 0xd3, 0x0a]);
    data.extend(std::iter::repeat_n(b' ', 100));
    data
}

/// Bytes of the `jpeg` fixture blob: a minimal JFIF header.
pub fn jpeg_blob() -> Vec<u8> {
    vec![
        0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0x4a, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x00, 0x00,
        0x01, 0x00, 0x01, 0x00, 0x00, 0xff, 0xd9,
    ]
}

/// `Thu, 01 Jan 2026 00:00:00 +0000`.
pub fn rfc2822_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S +0000").to_string()
}

/// Header and body fields of a single-part text message.
#[derive(Debug, Clone, Default)]
pub struct MessageSpec {
    /// `From:`
    pub from: String,
    /// `To:`
    pub to: String,
    /// `Cc:`
    pub cc: Option<String>,
    /// `Bcc:`
    pub bcc: Option<String>,
    /// `Subject:`, may be empty.
    pub subject: String,
    /// `Date:`
    pub date: DateTime<Utc>,
    /// `Message-ID:` including angle brackets.
    pub message_id: String,
    /// `In-Reply-To:`
    pub in_reply_to: Option<String>,
    /// `References:`
    pub references: Option<String>,
    /// Extra header lines, emitted after the MIME headers.
    pub extra_headers: Vec<String>,
}

impl MessageSpec {
    fn new(from: &str, to: &str, subject: &str, date: DateTime<Utc>, message_id: &str) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            date,
            message_id: message_id.into(),
            ..Self::default()
        }
    }

    fn envelope(&self) -> Vec<String> {
        let mut lines = vec![format!("From: {}", self.from), format!("To: {}", self.to)];
        if let Some(cc) = &self.cc {
            lines.push(format!("Cc: {cc}"));
        }
        if let Some(bcc) = &self.bcc {
            lines.push(format!("Bcc: {bcc}"));
        }
        lines.push(format!("Subject: {}", self.subject));
        lines.push(format!("Date: {}", rfc2822_date(self.date)));
        lines.push(format!("Message-ID: {}", self.message_id));
        if let Some(irt) = &self.in_reply_to {
            lines.push(format!("In-Reply-To: {irt}"));
        }
        if let Some(refs) = &self.references {
            lines.push(format!("References: {refs}"));
        }
        lines.push("MIME-Version: 1.0".into());
        lines
    }

    /// A `text/plain` message.
    pub fn plain(&self, body: &str) -> Vec<u8> {
        let mut lines = self.envelope();
        lines.push("Content-Type: text/plain; charset=UTF-8".into());
        lines.push("Content-Transfer-Encoding: 7bit".into());
        lines.extend(self.extra_headers.iter().cloned());
        lines.push(String::new());
        lines.push(body.into());
        lines.join("\r\n").into_bytes()
    }

    /// `multipart/mixed`: an HTML part and a base64 attachment.
    pub fn mixed(&self, html: &str, attachment_type: &str, attachment_name: &str, attachment: &[u8]) -> Vec<u8> {
        let boundary = "----=_Part_001_jct";
        let mut lines = self.envelope();
        lines.extend([
            format!("Content-Type: multipart/mixed; boundary=\"{boundary}\""),
            String::new(),
            format!("--{boundary}"),
            "Content-Type: text/html; charset=UTF-8".into(),
            "Content-Transfer-Encoding: 7bit".into(),
            String::new(),
            html.into(),
            format!("--{boundary}"),
            format!("Content-Type: {attachment_type}; name=\"{attachment_name}\""),
            format!("Content-Disposition: attachment; filename=\"{attachment_name}\""),
            "Content-Transfer-Encoding: base64".into(),
            String::new(),
            STANDARD.encode(attachment),
            format!("--{boundary}--"),
        ]);
        lines.join("\r\n").into_bytes()
    }

    /// `multipart/alternative`: text and HTML renderings.
    pub fn alternative(&self, text: &str, html: &str) -> Vec<u8> {
        let boundary = "----=_Alt_001_jct";
        let mut lines = self.envelope();
        lines.extend([
            format!("Content-Type: multipart/alternative; boundary=\"{boundary}\""),
            String::new(),
            format!("--{boundary}"),
            "Content-Type: text/plain; charset=UTF-8".into(),
            "Content-Transfer-Encoding: 7bit".into(),
            String::new(),
            text.into(),
            format!("--{boundary}"),
            "Content-Type: text/html; charset=UTF-8".into(),
            "Content-Transfer-Encoding: 7bit".into(),
            String::new(),
            html.into(),
            format!("--{boundary}--"),
        ]);
        lines.join("\r\n").into_bytes()
    }

    /// `multipart/related`: HTML plus an inline image addressed by `cid`.
    pub fn related(&self, html: &str, cid: &str, image: &[u8]) -> Vec<u8> {
        let boundary = "----=_Rel_001_jct";
        let mut lines = self.envelope();
        lines.extend([
            format!("Content-Type: multipart/related; boundary=\"{boundary}\""),
            String::new(),
            format!("--{boundary}"),
            "Content-Type: text/html; charset=UTF-8".into(),
            "Content-Transfer-Encoding: 7bit".into(),
            String::new(),
            html.into(),
            format!("--{boundary}"),
            "Content-Type: image/jpeg".into(),
            format!("Content-ID: <{cid}>"),
            "Content-Disposition: inline".into(),
            "Content-Transfer-Encoding: base64".into(),
            String::new(),
            STANDARD.encode(image),
            format!("--{boundary}--"),
        ]);
        lines.join("\r\n").into_bytes()
    }
}

/// Where fixture messages are filed.
#[derive(Debug, Clone)]
pub struct Targets {
    /// Inbox role mailbox.
    pub inbox: String,
    /// Drafts role mailbox, or the inbox when the server has none.
    pub drafts: String,
    /// Fixture `folderA`.
    pub folder_a: String,
    /// Fixture `folderB`.
    pub folder_b: String,
    /// Fixture `child1`.
    pub child1: String,
}

/// One message to import.
#[derive(Debug, Clone)]
pub struct FixtureMessage {
    /// Semantic name recorded in the run context.
    pub key: &'static str,
    /// RFC 5322 bytes.
    pub raw: Vec<u8>,
    /// Mailboxes the message is filed in.
    pub mailbox_ids: Vec<String>,
    /// Keywords set at import.
    pub keywords: Vec<&'static str>,
    /// `receivedAt` at import.
    pub received_at: DateTime<Utc>,
}

fn message(
    key: &'static str,
    raw: Vec<u8>,
    mailboxes: &[&String],
    keywords: &[&'static str],
    received_at: DateTime<Utc>,
) -> FixtureMessage {
    FixtureMessage {
        key,
        raw,
        mailbox_ids: mailboxes.iter().map(|m| (*m).clone()).collect(),
        keywords: keywords.to_vec(),
        received_at,
    }
}

/// Sender and recipient of the submission draft.
#[derive(Debug, Clone)]
pub struct DraftParties {
    /// Primary username.
    pub from: String,
    /// Secondary username.
    pub to: String,
}

/// The full fixture set, in import order. Dates are relative to `now`.
pub fn fixture_messages(now: DateTime<Utc>, t: &Targets, draft: Option<&DraftParties>) -> Vec<FixtureMessage> {
    let days = |d: i64| now - Duration::days(d);
    let hours = |h: i64| now - Duration::hours(h);
    const ME: &str = "testuser@example.com";
    let alice = "Alice Sender <alice@example.com>";
    let bob = "Bob Jones <bob@example.org>";

    let mut out = vec![
        message(
            "plain-simple",
            MessageSpec::new(alice, ME, "Meeting tomorrow morning", days(10), "<plain-simple-001@test>")
                .plain("Let's meet tomorrow at 9am in the conference room."),
            &[&t.inbox],
            &["$seen"],
            days(10),
        ),
        message(
            "html-attachment",
            MessageSpec {
                cc: Some("charlie@example.net".into()),
                ..MessageSpec::new(bob, ME, "Q3 Financial Report", days(9), "<html-attach-001@test>")
            }
            .mixed(
                "<html><body><h1>Q3 Report</h1><p>Please find the report attached.</p></body></html>",
                "application/pdf",
                "report.pdf",
                b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n",
            ),
            &[&t.inbox],
            &["$seen", "$flagged"],
            days(9),
        ),
        message(
            "thread-starter",
            MessageSpec::new(ME, "alice@example.com", "Project Alpha Discussion", days(8), "<thread-alpha-001@test>")
                .plain("I'd like to discuss the Project Alpha timeline."),
            &[&t.folder_a],
            &["$seen"],
            days(8),
        ),
        message(
            "thread-reply-1",
            MessageSpec {
                in_reply_to: Some("<thread-alpha-001@test>".into()),
                references: Some("<thread-alpha-001@test>".into()),
                ..MessageSpec::new(alice, ME, "Re: Project Alpha Discussion", days(7), "<thread-alpha-002@test>")
            }
            .plain("Sure, let's discuss. How about Thursday?"),
            &[&t.inbox],
            &[],
            days(7),
        ),
        message(
            "thread-reply-2",
            MessageSpec {
                in_reply_to: Some("<thread-alpha-002@test>".into()),
                references: Some("<thread-alpha-001@test> <thread-alpha-002@test>".into()),
                ..MessageSpec::new(
                    bob,
                    "testuser@example.com, alice@example.com",
                    "Re: Project Alpha Discussion",
                    days(6),
                    "<thread-alpha-003@test>",
                )
            }
            .plain("Thursday works for me. I'll bring the xylophone presentation materials."),
            &[&t.inbox],
            &["$answered"],
            days(6),
        ),
        message(
            "multi-mailbox",
            MessageSpec::new("David Cross <david@example.com>", ME, "Cross-filed document", days(5), "<multi-mb-001@test>")
                .plain("This document should appear in multiple folders."),
            &[&t.inbox, &t.folder_a],
            &["$seen"],
            days(5),
        ),
        message(
            "large-email",
            MessageSpec::new("Eve Large <eve@example.com>", ME, "Detailed analysis with data", days(4), "<large-001@test>")
                .plain(&format!(
                    "Start of analysis. {}End of analysis.",
                    "This is a detailed paragraph of analysis text that covers various topics. ".repeat(700)
                )),
            &[&t.folder_b],
            &[],
            days(4),
        ),
        message(
            "html-only",
            MessageSpec::new("Frank Newsletter <frank@example.com>", ME, "Newsletter: Weekly Digest", days(3), "<html-only-001@test>")
                .alternative(
                    "Weekly Digest - plain text version",
                    "<html><body><h1>Weekly Digest</h1><p>Here is your <b>weekly digest</b> of news.</p><img src=\"cid:image1\"/></body></html>",
                ),
            &[&t.inbox],
            &["$seen"],
            days(3),
        ),
        message(
            "no-subject",
            MessageSpec::new("Grace Minimal <grace@example.com>", ME, "", days(2), "<no-subj-001@test>")
                .plain("This message has no subject."),
            &[&t.inbox],
            &["$seen"],
            days(2),
        ),
        message(
            "custom-keywords",
            MessageSpec::new("Henry Tags <henry@example.com>", ME, "Tagged message", days(1), "<custom-kw-001@test>")
                .plain("This message has custom keywords applied."),
            &[&t.inbox],
            &["$seen", "$forwarded", "custom_label"],
            days(1),
        ),
        message(
            "very-old",
            MessageSpec::new("Iris Archive <iris@example.com>", ME, "Archived correspondence", days(30), "<old-001@test>")
                .plain("This is an old archived email from a month ago."),
            &[&t.folder_a],
            &["$seen"],
            days(30),
        ),
        message(
            "bcc-email",
            MessageSpec {
                bcc: Some("secret@example.com".into()),
                ..MessageSpec::new(ME, "jack@example.com", "Confidential note", days(2), "<bcc-001@test>")
            }
            .plain("This is a confidential message with a BCC recipient."),
            &[&t.folder_a],
            &["$seen", "$draft"],
            days(2),
        ),
        message(
            "special-headers",
            MessageSpec {
                extra_headers: vec![
                    "List-Post: <mailto:list@example.com>".into(),
                    "List-Unsubscribe: <https://example.com/unsub>".into(),
                    "X-Custom-Header: custom-value-12345".into(),
                ],
                ..MessageSpec::new("List Admin <list-admin@example.com>", ME, "Mailing list post", days(1), "<list-001@test>")
            }
            .plain("This is a post from a mailing list."),
            &[&t.inbox],
            &["$seen"],
            days(1),
        ),
        message(
            "multipart-related",
            MessageSpec::new("Kate Images <kate@example.com>", ME, "Image embedded email", hours(12), "<related-001@test>")
                .related(
                    "<html><body><p>See the image below:</p><img src=\"cid:image001@test\"/></body></html>",
                    "image001@test",
                    &jpeg_blob(),
                ),
            &[&t.inbox],
            &["$seen"],
            hours(12),
        ),
        message(
            "intl-sender",
            MessageSpec::new(
                "=?UTF-8?B?6YeR5Z+O5q2m?= <kaneshiro@example.com>",
                ME,
                "=?UTF-8?B?44GT44KT44Gr44Gh44Gv?=",
                hours(6),
                "<intl-001@test>",
            )
            .plain("This message has an internationalized sender name and subject."),
            &[&t.inbox],
            &[],
            hours(6),
        ),
        message(
            "sort-test-1",
            MessageSpec::new("Zara First <zara@example.com>", ME, "Alpha sort test", days(5), "<sort-001@test>")
                .plain(&"A".repeat(100)),
            &[&t.folder_b],
            &["$seen"],
            days(3),
        ),
        message(
            "sort-test-2",
            MessageSpec::new("Amy Second <amy@example.com>", ME, "Beta sort test", days(3), "<sort-002@test>")
                .plain(&"B".repeat(500)),
            &[&t.folder_b],
            &["$seen", "$flagged"],
            days(2),
        ),
        message(
            "sort-test-3",
            MessageSpec::new("Mike Third <mike@example.com>", ME, "Gamma sort test", days(1), "<sort-003@test>")
                .plain(&"C".repeat(50)),
            &[&t.folder_b],
            &[],
            days(1),
        ),
    ];

    if let Some(parties) = draft {
        out.push(message(
            "draft-for-submission",
            MessageSpec::new(&parties.from, &parties.to, "Test submission email", hours(1), "<submission-001@test>")
                .plain("This email will be used for submission testing."),
            &[&t.drafts],
            &["$seen", "$draft"],
            hours(1),
        ));
    }

    out.push(message(
        "child-mailbox-email",
        MessageSpec::new("Nancy Nested <nancy@example.com>", ME, "In nested folder", days(5), "<child-001@test>")
            .plain("This email lives in a nested child mailbox."),
        &[&t.child1],
        &["$seen"],
        days(5),
    ));
    out.push(message("korean-euckr", korean_euckr(hours(5)), &[&t.inbox], &["$seen"], hours(5)));
    out.push(message("invalid-ascii", invalid_ascii(hours(4)), &[&t.inbox], &["$seen"], hours(4)));
    out
}

/// A `text/plain; charset=EUC-KR` message with RFC 2047 encoded headers.
fn korean_euckr(date: DateTime<Utc>) -> Vec<u8> {
    // "테스트 이메일입니다" in EUC-KR.
    let body: [u8; 19] = [
        0xc5, 0xd7, 0xbd, 0xba, 0xc6, 0xae, 0x20, 0xc0, 0xcc, 0xb8, 0xde, 0xc0, 0xcf, 0xc0, 0xd4,
        0xb4, 0xcf, 0xb4, 0xd9,
    ];
    [
        "From: =?EUC-KR?B?seS/tbjR?= <korean-sender@example.com>".to_string(),
        "To: testuser@example.com".into(),
        "Subject: =?EUC-KR?B?sNa0z7TZx9Cw+A==?=".into(),
        format!("Date: {}", rfc2822_date(date)),
        "Message-ID: <korean-001@test>".into(),
        "MIME-Version: 1.0".into(),
        "Content-Type: text/plain; charset=EUC-KR".into(),
        "Content-Transfer-Encoding: base64".into(),
        String::new(),
        STANDARD.encode(body),
    ]
    .join("\r\n")
    .into_bytes()
}

/// A message declaring us-ascii that carries control characters, an
/// over-long line and raw 8-bit bytes.
fn invalid_ascii(date: DateTime<Utc>) -> Vec<u8> {
    let mut raw = [
        "From: broken@example.com".to_string(),
        "To: testuser@example.com".into(),
        "Subject: Malformed email test".into(),
        format!("Date: {}", rfc2822_date(date)),
        "Message-ID: <invalid-001@test>".into(),
        "MIME-Version: 1.0".into(),
        "Content-Type: text/plain; charset=us-ascii".into(),
        "X-Broken-Header: value with \x01\x02 control chars".into(),
        String::new(),
        "This email has some issues.".into(),
        format!("It has a line that is way too long: {}", "x".repeat(1000)),
        String::new(),
    ]
    .join("\r\n")
    .into_bytes();
    raw.extend_from_slice(b"And some 8-bit chars in ASCII: caf\xe9 na\xefve r\xe9sum\xe9\r\nEnd of message.");
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn targets() -> Targets {
        Targets {
            inbox: "in".into(),
            drafts: "dr".into(),
            folder_a: "fa".into(),
            folder_b: "fb".into(),
            child1: "c1".into(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 11, 0, 0, 0).unwrap()
    }

    #[test]
    fn date_format_matches_rfc2822() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(rfc2822_date(at), "Thu, 01 Jan 2026 00:00:00 +0000");
    }

    #[test]
    fn draft_only_with_parties() {
        let without = fixture_messages(now(), &targets(), None);
        assert!(without.iter().all(|m| m.key != "draft-for-submission"));
        let parties = DraftParties {
            from: "alice".into(),
            to: "bob".into(),
        };
        let with = fixture_messages(now(), &targets(), Some(&parties));
        assert_eq!(with.len(), without.len() + 1);
        let draft = with.iter().find(|m| m.key == "draft-for-submission").unwrap();
        assert_eq!(draft.mailbox_ids, vec!["dr".to_string()]);
    }

    #[test]
    fn keys_are_unique_and_cover_the_set() {
        let all = fixture_messages(now(), &targets(), None);
        let mut keys: Vec<&str> = all.iter().map(|m| m.key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), all.len());
        assert_eq!(all.len(), 21);
    }

    #[test]
    fn thread_reply_references_parent() {
        let all = fixture_messages(now(), &targets(), None);
        let reply = all.iter().find(|m| m.key == "thread-reply-1").unwrap();
        let text = String::from_utf8(reply.raw.clone()).unwrap();
        assert!(text.contains("\r\nIn-Reply-To: <thread-alpha-001@test>\r\n"));
        assert!(text.contains("\r\n\r\nSure, let's discuss."));
    }

    #[test]
    fn invalid_ascii_keeps_raw_high_bytes() {
        let all = fixture_messages(now(), &targets(), None);
        let bad = all.iter().find(|m| m.key == "invalid-ascii").unwrap();
        assert!(bad.raw.contains(&0xe9));
        assert!(bad.raw.contains(&0x01));
        assert!(String::from_utf8(bad.raw.clone()).is_err());
    }
}
