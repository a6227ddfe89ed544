// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::support::first;
use jct_runtime::assertions::{
    array, ensure, ensure_contains, ensure_eq, ensure_ge, ensure_gt, ensure_type, string,
};
use jct_runtime::{AssertionFailure, Check, Group, RunContext, TestDescriptor};
use serde_json::{Value, json};

/// Body-part and header-form checks for `Email/get`.
pub fn checks() -> Vec<TestDescriptor> {
    let body = Group::new("email", "RFC8621", "4.1.4");
    let header = Group::new("email", "RFC8621", "4.1.2");
    vec![
        body.define("body-structure", "bodyStructure returns the MIME tree", body_structure),
        body.define("body-text-body", "textBody lists the plain text parts", body_text_body),
        body.define("body-html-body", "htmlBody lists the HTML parts", body_html_body),
        body.define("body-attachments", "attachments lists the attached parts", body_attachments),
        body.define("body-values-text", "fetchTextBodyValues returns the text content", body_values_text),
        body.define("body-values-html", "fetchHTMLBodyValues returns the HTML content", body_values_html),
        body.define("body-values-all", "fetchAllBodyValues returns every text part", body_values_all),
        body.define("body-max-body-value-bytes", "maxBodyValueBytes truncates long values", body_max_body_value_bytes),
        body.define("body-properties-filter", "bodyProperties limits the part properties", body_properties_filter),
        body.define("body-multipart-alternative-text-and-html", "An alternative splits into textBody and htmlBody", body_alternative_text_and_html),
        body.define("body-inline-attachment-cid", "An inline image carries its Content-ID", body_inline_attachment_cid),
        body.define("body-attachment-blob-id", "Attachment parts carry a blobId", body_attachment_blob_id),
        body.define("body-non-utf8-charset", "A EUC-KR body reports its charset and encoding state", body_non_utf8_charset),
        body.define("body-invalid-ascii-handling", "A malformed message is still served", body_invalid_ascii_handling),
        header.define("header-from", "from returns the sender address", header_from),
        header.define("header-to", "to returns the recipient addresses", header_to),
        header.define("header-cc", "cc returns the CC addresses", header_cc),
        header.define("header-subject", "subject returns the decoded subject", header_subject),
        header.define("header-subject-empty", "An empty subject is empty or null", header_subject_empty),
        header.define("header-sent-at", "sentAt is the Date header as a date", header_sent_at),
        header.define("header-message-id", "messageId lists the Message-ID", header_message_id),
        header.define("header-in-reply-to", "inReplyTo lists the parent ids", header_in_reply_to),
        header.define("header-references", "references lists the whole chain", header_references),
        header.define("header-raw-access", "header:Subject:asText returns the subject", header_raw_access),
        header.define("header-as-addresses", "header:From:asAddresses parses addresses", header_as_addresses),
        header.define("header-as-grouped-addresses", "header:From:asGroupedAddresses returns groups", header_as_grouped_addresses),
        header.define("header-as-message-ids", "header:Message-ID:asMessageIds parses ids", header_as_message_ids),
        header.define("header-as-date", "header:Date:asDate parses the date", header_as_date),
        header.define("header-as-urls", "header:List-Unsubscribe:asURLs parses URLs", header_as_urls),
        header.define("header-custom-header", "A custom header is readable", header_custom_header),
        header.define("header-intl-from-decoded", "An encoded-word display name is decoded", header_intl_from_decoded),
        header.define("header-raw-form", "header:Subject returns the raw value", header_raw_form),
        header.define("header-case-insensitive", "Header names match case-insensitively", header_case_insensitive),
        header.define("header-bcc", "bcc returns the BCC address when kept", header_bcc),
    ]
}

/// `Email/get` of one fixture with `args` merged in; returns the email.
async fn get_fixture(ctx: &RunContext, key: &str, args: Value) -> anyhow::Result<Value> {
    let mut request = json!({ "ids": [ctx.email(key)?] });
    if let (Some(request), Value::Object(extra)) = (request.as_object_mut(), args) {
        request.extend(extra);
    }
    let resp = ctx.call("Email/get", request).await?;
    Ok(first(&resp, "Email/get")?.clone())
}

/// First depth-first part in a body structure with MIME type `mime`.
fn find_part<'a>(node: &'a Value, mime: &str) -> Option<&'a Value> {
    if node["type"].as_str().is_some_and(|t| t.eq_ignore_ascii_case(mime)) {
        return Some(node);
    }
    node["subParts"]
        .as_array()?
        .iter()
        .find_map(|child| find_part(child, mime))
}

/// The first body value of an email.
fn first_value(email: &Value) -> Check<&Value> {
    email["bodyValues"]
        .as_object()
        .and_then(|values| values.values().next())
        .ok_or_else(|| AssertionFailure::new("bodyValues must not be empty"))
}

fn first_type(parts: &Value, what: &str) -> Check<String> {
    let list = array(parts, what)?;
    ensure_gt(list.len(), 0, Some(what))?;
    Ok(string(&list[0]["type"], "type")?.to_ascii_lowercase())
}

// ── Body parts ──────────────────────────────────────────────────────

body!(body_structure, |ctx| {
    let email = get_fixture(
        ctx,
        "html-attachment",
        json!({
            "properties": ["bodyStructure"],
            "bodyProperties": ["partId", "type", "name", "disposition", "size", "subParts"],
        }),
    )
    .await?;
    let structure = &email["bodyStructure"];
    ensure_contains(string(&structure["type"], "type")?, "multipart/", None)?;
    ensure_gt(array(&structure["subParts"], "subParts")?.len(), 1, None)?;
    Ok(())
});

body!(body_text_body, |ctx| {
    let email = get_fixture(
        ctx,
        "plain-simple",
        json!({ "properties": ["textBody"], "bodyProperties": ["partId", "type"] }),
    )
    .await?;
    ensure_contains(&first_type(&email["textBody"], "textBody")?, "text/plain", None)?;
    Ok(())
});

body!(body_html_body, |ctx| {
    let email = get_fixture(
        ctx,
        "html-only",
        json!({ "properties": ["htmlBody"], "bodyProperties": ["partId", "type"] }),
    )
    .await?;
    ensure_contains(&first_type(&email["htmlBody"], "htmlBody")?, "text/html", None)?;
    Ok(())
});

body!(body_attachments, |ctx| {
    let email = get_fixture(
        ctx,
        "html-attachment",
        json!({
            "properties": ["attachments"],
            "bodyProperties": ["partId", "type", "name", "disposition", "size"],
        }),
    )
    .await?;
    let attachments = array(&email["attachments"], "attachments")?;
    ensure_gt(attachments.len(), 0, None)?;
    ensure_eq(&attachments[0]["name"], &json!("report.pdf"), None)?;
    Ok(())
});

body!(body_values_text, |ctx| {
    let email = get_fixture(
        ctx,
        "plain-simple",
        json!({
            "properties": ["textBody", "bodyValues"],
            "bodyProperties": ["partId"],
            "fetchTextBodyValues": true,
        }),
    )
    .await?;
    let value = first_value(&email)?;
    ensure_contains(string(&value["value"], "value")?, "conference room", None)?;
    ensure_type(&value["isEncodingProblem"], "boolean", None)?;
    ensure_eq(&value["isTruncated"], &json!(false), None)?;
    Ok(())
});

body!(body_values_html, |ctx| {
    let email = get_fixture(
        ctx,
        "html-only",
        json!({
            "properties": ["htmlBody", "bodyValues"],
            "bodyProperties": ["partId"],
            "fetchHTMLBodyValues": true,
        }),
    )
    .await?;
    ensure_contains(string(&first_value(&email)?["value"], "value")?, "Weekly Digest", None)?;
    Ok(())
});

body!(body_values_all, |ctx| {
    let email = get_fixture(
        ctx,
        "html-only",
        json!({
            "properties": ["textBody", "htmlBody", "bodyValues"],
            "bodyProperties": ["partId", "type"],
            "fetchAllBodyValues": true,
        }),
    )
    .await?;
    let values = email["bodyValues"].as_object().map_or(0, |v| v.len());
    ensure_ge(values, 2, Some("both alternatives have a value"))?;
    Ok(())
});

body!(body_max_body_value_bytes, |ctx| {
    let email = get_fixture(
        ctx,
        "large-email",
        json!({
            "properties": ["textBody", "bodyValues"],
            "bodyProperties": ["partId"],
            "fetchTextBodyValues": true,
            "maxBodyValueBytes": 100,
        }),
    )
    .await?;
    let value = first_value(&email)?;
    let text = string(&value["value"], "value")?;
    ensure(text.len() <= 100, format!("value is {} bytes, limit 100", text.len()))?;
    ensure_eq(&value["isTruncated"], &json!(true), None)?;
    Ok(())
});

body!(body_properties_filter, |ctx| {
    let email = get_fixture(
        ctx,
        "html-attachment",
        json!({ "properties": ["attachments"], "bodyProperties": ["partId", "type"] }),
    )
    .await?;
    for part in array(&email["attachments"], "attachments")? {
        let extra: Vec<&String> = part
            .as_object()
            .map(|o| o.keys().filter(|k| !matches!(k.as_str(), "partId" | "type")).collect())
            .unwrap_or_default();
        ensure(extra.is_empty(), format!("unrequested part properties: {extra:?}"))?;
    }
    Ok(())
});

body!(body_alternative_text_and_html, |ctx| {
    let email = get_fixture(
        ctx,
        "html-only",
        json!({ "properties": ["textBody", "htmlBody"], "bodyProperties": ["partId", "type"] }),
    )
    .await?;
    ensure_contains(&first_type(&email["textBody"], "textBody")?, "text/plain", None)?;
    ensure_contains(&first_type(&email["htmlBody"], "htmlBody")?, "text/html", None)?;
    Ok(())
});

body!(body_inline_attachment_cid, |ctx| {
    let email = get_fixture(
        ctx,
        "multipart-related",
        json!({
            "properties": ["bodyStructure"],
            "bodyProperties": ["partId", "type", "cid", "disposition", "subParts"],
        }),
    )
    .await?;
    let image = find_part(&email["bodyStructure"], "image/jpeg")
        .ok_or_else(|| AssertionFailure::new("no image/jpeg part in bodyStructure"))?;
    ensure_contains(string(&image["cid"], "cid")?, "image001@test", None)?;
    Ok(())
});

body!(body_attachment_blob_id, |ctx| {
    let email = get_fixture(
        ctx,
        "html-attachment",
        json!({
            "properties": ["attachments"],
            "bodyProperties": ["partId", "blobId", "type", "name", "size"],
        }),
    )
    .await?;
    let attachments = array(&email["attachments"], "attachments")?;
    ensure_gt(attachments.len(), 0, None)?;
    ensure(
        attachments[0]["blobId"].as_str().is_some_and(|b| !b.is_empty()),
        "attachment must have a blobId",
    )?;
    Ok(())
});

body!(body_non_utf8_charset, |ctx| {
    let email = get_fixture(
        ctx,
        "korean-euckr",
        json!({
            "properties": ["textBody", "bodyValues", "from", "subject"],
            "bodyProperties": ["partId", "charset"],
            "fetchTextBodyValues": true,
        }),
    )
    .await?;
    let charset = first_charset(&email)?;
    ensure_eq(&charset.as_str(), &"euc-kr", None)?;
    ensure_type(&first_value(&email)?["isEncodingProblem"], "boolean", None)?;
    Ok(())
});

fn first_charset(email: &Value) -> Check<String> {
    let parts = array(&email["textBody"], "textBody")?;
    ensure_gt(parts.len(), 0, None)?;
    Ok(string(&parts[0]["charset"], "charset")?.to_ascii_lowercase())
}

body!(body_invalid_ascii_handling, |ctx| {
    let email = get_fixture(
        ctx,
        "invalid-ascii",
        json!({
            "properties": ["subject", "textBody", "bodyValues"],
            "bodyProperties": ["partId"],
            "fetchTextBodyValues": true,
        }),
    )
    .await?;
    ensure_eq(&email["subject"], &json!("Malformed email test"), None)?;
    Ok(())
});

// ── Headers ─────────────────────────────────────────────────────────

async fn header_of(ctx: &RunContext, key: &str, property: &str) -> anyhow::Result<Value> {
    let email = get_fixture(ctx, key, json!({ "properties": [property] })).await?;
    Ok(email[property].clone())
}

/// `email` of the first address in an address list.
fn first_email(list: &Value, what: &str) -> Check<String> {
    let list = array(list, what)?;
    ensure_gt(list.len(), 0, Some(what))?;
    Ok(string(&list[0]["email"], "email")?.to_string())
}

body!(header_from, |ctx| {
    let from = header_of(ctx, "plain-simple", "from").await?;
    ensure_eq(&first_email(&from, "from")?.as_str(), &"alice@example.com", None)?;
    ensure_eq(&from[0]["name"], &json!("Alice Sender"), None)?;
    Ok(())
});

body!(header_to, |ctx| {
    let to = header_of(ctx, "plain-simple", "to").await?;
    ensure_eq(&first_email(&to, "to")?.as_str(), &"testuser@example.com", None)?;
    Ok(())
});

body!(header_cc, |ctx| {
    let cc = header_of(ctx, "html-attachment", "cc").await?;
    ensure_eq(&first_email(&cc, "cc")?.as_str(), &"charlie@example.net", None)?;
    Ok(())
});

body!(header_subject, |ctx| {
    let subject = header_of(ctx, "plain-simple", "subject").await?;
    ensure_eq(&subject, &json!("Meeting tomorrow morning"), None)?;
    Ok(())
});

body!(header_subject_empty, |ctx| {
    let subject = header_of(ctx, "no-subject", "subject").await?;
    ensure(
        subject.is_null() || subject == "",
        format!("expected an empty or null subject, got {subject}"),
    )?;
    Ok(())
});

body!(header_sent_at, |ctx| {
    let sent_at = header_of(ctx, "plain-simple", "sentAt").await?;
    let text = string(&sent_at, "sentAt")?;
    ensure(
        chrono::DateTime::parse_from_rfc3339(text).is_ok(),
        format!("sentAt {text} is not a date"),
    )?;
    Ok(())
});

body!(header_message_id, |ctx| {
    let ids = header_of(ctx, "thread-starter", "messageId").await?;
    let ids = array(&ids, "messageId")?;
    ensure_gt(ids.len(), 0, None)?;
    ensure_contains(string(&ids[0], "messageId")?, "thread-alpha-001@test", None)?;
    Ok(())
});

body!(header_in_reply_to, |ctx| {
    let ids = header_of(ctx, "thread-reply-1", "inReplyTo").await?;
    let ids = array(&ids, "inReplyTo")?;
    ensure_gt(ids.len(), 0, None)?;
    ensure_contains(string(&ids[0], "inReplyTo")?, "thread-alpha-001@test", None)?;
    Ok(())
});

body!(header_references, |ctx| {
    let refs = header_of(ctx, "thread-reply-2", "references").await?;
    ensure_ge(array(&refs, "references")?.len(), 2, None)?;
    Ok(())
});

body!(header_raw_access, |ctx| {
    let value = header_of(ctx, "plain-simple", "header:Subject:asText").await?;
    ensure_contains(string(&value, "header:Subject:asText")?, "Meeting tomorrow morning", None)?;
    Ok(())
});

body!(header_as_addresses, |ctx| {
    let addresses = header_of(ctx, "plain-simple", "header:From:asAddresses").await?;
    ensure_eq(&first_email(&addresses, "asAddresses")?.as_str(), &"alice@example.com", None)?;
    Ok(())
});

body!(header_as_grouped_addresses, |ctx| {
    let groups = header_of(ctx, "plain-simple", "header:From:asGroupedAddresses").await?;
    let groups = array(&groups, "asGroupedAddresses")?;
    ensure_gt(groups.len(), 0, None)?;
    ensure_type(&groups[0]["addresses"], "array", Some("each group has an addresses array"))?;
    Ok(())
});

body!(header_as_message_ids, |ctx| {
    let ids = header_of(ctx, "thread-starter", "header:Message-ID:asMessageIds").await?;
    let ids = array(&ids, "asMessageIds")?;
    ensure_gt(ids.len(), 0, None)?;
    ensure_contains(string(&ids[0], "asMessageIds")?, "thread-alpha-001@test", None)?;
    Ok(())
});

body!(header_as_date, |ctx| {
    let date = header_of(ctx, "plain-simple", "header:Date:asDate").await?;
    let text = string(&date, "asDate")?;
    ensure(
        chrono::DateTime::parse_from_rfc3339(text).is_ok(),
        format!("asDate {text} is not a date"),
    )?;
    Ok(())
});

body!(header_as_urls, |ctx| {
    let urls = header_of(ctx, "special-headers", "header:List-Unsubscribe:asURLs").await?;
    let urls = array(&urls, "asURLs")?;
    ensure_gt(urls.len(), 0, None)?;
    ensure_contains(string(&urls[0], "asURLs")?, "example.com/unsub", None)?;
    Ok(())
});

body!(header_custom_header, |ctx| {
    let value = header_of(ctx, "special-headers", "header:X-Custom-Header:asText").await?;
    ensure_contains(string(&value, "X-Custom-Header")?, "custom-value-12345", None)?;
    Ok(())
});

body!(header_intl_from_decoded, |ctx| {
    let from = header_of(ctx, "intl-sender", "from").await?;
    ensure_eq(&first_email(&from, "from")?.as_str(), &"kaneshiro@example.com", None)?;
    if let Some(name) = from[0]["name"].as_str() {
        ensure(
            !name.is_empty() && !name.contains("=?"),
            format!("display name {name:?} is not decoded"),
        )?;
    }
    Ok(())
});

body!(header_raw_form, |ctx| {
    let value = header_of(ctx, "plain-simple", "header:Subject").await?;
    ensure_contains(string(&value, "header:Subject")?, "Meeting tomorrow morning", None)?;
    Ok(())
});

body!(header_case_insensitive, |ctx| {
    let email = get_fixture(
        ctx,
        "plain-simple",
        json!({ "properties": ["header:subject:asText", "header:SUBJECT:asText"] }),
    )
    .await?;
    let lower = email["header:subject:asText"].as_str();
    let upper = email["header:SUBJECT:asText"].as_str();
    ensure(
        lower.or(upper).is_some_and(|s| s.contains("Meeting tomorrow morning")),
        "the subject must be found whatever the case of its name",
    )?;
    Ok(())
});

body!(header_bcc, |ctx| {
    let bcc = header_of(ctx, "bcc-email", "bcc").await?;
    if bcc.as_array().is_some_and(|list| !list.is_empty()) {
        ensure_eq(&first_email(&bcc, "bcc")?.as_str(), &"secret@example.com", None)?;
    }
    Ok(())
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_part_walks_nested_structures() {
        let tree = json!({
            "type": "multipart/mixed",
            "subParts": [
                { "type": "text/plain", "partId": "1" },
                { "type": "multipart/related", "subParts": [
                    { "type": "text/html", "partId": "2.1" },
                    { "type": "IMAGE/JPEG", "partId": "2.2", "cid": "img@test" },
                ] },
            ],
        });
        assert_eq!(find_part(&tree, "image/jpeg").unwrap()["partId"], "2.2");
        assert!(find_part(&tree, "application/pdf").is_none());
    }

    #[test]
    fn first_value_requires_a_body_value() {
        assert!(first_value(&json!({ "bodyValues": {} })).is_err());
        let email = json!({ "bodyValues": { "1": { "value": "hi" } } });
        assert_eq!(first_value(&email).unwrap()["value"], "hi");
    }
}
