// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::skip::needs_cross_account;
use crate::support::{expect_method_error, first, set_error_type};
use jct_client::OCTET_STREAM;
use jct_runtime::assertions::{
    ensure, ensure_contains, ensure_eq, ensure_id, ensure_type, string,
};
use jct_runtime::{Group, TestDescriptor};
use serde_json::json;

/// Checks in the `binary` category.
pub fn checks() -> Vec<TestDescriptor> {
    let upload = Group::new("binary", "RFC8620", "6.1");
    let download = Group::new("binary", "RFC8620", "6.2");
    let copy = Group::new("binary", "RFC8620", "6.3");
    vec![
        upload.define("upload-basic", "Upload returns accountId, blobId, type and size", upload_basic),
        upload.define("upload-binary-content", "Uploaded binary content downloads byte for byte", upload_binary_content),
        download.define("download-uploaded-blob", "Download a fixture blob by id", download_uploaded_blob),
        download.define("download-content-type", "Download honours the requested type", download_content_type)
            .recommended(),
        download.define("download-nonexistent-blob", "Download of unknown blob returns 404", download_nonexistent_blob),
        download.define("download-email-blob", "Email blobId downloads the raw message", download_email_blob),
        copy.define("blob-copy-same-account-error", "Blob/copy within one account is rejected", blob_copy_same_account_error)
            .recommended(),
        copy.define("blob-copy-cross-account", "Blob/copy copies a blob into another account", blob_copy_cross_account)
            .skip_if(needs_cross_account),
        copy.define("blob-copy-not-found", "Blob/copy reports unknown blobs in notCopied", blob_copy_not_found)
            .skip_if(needs_cross_account),
    ]
}

body!(upload_basic, |ctx| {
    let data = b"Hello, JMAP upload!".to_vec();
    let len = data.len() as u64;
    let resp = ctx.client.upload(data, "text/plain", None).await?;
    ensure_eq(&resp.account_id, &ctx.account_id, None)?;
    ensure_id(&resp.blob_id, None)?;
    ensure_contains(&resp.content_type, "text/plain", None)?;
    ensure_eq(&resp.size, &len, Some("size must match the uploaded octets"))?;
    Ok(())
});

body!(upload_binary_content, |ctx| {
    let data: Vec<u8> = (0..=255u8).collect();
    let resp = ctx.client.upload(data.clone(), OCTET_STREAM, None).await?;
    let got = ctx
        .client
        .download(&resp.blob_id, OCTET_STREAM, "bytes.bin", None)
        .await?;
    ensure_eq(&got.status, &200, None)?;
    ensure(got.body == data, "downloaded bytes differ from the upload")?;
    Ok(())
});

body!(download_uploaded_blob, |ctx| {
    let blob_id = ctx.blob("pdf")?.to_string();
    let got = ctx
        .client
        .download(&blob_id, "application/pdf", "test.pdf", None)
        .await?;
    ensure_eq(&got.status, &200, None)?;
    ensure(got.body.starts_with(b"%PDF"), "body must start with the PDF signature")?;
    Ok(())
});

body!(download_content_type, |ctx| {
    let blob_id = ctx.blob("jpeg")?.to_string();
    let got = ctx
        .client
        .download(&blob_id, "image/jpeg", "photo.jpg", None)
        .await?;
    ensure_eq(&got.status, &200, None)?;
    ensure_contains(got.header("content-type").unwrap_or_default(), "image/jpeg", None)?;
    Ok(())
});

body!(download_nonexistent_blob, |ctx| {
    let got = ctx
        .client
        .download("nonexistent-blob-xyz", OCTET_STREAM, "missing.bin", None)
        .await?;
    ensure_eq(&got.status, &404, None)?;
    Ok(())
});

body!(download_email_blob, |ctx| {
    let email_id = ctx.email("plain-simple")?.to_string();
    let resp = ctx
        .call("Email/get", json!({ "ids": [email_id], "properties": ["blobId"] }))
        .await?;
    let blob_id = string(&first(&resp, "Email/get")?["blobId"], "blobId")?.to_string();
    let got = ctx
        .client
        .download(&blob_id, "message/rfc822", "email.eml", None)
        .await?;
    ensure_eq(&got.status, &200, None)?;
    let text = String::from_utf8_lossy(&got.body);
    ensure_contains(&text, "Subject:", None)?;
    ensure_contains(&text, "Message-ID:", None)?;
    Ok(())
});

body!(blob_copy_same_account_error, |ctx| {
    let blob_id = ctx.blob("pdf")?.to_string();
    let result = ctx
        .client
        .call(
            "Blob/copy",
            json!({
                "fromAccountId": ctx.account_id,
                "accountId": ctx.account_id,
                "blobIds": [blob_id],
            }),
        )
        .await;
    expect_method_error(result, "invalidArguments")
});

body!(blob_copy_cross_account, |ctx| {
    let target = ctx
        .cross_account_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no cross account"))?;
    let blob_id = ctx.blob("pdf")?.to_string();
    let resp = ctx
        .client
        .call(
            "Blob/copy",
            json!({ "fromAccountId": ctx.account_id, "accountId": target, "blobIds": [blob_id] }),
        )
        .await?;
    ensure_type(&resp["copied"], "object", Some("copied must be an object"))?;
    let copied = string(&resp["copied"][blob_id.as_str()], "copied blob id")?;
    ensure_id(copied, None)?;
    Ok(())
});

body!(blob_copy_not_found, |ctx| {
    let target = ctx
        .cross_account_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no cross account"))?;
    let resp = ctx
        .client
        .call(
            "Blob/copy",
            json!({
                "fromAccountId": ctx.account_id,
                "accountId": target,
                "blobIds": ["nonexistent-blob-xyz"],
            }),
        )
        .await?;
    let kind = set_error_type(&resp, "notCopied", "nonexistent-blob-xyz")?;
    ensure_eq(&kind, &"blobNotFound", None)?;
    Ok(())
});
