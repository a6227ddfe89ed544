// SPDX-License-Identifier: MIT OR Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One method call or response: `[name, arguments, callId]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation(pub String, pub Value, pub String);

impl Invocation {
    /// Build an invocation.
    pub fn new(name: impl Into<String>, args: Value, call_id: impl Into<String>) -> Self {
        Self(name.into(), args, call_id.into())
    }

    /// Method name (or `"error"` for a method-level error response).
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Arguments object.
    pub fn args(&self) -> &Value {
        &self.1
    }

    /// Client-chosen call id.
    pub fn call_id(&self) -> &str {
        &self.2
    }

    /// `true` when this is a method-level error response.
    pub fn is_error(&self) -> bool {
        self.0 == "error"
    }
}

/// A back-reference to an earlier call's result (RFC 8620 §3.7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultReference {
    /// Call id of the referenced invocation.
    pub result_of: String,
    /// Method name the referenced response must carry.
    pub name: String,
    /// JSON pointer into the referenced arguments.
    pub path: String,
}

impl ResultReference {
    /// Build a reference.
    pub fn new(result_of: &str, name: &str, path: &str) -> Self {
        Self {
            result_of: result_of.into(),
            name: name.into(),
            path: path.into(),
        }
    }

    /// JSON form suitable for a `#property` argument.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "resultOf": self.result_of,
            "name": self.name,
            "path": self.path,
        })
    }
}

/// The API request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JmapRequest {
    /// Capability URIs the request relies on.
    pub using: Vec<String>,
    /// Ordered method calls.
    pub method_calls: Vec<Invocation>,
    /// Client-supplied creation id map, echoed back by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_ids: Option<BTreeMap<String, String>>,
}

impl JmapRequest {
    /// Request with the given capabilities and calls.
    pub fn new(using: Vec<String>, method_calls: Vec<Invocation>) -> Self {
        Self {
            using,
            method_calls,
            created_ids: None,
        }
    }
}

/// The API response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JmapResponse {
    /// Method responses in call order.
    pub method_responses: Vec<Invocation>,
    /// Current session state token.
    #[serde(default)]
    pub session_state: String,
    /// Creation id map, when the request supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_ids: Option<BTreeMap<String, String>>,
}

impl JmapResponse {
    /// The first response carrying `call_id`.
    pub fn by_call_id(&self, call_id: &str) -> Option<&Invocation> {
        self.method_responses.iter().find(|i| i.call_id() == call_id)
    }
}

/// Metadata returned by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Account the blob belongs to.
    pub account_id: String,
    /// Server-assigned blob id.
    pub blob_id: String,
    /// Media type recorded by the server.
    #[serde(rename = "type")]
    pub content_type: String,
    /// Size in octets.
    pub size: u64,
}

/// Status, headers and body of a download or raw POST.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, lower-cased names.
    pub headers: BTreeMap<String, String>,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Header lookup by lower-case name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Shorthand for building an arguments object from pairs.
pub fn args<I, K>(pairs: I) -> Value
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    let map: Map<String, Value> = pairs.into_iter().map(|(k, v)| (k.into(), v)).collect();
    Value::Object(map)
}
