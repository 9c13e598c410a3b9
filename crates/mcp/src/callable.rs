//! The inbound callable-tool interface and its raw response shape.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::Result;

/// A single function call forwarded to a tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: Value,
}

/// Anything that can execute tool calls and answer with raw response parts.
///
/// Each response part may carry a `functionResponse` object whose `response`
/// holds `content`, and optionally `name` and `error.isError`. Parts are left
/// as raw JSON so malformed responses can still be shown for debugging.
pub trait CallableTool: Send + Sync {
    fn call_tool(
        &self,
        calls: Vec<FunctionCall>,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;
}

/// Build a raw response part from an MCP `tools/call` result.
pub fn function_response_part(name: &str, content: Vec<Value>, is_error: bool) -> Value {
    let mut response = json!({ "content": content });
    if is_error {
        response["error"] = json!({ "isError": true });
    }
    json!({
        "functionResponse": {
            "name": name,
            "response": response,
        }
    })
}

/// The `functionResponse.response` object of the first part, if any.
pub fn first_response(parts: &[Value]) -> Option<&Value> {
    parts.first()?.get("functionResponse")?.get("response")
}

/// Whether the server flagged a logical tool failure in the first part.
///
/// The flag is accepted as a boolean or as the string `"true"`.
pub fn reports_error(parts: &[Value]) -> bool {
    let Some(flag) = first_response(parts)
        .and_then(|response| response.get("error"))
        .and_then(|error| error.get("isError"))
    else {
        return false;
    };
    match flag {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true",
        _ => false,
    }
}
