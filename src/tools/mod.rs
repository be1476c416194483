pub mod assignments_tool;
pub mod content_tool;
pub mod courses_tool;
pub mod social_tool;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::fmt::Display;
use tracing::error;

use crate::mcp::types::CallToolResult;
use crate::utils::canvas_client::{ApiRequest, CanvasClient, CanvasError, DEFAULT_MAX_PAGES};
use crate::utils::content_guard::{cap_items, error_payload, render_json};

const DEFAULT_PER_PAGE: u32 = 50;

/// Arguments shared by every list tool.
#[derive(Debug, Deserialize)]
pub struct PageArgs {
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default)]
    pub max_items: Option<usize>,
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

fn default_max_pages() -> u32 {
    DEFAULT_MAX_PAGES
}

/// Canvas ids are documented as strings but clients often send numbers; accept both.
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or integer id, got {}",
            other
        ))),
    }
}

pub fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or integer id, got {}",
            other
        ))),
    }
}

/// Parses tool arguments; a missing arguments object is treated as `{}` so that
/// tools whose arguments are all optional can be called bare.
pub(crate) fn parse_args<T: DeserializeOwned>(
    tool: &str,
    arguments: Option<Value>,
) -> Result<T, CallToolResult> {
    serde_json::from_value::<T>(arguments.unwrap_or_else(|| json!({}))).map_err(|e| {
        error!("Invalid {} parameters: {}", tool, e);
        tool_error(format!("Invalid parameters: {}", e))
    })
}

pub(crate) fn tool_error(message: impl Display) -> CallToolResult {
    CallToolResult::error(error_payload(message))
}

/// Converts the outcome of a tool body into the tool response: pretty JSON on success,
/// `{"error": ...}` on failure.
pub(crate) fn respond<E: Display>(tool: &str, result: Result<Value, E>) -> CallToolResult {
    match result {
        Ok(value) => match render_json(&value) {
            Ok(text) => CallToolResult::success(text),
            Err(e) => tool_error(e),
        },
        Err(e) => {
            error!("Tool {} failed: {}", tool, e);
            tool_error(e)
        }
    }
}

/// Runs a paginated list request with the shared page arguments applied.
pub(crate) async fn fetch_list(
    client: &CanvasClient,
    request: ApiRequest,
    page: &PageArgs,
) -> Result<Value, CanvasError> {
    let request = request
        .param("per_page", page.per_page)
        .paginate(Some(page.max_pages));
    let data = client.request(request).await?;
    Ok(cap_items(data, page.max_items))
}

/// Adds the shared pagination properties to a tool's own properties.
pub(crate) fn list_schema(mut properties: Value, required: &[&str]) -> Value {
    if let Some(map) = properties.as_object_mut() {
        map.insert(
            "per_page".to_string(),
            json!({
                "type": "integer",
                "description": "Items per page (Canvas max 100, default: 50)",
                "default": DEFAULT_PER_PAGE,
                "minimum": 1,
                "maximum": 100
            }),
        );
        map.insert(
            "max_pages".to_string(),
            json!({
                "type": "integer",
                "description": "Maximum number of pages to fetch (default: 5)",
                "default": DEFAULT_MAX_PAGES,
                "minimum": 1
            }),
        );
        map.insert(
            "max_items".to_string(),
            json!({
                "type": "integer",
                "description": "Maximum number of items to return after pagination",
                "minimum": 1
            }),
        );
    }
    object_schema(properties, required)
}

pub(crate) fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

pub(crate) fn include_property(examples: &str) -> Value {
    json!({
        "type": "array",
        "items": { "type": "string" },
        "description": format!("Extra data to include (e.g. {})", examples)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct IdArgs {
        #[serde(deserialize_with = "deserialize_id")]
        course_id: String,
        #[serde(default, deserialize_with = "deserialize_opt_id")]
        folder_id: Option<String>,
        #[serde(flatten)]
        page: PageArgs,
    }

    #[test]
    fn ids_accept_strings_and_numbers() {
        let args: IdArgs = parse_args("t", Some(json!({ "course_id": 42 }))).unwrap();
        assert_eq!(args.course_id, "42");
        assert_eq!(args.folder_id, None);

        let args: IdArgs =
            parse_args("t", Some(json!({ "course_id": "abc", "folder_id": 7 }))).unwrap();
        assert_eq!(args.course_id, "abc");
        assert_eq!(args.folder_id.as_deref(), Some("7"));
    }

    #[test]
    fn page_args_have_defaults() {
        let args: IdArgs = parse_args("t", Some(json!({ "course_id": "1" }))).unwrap();
        assert_eq!(args.page.per_page, 50);
        assert_eq!(args.page.max_pages, 5);
        assert_eq!(args.page.max_items, None);
    }

    #[test]
    fn missing_required_argument_is_an_error_payload() {
        let result = parse_args::<IdArgs>("t", None).unwrap_err();
        assert!(result.is_error());
        let payload: Value = serde_json::from_str(result.text()).unwrap();
        assert!(payload["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid parameters"));
    }

    #[test]
    fn list_schema_adds_paging_properties() {
        let schema = list_schema(json!({ "course_id": { "type": "string" } }), &["course_id"]);
        assert!(schema["properties"]["per_page"].is_object());
        assert!(schema["properties"]["max_pages"].is_object());
        assert!(schema["properties"]["max_items"].is_object());
        assert_eq!(schema["required"], json!(["course_id"]));
    }
}
