use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::{
    deserialize_id, deserialize_opt_id, fetch_list, include_property, list_schema, parse_args,
    respond, PageArgs,
};
use crate::mcp::types::{CallToolResult, ToolAnnotations, ToolDefinition};
use crate::utils::canvas_client::{ApiRequest, CanvasClient};

fn context_codes_property() -> serde_json::Value {
    json!({
        "type": "array",
        "items": { "type": "string" },
        "description": "Context codes to query (e.g. ['course_123', 'user_456'])"
    })
}

pub static LIST_ANNOUNCEMENTS_TOOL_DEFINITION: Lazy<ToolDefinition> =
    Lazy::new(|| ToolDefinition {
        name: "list_announcements".to_string(),
        description: "List announcements for a course or a set of context codes".to_string(),
        input_schema: list_schema(
            json!({
                "context_codes": context_codes_property(),
                "course_id": {
                    "type": "string",
                    "description": "Alternative to context_codes; converted to course_<id>"
                },
                "start_date": { "type": "string", "description": "ISO 8601 start date" },
                "end_date": { "type": "string", "description": "ISO 8601 end date" }
            }),
            &[],
        ),
        annotations: Some(ToolAnnotations::read_only("List Announcements")),
    });

pub static LIST_DISCUSSION_TOPICS_TOOL_DEFINITION: Lazy<ToolDefinition> =
    Lazy::new(|| ToolDefinition {
        name: "list_discussion_topics".to_string(),
        description: "List discussion topics for a course".to_string(),
        input_schema: list_schema(
            json!({
                "course_id": { "type": "string", "description": "The ID of the course" },
                "search_term": { "type": "string", "description": "Partial topic title to match" },
                "include": include_property("['all_dates', 'sections']")
            }),
            &["course_id"],
        ),
        annotations: Some(ToolAnnotations::read_only("List Discussion Topics")),
    });

pub static LIST_CALENDAR_EVENTS_TOOL_DEFINITION: Lazy<ToolDefinition> =
    Lazy::new(|| ToolDefinition {
        name: "list_calendar_events".to_string(),
        description: "List calendar events".to_string(),
        input_schema: list_schema(
            json!({
                "context_codes": context_codes_property(),
                "type": { "type": "string", "description": "'event' or 'assignment'" },
                "start_date": { "type": "string", "description": "ISO 8601 start date" },
                "end_date": { "type": "string", "description": "ISO 8601 end date" }
            }),
            &[],
        ),
        annotations: Some(ToolAnnotations::read_only("List Calendar Events")),
    });

pub static LIST_TODO_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "list_todo".to_string(),
    description: "List the current user's to-do items".to_string(),
    input_schema: list_schema(json!({}), &[]),
    annotations: Some(ToolAnnotations::read_only("List To-Do Items")),
});

#[derive(Debug, Deserialize)]
struct ListAnnouncementsParams {
    context_codes: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    course_id: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    #[serde(flatten)]
    page: PageArgs,
}

#[derive(Debug, Deserialize)]
struct ListDiscussionTopicsParams {
    #[serde(deserialize_with = "deserialize_id")]
    course_id: String,
    search_term: Option<String>,
    include: Option<Vec<String>>,
    #[serde(flatten)]
    page: PageArgs,
}

#[derive(Debug, Deserialize)]
struct ListCalendarEventsParams {
    context_codes: Option<Vec<String>>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    #[serde(flatten)]
    page: PageArgs,
}

#[derive(Debug, Deserialize)]
struct ListTodoParams {
    #[serde(flatten)]
    page: PageArgs,
}

/// Explicit context codes win; otherwise a course id becomes `course_<id>`.
fn announcement_context_codes(
    context_codes: Option<Vec<String>>,
    course_id: Option<&str>,
) -> Option<Vec<String>> {
    match (context_codes, course_id) {
        (Some(codes), _) if !codes.is_empty() => Some(codes),
        (_, Some(course)) => Some(vec![format!("course_{}", course)]),
        (codes, None) => codes,
    }
}

pub struct SocialTool {
    client: Arc<CanvasClient>,
}

impl SocialTool {
    pub fn new(client: Arc<CanvasClient>) -> Self {
        Self { client }
    }

    pub async fn list_announcements(&self, arguments: Option<serde_json::Value>) -> CallToolResult {
        let params: ListAnnouncementsParams = match parse_args("list_announcements", arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        let codes = announcement_context_codes(params.context_codes, params.course_id.as_deref());
        info!("Listing announcements for {:?}", codes);
        let request = ApiRequest::get("/api/v1/announcements").params(json!({
            "context_codes": codes,
            "start_date": params.start_date,
            "end_date": params.end_date,
        }));
        respond(
            "list_announcements",
            fetch_list(&self.client, request, &params.page).await,
        )
    }

    pub async fn list_discussion_topics(
        &self,
        arguments: Option<serde_json::Value>,
    ) -> CallToolResult {
        let params: ListDiscussionTopicsParams =
            match parse_args("list_discussion_topics", arguments) {
                Ok(params) => params,
                Err(result) => return result,
            };

        let request = ApiRequest::get(format!(
            "/api/v1/courses/{}/discussion_topics",
            params.course_id
        ))
        .params(json!({
            "search_term": params.search_term,
            "include": params.include,
        }));
        respond(
            "list_discussion_topics",
            fetch_list(&self.client, request, &params.page).await,
        )
    }

    pub async fn list_calendar_events(
        &self,
        arguments: Option<serde_json::Value>,
    ) -> CallToolResult {
        let params: ListCalendarEventsParams = match parse_args("list_calendar_events", arguments)
        {
            Ok(params) => params,
            Err(result) => return result,
        };

        let request = ApiRequest::get("/api/v1/calendar_events").params(json!({
            "context_codes": params.context_codes,
            "type": params.event_type,
            "start_date": params.start_date,
            "end_date": params.end_date,
        }));
        respond(
            "list_calendar_events",
            fetch_list(&self.client, request, &params.page).await,
        )
    }

    pub async fn list_todo(&self, arguments: Option<serde_json::Value>) -> CallToolResult {
        let params: ListTodoParams = match parse_args("list_todo", arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        let request = ApiRequest::get("/api/v1/users/self/todo");
        respond(
            "list_todo",
            fetch_list(&self.client, request, &params.page).await,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::canvas_client::tests::test_client;
    use serde_json::Value;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn course_id_becomes_context_code() {
        assert_eq!(
            announcement_context_codes(None, Some("42")),
            Some(vec!["course_42".to_string()])
        );
        assert_eq!(
            announcement_context_codes(Some(vec!["user_1".to_string()]), Some("42")),
            Some(vec!["user_1".to_string()])
        );
        assert_eq!(
            announcement_context_codes(Some(vec![]), Some("42")),
            Some(vec!["course_42".to_string()])
        );
        assert_eq!(announcement_context_codes(None, None), None);
    }

    #[tokio::test]
    async fn list_announcements_sends_bracketed_context_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/announcements"))
            .and(query_param("context_codes[]", "course_42"))
            .and(query_param("per_page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1, "title": "Welcome" }])))
            .expect(1)
            .mount(&server)
            .await;

        let tool = SocialTool::new(Arc::new(test_client(&server.uri())));
        let result = tool
            .list_announcements(Some(json!({ "course_id": 42, "per_page": 2 })))
            .await;

        assert!(!result.is_error(), "unexpected error: {}", result.text());
        let data: Value = serde_json::from_str(result.text()).unwrap();
        assert_eq!(data[0]["title"], "Welcome");
    }

    #[tokio::test]
    async fn list_todo_accepts_missing_arguments() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/users/self/todo"))
            .and(query_param("per_page", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let tool = SocialTool::new(Arc::new(test_client(&server.uri())));
        let result = tool.list_todo(None).await;
        assert!(!result.is_error());
        assert_eq!(result.text(), "[]");
    }
}
