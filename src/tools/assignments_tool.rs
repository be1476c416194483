use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::{
    deserialize_id, fetch_list, include_property, list_schema, object_schema, parse_args, respond,
    PageArgs,
};
use crate::mcp::types::{CallToolResult, ToolAnnotations, ToolDefinition};
use crate::utils::canvas_client::{ApiRequest, CanvasClient};

pub static LIST_ASSIGNMENTS_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "list_assignments".to_string(),
    description: "List assignments for a course".to_string(),
    input_schema: list_schema(
        json!({
            "course_id": { "type": "string", "description": "The ID of the course" },
            "search_term": { "type": "string", "description": "Partial assignment name to match" },
            "bucket": {
                "type": "string",
                "description": "Filter by bucket (past, overdue, undated, ungraded, unsubmitted, upcoming, future)"
            },
            "order_by": {
                "type": "string",
                "description": "Sort order (position, name, due_at)"
            },
            "include": include_property("['submission', 'overrides']")
        }),
        &["course_id"],
    ),
    annotations: Some(ToolAnnotations::read_only("List Assignments")),
});

pub static GET_ASSIGNMENT_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "get_assignment".to_string(),
    description: "Get details for a single assignment".to_string(),
    input_schema: object_schema(
        json!({
            "course_id": { "type": "string", "description": "The ID of the course" },
            "assignment_id": { "type": "string", "description": "The ID of the assignment" },
            "include": include_property("['submission']")
        }),
        &["course_id", "assignment_id"],
    ),
    annotations: Some(ToolAnnotations::read_only("Get Assignment")),
});

pub static LIST_QUIZZES_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "list_quizzes".to_string(),
    description: "List quizzes for a course".to_string(),
    input_schema: list_schema(
        json!({
            "course_id": { "type": "string", "description": "The ID of the course" },
            "search_term": { "type": "string", "description": "Partial quiz title to match" }
        }),
        &["course_id"],
    ),
    annotations: Some(ToolAnnotations::read_only("List Quizzes")),
});

pub static GET_QUIZ_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "get_quiz".to_string(),
    description: "Get a single quiz".to_string(),
    input_schema: object_schema(
        json!({
            "course_id": { "type": "string", "description": "The ID of the course" },
            "quiz_id": { "type": "string", "description": "The ID of the quiz" }
        }),
        &["course_id", "quiz_id"],
    ),
    annotations: Some(ToolAnnotations::read_only("Get Quiz")),
});

#[derive(Debug, Deserialize)]
struct ListAssignmentsParams {
    #[serde(deserialize_with = "deserialize_id")]
    course_id: String,
    search_term: Option<String>,
    bucket: Option<String>,
    order_by: Option<String>,
    include: Option<Vec<String>>,
    #[serde(flatten)]
    page: PageArgs,
}

#[derive(Debug, Deserialize)]
struct GetAssignmentParams {
    #[serde(deserialize_with = "deserialize_id")]
    course_id: String,
    #[serde(deserialize_with = "deserialize_id")]
    assignment_id: String,
    include: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ListQuizzesParams {
    #[serde(deserialize_with = "deserialize_id")]
    course_id: String,
    search_term: Option<String>,
    #[serde(flatten)]
    page: PageArgs,
}

#[derive(Debug, Deserialize)]
struct GetQuizParams {
    #[serde(deserialize_with = "deserialize_id")]
    course_id: String,
    #[serde(deserialize_with = "deserialize_id")]
    quiz_id: String,
}

pub struct AssignmentsTool {
    client: Arc<CanvasClient>,
}

impl AssignmentsTool {
    pub fn new(client: Arc<CanvasClient>) -> Self {
        Self { client }
    }

    pub async fn list_assignments(&self, arguments: Option<serde_json::Value>) -> CallToolResult {
        let params: ListAssignmentsParams = match parse_args("list_assignments", arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        info!("Listing assignments for course {}", params.course_id);
        let request = ApiRequest::get(format!("/api/v1/courses/{}/assignments", params.course_id))
            .params(json!({
                "search_term": params.search_term,
                "bucket": params.bucket,
                "order_by": params.order_by,
                "include": params.include,
            }));
        respond(
            "list_assignments",
            fetch_list(&self.client, request, &params.page).await,
        )
    }

    pub async fn get_assignment(&self, arguments: Option<serde_json::Value>) -> CallToolResult {
        let params: GetAssignmentParams = match parse_args("get_assignment", arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        let request = ApiRequest::get(format!(
            "/api/v1/courses/{}/assignments/{}",
            params.course_id, params.assignment_id
        ))
        .params(json!({ "include": params.include }));
        respond("get_assignment", self.client.request(request).await)
    }

    pub async fn list_quizzes(&self, arguments: Option<serde_json::Value>) -> CallToolResult {
        let params: ListQuizzesParams = match parse_args("list_quizzes", arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        info!("Listing quizzes for course {}", params.course_id);
        let request = ApiRequest::get(format!("/api/v1/courses/{}/quizzes", params.course_id))
            .params(json!({ "search_term": params.search_term }));
        respond(
            "list_quizzes",
            fetch_list(&self.client, request, &params.page).await,
        )
    }

    pub async fn get_quiz(&self, arguments: Option<serde_json::Value>) -> CallToolResult {
        let params: GetQuizParams = match parse_args("get_quiz", arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        let request = ApiRequest::get(format!(
            "/api/v1/courses/{}/quizzes/{}",
            params.course_id, params.quiz_id
        ));
        respond("get_quiz", self.client.request(request).await)
    }
}
