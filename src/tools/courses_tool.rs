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

pub static LIST_COURSES_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "list_courses".to_string(),
    description: "List courses the current user can access".to_string(),
    input_schema: list_schema(
        json!({
            "enrollment_state": {
                "type": "string",
                "description": "Filter by enrollment state (active, invited_or_pending, completed)"
            },
            "state": {
                "type": "string",
                "description": "Filter by course state (unpublished, available, completed, deleted)"
            },
            "search_term": {
                "type": "string",
                "description": "Only return courses whose name matches this term"
            },
            "include": include_property("['term', 'teachers']")
        }),
        &[],
    ),
    annotations: Some(ToolAnnotations::read_only("List Courses")),
});

pub static GET_COURSE_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "get_course".to_string(),
    description: "Get details for a single course".to_string(),
    input_schema: object_schema(
        json!({
            "course_id": {
                "type": "string",
                "description": "The ID of the course"
            },
            "include": include_property("['syllabus_body', 'term']")
        }),
        &["course_id"],
    ),
    annotations: Some(ToolAnnotations::read_only("Get Course")),
});

#[derive(Debug, Deserialize)]
struct ListCoursesParams {
    enrollment_state: Option<String>,
    state: Option<String>,
    search_term: Option<String>,
    include: Option<Vec<String>>,
    #[serde(flatten)]
    page: PageArgs,
}

#[derive(Debug, Deserialize)]
struct GetCourseParams {
    #[serde(deserialize_with = "deserialize_id")]
    course_id: String,
    include: Option<Vec<String>>,
}

pub struct CoursesTool {
    client: Arc<CanvasClient>,
}

impl CoursesTool {
    pub fn new(client: Arc<CanvasClient>) -> Self {
        Self { client }
    }

    pub async fn list_courses(&self, arguments: Option<serde_json::Value>) -> CallToolResult {
        let params: ListCoursesParams = match parse_args("list_courses", arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        info!(
            "Listing courses (per_page: {}, max_pages: {})",
            params.page.per_page, params.page.max_pages
        );
        let request = ApiRequest::get("/api/v1/courses").params(json!({
            "enrollment_state": params.enrollment_state,
            "state": params.state,
            "search_term": params.search_term,
            "include": params.include,
        }));
        respond(
            "list_courses",
            fetch_list(&self.client, request, &params.page).await,
        )
    }

    pub async fn get_course(&self, arguments: Option<serde_json::Value>) -> CallToolResult {
        let params: GetCourseParams = match parse_args("get_course", arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        info!("Fetching course {}", params.course_id);
        let request = ApiRequest::get(format!("/api/v1/courses/{}", params.course_id))
            .params(json!({ "include": params.include }));
        respond("get_course", self.client.request(request).await)
    }
}
