use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::transport::StdioTransport;
use super::types::*;
use crate::tools::assignments_tool::{
    AssignmentsTool, GET_ASSIGNMENT_TOOL_DEFINITION, GET_QUIZ_TOOL_DEFINITION,
    LIST_ASSIGNMENTS_TOOL_DEFINITION, LIST_QUIZZES_TOOL_DEFINITION,
};
use crate::tools::content_tool::{
    ContentTool, GET_FILE_TOOL_DEFINITION, GET_FOLDER_TOOL_DEFINITION, GET_PAGE_TOOL_DEFINITION,
    LIST_FILES_TOOL_DEFINITION, LIST_FOLDERS_TOOL_DEFINITION, LIST_MODULES_TOOL_DEFINITION,
    LIST_PAGES_TOOL_DEFINITION, READ_PDF_TOOL_DEFINITION,
};
use crate::tools::courses_tool::{
    CoursesTool, GET_COURSE_TOOL_DEFINITION, LIST_COURSES_TOOL_DEFINITION,
};
use crate::tools::social_tool::{
    SocialTool, LIST_ANNOUNCEMENTS_TOOL_DEFINITION, LIST_CALENDAR_EVENTS_TOOL_DEFINITION,
    LIST_DISCUSSION_TOPICS_TOOL_DEFINITION, LIST_TODO_TOOL_DEFINITION,
};
use crate::tools::tool_error;
use crate::utils::canvas_client::CanvasClient;

pub struct McpServer {
    transport: StdioTransport,
    client: Arc<CanvasClient>,
    initialized: bool,
}

impl McpServer {
    pub fn new(client: Arc<CanvasClient>) -> Self {
        Self {
            transport: StdioTransport::new(),
            client,
            initialized: false,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("MCP server started and listening on stdio");

        loop {
            match self.transport.read_message().await? {
                Some(McpMessage::Request(request)) => {
                    let response = self.handle_request(request).await;
                    self.transport.write_response(response).await?;
                }
                Some(McpMessage::Notification(notification)) => {
                    self.handle_notification(notification).await;
                }
                None => {
                    info!("Client disconnected");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_request(&mut self, request: McpRequest) -> McpResponse {
        let id = Self::ensure_valid_id(request.id.clone());

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            "ping" => McpResponse::success(id, serde_json::json!({})),
            _ => McpResponse::failure(id, METHOD_NOT_FOUND, "Method not found"),
        }
    }

    async fn handle_notification(&mut self, notification: McpNotification) {
        debug!("Received notification: {}", notification.method);

        match notification.method.as_str() {
            "notifications/initialized" => {
                info!("Client initialization completed");
                self.initialized = true;
            }
            "notifications/cancelled" => {
                debug!("Request cancelled notification received");
            }
            _ => {
                warn!("Unknown notification method: {}", notification.method);
            }
        }
    }

    fn ensure_valid_id(id: Option<serde_json::Value>) -> serde_json::Value {
        match id {
            Some(serde_json::Value::Null) | None => serde_json::Value::String("0".to_string()),
            Some(value) => value,
        }
    }

    fn handle_initialize(
        &self,
        id: serde_json::Value,
        params: Option<serde_json::Value>,
    ) -> McpResponse {
        let Some(params) = params else {
            return McpResponse::failure(id, INVALID_PARAMS, "Missing params");
        };

        match serde_json::from_value::<InitializeParams>(params) {
            Ok(init_params) => {
                info!(
                    "Initializing session for client {} {}",
                    init_params.client_info.name, init_params.client_info.version
                );
                let result = InitializeResult {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    server_info: ServerInfo {
                        name: "Canvas LMS MCP".to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                        description: Some(
                            "Read-only access to Canvas courses, assignments, files and discussions"
                                .to_string(),
                        ),
                    },
                    capabilities: ServerCapabilities {
                        tools: Some(ToolsCapability {
                            list_changed: Some(false),
                        }),
                    },
                };
                McpResponse::from_serializable(id, &result)
            }
            Err(e) => McpResponse::failure(id, INVALID_PARAMS, format!("Invalid params: {}", e)),
        }
    }

    fn tool_definitions() -> Vec<ToolDefinition> {
        vec![
            LIST_COURSES_TOOL_DEFINITION.clone(),
            GET_COURSE_TOOL_DEFINITION.clone(),
            LIST_ASSIGNMENTS_TOOL_DEFINITION.clone(),
            GET_ASSIGNMENT_TOOL_DEFINITION.clone(),
            LIST_QUIZZES_TOOL_DEFINITION.clone(),
            GET_QUIZ_TOOL_DEFINITION.clone(),
            LIST_FILES_TOOL_DEFINITION.clone(),
            GET_FILE_TOOL_DEFINITION.clone(),
            READ_PDF_TOOL_DEFINITION.clone(),
            LIST_FOLDERS_TOOL_DEFINITION.clone(),
            GET_FOLDER_TOOL_DEFINITION.clone(),
            LIST_MODULES_TOOL_DEFINITION.clone(),
            LIST_PAGES_TOOL_DEFINITION.clone(),
            GET_PAGE_TOOL_DEFINITION.clone(),
            LIST_ANNOUNCEMENTS_TOOL_DEFINITION.clone(),
            LIST_DISCUSSION_TOPICS_TOOL_DEFINITION.clone(),
            LIST_CALENDAR_EVENTS_TOOL_DEFINITION.clone(),
            LIST_TODO_TOOL_DEFINITION.clone(),
        ]
    }

    fn handle_list_tools(&self, id: serde_json::Value) -> McpResponse {
        let result = ListToolsResult {
            tools: Self::tool_definitions(),
        };
        McpResponse::from_serializable(id, &result)
    }

    async fn handle_call_tool(
        &self,
        id: serde_json::Value,
        params: Option<serde_json::Value>,
    ) -> McpResponse {
        let Some(params) = params else {
            return McpResponse::failure(id, INVALID_PARAMS, "Missing params");
        };

        match serde_json::from_value::<CallToolParams>(params) {
            Ok(call_params) => {
                debug!(
                    tool = %call_params.name,
                    initialized = self.initialized,
                    "Dispatching tool call"
                );
                let result = self.execute_tool(call_params).await;
                McpResponse::from_serializable(id, &result)
            }
            Err(e) => McpResponse::failure(id, INVALID_PARAMS, format!("Invalid params: {}", e)),
        }
    }

    async fn execute_tool(&self, params: CallToolParams) -> CallToolResult {
        let client = self.client.clone();
        let args = params.arguments;

        match params.name.as_str() {
            "list_courses" => CoursesTool::new(client).list_courses(args).await,
            "get_course" => CoursesTool::new(client).get_course(args).await,
            "list_assignments" => AssignmentsTool::new(client).list_assignments(args).await,
            "get_assignment" => AssignmentsTool::new(client).get_assignment(args).await,
            "list_quizzes" => AssignmentsTool::new(client).list_quizzes(args).await,
            "get_quiz" => AssignmentsTool::new(client).get_quiz(args).await,
            "list_files" => ContentTool::new(client).list_files(args).await,
            "get_file" => ContentTool::new(client).get_file(args).await,
            "read_pdf" => ContentTool::new(client).read_pdf(args).await,
            "list_folders" => ContentTool::new(client).list_folders(args).await,
            "get_folder" => ContentTool::new(client).get_folder(args).await,
            "list_modules" => ContentTool::new(client).list_modules(args).await,
            "list_pages" => ContentTool::new(client).list_pages(args).await,
            "get_page" => ContentTool::new(client).get_page(args).await,
            "list_announcements" => SocialTool::new(client).list_announcements(args).await,
            "list_discussion_topics" => SocialTool::new(client).list_discussion_topics(args).await,
            "list_calendar_events" => SocialTool::new(client).list_calendar_events(args).await,
            "list_todo" => SocialTool::new(client).list_todo(args).await,
            _ => {
                warn!("Tool not found: {}", params.name);
                tool_error(format!("Tool not found: {}", params.name))
            }
        }
    }
}
