use anyhow::bail;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::{
    deserialize_id, deserialize_opt_id, fetch_list, include_property, list_schema, object_schema,
    parse_args, respond, PageArgs,
};
use crate::mcp::types::{CallToolResult, ToolAnnotations, ToolDefinition};
use crate::utils::canvas_client::{ApiRequest, CanvasClient};
use crate::utils::pdf::{extract_text, looks_like_pdf};

pub static LIST_FILES_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "list_files".to_string(),
    description: "List files for a folder, a course, or the current user. \
        If this returns 403 the course has likely hidden its Files tab; \
        try list_modules with include=['items'] instead."
        .to_string(),
    input_schema: list_schema(
        json!({
            "course_id": { "type": "string", "description": "List files of this course" },
            "folder_id": { "type": "string", "description": "List files of this folder (takes precedence over course_id)" },
            "search_term": { "type": "string", "description": "Partial file name to match" },
            "include": include_property("['user', 'usage_rights']")
        }),
        &[],
    ),
    annotations: Some(ToolAnnotations::read_only("List Files")),
});

pub static GET_FILE_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "get_file".to_string(),
    description: "Get metadata for a file".to_string(),
    input_schema: object_schema(
        json!({
            "file_id": { "type": "string", "description": "The ID of the file" },
            "include": include_property("['user']")
        }),
        &["file_id"],
    ),
    annotations: Some(ToolAnnotations::read_only("Get File")),
});

pub static READ_PDF_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "read_pdf".to_string(),
    description: "Download a PDF file and extract its text".to_string(),
    input_schema: object_schema(
        json!({
            "file_id": { "type": "string", "description": "The ID of the PDF file" },
            "max_chars": {
                "type": "integer",
                "description": "Maximum number of characters to return, 0 for no limit (default: 20000)",
                "default": DEFAULT_MAX_CHARS,
                "minimum": 0
            }
        }),
        &["file_id"],
    ),
    annotations: Some(ToolAnnotations::read_only("Read PDF")),
});

pub static LIST_FOLDERS_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "list_folders".to_string(),
    description: "List folders in a course".to_string(),
    input_schema: list_schema(
        json!({
            "course_id": { "type": "string", "description": "The ID of the course" }
        }),
        &["course_id"],
    ),
    annotations: Some(ToolAnnotations::read_only("List Folders")),
});

pub static GET_FOLDER_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "get_folder".to_string(),
    description: "Get metadata for a folder".to_string(),
    input_schema: object_schema(
        json!({
            "folder_id": { "type": "string", "description": "The ID of the folder" }
        }),
        &["folder_id"],
    ),
    annotations: Some(ToolAnnotations::read_only("Get Folder")),
});

pub static LIST_MODULES_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "list_modules".to_string(),
    description: "List modules for a course. Use include=['items'] to see module items, \
        including files; this often works when list_files is restricted."
        .to_string(),
    input_schema: list_schema(
        json!({
            "course_id": { "type": "string", "description": "The ID of the course" },
            "include": include_property("['items', 'content_details']")
        }),
        &["course_id"],
    ),
    annotations: Some(ToolAnnotations::read_only("List Modules")),
});

pub static LIST_PAGES_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "list_pages".to_string(),
    description: "List wiki pages in a course".to_string(),
    input_schema: list_schema(
        json!({
            "course_id": { "type": "string", "description": "The ID of the course" },
            "search_term": { "type": "string", "description": "Partial page title to match" },
            "sort": { "type": "string", "description": "Sort by title, created_at or updated_at" }
        }),
        &["course_id"],
    ),
    annotations: Some(ToolAnnotations::read_only("List Pages")),
});

pub static GET_PAGE_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "get_page".to_string(),
    description: "Get a single wiki page by its page_url".to_string(),
    input_schema: object_schema(
        json!({
            "course_id": { "type": "string", "description": "The ID of the course" },
            "page_url": { "type": "string", "description": "The page's url slug or ID" },
            "include_content": {
                "type": "boolean",
                "description": "Include the page body (default: false)",
                "default": false
            }
        }),
        &["course_id", "page_url"],
    ),
    annotations: Some(ToolAnnotations::read_only("Get Page")),
});

const DEFAULT_MAX_CHARS: usize = 20000;

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}

#[derive(Debug, Deserialize)]
struct ListFilesParams {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    course_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    folder_id: Option<String>,
    search_term: Option<String>,
    include: Option<Vec<String>>,
    #[serde(flatten)]
    page: PageArgs,
}

#[derive(Debug, Deserialize)]
struct GetFileParams {
    #[serde(deserialize_with = "deserialize_id")]
    file_id: String,
    include: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ReadPdfParams {
    #[serde(deserialize_with = "deserialize_id")]
    file_id: String,
    #[serde(default = "default_max_chars")]
    max_chars: usize,
}

#[derive(Debug, Deserialize)]
struct CourseListParams {
    #[serde(deserialize_with = "deserialize_id")]
    course_id: String,
    include: Option<Vec<String>>,
    #[serde(flatten)]
    page: PageArgs,
}

#[derive(Debug, Deserialize)]
struct GetFolderParams {
    #[serde(deserialize_with = "deserialize_id")]
    folder_id: String,
}

#[derive(Debug, Deserialize)]
struct ListPagesParams {
    #[serde(deserialize_with = "deserialize_id")]
    course_id: String,
    search_term: Option<String>,
    sort: Option<String>,
    #[serde(flatten)]
    page: PageArgs,
}

#[derive(Debug, Deserialize)]
struct GetPageParams {
    #[serde(deserialize_with = "deserialize_id")]
    course_id: String,
    page_url: String,
    #[serde(default)]
    include_content: bool,
}

/// Picks the files endpoint: a folder wins over a course, and with neither the user's own files.
fn files_path(folder_id: Option<&str>, course_id: Option<&str>) -> String {
    match (folder_id, course_id) {
        (Some(folder), _) => format!("/api/v1/folders/{}/files", folder),
        (None, Some(course)) => format!("/api/v1/courses/{}/files", course),
        (None, None) => "/api/v1/users/self/files".to_string(),
    }
}

/// First non-empty string among `keys` in a Canvas object.
fn first_str<'a>(meta: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| meta.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

pub struct ContentTool {
    client: Arc<CanvasClient>,
}

impl ContentTool {
    pub fn new(client: Arc<CanvasClient>) -> Self {
        Self { client }
    }

    pub async fn list_files(&self, arguments: Option<Value>) -> CallToolResult {
        let params: ListFilesParams = match parse_args("list_files", arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        let path = files_path(params.folder_id.as_deref(), params.course_id.as_deref());
        info!("Listing files from {}", path);
        let request = ApiRequest::get(path).params(json!({
            "search_term": params.search_term,
            "include": params.include,
        }));
        respond(
            "list_files",
            fetch_list(&self.client, request, &params.page).await,
        )
    }

    pub async fn get_file(&self, arguments: Option<Value>) -> CallToolResult {
        let params: GetFileParams = match parse_args("get_file", arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        let request = ApiRequest::get(format!("/api/v1/files/{}", params.file_id))
            .params(json!({ "include": params.include }));
        respond("get_file", self.client.request(request).await)
    }

    pub async fn read_pdf(&self, arguments: Option<Value>) -> CallToolResult {
        let params: ReadPdfParams = match parse_args("read_pdf", arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        info!(
            "Reading PDF file {} (max_chars: {})",
            params.file_id, params.max_chars
        );
        let result = self
            .read_pdf_text(&params)
            .await
            .map_err(|e| format!("Error reading PDF: {}", e));
        respond("read_pdf", result)
    }

    async fn read_pdf_text(&self, params: &ReadPdfParams) -> anyhow::Result<Value> {
        let meta = self
            .client
            .request(ApiRequest::get(format!("/api/v1/files/{}", params.file_id)))
            .await?;
        if !meta.is_object() {
            bail!("Could not retrieve file metadata for id {}", params.file_id);
        }

        let name = first_str(&meta, &["display_name", "filename"]).unwrap_or("unknown");
        let mime = first_str(&meta, &["content-type", "mime_type"]).unwrap_or("");
        if !looks_like_pdf(mime, name) {
            bail!("File {} (type {}) does not appear to be a PDF", name, mime);
        }

        let download_url = first_str(&meta, &["url"])
            .map(str::to_string)
            .unwrap_or_else(|| format!("/api/v1/files/{}/download", params.file_id));

        let bytes = self.client.fetch_binary(&download_url).await?;

        let started = std::time::Instant::now();
        let extracted = extract_text(&bytes, params.max_chars)?;
        info!(
            file_id = %params.file_id,
            size = bytes.len(),
            chars = extracted.text.chars().count(),
            truncated = extracted.truncated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "PDF extraction succeeded"
        );

        let mut result = serde_json::to_value(&extracted)?;
        result["file"] = json!({
            "id": params.file_id,
            "name": name,
            "mime_type": mime,
            "size": meta.get("size").cloned().unwrap_or(Value::Null),
        });
        Ok(result)
    }

    pub async fn list_folders(&self, arguments: Option<Value>) -> CallToolResult {
        let params: CourseListParams = match parse_args("list_folders", arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        let request = ApiRequest::get(format!("/api/v1/courses/{}/folders", params.course_id));
        respond(
            "list_folders",
            fetch_list(&self.client, request, &params.page).await,
        )
    }

    pub async fn get_folder(&self, arguments: Option<Value>) -> CallToolResult {
        let params: GetFolderParams = match parse_args("get_folder", arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        let request = ApiRequest::get(format!("/api/v1/folders/{}", params.folder_id));
        respond("get_folder", self.client.request(request).await)
    }

    pub async fn list_modules(&self, arguments: Option<Value>) -> CallToolResult {
        let params: CourseListParams = match parse_args("list_modules", arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        info!("Listing modules for course {}", params.course_id);
        let request = ApiRequest::get(format!("/api/v1/courses/{}/modules", params.course_id))
            .params(json!({ "include": params.include }));
        respond(
            "list_modules",
            fetch_list(&self.client, request, &params.page).await,
        )
    }

    pub async fn list_pages(&self, arguments: Option<Value>) -> CallToolResult {
        let params: ListPagesParams = match parse_args("list_pages", arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        let request = ApiRequest::get(format!("/api/v1/courses/{}/pages", params.course_id))
            .params(json!({
                "search_term": params.search_term,
                "sort": params.sort,
            }));
        respond(
            "list_pages",
            fetch_list(&self.client, request, &params.page).await,
        )
    }

    pub async fn get_page(&self, arguments: Option<Value>) -> CallToolResult {
        let params: GetPageParams = match parse_args("get_page", arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        let mut request = ApiRequest::get(format!(
            "/api/v1/courses/{}/pages/{}",
            params.course_id, params.page_url
        ));
        if params.include_content {
            request = request.param("include", json!(["body"]));
        }
        respond("get_page", self.client.request(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::canvas_client::tests::test_client;
    use crate::utils::pdf::tests::build_pdf;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn folder_takes_precedence_over_course() {
        assert_eq!(files_path(Some("3"), Some("9")), "/api/v1/folders/3/files");
        assert_eq!(files_path(None, Some("9")), "/api/v1/courses/9/files");
        assert_eq!(files_path(None, None), "/api/v1/users/self/files");
    }

    #[test]
    fn first_str_skips_missing_and_empty_keys() {
        let meta = json!({ "display_name": "", "filename": "a.pdf" });
        assert_eq!(first_str(&meta, &["display_name", "filename"]), Some("a.pdf"));
        assert_eq!(first_str(&meta, &["url"]), None);
    }

    #[tokio::test]
    async fn read_pdf_refuses_non_pdf_without_downloading() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/files/9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 9,
                "display_name": "notes.docx",
                "content-type": "application/msword",
                "url": format!("{}/files/9/blob", server.uri())
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/9/blob"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tool = ContentTool::new(Arc::new(test_client(&server.uri())));
        let result = tool.read_pdf(Some(json!({ "file_id": "9" }))).await;

        assert!(result.is_error());
        let payload: Value = serde_json::from_str(result.text()).unwrap();
        let message = payload["error"].as_str().unwrap();
        assert!(message.starts_with("Error reading PDF: "));
        assert!(message.contains("does not appear to be a PDF"));
    }

    #[tokio::test]
    async fn read_pdf_returns_file_info_and_bounded_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/files/6"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 6,
                "display_name": "lecture.pdf",
                "content-type": "application/pdf",
                "size": 2048,
                "url": format!("{}/files/6/blob?verifier=abc", server.uri())
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/6/blob"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(build_pdf(&["Alpha page", "Beta page"])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tool = ContentTool::new(Arc::new(test_client(&server.uri())));
        let result = tool
            .read_pdf(Some(json!({ "file_id": "6", "max_chars": 5 })))
            .await;

        assert!(!result.is_error(), "unexpected error: {}", result.text());
        let data: Value = serde_json::from_str(result.text()).unwrap();
        assert_eq!(data["text"], "Alpha");
        assert_eq!(data["truncated"], json!(true));
        assert_eq!(data["file"]["name"], "lecture.pdf");
        assert_eq!(data["file"]["mime_type"], "application/pdf");
        assert_eq!(data["file"]["size"], json!(2048));
    }

    #[tokio::test]
    async fn read_pdf_reports_parse_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/files/5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 5,
                "display_name": "syllabus.pdf",
                "content-type": "application/pdf",
                "size": 12
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/files/5/download"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not really a pdf".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let tool = ContentTool::new(Arc::new(test_client(&server.uri())));
        let result = tool.read_pdf(Some(json!({ "file_id": 5 }))).await;

        assert!(result.is_error());
        let payload: Value = serde_json::from_str(result.text()).unwrap();
        assert!(payload["error"]
            .as_str()
            .unwrap()
            .contains("Failed to parse PDF"));
    }

    #[tokio::test]
    async fn list_files_uses_folder_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/folders/4/files"))
            .and(query_param("search_term", "lab"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }, { "id": 2 }])))
            .expect(1)
            .mount(&server)
            .await;

        let tool = ContentTool::new(Arc::new(test_client(&server.uri())));
        let result = tool
            .list_files(Some(json!({ "folder_id": "4", "course_id": "8", "search_term": "lab" })))
            .await;

        let data: Value = serde_json::from_str(result.text()).unwrap();
        assert_eq!(data.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn get_page_with_content_requests_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/3/pages/week-1"))
            .and(query_param("include[]", "body"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "url": "week-1",
                "body": "<p>Hello</p>"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tool = ContentTool::new(Arc::new(test_client(&server.uri())));
        let result = tool
            .get_page(Some(json!({
                "course_id": "3",
                "page_url": "week-1",
                "include_content": true
            })))
            .await;

        let data: Value = serde_json::from_str(result.text()).unwrap();
        assert_eq!(data["body"], "<p>Hello</p>");
    }
}
