use clap::{Arg, Command};
use std::env;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod mcp;
mod tools;
mod utils;

use config::{CanvasConfig, DownloadFallback, BASE_URL_ENV, TOKEN_ENV};
use mcp::server::McpServer;
use utils::canvas_client::CanvasClient;

fn cli() -> Command {
    Command::new("mcp-canvas")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A Model Context Protocol server for the Canvas LMS REST API")
        .long_about(
            "This MCP server exposes read-only Canvas tools:\n\
            - courses: list_courses, get_course\n\
            - assignments: list_assignments, get_assignment, list_quizzes, get_quiz\n\
            - content: list_files, get_file, read_pdf, list_folders, get_folder,\n  \
              list_modules, list_pages, get_page\n\
            - social: list_announcements, list_discussion_topics, list_calendar_events, list_todo",
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .value_name("URL")
                .help("Canvas instance URL, e.g. https://school.instructure.com (env: CANVAS_BASE_URL)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .value_name("TOKEN")
                .help("Canvas API access token (env: CANVAS_TOKEN)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECS")
                .help("HTTP timeout per request in seconds")
                .value_parser(clap::value_parser!(u64))
                .default_value("30"),
        )
        .arg(
            Arg::new("strict-download-auth")
                .long("strict-download-auth")
                .help("Only retry file downloads without credentials after a 401/403")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Only log errors")
                .action(clap::ArgAction::SetTrue),
        )
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();

    // Logs go to stderr; stdout is reserved for JSON-RPC
    let default_level = if matches.get_flag("quiet") { "error" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let base_url = matches
        .get_one::<String>("base-url")
        .cloned()
        .or_else(|| env::var(BASE_URL_ENV).ok());
    let token = matches
        .get_one::<String>("token")
        .cloned()
        .or_else(|| env::var(TOKEN_ENV).ok());

    let fallback = if matches.get_flag("strict-download-auth") {
        DownloadFallback::AuthErrorsOnly
    } else {
        DownloadFallback::AnyError
    };
    let timeout = matches.get_one::<u64>("timeout").copied().unwrap_or(30);

    let config = match CanvasConfig::new(base_url, token) {
        Ok(config) => config
            .with_timeout(Duration::from_secs(timeout))
            .with_download_fallback(fallback),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let client = match CanvasClient::new(&config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create Canvas client: {}", e);
            process::exit(1);
        }
    };

    info!(
        base_url = %config.base_url,
        timeout_secs = timeout,
        download_fallback = ?config.download_fallback,
        "Starting MCP server..."
    );

    let mut server = McpServer::new(client);
    if let Err(e) = server.start().await {
        error!("Failed to start server: {}", e);
        process::exit(1);
    }
}
