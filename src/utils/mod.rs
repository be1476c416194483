pub mod canvas_client;
pub mod content_guard;
pub mod pdf;
