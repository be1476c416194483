use anyhow::{anyhow, Result};
use futures::{SinkExt, StreamExt};
use tokio::io::BufReader;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error};

use super::types::{McpMessage, McpNotification, McpRequest, McpResponse};

/// Newline-delimited JSON-RPC over stdin/stdout. stdout carries protocol traffic only.
pub struct StdioTransport {
    reader: FramedRead<BufReader<tokio::io::Stdin>, LinesCodec>,
    writer: FramedWrite<tokio::io::Stdout, LinesCodec>,
}

impl StdioTransport {
    pub fn new() -> Self {
        let reader = FramedRead::new(BufReader::new(tokio::io::stdin()), LinesCodec::new());
        let writer = FramedWrite::new(tokio::io::stdout(), LinesCodec::new());

        Self { reader, writer }
    }

    /// Reads the next well-formed message; `Ok(None)` means the client closed stdin.
    /// Unparseable lines are logged and skipped.
    pub async fn read_message(&mut self) -> Result<Option<McpMessage>> {
        loop {
            match self.reader.next().await {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    debug!("Received: {}", line);
                    match parse_message(&line) {
                        Ok(message) => return Ok(Some(message)),
                        Err(e) => error!("Failed to parse message: {}", e),
                    }
                }
                Some(Err(e)) => {
                    error!("Error reading from stdin: {}", e);
                    return Err(anyhow!("Transport error: {}", e));
                }
                None => {
                    debug!("EOF reached");
                    return Ok(None);
                }
            }
        }
    }

    pub async fn write_response(&mut self, response: McpResponse) -> Result<()> {
        let json = serde_json::to_string(&response)?;
        debug!("Sending: {}", json);

        self.writer.send(json).await?;

        Ok(())
    }
}

/// Classifies one line: objects with an `id` are requests, objects without are notifications.
pub fn parse_message(line: &str) -> Result<McpMessage> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| anyhow!("Invalid JSON: {}", e))?;

    let obj = value
        .as_object()
        .ok_or_else(|| anyhow!("Invalid JSON-RPC message structure"))?;

    if obj.contains_key("id") {
        let request = serde_json::from_value::<McpRequest>(value)
            .map_err(|e| anyhow!("Invalid JSON-RPC request: {}", e))?;
        Ok(McpMessage::Request(request))
    } else {
        let notification = serde_json::from_value::<McpNotification>(value)
            .map_err(|e| anyhow!("Invalid JSON-RPC notification: {}", e))?;
        Ok(McpMessage::Notification(notification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_with_id_is_a_request() {
        let msg = parse_message(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list","params":null}"#)
            .unwrap();
        match msg {
            McpMessage::Request(req) => assert_eq!(req.method, "tools/list"),
            McpMessage::Notification(_) => panic!("expected request"),
        }
    }

    #[test]
    fn line_without_id_is_a_notification() {
        let msg =
            parse_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(matches!(msg, McpMessage::Notification(n) if n.method == "notifications/initialized"));
    }

    #[test]
    fn rejects_non_objects_and_bad_json() {
        assert!(parse_message("[1,2,3]").is_err());
        assert!(parse_message("{not json").is_err());
    }
}
