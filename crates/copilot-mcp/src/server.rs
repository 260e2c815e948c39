//! MCP Server
//!
//! Handles the MCP protocol over a duplex byte stream (stdio in
//! production), processing newline-delimited JSON-RPC 2.0 messages.
//!
//! Tools are registered with a typed input: arguments are checked against
//! the tool's schema and deserialized before the handler runs, so a
//! handler never sees invalid input. Each message is handled in its own
//! task; responses go through a single writer so lines never interleave.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::protocol::{
    CallToolParams, InitializeResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    ServerCapabilities, ServerInfo, Tool, ToolResult, ToolsCapability, INTERNAL_ERROR,
    INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION,
};

type ToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// Deserializes arguments and starts the handler
type ToolHandler =
    Arc<dyn Fn(Map<String, Value>) -> Result<ToolFuture, String> + Send + Sync>;

struct RegisteredTool {
    tool: Tool,
    handler: ToolHandler,
}

/// MCP Server that communicates over a duplex stream
pub struct McpServer {
    info: ServerInfo,
    tools: Vec<RegisteredTool>,
}

impl McpServer {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            info: ServerInfo {
                name: name.to_string(),
                version: version.to_string(),
            },
            tools: Vec::new(),
        }
    }

    /// Register a tool with a typed input and an async handler
    pub fn register_tool<T, F, Fut>(&mut self, tool: Tool, handler: F)
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        let handler: ToolHandler = Arc::new(move |args| {
            let input: T =
                serde_json::from_value(Value::Object(args)).map_err(|e| e.to_string())?;
            Ok(Box::pin(handler(input)) as ToolFuture)
        });

        self.tools.retain(|registered| registered.tool.name != tool.name);
        self.tools.push(RegisteredTool { tool, handler });
    }

    /// Registered tool definitions, in registration order
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|registered| registered.tool.clone()).collect()
    }

    /// Run the server, reading from stdin and writing to stdout
    pub async fn run_stdio(self) -> anyhow::Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve until the reader reaches EOF and in-flight calls have finished
    pub async fn serve<R, W>(self, reader: R, writer: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let server = Arc::new(self);
        let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut in_flight = JoinSet::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            // A line that is not UTF-8 gets a parse error; the session continues
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    error!(error = %e, "Received non-UTF-8 message");
                    let _ = tx.send(JsonRpcResponse::error(
                        None,
                        PARSE_ERROR,
                        format!("Parse error: {}", e),
                    ));
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            debug!(length = line.len(), "Received message");

            let server = Arc::clone(&server);
            let tx = tx.clone();
            let message = line.to_string();
            in_flight.spawn(async move {
                if let Some(resp) = server.handle_message(&message).await {
                    let _ = tx.send(resp);
                }
            });

            while let Some(done) = in_flight.try_join_next() {
                if let Err(e) = done {
                    error!(error = %e, "Message task failed");
                }
            }
        }

        // EOF - client disconnected
        info!("Client disconnected");
        while let Some(done) = in_flight.join_next().await {
            if let Err(e) = done {
                error!(error = %e, "Message task failed");
            }
        }

        drop(tx);
        writer_task.await??;
        Ok(())
    }

    /// Handle a single JSON-RPC message
    pub async fn handle_message(&self, message: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(req) => req,
            Err(e) => {
                error!(error = %e, "Failed to parse request");
                return Some(JsonRpcResponse::error(
                    None,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        let id = request.id.clone();

        // Handle notifications (no id means no response expected)
        if id.is_none() {
            self.handle_notification(&request.method);
            return None;
        }

        let result = self.handle_request(&request.method, request.params).await;

        match result {
            Ok(value) => Some(JsonRpcResponse::success(id, value)),
            Err((code, message)) => Some(JsonRpcResponse::error(id, code, message)),
        }
    }

    /// Handle a notification (no response expected)
    fn handle_notification(&self, method: &str) {
        match method {
            "notifications/initialized" => {
                info!("Client initialized");
            }
            "notifications/cancelled" => {
                debug!("Request cancelled");
            }
            _ => {
                debug!(method, "Unknown notification");
            }
        }
    }

    /// Handle a request and return the result
    async fn handle_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, (i32, String)> {
        match method {
            "initialize" => self.handle_initialize(),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(params).await,
            "ping" => Ok(json!({})),
            _ => {
                warn!(method, "Unknown method");
                Err((METHOD_NOT_FOUND, format!("Method not found: {}", method)))
            }
        }
    }

    /// Handle the initialize request
    fn handle_initialize(&self) -> Result<Value, (i32, String)> {
        info!("Initializing MCP server");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: self.info.clone(),
        };

        serde_json::to_value(result)
            .map_err(|e| (INTERNAL_ERROR, format!("Serialization error: {}", e)))
    }

    /// Handle the tools/list request
    fn handle_list_tools(&self) -> Result<Value, (i32, String)> {
        let result = ListToolsResult { tools: self.tools() };

        serde_json::to_value(result)
            .map_err(|e| (INTERNAL_ERROR, format!("Serialization error: {}", e)))
    }

    /// Handle the tools/call request
    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value, (i32, String)> {
        let params: CallToolParams = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| (INVALID_PARAMS, format!("Invalid params: {}", e)))?,
            None => return Err((INVALID_PARAMS, "Missing params".to_string())),
        };

        let registered = self
            .tools
            .iter()
            .find(|registered| registered.tool.name == params.name)
            .ok_or_else(|| (INVALID_PARAMS, format!("Unknown tool: {}", params.name)))?;

        registered
            .tool
            .input_schema
            .validate(&params.arguments)
            .map_err(|e| {
                warn!(scope = %params.name, error = %e, "rejected invalid arguments");
                (
                    INVALID_PARAMS,
                    format!("Invalid arguments for tool {}: {}", params.name, e),
                )
            })?;

        let future = (registered.handler)(params.arguments).map_err(|e| {
            (
                INVALID_PARAMS,
                format!("Invalid arguments for tool {}: {}", params.name, e),
            )
        })?;

        // A panicking handler fails this call only
        let result = tokio::spawn(future).await.map_err(|e| {
            error!(scope = %params.name, error = %e, "Tool handler failed");
            (INTERNAL_ERROR, format!("Tool {} failed: {}", params.name, e))
        })?;

        serde_json::to_value(result)
            .map_err(|e| (INTERNAL_ERROR, format!("Serialization error: {}", e)))
    }
}

async fn write_responses<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(resp) = rx.recv().await {
        let resp_str = serde_json::to_string(&resp)?;
        debug!(length = resp_str.len(), "Sending response");
        writer.write_all(resp_str.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{InputSchema, TextContent};
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Deserialize)]
    struct EchoInput {
        text: String,
    }

    fn echo_tool() -> Tool {
        Tool {
            name: "echo".to_string(),
            title: Some("Echo".to_string()),
            description: "Echo the text back".to_string(),
            input_schema: InputSchema {
                schema_type: "object".to_string(),
                properties: json!({ "text": { "type": "string", "minLength": 1 } })
                    .as_object()
                    .cloned()
                    .unwrap(),
                required: vec!["text".to_string()],
            },
        }
    }

    fn server_with_counter() -> (McpServer, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut server = McpServer::new("test", "0.0.0");
        server.register_tool(echo_tool(), move |input: EchoInput| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { ToolResult::text(input.text) }
        });
        (server, calls)
    }

    async fn request(server: &McpServer, message: Value) -> Value {
        let resp = server.handle_message(&message.to_string()).await.unwrap();
        serde_json::to_value(resp).unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let (server, _) = server_with_counter();
        let resp = request(
            &server,
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }),
        )
        .await;

        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(resp["result"]["serverInfo"]["name"], "test");
        assert!(resp["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_list_tools() {
        let (server, _) = server_with_counter();
        let resp = request(
            &server,
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }),
        )
        .await;

        let tools = resp["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "echo");
        assert_eq!(tools[0]["title"], "Echo");
        assert_eq!(tools[0]["inputSchema"]["required"][0], "text");
    }

    #[tokio::test]
    async fn test_call_tool() {
        let (server, calls) = server_with_counter();
        let resp = request(
            &server,
            json!({
                "jsonrpc": "2.0", "id": "a", "method": "tools/call",
                "params": { "name": "echo", "arguments": { "text": "hi" } }
            }),
        )
        .await;

        let content: Vec<TextContent> =
            serde_json::from_value(resp["result"]["content"].clone()).unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0].content_type, "text");
        assert_eq!(content[0].text, "hi");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_handler() {
        let (server, calls) = server_with_counter();

        for arguments in [json!({}), json!({ "text": "" }), json!({ "text": 7 })] {
            let resp = request(
                &server,
                json!({
                    "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                    "params": { "name": "echo", "arguments": arguments }
                }),
            )
            .await;

            assert_eq!(resp["error"]["code"], INVALID_PARAMS);
            assert!(resp.get("result").is_none());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let (server, _) = server_with_counter();

        let resp = request(
            &server,
            json!({
                "jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": { "name": "nope" }
            }),
        )
        .await;
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);

        let resp = request(
            &server,
            json!({ "jsonrpc": "2.0", "id": 5, "method": "resources/list" }),
        )
        .await;
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_parse_error_and_notifications() {
        let (server, _) = server_with_counter();

        let resp = server.handle_message("{not json").await.unwrap();
        assert_eq!(resp.error.unwrap().code, PARSE_ERROR);

        let resp = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn test_panicking_handler_fails_only_that_call() {
        let mut server = McpServer::new("test", "0.0.0");
        server.register_tool(echo_tool(), |input: EchoInput| async move {
            if input.text == "panic" {
                panic!("handler bug");
            }
            ToolResult::text(input.text)
        });

        let call = |text: &str| {
            json!({
                "jsonrpc": "2.0", "id": 6, "method": "tools/call",
                "params": { "name": "echo", "arguments": { "text": text } }
            })
        };

        let resp = request(&server, call("panic")).await;
        assert_eq!(resp["error"]["code"], INTERNAL_ERROR);

        let resp = request(&server, call("fine")).await;
        assert_eq!(resp["result"]["content"][0]["text"], "fine");
    }

    #[tokio::test]
    async fn test_serve_over_duplex() {
        let (server, _) = server_with_counter();
        let (client, server_io) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_io);
        let handle = tokio::spawn(server.serve(server_read, server_write));

        let (client_read, mut client_write) = tokio::io::split(client);
        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\n")
            .await
            .unwrap();
        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n")
            .await
            .unwrap();
        client_write.shutdown().await.unwrap();
        drop(client_write);

        let mut lines = BufReader::new(client_read).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let resp: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"], json!({}));

        handle.await.unwrap().unwrap();
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_gets_parse_error_and_session_continues() {
        let (server, _) = server_with_counter();
        let (client, server_io) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_io);
        let handle = tokio::spawn(server.serve(server_read, server_write));

        let (client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"\xff\xfe garbage\n").await.unwrap();
        let mut lines = BufReader::new(client_read).lines();

        let line = lines.next_line().await.unwrap().unwrap();
        let resp: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(resp["id"], Value::Null);
        assert_eq!(resp["error"]["code"], PARSE_ERROR);

        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n")
            .await
            .unwrap();
        let line = lines.next_line().await.unwrap().unwrap();
        let resp: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(resp["id"], 2);
        assert_eq!(resp["result"], json!({}));

        client_write.shutdown().await.unwrap();
        handle.await.unwrap().unwrap();
    }
}
