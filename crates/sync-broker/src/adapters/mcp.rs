//! Consumer surface - line-delimited JSON-RPC 2.0 (MCP tool protocol).
//!
//! One JSON object per line in, one response per line out. Every message is
//! handled on its own task so a blocked `playground_watch` never holds up a
//! `playground_respond` sent after it. A single writer task owns the output
//! stream and serializes the response lines.
//!
//! Unparseable lines are logged and dropped; consumers of this protocol do
//! not expect a reply to them.

use crate::domain::config::McpConfig;
use crate::domain::error::{codes, ApiError, BrokerError};
use crate::domain::RequestId;
use crate::ports::RendezvousApi;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Tool that blocks until work is available (fetchWork).
pub const WATCH_TOOL: &str = "playground_watch";

/// Tool that posts an answer (postAnswer).
pub const RESPOND_TOOL: &str = "playground_respond";

/// Output buffer between handler tasks and the writer
const OUTPUT_BUFFER: usize = 256;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RespondArgs {
    request_id: String,
    content: String,
}

/// JSON-RPC server for the consumer.
pub struct McpServer {
    broker: Arc<dyn RendezvousApi>,
    config: McpConfig,
}

impl McpServer {
    pub fn new(broker: Arc<dyn RendezvousApi>, config: McpConfig) -> Self {
        Self { broker, config }
    }

    /// Serve one consumer connection until its input stream ends.
    ///
    /// Calls still in flight at end of input are cancelled; their fetch
    /// waiters go with them.
    pub async fn serve<R, W>(self: Arc<Self>, mut reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::channel::<String>(OUTPUT_BUFFER);
        let writer_task = tokio::spawn(write_lines(writer, out_rx));

        let mut in_flight = JoinSet::new();
        let mut buf = Vec::new();

        // Raw bytes per line: a line that is not UTF-8 is just another bad message.
        while reader.read_until(b'\n', &mut buf).await? > 0 {
            while in_flight.try_join_next().is_some() {}

            let line = buf.trim_ascii();
            if line.is_empty() {
                buf.clear();
                continue;
            }

            let parsed = serde_json::from_slice::<Value>(line);
            buf.clear();
            let message = match parsed {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "Ignoring unparseable consumer message");
                    continue;
                }
            };

            let server = Arc::clone(&self);
            let out_tx = out_tx.clone();
            in_flight.spawn(async move {
                if let Some(response) = server.handle_message(message).await {
                    if out_tx.send(response.to_string()).await.is_err() {
                        debug!("Consumer output closed before response was written");
                    }
                }
            });
        }

        info!(
            in_flight = in_flight.len(),
            "Consumer input closed"
        );
        in_flight.shutdown().await;
        drop(out_tx);

        writer_task
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }

    /// Handle one decoded message. Returns the response, if one is owed.
    pub async fn handle_message(&self, message: Value) -> Option<Value> {
        let id = message.get("id").cloned();

        let Some(method) = message.get("method").and_then(Value::as_str) else {
            return id.map(|id| {
                error_response(
                    id,
                    ApiError::new(codes::INVALID_REQUEST, "Invalid Request: missing method"),
                )
            });
        };

        match method {
            "initialize" => Some(success_response(
                id.unwrap_or(Value::Null),
                json!({
                    "protocolVersion": self.config.protocol_version,
                    "serverInfo": {
                        "name": self.config.server_name,
                        "version": crate::VERSION,
                    },
                    "capabilities": { "tools": {} },
                }),
            )),
            "notifications/initialized" => {
                info!("Consumer initialized");
                None
            }
            "ping" => Some(success_response(id.unwrap_or(Value::Null), json!({}))),
            "tools/list" => Some(success_response(
                id.unwrap_or(Value::Null),
                json!({ "tools": tool_definitions() }),
            )),
            "tools/call" => {
                let params = message.get("params");
                let name = params
                    .and_then(|p| p.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let args = params
                    .and_then(|p| p.get("arguments"))
                    .cloned()
                    .unwrap_or_else(|| json!({}));

                let result = self.call_tool(name, args).await;
                let text = serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string());
                Some(success_response(
                    id.unwrap_or(Value::Null),
                    json!({ "content": [{ "type": "text", "text": text }] }),
                ))
            }
            other => {
                debug!(method = other, "Unknown consumer method");
                id.map(|id| error_response(id, ApiError::unknown_method(other)))
            }
        }
    }

    /// Run a tool and return its result object.
    pub async fn call_tool(&self, name: &str, args: Value) -> Value {
        match name {
            WATCH_TOOL => self.watch().await,
            RESPOND_TOOL => self.respond(args),
            other => {
                warn!(tool = other, "Unknown tool");
                json!({ "error": format!("Unknown tool: {}", other) })
            }
        }
    }

    async fn watch(&self) -> Value {
        debug!("Consumer watching for work");
        let request = self.broker.await_work().await;
        info!(
            request_id = %request.id,
            action = %request.action,
            subject_id = %request.subject_id,
            "Handing request to consumer"
        );
        serde_json::to_value(request.to_work_item())
            .unwrap_or_else(|e| json!({ "error": ApiError::internal(e.to_string()).message }))
    }

    fn respond(&self, args: Value) -> Value {
        let args: RespondArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return json!({ "error": ApiError::from(e).message }),
        };

        info!(request_id = %args.request_id, "Consumer responding");

        // An id that does not even parse cannot match anything we issued.
        let Ok(request_id) = RequestId::parse(&args.request_id) else {
            warn!(request_id = %args.request_id, "Malformed request id");
            return not_found(self.broker.status().pending_id);
        };

        match self.broker.resolve(request_id, args.content) {
            Ok(outcome) => match outcome.warning() {
                None => json!({ "success": true }),
                Some(warning) => json!({ "success": true, "warning": warning }),
            },
            Err(BrokerError::UnknownRequestId { pending_id, .. }) => not_found(pending_id),
            Err(e) => json!({ "error": e.to_string() }),
        }
    }
}

fn not_found(pending_id: Option<RequestId>) -> Value {
    match pending_id {
        Some(pending_id) => json!({ "error": "Request not found", "pendingId": pending_id }),
        None => json!({ "error": "Request not found" }),
    }
}

/// Tool definitions advertised by `tools/list`
pub fn tool_definitions() -> Value {
    json!([
        {
            "name": WATCH_TOOL,
            "description": "BLOCKING: Waits for a user to interact with the playground. Call this in a loop to handle requests interactively. Returns as soon as a request is pending.",
            "inputSchema": { "type": "object", "properties": {}, "required": [] }
        },
        {
            "name": RESPOND_TOOL,
            "description": "Send a response back to the playground after processing a request.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "requestId": { "type": "string", "description": "Request ID from playground_watch" },
                    "content": { "type": "string", "description": "Your response (markdown supported)" }
                },
                "required": ["requestId", "content"]
            }
        }
    ])
}

fn success_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, error: ApiError) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": error })
}

async fn write_lines<W>(mut writer: W, mut lines: mpsc::Receiver<String>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
