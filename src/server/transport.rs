//! JSON-RPC over stdio transport.
//!
//! Serves the MCP protocol on a line-delimited stream (one JSON object per
//! line):
//! - Reading requests and notifications from stdin
//! - Dispatching each `tools/call` on its own task
//! - Writing responses to stdout under a shared writer lock
//!
//! Every in-flight `tools/call` has a `CancellationToken`, fired by
//! `notifications/cancelled`. A cancelled request gets no response.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::errors::{ToolError, TransportError};
use super::tools::{tool_definitions, GatewayState};
use super::types::{
    error_codes, CallToolParams, CallToolResult, CancelledParams, InitializeResult,
    JsonRpcRequest, JsonRpcResponse, RequestId, ServerInfo, PROTOCOL_VERSION,
};

const SERVER_NAME: &str = "ask-another";

type InFlight = Arc<StdMutex<HashMap<RequestId, CancellationToken>>>;

// ─── Server ──────────────────────────────────────────────────────────────────

/// MCP server bound to one output stream.
pub struct StdioServer<W> {
    state: Arc<GatewayState>,
    writer: Arc<Mutex<W>>,
    in_flight: InFlight,
}

impl<W> Clone for StdioServer<W> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            writer: Arc::clone(&self.writer),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<W> StdioServer<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(state: Arc<GatewayState>, writer: W) -> Self {
        Self {
            state,
            writer: Arc::new(Mutex::new(writer)),
            in_flight: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Read and dispatch messages until `reader` reaches EOF.
    pub async fn serve<R>(&self, reader: R) -> Result<(), TransportError>
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await.map_err(TransportError::Read)? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => self.dispatch(request).await?,
                Err(e) => {
                    tracing::warn!(error = %e, "unparseable message on stdin");
                    self.write(&JsonRpcResponse::failure(
                        None,
                        error_codes::PARSE_ERROR,
                        format!("Parse error: {e}"),
                    ))
                    .await?;
                }
            }
        }

        tracing::info!("stdin closed, shutting down");
        Ok(())
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> Result<(), TransportError> {
        let Some(id) = request.id.clone() else {
            self.handle_notification(request);
            return Ok(());
        };

        let result = match request.method.as_str() {
            "initialize" => serde_json::to_value(InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                capabilities: serde_json::json!({"tools": {"listChanged": false}}),
                server_info: ServerInfo {
                    name: SERVER_NAME,
                    version: env!("CARGO_PKG_VERSION"),
                },
                instructions: self.state.instructions(),
            })?,
            "ping" => serde_json::json!({}),
            "tools/list" => serde_json::json!({ "tools": tool_definitions() }),
            "tools/call" => {
                self.spawn_tool_call(id, request.params);
                return Ok(());
            }
            other => {
                tracing::debug!(method = %other, "unknown method");
                return self
                    .write(&JsonRpcResponse::failure(
                        Some(id),
                        error_codes::METHOD_NOT_FOUND,
                        format!("Method not found: {other}"),
                    ))
                    .await;
            }
        };

        self.write(&JsonRpcResponse::success(Some(id), result)).await
    }

    fn handle_notification(&self, request: JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/cancelled" => {
                let params = request
                    .params
                    .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok());
                let Some(params) = params else {
                    tracing::warn!("notifications/cancelled without a valid requestId");
                    return;
                };
                let token = self
                    .in_flight
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(&params.request_id)
                    .cloned();
                if let Some(token) = token {
                    tracing::info!(
                        request_id = ?params.request_id,
                        reason = params.reason.as_deref().unwrap_or("-"),
                        "request cancelled by client"
                    );
                    token.cancel();
                }
            }
            "notifications/initialized" => tracing::debug!("client initialized"),
            other => tracing::debug!(method = %other, "ignoring notification"),
        }
    }

    /// Run one `tools/call` on its own task.
    ///
    /// The cancellation token is registered before the task starts, so a
    /// cancel notification read right after this request always finds it.
    fn spawn_tool_call(&self, id: RequestId, params: Option<serde_json::Value>) {
        let token = CancellationToken::new();
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), token.clone());

        let server = self.clone();
        tokio::spawn(async move {
            let response = server.run_tool_call(id.clone(), params, &token).await;
            server
                .in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);

            let Some(response) = response else {
                return;
            };
            if token.is_cancelled() {
                return;
            }
            if let Err(e) = server.write(&response).await {
                tracing::error!(error = %e, "failed to write tool response");
            }
        });
    }

    async fn run_tool_call(
        &self,
        id: RequestId,
        params: Option<serde_json::Value>,
        token: &CancellationToken,
    ) -> Option<JsonRpcResponse> {
        let params = match params.map(serde_json::from_value::<CallToolParams>) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return Some(JsonRpcResponse::failure(
                    Some(id),
                    error_codes::INVALID_PARAMS,
                    format!("Invalid tools/call params: {e}"),
                ))
            }
            None => {
                return Some(JsonRpcResponse::failure(
                    Some(id),
                    error_codes::INVALID_PARAMS,
                    "Missing tools/call params",
                ))
            }
        };

        let started = std::time::Instant::now();
        let outcome = self
            .state
            .call_tool(&params.name, params.arguments, token)
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(text) => {
                tracing::info!(tool = %params.name, elapsed_ms, "tool call succeeded");
                CallToolResult::text(text)
            }
            Err(ToolError::Interrupted) => {
                tracing::info!(tool = %params.name, elapsed_ms, "tool call interrupted");
                return None;
            }
            Err(ToolError::UnknownTool(name)) => {
                return Some(JsonRpcResponse::failure(
                    Some(id),
                    error_codes::INVALID_PARAMS,
                    format!("Unknown tool: '{name}'"),
                ))
            }
            Err(e) => {
                tracing::warn!(tool = %params.name, elapsed_ms, error = %e, "tool call failed");
                CallToolResult::error(e.to_string())
            }
        };

        match serde_json::to_value(result) {
            Ok(value) => Some(JsonRpcResponse::success(Some(id), value)),
            Err(e) => Some(JsonRpcResponse::failure(
                Some(id),
                error_codes::INVALID_REQUEST,
                format!("failed to encode tool result: {e}"),
            )),
        }
    }

    async fn write(&self, response: &JsonRpcResponse) -> Result<(), TransportError> {
        let mut json = serde_json::to_string(response)?;
        json.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(TransportError::Write)?;
        writer.flush().await.map_err(TransportError::Write)
    }
}

/// Serve on the process's stdin/stdout until stdin closes.
pub async fn serve_stdio(state: Arc<GatewayState>) -> Result<(), TransportError> {
    StdioServer::new(state, tokio::io::stdout())
        .serve(tokio::io::stdin())
        .await
}

// ─── Tests ───────────────────────────────────────────────────────────────────
