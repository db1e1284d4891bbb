//! # 协议服务层
//!
//! 基于行分隔 JSON-RPC 2.0 的工具服务器。逐行读取输入流，按到达顺序
//! 并发分发请求，所有响应经由单个写入任务串行输出，保证每个响应恰好
//! 占据一行、永不交错。诊断日志只写入独立的日志流，协议输出流中除
//! 合法的 JSON-RPC 响应外不会出现任何内容。
//!
//! ## 方法
//! - `initialize`: 协议握手，返回协议版本与服务器信息
//! - `tools/list`: 静态工具目录
//! - `tools/call`: 调用具名工具，映射到会话管理器操作
//!
//! ## 模块结构
//! - `rpc`: JSON-RPC 线路实体与错误码
//! - `tools`: 工具目录与分发

pub mod rpc;
pub mod tools;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::session::SessionManager;
use crate::{Error, Result};
use rpc::{Request, Response};
use tools::ToolError;

/// Fixed protocol version answered by `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name answered by `initialize`
pub const SERVER_NAME: &str = "pagepilot";

/// Line-delimited JSON-RPC tool server over one shared session
pub struct ProtocolServer {
    session: Arc<SessionManager>,
    initialized: AtomicBool,
}

impl ProtocolServer {
    /// Create a server over a session manager
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self {
            session,
            initialized: AtomicBool::new(false),
        }
    }

    /// Whether the `initialize` handshake has been seen
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Relaxed)
    }

    /// Serve requests from `input` until it is exhausted.
    ///
    /// Handlers run concurrently; a single writer task owns `output` so
    /// responses are emitted as whole lines in completion order. Returns
    /// once the input stream ends and every in-flight response has been
    /// written.
    pub async fn run<R, W>(self: Arc<Self>, input: R, output: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<String>(64);

        let writer = tokio::spawn(async move {
            let mut output = output;
            while let Some(line) = rx.recv().await {
                if output.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if output.write_all(b"\n").await.is_err() {
                    break;
                }
                if output.flush().await.is_err() {
                    break;
                }
            }
        });

        let mut lines = BufReader::new(input).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let value: Value = match serde_json::from_str(line) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Unparseable request line: {}", e);
                    Self::send(&tx, Response::failure(Value::Null, rpc::PARSE_ERROR, "Parse error"))
                        .await;
                    continue;
                }
            };

            // Valid JSON that is not a request object still echoes the id
            // when one is present.
            let id = value.get("id").cloned().unwrap_or(Value::Null);
            let request: Request = match serde_json::from_value(value) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Invalid request object: {}", e);
                    Self::send(
                        &tx,
                        Response::failure(id, rpc::INVALID_REQUEST, "Invalid request"),
                    )
                    .await;
                    continue;
                }
            };

            let server = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(response) = server.handle(request).await {
                    Self::send(&tx, response).await;
                }
            });
        }

        // Input exhausted: in-flight handlers still hold channel clones;
        // the writer drains them before the server returns.
        drop(tx);
        writer
            .await
            .map_err(|e| Error::internal(format!("Writer task failed: {}", e)))?;

        debug!("Protocol stream closed");
        Ok(())
    }

    async fn send(tx: &mpsc::Sender<String>, response: Response) {
        match serde_json::to_string(&response) {
            Ok(line) => {
                if tx.send(line).await.is_err() {
                    error!("Protocol writer is gone, dropping response");
                }
            }
            Err(e) => error!("Failed to serialize response: {}", e),
        }
    }

    /// Dispatch one request. Requests without an id are notifications and
    /// produce no response.
    async fn handle(&self, request: Request) -> Option<Response> {
        let id = match request.id {
            Some(id) => id,
            None => {
                debug!("Notification received: {}", request.method);
                return None;
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(Response::failure(
                id,
                rpc::INVALID_REQUEST,
                "Invalid JSON-RPC version",
            ));
        }

        let response = match request.method.as_str() {
            "initialize" => {
                self.initialized.store(true, Ordering::Relaxed);
                Response::success(
                    id,
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": { "tools": {} },
                        "serverInfo": {
                            "name": SERVER_NAME,
                            "version": crate::VERSION,
                        }
                    }),
                )
            }

            "tools/list" => {
                let tools: Vec<Value> = tools::catalogue()
                    .iter()
                    .map(|tool| {
                        json!({
                            "name": tool.name,
                            "description": tool.description,
                            "inputSchema": tool.input_schema,
                        })
                    })
                    .collect();
                Response::success(id, json!({ "tools": tools }))
            }

            "tools/call" => self.handle_tool_call(id, request.params).await,

            other => Response::failure(
                id,
                rpc::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        };

        Some(response)
    }

    async fn handle_tool_call(&self, id: Value, params: Option<Value>) -> Response {
        let params = params.unwrap_or(Value::Null);

        let name = match params.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => {
                return Response::failure(
                    id,
                    rpc::INVALID_PARAMS,
                    "tools/call requires a string \"name\" parameter",
                )
            }
        };
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        debug!("Tool call: {}", name);

        match tools::call_tool(&self.session, &name, &arguments).await {
            Ok(outcome) => {
                let mut result = json!({
                    "content": [ { "type": "text", "text": outcome.text } ]
                });
                if let Some(data) = outcome.data {
                    result["data"] = data;
                }
                Response::success(id, result)
            }
            Err(ToolError::UnknownTool(unknown)) => Response::failure(
                id,
                rpc::METHOD_NOT_FOUND,
                format!("Unknown tool: {}", unknown),
            ),
            Err(ToolError::InvalidArgs(message)) => {
                Response::failure(id, rpc::INVALID_PARAMS, message)
            }
            Err(ToolError::Session(e)) if e.is_not_launched() => Response::failure(
                id,
                rpc::INTERNAL_ERROR,
                format!(
                    "Browser session not launched. Call browser_launch before {}.",
                    name
                ),
            ),
            Err(ToolError::Session(e)) => {
                Response::failure(id, rpc::INTERNAL_ERROR, format!("{} failed: {}", name, e))
            }
        }
    }
}
