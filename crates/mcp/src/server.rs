//! MCP server management (spawn, communicate, lifecycle).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::callable::{CallableTool, FunctionCall, function_response_part};
use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, RequestId, Tool,
};

/// Default timeout for MCP operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum size of a single message line (4MB).
/// Sized for inline image payloads.
pub const MAX_OUTPUT_SIZE: usize = 4 * 1024 * 1024;

/// JSON-RPC "method not found".
const METHOD_NOT_FOUND: i32 = -32601;

type Writer = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;
type Pending = Arc<StdMutex<HashMap<RequestId, oneshot::Sender<Result<JsonRpcResponse>>>>>;

/// Configuration for an MCP server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    /// Filled from the config table key when omitted.
    #[serde(default)]
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Tools from this server may skip confirmation in a trusted folder.
    #[serde(default)]
    pub trust: bool,
    #[serde(default)]
    pub include_tools: Vec<String>,
    #[serde(default)]
    pub exclude_tools: Vec<String>,
}

/// Handle to a running MCP server.
///
/// A background task reads the server's output and hands each response to
/// the request waiting on its id. A request that is dropped or times out
/// gives up its slot, and a late answer to it is discarded.
pub struct Server {
    config: ServerConfig,
    process: Mutex<Option<Child>>,
    writer: Writer,
    pending: Pending,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    next_id: AtomicI64,
    server_info: Mutex<Option<InitializeResult>>,
    tools: Mutex<Vec<Tool>>,
}

impl Server {
    /// Spawn a new MCP server process.
    pub async fn spawn(config: ServerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(Error::Spawn)?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdin")))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdout")))?;

        debug!(server = %config.name, command = %config.command, "spawned MCP server");

        Ok(Self::connect(config, Some(process), stdout, stdin))
    }

    /// Talk to a server over an already open pair of streams.
    fn connect(
        config: ServerConfig,
        process: Option<Child>,
        output: impl AsyncRead + Send + Unpin + 'static,
        input: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        let input: Box<dyn AsyncWrite + Send + Unpin> = Box::new(input);
        let writer: Writer = Arc::new(Mutex::new(input));
        let pending: Pending = Arc::default();
        let closed = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(read_loop(
            config.name.clone(),
            BufReader::new(output),
            Arc::clone(&writer),
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));

        Self {
            config,
            process: Mutex::new(process),
            writer,
            pending,
            closed,
            reader,
            next_id: AtomicI64::new(1),
            server_info: Mutex::new(None),
            tools: Mutex::new(Vec::new()),
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Initialize the server and fetch its tools.
    pub async fn initialize(&self) -> Result<&Self> {
        let params = InitializeParams::default();
        let result: InitializeResult = self.request("initialize", Some(params)).await?;
        self.notify("notifications/initialized", None::<()>).await?;

        debug!(
            server = %self.config.name,
            remote = %result.server_info.name,
            protocol = %result.protocol_version,
            "MCP server initialized"
        );
        *self.server_info.lock().await = Some(result);

        self.refresh_tools().await?;
        Ok(self)
    }

    pub async fn is_initialized(&self) -> bool {
        self.server_info.lock().await.is_some()
    }

    /// Re-fetch the tool list, following pagination cursors.
    pub async fn refresh_tools(&self) -> Result<()> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult = self.request("tools/list", params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        *self.tools.lock().await = tools;
        Ok(())
    }

    /// Get the list of available tools.
    pub async fn tools(&self) -> Vec<Tool> {
        self.tools.lock().await.clone()
    }

    /// Call a tool by name.
    ///
    /// A result flagged `isError` is returned as-is; interpreting it is up
    /// to the caller.
    pub async fn call(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        if !self.is_initialized().await {
            return Err(Error::NotInitialized);
        }

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        self.request("tools/call", Some(params)).await
    }

    /// Shut down the server.
    pub async fn shutdown(&self) {
        self.reader.abort();
        close(&self.closed, &self.pending);
        let mut process = self.process.lock().await;
        if let Some(process) = process.as_mut() {
            if let Err(e) = process.kill().await {
                debug!(server = %self.config.name, "kill failed: {e}");
            }
        }
    }

    // --- Internal methods ---

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }
        let request_json = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        let _slot = PendingSlot::register(&self.pending, id.clone(), tx);
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ServerExited);
        }

        write_line(&self.writer, &request_json).await?;

        let response = match timeout(DEFAULT_TIMEOUT, rx).await {
            Err(_) => {
                debug!(server = %self.config.name, ?id, method, "request timed out");
                return Err(Error::Timeout);
            }
            Ok(Err(_)) => return Err(Error::ServerExited),
            Ok(Ok(response)) => response?,
        };

        let result_value = response.into_result()?;
        serde_json::from_value(result_value)
            .map_err(|e| Error::InvalidResponse(format!("{method}: {e}")))
    }

    async fn notify<P>(&self, method: &str, params: Option<P>) -> Result<()>
    where
        P: serde::Serialize,
    {
        // Notifications have no ID
        let notification = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.and_then(|p| serde_json::to_value(p).ok())
        });
        write_line(&self.writer, &serde_json::to_string(&notification)?).await
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl CallableTool for Server {
    async fn call_tool(&self, calls: Vec<FunctionCall>) -> Result<Vec<Value>> {
        let mut parts = Vec::with_capacity(calls.len());
        for call in calls {
            let arguments = match call.args {
                Value::Null => None,
                args => Some(args),
            };
            let result = self.call(&call.name, arguments).await?;
            if result.is_error {
                warn!(server = %self.config.name, tool = %call.name, "tool reported an error");
            }
            parts.push(function_response_part(
                &call.name,
                result.content,
                result.is_error,
            ));
        }
        Ok(parts)
    }
}

/// A request's place in the pending map, released when the request ends
/// however it ends.
struct PendingSlot<'a> {
    pending: &'a Pending,
    id: RequestId,
}

impl<'a> PendingSlot<'a> {
    fn register(
        pending: &'a Pending,
        id: RequestId,
        tx: oneshot::Sender<Result<JsonRpcResponse>>,
    ) -> Self {
        lock(pending).insert(id.clone(), tx);
        Self { pending, id }
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

fn lock(
    pending: &Pending,
) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<Result<JsonRpcResponse>>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mark the connection closed and fail every waiting request.
fn close(closed: &AtomicBool, pending: &Pending) {
    closed.store(true, Ordering::SeqCst);
    fail_pending(pending, || Error::ServerExited);
}

fn fail_pending(pending: &Pending, error: impl Fn() -> Error) {
    for (_, tx) in lock(pending).drain() {
        let _ = tx.send(Err(error()));
    }
}

async fn write_line(writer: &Writer, line: &str) -> Result<()> {
    let mut writer = writer.lock().await;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Incoming {
    Line(String),
    /// A line over the size cap, already skipped; carries its length.
    TooLarge(usize),
}

/// Read one non-blank line, holding at most `max` bytes of it in memory.
async fn read_message<R>(reader: &mut R, max: usize) -> std::io::Result<Option<Incoming>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut buf = Vec::new();
        let read = (&mut *reader)
            .take(max as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            return Ok(None);
        }
        if buf.len() > max && buf.last() != Some(&b'\n') {
            let rest = skip_line(reader).await?;
            return Ok(Some(Incoming::TooLarge(buf.len() + rest)));
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if !line.is_empty() {
            return Ok(Some(Incoming::Line(line.to_string())));
        }
    }
}

/// Discard input up to and including the next newline.
async fn skip_line<R>(reader: &mut R) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut skipped = 0;
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(skipped);
        }
        match buf.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(skipped + pos + 1);
            }
            None => {
                let len = buf.len();
                reader.consume(len);
                skipped += len;
            }
        }
    }
}

async fn read_loop<R>(
    server: String,
    mut reader: R,
    writer: Writer,
    pending: Pending,
    closed: Arc<AtomicBool>,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        match read_message(&mut reader, MAX_OUTPUT_SIZE).await {
            Ok(Some(Incoming::Line(line))) => dispatch(&server, &line, &writer, &pending).await,
            Ok(Some(Incoming::TooLarge(size))) => {
                warn!(server = %server, size, "dropping oversized message");
                fail_pending(&pending, || Error::OutputTooLarge {
                    size,
                    max: MAX_OUTPUT_SIZE,
                });
            }
            Ok(None) => break,
            Err(e) => {
                warn!(server = %server, "failed to read from server: {e}");
                break;
            }
        }
    }
    debug!(server = %server, "server output closed");
    close(&closed, &pending);
}

async fn dispatch(server: &str, line: &str, writer: &Writer, pending: &Pending) {
    let message: Value = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            warn!(server, "ignoring unparseable line: {e}");
            return;
        }
    };
    let id = message.get("id").and_then(|id| RequestId::deserialize(id).ok());

    if let Some(method) = message.get("method").and_then(Value::as_str) {
        match id {
            Some(id) => answer_server_request(server, writer, id, method).await,
            None => debug!(server, method, "skipping server notification"),
        }
        return;
    }

    let response: JsonRpcResponse = match serde_json::from_value(message) {
        Ok(response) => response,
        Err(e) => {
            warn!(server, "ignoring malformed response: {e}");
            return;
        }
    };
    let Some(id) = response.id.clone() else {
        debug!(server, "ignoring response without id");
        return;
    };
    let waiter = lock(pending).remove(&id);
    match waiter {
        Some(tx) => {
            let _ = tx.send(Ok(response));
        }
        None => debug!(server, ?id, "discarding response to abandoned request"),
    }
}

/// Reply to a request the server sent us. Only `ping` is supported.
async fn answer_server_request(server: &str, writer: &Writer, id: RequestId, method: &str) {
    let reply = if method == "ping" {
        json!({ "jsonrpc": "2.0", "id": id, "result": {} })
    } else {
        debug!(server, method, "rejecting unsupported server request");
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": METHOD_NOT_FOUND,
                "message": format!("method not found: {method}"),
            }
        })
    };
    if let Err(e) = write_line(writer, &reply.to_string()).await {
        warn!(server, method, "failed to answer server request: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable::reports_error;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    #[test]
    fn server_config_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"command": "mcp-filesystem"}"#).unwrap();
        assert_eq!(config.command, "mcp-filesystem");
        assert!(config.args.is_empty());
        assert!(!config.trust);
        assert!(config.include_tools.is_empty());
    }

    #[tokio::test]
    async fn spawn_missing_binary_fails() {
        let config = ServerConfig {
            name: "ghost".into(),
            command: "definitely-not-a-real-mcp-server-binary".into(),
            ..Default::default()
        };
        assert!(matches!(Server::spawn(config).await, Err(Error::Spawn(_))));
    }

    #[tokio::test]
    async fn call_before_initialize_is_rejected() {
        let (server, _pong) = scripted_server();
        assert!(matches!(
            server.call("anything", None).await,
            Err(Error::NotInitialized)
        ));
    }

    /// In-process server speaking MCP over a duplex pipe. Answers
    /// `initialize` after a notification and a `ping`, lists tools over two
    /// pages, and serves `echo`, `fail` and a `slow` call that answers late.
    fn scripted_server() -> (Server, Arc<AtomicBool>) {
        let (client, remote) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client);
        let pong = Arc::new(AtomicBool::new(false));
        tokio::spawn(run_script(tokio::io::split(remote), Arc::clone(&pong)));

        let config = ServerConfig {
            name: "scripted".into(),
            command: "scripted".into(),
            ..Default::default()
        };
        (Server::connect(config, None, client_read, client_write), pong)
    }

    async fn run_script(
        (read, mut write): (ReadHalf<DuplexStream>, WriteHalf<DuplexStream>),
        pong: Arc<AtomicBool>,
    ) {
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(message) = serde_json::from_str::<Value>(&line) else {
                continue;
            };
            if message["id"] == "srv-1" {
                pong.store(message.get("result").is_some(), Ordering::SeqCst);
                continue;
            }
            let (delay, replies) = script_reply(&message);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            for reply in replies {
                if write.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    }

    fn script_reply(message: &Value) -> (Option<Duration>, Vec<Value>) {
        let id = message["id"].clone();
        let ok = |result: Value| json!({"jsonrpc": "2.0", "id": id, "result": result});
        let tool = |name: &str| json!({"name": name, "inputSchema": {"type": "object"}});
        let text = |text: &str| json!([{"type": "text", "text": text}]);

        match message["method"].as_str().unwrap_or_default() {
            "initialize" => (
                None,
                vec![
                    json!({
                        "jsonrpc": "2.0",
                        "method": "notifications/message",
                        "params": {"data": "hello"}
                    }),
                    json!({"jsonrpc": "2.0", "id": "srv-1", "method": "ping"}),
                    ok(json!({
                        "protocolVersion": "2025-06-18",
                        "capabilities": {},
                        "serverInfo": {"name": "scripted"}
                    })),
                ],
            ),
            "tools/list" => match message["params"]["cursor"].as_str() {
                None => (
                    None,
                    vec![ok(json!({"tools": [tool("echo")], "nextCursor": "page-2"}))],
                ),
                Some(_) => (
                    None,
                    vec![ok(json!({"tools": [tool("fail"), tool("slow")]}))],
                ),
            },
            "tools/call" => match message["params"]["name"].as_str().unwrap_or_default() {
                "echo" => {
                    let said = message["params"]["arguments"]["text"]
                        .as_str()
                        .unwrap_or("");
                    (None, vec![ok(json!({"content": text(said)}))])
                }
                "fail" => (
                    None,
                    vec![ok(json!({"content": text("boom"), "isError": true}))],
                ),
                _ => (
                    Some(Duration::from_millis(200)),
                    vec![ok(json!({"content": text("late")}))],
                ),
            },
            _ => (None, Vec::new()),
        }
    }

    fn echo(text: &str) -> FunctionCall {
        FunctionCall {
            name: "echo".into(),
            args: json!({"text": text}),
        }
    }

    #[tokio::test]
    async fn initialize_follows_cursor_and_answers_ping() {
        let (server, pong) = scripted_server();
        server.initialize().await.unwrap();

        let names: Vec<_> = server.tools().await.into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["echo", "fail", "slow"]);
        assert!(server.is_initialized().await);
        assert!(pong.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn call_tool_maps_error_flag() {
        let (server, _pong) = scripted_server();
        server.initialize().await.unwrap();

        let parts = server
            .call_tool(vec![
                echo("hi"),
                FunctionCall {
                    name: "fail".into(),
                    args: Value::Null,
                },
            ])
            .await
            .unwrap();

        assert_eq!(
            parts[0],
            function_response_part("echo", vec![json!({"type": "text", "text": "hi"})], false)
        );
        assert!(!reports_error(&parts[..1]));
        assert_eq!(
            parts[1]["functionResponse"]["response"]["error"]["isError"],
            json!(true)
        );
        assert!(reports_error(&parts[1..]));
    }

    #[tokio::test]
    async fn abandoned_call_leaves_connection_usable() {
        let (server, _pong) = scripted_server();
        server.initialize().await.unwrap();

        let slow = FunctionCall {
            name: "slow".into(),
            args: json!({}),
        };
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            _ = server.call_tool(vec![slow]) => panic!("slow call should still be pending"),
        }

        for word in ["one", "two", "three"] {
            let call = server.call_tool(vec![echo(word)]);
            let parts = tokio::time::timeout(Duration::from_secs(5), call)
                .await
                .expect("call should not hang")
                .unwrap();
            assert_eq!(
                parts[0]["functionResponse"]["response"]["content"][0]["text"],
                word
            );
        }
        assert!(lock(&server.pending).is_empty());
    }

    #[tokio::test]
    async fn closed_output_fails_requests() {
        let (client, remote) = tokio::io::duplex(1024);
        drop(remote);
        let (read, write) = tokio::io::split(client);
        let server = Server::connect(ServerConfig::default(), None, read, write);

        let result = tokio::time::timeout(Duration::from_secs(5), server.initialize())
            .await
            .expect("closed server should fail fast");
        assert!(matches!(result, Err(Error::ServerExited) | Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn oversized_line_is_skipped_without_buffering() {
        let input = format!("first\n\n{}\nnext\n", "x".repeat(20));
        let mut reader = BufReader::new(input.as_bytes());

        assert_eq!(
            read_message(&mut reader, 10).await.unwrap(),
            Some(Incoming::Line("first".into()))
        );
        assert_eq!(
            read_message(&mut reader, 10).await.unwrap(),
            Some(Incoming::TooLarge(21))
        );
        assert_eq!(
            read_message(&mut reader, 10).await.unwrap(),
            Some(Incoming::Line("next".into()))
        );
        assert_eq!(read_message(&mut reader, 10).await.unwrap(), None);
    }

    #[tokio::test]
    async fn line_at_the_cap_is_kept() {
        let input = format!("{}\n", "y".repeat(10));
        let mut reader = BufReader::new(input.as_bytes());
        assert_eq!(
            read_message(&mut reader, 10).await.unwrap(),
            Some(Incoming::Line("y".repeat(10)))
        );
    }
}
