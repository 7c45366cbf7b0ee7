//! Tool Manager (Component B): in-process tool definitions plus discovery of
//! tools from external MCP subprocesses and remote HTTP tool servers.
//!
//! Three kinds of tools exist side by side behind one [`Tool`] shape:
//!
//! - **in-process** — a Rust closure, defined with [`tool`] or [`Tool::new`].
//! - **MCP** — discovered from a subprocess speaking line-delimited JSON-RPC
//!   2.0 on stdin/stdout ([`McpToolSource`]).
//! - **remote** — discovered from an HTTP(S) endpoint with an API key
//!   ([`RemoteToolSource`]).
//!
//! The [`ToolManager`] merges all sources into one name-to-`Tool` registry
//! and wraps every call in the configured per-tool timeout.

use crate::session::{SessionContext, ToolCallContext};
use crate::types::{MessageChunk, MessageRole, MessageType};
use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// Type alias for in-process tool handler functions.
///
/// `Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>`
/// lets handlers of different concrete closure types live in one registry,
/// be called from a shared reference, and cross thread boundaries.
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// Type alias for handlers that need a view of the calling session —
/// currently only [`crate::agents::Agent::to_tool`]'s agent-as-tool
/// adapter, which spawns a child [`SessionContext`] per call.
pub type ContextualToolHandler = Arc<
    dyn Fn(Value, ToolCallContext) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>>
        + Send
        + Sync,
>;

#[derive(Clone)]
enum ToolLogic {
    Plain(ToolHandler),
    Contextual(ContextualToolHandler),
}

/// A callable tool: name, description, JSON-Schema parameters, and either an
/// in-process handler or a dispatch to an external source.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    input_schema: Value,
    logic: ToolLogic,
}

impl Tool {
    /// Create a new in-process tool. `input_schema` accepts simple type
    /// notation, extended per-property notation, or a full JSON Schema —
    /// see [`convert_schema_to_openai`].
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let name = name.into();
        let description = description.into();
        let input_schema = convert_schema_to_openai(input_schema);

        Self {
            name,
            description,
            input_schema,
            logic: ToolLogic::Plain(Arc::new(move |args| Box::pin(handler(args)))),
        }
    }

    /// Create a tool whose handler needs a [`ToolCallContext`] view of the
    /// session making the call, e.g. to spawn a child session. Only
    /// reachable through [`ToolManager::call`]; a direct [`Tool::execute`]
    /// on a contextual tool fails.
    pub fn new_contextual<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, ToolCallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let name = name.into();
        let description = description.into();
        let input_schema = convert_schema_to_openai(input_schema);

        Self {
            name,
            description,
            input_schema,
            logic: ToolLogic::Contextual(Arc::new(move |args, ctx| Box::pin(handler(args, ctx)))),
        }
    }

    /// Execute a plain tool directly, with no session context. Fails for a
    /// tool created with [`Tool::new_contextual`] — route those through
    /// [`ToolManager::call`] instead.
    pub async fn execute(&self, arguments: Value) -> Result<Value> {
        match &self.logic {
            ToolLogic::Plain(handler) => handler(arguments).await,
            ToolLogic::Contextual(_) => Err(Error::tool_failed(format!(
                "tool '{}' requires a session context; call it through ToolManager::call",
                self.name
            ))),
        }
    }

    pub async fn execute_with_context(&self, arguments: Value, ctx: &SessionContext) -> Result<Value> {
        match &self.logic {
            ToolLogic::Plain(handler) => handler(arguments).await,
            ToolLogic::Contextual(handler) => handler(arguments, ctx.call_context()).await,
        }
    }

    pub fn to_openai_format(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

/// Normalize a tool parameter schema to OpenAI's JSON Schema format. Accepts
/// simple type notation (`{"x": "number"}`), extended per-property notation
/// (`{"x": {"type": "number", "optional": true}}`), or a pass-through full
/// JSON Schema (has both `"type"` and `"properties"`).
fn convert_schema_to_openai(schema: Value) -> Value {
    if schema.is_object() {
        let obj = schema.as_object().expect("checked is_object above");
        if obj.contains_key("type") && obj.contains_key("properties") {
            return schema;
        }

        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for (param_name, param_type) in obj {
            if let Some(type_str) = param_type.as_str() {
                properties.insert(param_name.clone(), type_to_json_schema(type_str));
                required.push(param_name.clone());
            } else if param_type.is_object() {
                let mut prop = param_type.clone();
                let prop_obj = prop.as_object_mut().expect("checked is_object above");

                let is_optional = prop_obj
                    .remove("optional")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let is_required = prop_obj.remove("required").and_then(|v| v.as_bool());
                let has_default = prop_obj.contains_key("default");

                properties.insert(param_name.clone(), prop);

                if let Some(true) = is_required {
                    required.push(param_name.clone());
                } else if is_optional || is_required == Some(false) {
                    // explicitly optional
                } else if !has_default {
                    required.push(param_name.clone());
                }
            }
        }

        return serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required
        });
    }

    serde_json::json!({ "type": "object", "properties": {}, "required": [] })
}

fn type_to_json_schema(type_str: &str) -> Value {
    let json_type = match type_str {
        "string" | "str" => "string",
        "integer" | "int" | "i32" | "i64" | "u32" | "u64" => "integer",
        "number" | "float" | "f32" | "f64" => "number",
        "boolean" | "bool" => "boolean",
        "array" | "list" | "vec" => "array",
        "object" | "dict" | "map" => "object",
        _ => "string",
    };
    serde_json::json!({ "type": json_type })
}

/// Fluent builder for [`Tool`], mirroring `tool(name, desc).param(...).build(handler)`.
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Value,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: serde_json::json!({}),
        }
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    pub fn param(mut self, name: &str, type_str: &str) -> Self {
        if !self.schema.is_object() {
            self.schema = serde_json::json!({});
        }
        let obj = self
            .schema
            .as_object_mut()
            .expect("schema is an object after reset above");
        obj.insert(name.to_string(), Value::String(type_str.to_string()));
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Tool::new(self.name, self.description, self.schema, handler)
    }
}

pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

// ============================================================================
// WORKSPACE SANDBOXING
// ============================================================================

/// Resolve `requested` against `workspace_root`, rejecting any path that
/// would escape the sandbox via `..` traversal or an absolute path outside
/// the root.
pub fn resolve_sandboxed(workspace_root: &Path, requested: &str) -> Result<PathBuf> {
    let candidate = workspace_root.join(requested);

    let mut normalized = PathBuf::new();
    for component in candidate.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(Error::invalid_argument(format!(
                        "path escapes workspace: {requested}"
                    )));
                }
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }

    if !normalized.starts_with(workspace_root) {
        return Err(Error::invalid_argument(format!(
            "path escapes workspace: {requested}"
        )));
    }

    Ok(normalized)
}

// ============================================================================
// MCP (Model Context Protocol) subprocess tool source
// ============================================================================

/// Spawns and owns a subprocess that speaks MCP over line-delimited JSON-RPC
/// 2.0 on stdin/stdout: `initialize`, `tools/list`, `tools/call`.
pub struct McpToolSource {
    label: String,
    child: Mutex<Child>,
    stdin: Mutex<tokio::process::ChildStdin>,
    stdout: Mutex<BufReader<tokio::process::ChildStdout>>,
    next_id: AtomicI64,
}

impl McpToolSource {
    /// Spawn `command` with `args` and run the MCP `initialize` handshake.
    pub async fn spawn(label: impl Into<String>, command: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            Error::config("MCP subprocess did not expose a writable stdin")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::config("MCP subprocess did not expose a readable stdout")
        })?;

        let source = Self {
            label: label.into(),
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            next_id: AtomicI64::new(1),
        };

        source
            .call_raw("initialize", serde_json::json!({"protocolVersion": "2024-11-05"}))
            .await?;

        Ok(source)
    }

    fn next_request_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn call_raw(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_request_id();
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        {
            let mut stdin = self.stdin.lock().await;
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await?;
        }

        let mut stdout = self.stdout.lock().await;
        loop {
            let mut buf = String::new();
            let n = stdout.read_line(&mut buf).await?;
            if n == 0 {
                return Err(Error::tool_failed(format!(
                    "MCP source '{}' closed stdout before responding",
                    self.label
                )));
            }
            let buf = buf.trim();
            if buf.is_empty() {
                continue;
            }
            let response: Value = serde_json::from_str(buf)?;

            // Notifications (no "id") carry streaming progress; skip them
            // and keep reading until the matching response arrives.
            if response.get("id").is_none() {
                continue;
            }
            if response.get("id") == Some(&Value::from(id)) {
                if let Some(error) = response.get("error") {
                    return Err(Error::tool_failed(format!(
                        "MCP source '{}' returned error: {error}",
                        self.label
                    )));
                }
                return Ok(response.get("result").cloned().unwrap_or(Value::Null));
            }
        }
    }

    /// List tools exposed by the subprocess, in the raw MCP `tools/list` shape.
    pub async fn list_tools(&self) -> Result<Vec<(String, String, Value)>> {
        let result = self.call_raw("tools/list", serde_json::json!({})).await?;
        let tools = result
            .get("tools")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(tools
            .into_iter()
            .filter_map(|t| {
                let name = t.get("name")?.as_str()?.to_string();
                let description = t
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let schema = t.get("inputSchema").cloned().unwrap_or(serde_json::json!({}));
                Some((name, description, schema))
            })
            .collect())
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        self.call_raw(
            "tools/call",
            serde_json::json!({"name": name, "arguments": arguments}),
        )
        .await
    }

    pub async fn shutdown(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        child.start_kill().ok();
        Ok(())
    }
}

/// Build [`Tool`]s that dispatch to an already-initialized [`McpToolSource`].
pub async fn discover_mcp_tools(source: Arc<McpToolSource>) -> Result<Vec<Tool>> {
    let entries = source.list_tools().await?;
    Ok(entries
        .into_iter()
        .map(|(name, description, schema)| {
            let source = source.clone();
            let tool_name = name.clone();
            Tool::new(name, description, schema, move |args| {
                let source = source.clone();
                let tool_name = tool_name.clone();
                async move { source.call_tool(&tool_name, args).await }
            })
        })
        .collect())
}

// ============================================================================
// Remote HTTP tool source
// ============================================================================

/// A tool server reachable over HTTP: `GET {base_url}/tools` for discovery,
/// `POST {base_url}/tools/{name}` to invoke, both bearer-authenticated.
pub struct RemoteToolSource {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RemoteToolSource {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<(String, String, Value)>> {
        let url = format!("{}/tools", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Error::LlmTransport)?;

        if !resp.status().is_success() {
            return Err(Error::tool_failed(format!(
                "remote tool source {url} returned {}",
                resp.status()
            )));
        }

        let body: Value = resp.json().await.map_err(Error::LlmTransport)?;
        let tools = body.as_array().cloned().unwrap_or_default();
        Ok(tools
            .into_iter()
            .filter_map(|t| {
                let name = t.get("name")?.as_str()?.to_string();
                let description = t
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let schema = t.get("schema").cloned().unwrap_or(serde_json::json!({}));
                Some((name, description, schema))
            })
            .collect())
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let url = format!("{}/tools/{}", self.base_url.trim_end_matches('/'), name);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&arguments)
            .send()
            .await
            .map_err(Error::LlmTransport)?;

        if !resp.status().is_success() {
            return Err(Error::tool_failed(format!(
                "remote tool '{name}' returned {}",
                resp.status()
            )));
        }

        resp.json().await.map_err(Error::LlmTransport)
    }
}

pub async fn discover_remote_tools(source: Arc<RemoteToolSource>) -> Result<Vec<Tool>> {
    let entries = source.list_tools().await?;
    Ok(entries
        .into_iter()
        .map(|(name, description, schema)| {
            let source = source.clone();
            let tool_name = name.clone();
            Tool::new(name, description, schema, move |args| {
                let source = source.clone();
                let tool_name = tool_name.clone();
                async move { source.call_tool(&tool_name, args).await }
            })
        })
        .collect())
}

// ============================================================================
// TOOL MANAGER
// ============================================================================

/// Merged registry of every discovered tool, dispatching calls with a
/// per-tool timeout applied uniformly regardless of source.
pub struct ToolManager {
    tools: HashMap<String, Tool>,
    default_timeout: Duration,
}

impl ToolManager {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            default_timeout,
        }
    }

    /// Register a tool. A name collision keeps "last registration wins" but
    /// logs a warning rather than silently discarding the prior tool.
    pub fn register(&mut self, tool: Tool) {
        if self.tools.contains_key(tool.name()) {
            tracing::warn!(tool = tool.name(), "tool name collision, replacing previous registration");
        }
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn register_all(&mut self, tools: impl IntoIterator<Item = Tool>) {
        for t in tools {
            self.register(t);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn tool_schemas(&self) -> Vec<Value> {
        self.tools.values().map(|t| t.to_openai_format()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// `tool_schemas`, restricted to an allow-list carried on the session
    /// (spec.md §4.2 `list_tools(filter?)`). `None` means "no restriction".
    pub fn tool_schemas_filtered(&self, allow: Option<&[String]>) -> Vec<Value> {
        match allow {
            None => self.tool_schemas(),
            Some(names) => self
                .tools
                .values()
                .filter(|t| names.iter().any(|n| n == t.name()))
                .map(|t| t.to_openai_format())
                .collect(),
        }
    }

    /// Execute a registered tool against `ctx` (spec.md §4.2 `run_tool`):
    /// rejects if the session is already cancelled, normalizes and
    /// schema-validates `arguments`, then dispatches with the manager's
    /// default timeout.
    pub async fn call(&self, name: &str, arguments: Value, ctx: &SessionContext) -> Result<Value> {
        if ctx.cancel().is_cancelled() {
            return Err(Error::Cancelled);
        }

        let tool = self
            .get(name)
            .ok_or_else(|| Error::tool_not_found(name))?;

        let arguments = normalize_arguments(arguments)?;
        validate_arguments(tool.input_schema(), &arguments)?;

        match tokio::time::timeout(self.default_timeout, tool.execute_with_context(arguments, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(Error::tool_timeout(name)),
        }
    }

    /// Like [`Self::call`], but also returns the intermediate `MessageChunk`s
    /// a caller should forward as they happen (spec.md §4.2
    /// `run_tool_stream`): a `ToolCall` chunk marking the call as started,
    /// then a `ToolCallResult` chunk carrying the outcome. The manager has
    /// no way to observe progress *inside* a tool's own execution, so these
    /// bracket the call rather than narrate it.
    pub async fn call_stream(
        &self,
        name: &str,
        arguments: Value,
        ctx: &SessionContext,
        tool_call_id: &str,
        timestamp: i64,
    ) -> Vec<MessageChunk> {
        let started = MessageChunk::builder(
            format!("{}-tool-start-{tool_call_id}", ctx.session_id()),
            MessageRole::Tool,
            MessageType::ToolCall,
        )
        .content(format!("calling '{name}'"))
        .tool_call_id(tool_call_id.to_string())
        .session_id(ctx.session_id().clone())
        .is_chunk(true)
        .is_final(false)
        .timestamp(timestamp)
        .build();

        let result = self.call(name, arguments, ctx).await;
        let content = match &result {
            Ok(value) => value.to_string(),
            Err(e) => serde_json::json!({"error": e.to_string(), "kind": e.kind()}).to_string(),
        };

        let finished = MessageChunk::builder(
            format!("{}-tool-result-{tool_call_id}", ctx.session_id()),
            MessageRole::Tool,
            MessageType::ToolCallResult,
        )
        .content(content)
        .tool_call_id(tool_call_id.to_string())
        .session_id(ctx.session_id().clone())
        .is_final(true)
        .timestamp(timestamp)
        .build();

        vec![started, finished]
    }
}

/// Normalize a tool-call argument payload before validation: a `Value::String`
/// is a double-encoded JSON body (the shape some OpenAI-compatible servers
/// send for `function.arguments`) and must be parsed before it can be
/// checked against a tool's schema.
fn normalize_arguments(arguments: Value) -> Result<Value> {
    match arguments {
        Value::String(raw) => serde_json::from_str(&raw)
            .map_err(|e| Error::invalid_argument(format!("arguments string is not valid JSON: {e}"))),
        other => Ok(other),
    }
}

/// Validate `arguments` against a tool's (already-normalized, see
/// [`convert_schema_to_openai`]) JSON Schema: every `required` property must
/// be present, and any property with a declared `type` must match it.
fn validate_arguments(schema: &Value, arguments: &Value) -> Result<()> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema_obj.get("required").and_then(|v| v.as_array()) {
        let args_obj = arguments.as_object();
        for key in required.iter().filter_map(|v| v.as_str()) {
            if !args_obj.map(|o| o.contains_key(key)).unwrap_or(false) {
                return Err(Error::invalid_argument(format!("missing required argument '{key}'")));
            }
        }
    }

    if let (Some(properties), Some(args_obj)) = (
        schema_obj.get("properties").and_then(|v| v.as_object()),
        arguments.as_object(),
    ) {
        for (key, value) in args_obj {
            let Some(expected_type) = properties.get(key).and_then(|p| p.get("type")).and_then(|t| t.as_str())
            else {
                continue;
            };
            if !json_value_matches_type(expected_type, value) {
                return Err(Error::invalid_argument(format!(
                    "argument '{key}' expected type '{expected_type}', got {value}"
                )));
            }
        }
    }

    Ok(())
}

fn json_value_matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_to_json_schema() {
        assert_eq!(type_to_json_schema("string"), json!({"type": "string"}));
        assert_eq!(type_to_json_schema("i64"), json!({"type": "integer"}));
        assert_eq!(type_to_json_schema("bool"), json!({"type": "boolean"}));
    }

    #[test]
    fn test_convert_simple_schema() {
        let schema = json!({"location": "string", "units": "string"});
        let result = convert_schema_to_openai(schema);
        assert_eq!(result["type"], "object");
        assert_eq!(result["required"], json!(["location", "units"]));
    }

    #[test]
    fn test_convert_full_schema_passthrough() {
        let schema = json!({"type": "object", "properties": {"name": {"type": "string"}}, "required": ["name"]});
        let result = convert_schema_to_openai(schema.clone());
        assert_eq!(result, schema);
    }

    #[tokio::test]
    async fn test_tool_creation_and_execute() {
        let add_tool = tool("add", "Add two numbers")
            .param("a", "number")
            .param("b", "number")
            .build(|args| async move {
                let a = args.get("a").and_then(|v| v.as_f64()).unwrap_or(0.0);
                let b = args.get("b").and_then(|v| v.as_f64()).unwrap_or(0.0);
                Ok(json!({"result": a + b}))
            });

        assert_eq!(add_tool.name(), "add");
        let result = add_tool.execute(json!({"a": 5.0, "b": 3.0})).await.unwrap();
        assert_eq!(result["result"], 8.0);
    }

    #[test]
    fn test_resolve_sandboxed_rejects_escape() {
        let root = PathBuf::from("/workspace/session-1");
        assert!(resolve_sandboxed(&root, "notes.txt").is_ok());
        assert!(resolve_sandboxed(&root, "../../etc/passwd").is_err());
    }

    #[test]
    fn test_resolve_sandboxed_allows_nested_dir() {
        let root = PathBuf::from("/workspace/session-1");
        let resolved = resolve_sandboxed(&root, "sub/dir/file.txt").unwrap();
        assert_eq!(resolved, PathBuf::from("/workspace/session-1/sub/dir/file.txt"));
    }

    fn test_ctx(name: &str) -> SessionContext {
        let session_id = crate::types::SessionId::new(name).unwrap();
        SessionContext::new(
            session_id,
            std::env::temp_dir().join(format!("agent-orchestrator-tools-test-{name}-{}", std::process::id())),
            4096,
        )
    }

    #[tokio::test]
    async fn test_tool_manager_not_found() {
        let manager = ToolManager::new(Duration::from_secs(1));
        let ctx = test_ctx("not-found");
        let err = manager.call("missing", json!({}), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), "tool_not_found");
    }

    #[tokio::test]
    async fn test_tool_manager_timeout() {
        let mut manager = ToolManager::new(Duration::from_millis(20));
        manager.register(tool("slow", "Sleeps").build(|_| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(json!({}))
        }));

        let ctx = test_ctx("timeout");
        let err = manager.call("slow", json!({}), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), "tool_timeout");
    }

    #[tokio::test]
    async fn test_tool_manager_dispatch() {
        let mut manager = ToolManager::new(Duration::from_secs(1));
        manager.register(tool("echo", "Echo").param("x", "number").build(|args| async move { Ok(args) }));
        let ctx = test_ctx("dispatch");
        let result = manager.call("echo", json!({"x": 1}), &ctx).await.unwrap();
        assert_eq!(result["x"], 1);
    }

    #[tokio::test]
    async fn test_tool_manager_rejects_missing_required_argument() {
        let mut manager = ToolManager::new(Duration::from_secs(1));
        manager.register(tool("greet", "Greets someone").param("name", "string").build(
            |args| async move { Ok(json!({"greeting": format!("hello {}", args["name"])})) },
        ));

        let ctx = test_ctx("missing-arg");
        let err = manager.call("greet", json!({}), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[tokio::test]
    async fn test_tool_manager_rejects_wrong_argument_type() {
        let mut manager = ToolManager::new(Duration::from_secs(1));
        manager.register(tool("double", "Doubles a number").param("x", "number").build(
            |args| async move { Ok(json!({"result": args["x"].as_f64().unwrap_or(0.0) * 2.0})) },
        ));

        let ctx = test_ctx("wrong-type");
        let err = manager.call("double", json!({"x": "not a number"}), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[tokio::test]
    async fn test_tool_manager_normalizes_double_encoded_string_arguments() {
        let mut manager = ToolManager::new(Duration::from_secs(1));
        manager.register(tool("echo", "Echo").param("x", "number").build(|args| async move { Ok(args) }));

        let ctx = test_ctx("normalize");
        let result = manager
            .call("echo", Value::String(r#"{"x": 3}"#.to_string()), &ctx)
            .await
            .unwrap();
        assert_eq!(result["x"], 3);
    }

    #[tokio::test]
    async fn test_tool_manager_rejects_malformed_string_arguments() {
        let mut manager = ToolManager::new(Duration::from_secs(1));
        manager.register(tool("echo", "Echo").build(|args| async move { Ok(args) }));

        let ctx = test_ctx("normalize-fail");
        let err = manager
            .call("echo", Value::String("not json".to_string()), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[tokio::test]
    async fn test_tool_manager_call_rejects_when_session_already_cancelled() {
        let mut manager = ToolManager::new(Duration::from_secs(1));
        manager.register(tool("echo", "Echo").build(|args| async move { Ok(args) }));

        let ctx = test_ctx("cancelled");
        ctx.cancel().cancel();
        let err = manager.call("echo", json!({}), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), "cancelled");
    }

    #[test]
    fn test_register_logs_a_warning_on_name_collision_but_keeps_last_registration() {
        let mut manager = ToolManager::new(Duration::from_secs(1));
        manager.register(tool("dup", "First").build(|_| async move { Ok(json!({"which": "first"})) }));
        manager.register(tool("dup", "Second").build(|_| async move { Ok(json!({"which": "second"})) }));
        assert_eq!(manager.get("dup").unwrap().description(), "Second");
    }

    #[tokio::test]
    async fn test_call_stream_brackets_a_successful_call_with_start_and_result_chunks() {
        let mut manager = ToolManager::new(Duration::from_secs(1));
        manager.register(tool("echo", "Echo").param("x", "number").build(|args| async move { Ok(args) }));

        let ctx = test_ctx("stream");
        let chunks = manager.call_stream("echo", json!({"x": 1}), &ctx, "call-1", 0).await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].message_type, MessageType::ToolCall);
        assert!(!chunks[0].is_final);
        assert_eq!(chunks[1].message_type, MessageType::ToolCallResult);
        assert!(chunks[1].is_final);
        assert!(chunks[1].content.contains('1'));
    }

    #[tokio::test]
    async fn test_contextual_tool_cannot_be_run_via_plain_execute() {
        let contextual = Tool::new_contextual("spawn", "Spawns a child", json!({}), |_args, _ctx| async move {
            Ok(json!({}))
        });
        let err = contextual.execute(json!({})).await.unwrap_err();
        assert_eq!(err.kind(), "tool_failed");
    }

    #[tokio::test]
    async fn test_contextual_tool_runs_through_tool_manager_call() {
        let mut manager = ToolManager::new(Duration::from_secs(1));
        manager.register(Tool::new_contextual("workspace_of", "Reports the caller's workspace", json!({}), |_args, ctx| async move {
            Ok(json!({"workspace_root": ctx.workspace_root().to_string_lossy()}))
        }));

        let ctx = test_ctx("contextual");
        let result = manager.call("workspace_of", json!({}), &ctx).await.unwrap();
        assert_eq!(result["workspace_root"], ctx.workspace_root().to_string_lossy().to_string());
    }
}
