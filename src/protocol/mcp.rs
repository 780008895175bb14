//! MCP (Model Context Protocol) tool surface (design §4.I): exposes
//! session/context/action operations as JSON-RPC tools over `rmcp`, so an
//! LLM agent can drive the browser directly instead of through REST/WS/gRPC.
//! Tool registry shape grounded in the teacher's `tools/mod.rs`
//! (`ToolRegistry` keyed by name, each tool owning its JSON schema).

use crate::actions::Action;
use crate::auth::Principal;
use crate::executor::ActionExecutor;
use crate::pages::PageManager;
use crate::session::{NewSession, SessionId, SessionStore};
use rmcp::model::{
    CallToolResult, Content, ErrorCode, ErrorData, ListResourcesResult, ListToolsResult,
    PaginatedRequestParam, RawResource, ReadResourceRequestParam, ReadResourceResult, Resource,
    ResourceContents, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::ServerHandler;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

/// Shared handle the MCP server delegates to; the same stack REST/WS/gRPC use.
pub struct McpServer {
    pub sessions: Arc<dyn SessionStore>,
    pub pages: Arc<PageManager>,
    pub executor: Arc<ActionExecutor>,
    /// Principal attributed to MCP-originated actions; MCP transports run
    /// behind an already-authenticated tool-call channel (stdio or a
    /// pre-authenticated HTTP bridge), so there is no per-call credential.
    pub principal: Principal,
}

fn tool_error(message: impl Into<String>) -> ErrorData {
    ErrorData::new(ErrorCode::INVALID_PARAMS, message.into(), None)
}

fn internal_error(message: impl Into<String>) -> ErrorData {
    ErrorData::new(ErrorCode::INTERNAL_ERROR, message.into(), None)
}

fn text_result(value: Value) -> CallToolResult {
    CallToolResult::success(vec![Content::text(value.to_string())])
}

fn arg<'a>(args: &'a Value, key: &str) -> Result<&'a Value, ErrorData> {
    args.get(key).ok_or_else(|| tool_error(format!("missing argument `{key}`")))
}

fn arg_str(args: &Value, key: &str) -> Result<String, ErrorData> {
    arg(args, key)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| tool_error(format!("`{key}` must be a string")))
}

impl McpServer {
    fn tools() -> Vec<Tool> {
        vec![
            Tool {
                name: Cow::Borrowed("create_session"),
                description: Some(Cow::Borrowed("Create a new browser-control session for a user")),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "user_id": {"type": "string"},
                            "username": {"type": "string"},
                            "roles": {"type": "array", "items": {"type": "string"}}
                        },
                        "required": ["user_id", "username"]
                    })
                    .as_object()
                    .cloned()
                    .unwrap(),
                ),
                annotations: None,
            },
            Tool {
                name: Cow::Borrowed("list_sessions"),
                description: Some(Cow::Borrowed("List sessions, optionally filtered by user id")),
                input_schema: Arc::new(
                    json!({"type": "object", "properties": {"user_id": {"type": "string"}}})
                        .as_object()
                        .cloned()
                        .unwrap(),
                ),
                annotations: None,
            },
            Tool {
                name: Cow::Borrowed("create_context"),
                description: Some(Cow::Borrowed("Create a browsing context within a session")),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {"session_id": {"type": "string"}},
                        "required": ["session_id"]
                    })
                    .as_object()
                    .cloned()
                    .unwrap(),
                ),
                annotations: None,
            },
            Tool {
                name: Cow::Borrowed("execute_action"),
                description: Some(Cow::Borrowed(
                    "Execute a single browser action (navigate, click, type, screenshot, ...)",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {"action": {"type": "object"}},
                        "required": ["action"]
                    })
                    .as_object()
                    .cloned()
                    .unwrap(),
                ),
                annotations: None,
            },
            Tool {
                name: Cow::Borrowed("delete_session"),
                description: Some(Cow::Borrowed("Delete a session and close its pages")),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {"session_id": {"type": "string"}},
                        "required": ["session_id"]
                    })
                    .as_object()
                    .cloned()
                    .unwrap(),
                ),
                annotations: None,
            },
        ]
    }

    fn resources() -> Vec<Resource> {
        vec![
            Resource::new(RawResource::new("api://health", "health"), None),
            Resource::new(RawResource::new("api://catalog", "catalog"), None),
        ]
    }

    async fn call_create_session(&self, args: Value) -> Result<CallToolResult, ErrorData> {
        let user_id = arg_str(&args, "user_id")?;
        let username = arg_str(&args, "username")?;
        let roles = args
            .get("roles")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let session_id = self
            .sessions
            .create(NewSession {
                user_id,
                username,
                roles,
                metadata: Value::Null,
                ttl: Duration::from_secs(3600),
            })
            .await
            .map_err(|err| internal_error(err.to_string()))?;
        Ok(text_result(json!({ "session_id": session_id.to_string() })))
    }

    async fn call_list_sessions(&self, args: Value) -> Result<CallToolResult, ErrorData> {
        let user_id = args.get("user_id").and_then(Value::as_str);
        let sessions = self
            .sessions
            .list(user_id)
            .await
            .map_err(|err| internal_error(err.to_string()))?;
        Ok(text_result(json!({ "sessions": sessions })))
    }

    async fn call_create_context(&self, args: Value) -> Result<CallToolResult, ErrorData> {
        let session_id: SessionId = arg_str(&args, "session_id")?
            .parse()
            .map_err(|_| tool_error("malformed session_id"))?;
        if !self.principal.owns_session(session_id) {
            return Err(tool_error("principal does not own this session"));
        }
        let context_id = self.pages.create_context(session_id).await;
        Ok(text_result(json!({ "context_id": context_id.to_string() })))
    }

    async fn call_execute_action(&self, args: Value) -> Result<CallToolResult, ErrorData> {
        let action_value = arg(&args, "action")?.clone();
        let action: Action = serde_json::from_value(action_value)
            .map_err(|err| tool_error(format!("malformed action: {err}")))?;
        let result = self.executor.execute(action, &self.principal).await;
        Ok(text_result(serde_json::to_value(result).unwrap_or(Value::Null)))
    }

    async fn call_delete_session(&self, args: Value) -> Result<CallToolResult, ErrorData> {
        let session_id: SessionId = arg_str(&args, "session_id")?
            .parse()
            .map_err(|_| tool_error("malformed session_id"))?;
        if !self.principal.owns_session(session_id) {
            return Err(tool_error("principal does not own this session"));
        }
        self.pages
            .close_pages_for_session(session_id)
            .await
            .map_err(|err| internal_error(err.to_string()))?;
        self.sessions.delete(session_id).await.map_err(|err| internal_error(err.to_string()))?;
        Ok(text_result(json!({ "deleted": true })))
    }

    fn read_resource(&self, uri: &str) -> Result<String, ErrorData> {
        match uri {
            "api://health" => Ok(json!({ "status": "ok" }).to_string()),
            "api://catalog" => Ok(json!({
                "tools": Self::tools().iter().map(|t| t.name.clone()).collect::<Vec<_>>(),
            })
            .to_string()),
            other => Err(tool_error(format!("unknown resource `{other}`"))),
        }
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().enable_resources().build(),
            server_info: rmcp::model::Implementation {
                name: "phoenix-bcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
            instructions: Some(
                "Tools for driving remote browser sessions: create_session, list_sessions, \
                 create_context, execute_action, delete_session. Resources: api://health, \
                 api://catalog."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult { tools: Self::tools(), next_cursor: None })
    }

    async fn call_tool(
        &self,
        request: rmcp::model::CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let args = request.arguments.map(Value::Object).unwrap_or(Value::Null);
        match request.name.as_ref() {
            "create_session" => self.call_create_session(args).await,
            "list_sessions" => self.call_list_sessions(args).await,
            "create_context" => self.call_create_context(args).await,
            "execute_action" => self.call_execute_action(args).await,
            "delete_session" => self.call_delete_session(args).await,
            other => Err(tool_error(format!("unknown tool `{other}`"))),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        Ok(ListResourcesResult { resources: Self::resources(), next_cursor: None })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        let body = self.read_resource(&request.uri)?;
        Ok(ReadResourceResult { contents: vec![ResourceContents::text(body, request.uri)] })
    }
}
