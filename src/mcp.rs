// src/mcp.rs
// RPC/tool transport surface (spec.md §6.2). The transport itself is out of
// scope; only the JSON request/response shape is specified. Implemented as
// an rmcp tool server exposing `memory_record`, `memory_search`,
// `memory_feedback`, and `memory_consolidate`.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::tool::{Parameters, ToolCallContext};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ListToolsResult, PaginatedRequestParam, ServerCapabilities,
    ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{tool, tool_router, ErrorData, ServerHandler};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::distiller::{ConsolidationOptions, Distiller, SessionOutcome, SessionSummary};
use crate::memory::{Memory, Outcome};
use crate::service::Service;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MemoryRecordRequest {
    pub project_id: String,
    pub title: String,
    pub content: String,
    #[schemars(description = "\"success\" or \"failure\"")]
    pub outcome: String,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MemorySearchRequest {
    pub project_id: String,
    pub query: String,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MemoryFeedbackRequest {
    pub memory_id: String,
    pub helpful: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MemoryDistillSessionRequest {
    pub session_id: String,
    pub project_id: String,
    #[schemars(description = "\"success\", \"failure\", or \"partial\"")]
    pub outcome: String,
    pub task: String,
    pub approach: String,
    pub result: String,
    pub tags: Option<Vec<String>>,
    pub duration_secs: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MemoryConsolidateRequest {
    pub project_id: String,
    pub similarity_threshold: Option<f32>,
    pub dry_run: Option<bool>,
    pub max_clusters: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct MemorySearchResponse {
    pub memories: Vec<Memory>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ConsolidationResultJson {
    pub created_memory_ids: Vec<Uuid>,
    pub archived_memory_ids: Vec<Uuid>,
    pub skipped_count: usize,
    pub total_processed: usize,
    pub duration_ms: u64,
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, ErrorData> {
    let text = serde_json::to_string(value)
        .map_err(|e| ErrorData::internal_error(format!("failed to serialize tool response: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn error_result(message: impl Into<String>) -> Result<CallToolResult, ErrorData> {
    Ok(CallToolResult::error(vec![Content::text(message.into())]))
}

#[derive(Clone)]
pub struct ReasoningBankServer {
    service: Arc<Service>,
    distiller: Arc<Distiller>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ReasoningBankServer {
    pub fn new(service: Arc<Service>, distiller: Arc<Distiller>) -> Self {
        Self { service, distiller, tool_router: Self::tool_router() }
    }

    #[tool(description = "Record a new memory (a distilled agent strategy or anti-pattern) for a project.")]
    async fn memory_record(&self, Parameters(req): Parameters<MemoryRecordRequest>) -> Result<CallToolResult, ErrorData> {
        let outcome = match req.outcome.as_str() {
            "success" => Outcome::Success,
            "failure" => Outcome::Failure,
            other => return error_result(format!("invalid outcome: {other}")),
        };
        let mut memory = Memory::new(req.project_id, req.title, req.content, outcome);
        memory.description = req.description.unwrap_or_default();
        memory.tags = req.tags.unwrap_or_default();

        match self.service.record(memory).await {
            Ok(saved) => json_result(&saved),
            Err(e) => error_result(e.to_string()),
        }
    }

    #[tool(description = "Distill a finished agent session into success/anti-pattern memories and record them.")]
    async fn memory_distill_session(
        &self,
        Parameters(req): Parameters<MemoryDistillSessionRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let outcome = match req.outcome.as_str() {
            "success" => SessionOutcome::Success,
            "failure" => SessionOutcome::Failure,
            "partial" => SessionOutcome::Partial,
            other => return error_result(format!("invalid outcome: {other}")),
        };
        let summary = SessionSummary {
            session_id: req.session_id,
            project_id: req.project_id,
            outcome,
            task: req.task,
            approach: req.approach,
            result: req.result,
            tags: req.tags.unwrap_or_default(),
            duration_secs: req.duration_secs,
            completed_at: chrono::Utc::now(),
        };

        match self.distiller.distill(&summary).await {
            Ok(memories) => {
                let count = memories.len();
                json_result(&MemorySearchResponse { memories, count })
            }
            Err(e) => error_result(e.to_string()),
        }
    }

    #[tool(description = "Search a project's memories by semantic similarity.")]
    async fn memory_search(&self, Parameters(req): Parameters<MemorySearchRequest>) -> Result<CallToolResult, ErrorData> {
        let limit = req.limit.unwrap_or(10).max(0) as usize;
        match self.service.search(&req.project_id, &req.query, limit).await {
            Ok(memories) => {
                let count = memories.len();
                json_result(&MemorySearchResponse { memories, count })
            }
            Err(e) => error_result(e.to_string()),
        }
    }

    #[tool(description = "Record explicit helpful/unhelpful feedback on a memory, recomputing its confidence.")]
    async fn memory_feedback(&self, Parameters(req): Parameters<MemoryFeedbackRequest>) -> Result<CallToolResult, ErrorData> {
        let Ok(memory_id) = Uuid::parse_str(&req.memory_id) else {
            return error_result(format!("invalid memory_id: {}", req.memory_id));
        };
        match self.service.feedback(memory_id, req.helpful).await {
            Ok(confidence) => json_result(&serde_json::json!({ "confidence": confidence })),
            Err(e) => error_result(e.to_string()),
        }
    }

    #[tool(description = "Consolidate a project's near-duplicate memories into LLM-synthesized super-memories.")]
    async fn memory_consolidate(&self, Parameters(req): Parameters<MemoryConsolidateRequest>) -> Result<CallToolResult, ErrorData> {
        let defaults = ConsolidationOptions::defaults(self.service.config());
        let opts = ConsolidationOptions {
            similarity_threshold: req.similarity_threshold.unwrap_or(defaults.similarity_threshold),
            max_clusters_per_run: req.max_clusters.unwrap_or(defaults.max_clusters_per_run),
            dry_run: req.dry_run.unwrap_or(false),
            force_all: false,
        };

        match self.distiller.consolidate(&req.project_id, opts).await {
            Ok(result) => json_result(&ConsolidationResultJson {
                created_memory_ids: result.created_memory_ids,
                archived_memory_ids: result.archived_memory_ids,
                skipped_count: result.skipped_count,
                total_processed: result.total_processed,
                duration_ms: duration_ms(result.duration),
            }),
            Err(e) => error_result(e.to_string()),
        }
    }
}

fn duration_ms(d: StdDuration) -> u64 {
    d.as_millis() as u64
}

impl ServerHandler for ReasoningBankServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: "reasoningbank".into(),
                title: Some("ReasoningBank — cross-session agent memory".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Record, search, and consolidate distilled agent strategies scored by a Bayesian confidence model.".into(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult { tools: self.tool_router.list_all(), next_cursor: None, meta: None }))
    }

    #[allow(clippy::manual_async_fn)]
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move {
            let ctx = ToolCallContext::new(self, request, context);
            self.tool_router.call(ctx).await
        }
    }
}
