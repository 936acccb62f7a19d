use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::ax_state::AppState;
use crate::core::batch::{self, Executor};
use crate::core::builder::QueryBuilder;
use crate::core::error::{QueryError, Result};
use crate::core::expression;
use crate::core::graph::SchemaGraph;
use crate::infra::db_external::Connection;
use crate::models::context::QueryRequest;
use crate::models::predicate::Predicate;
use crate::models::query::{QueryKind, Selection};
use crate::models::schema::ColumnRef;

/// 查询错误到 HTTP 响应：调用方输入问题为 400，引擎错误为 500
pub fn query_error_response(e: QueryError) -> Response {
    let status = if e.is_input_error() {
        StatusCode::BAD_REQUEST
    } else {
        error!("引擎执行失败: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

pub fn source_not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("data source '{}' not registered", id) })),
    )
        .into_response()
}

/// 执行一次 SELECT / DISTINCT / COUNT 查询；给出 key 与 values 时分批执行
pub async fn run_query(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<QueryRequest>,
) -> impl IntoResponse {
    let Some(conn) = state.pool_manager.get(&id) else {
        return source_not_found(&id);
    };
    info!("查询请求: source={}, kind={:?}, columns={:?}", id, payload.kind, payload.columns);

    match execute_request(&conn, &payload, state.settings.chunk_limit).await {
        Ok((sql, data)) => Json(json!({
            "status": "success",
            "data": data,
            "meta": {
                "sql": sql,
                "row_count": data.len()
            }
        }))
        .into_response(),
        Err(e) => query_error_response(e),
    }
}

async fn execute_request(
    conn: &Connection,
    req: &QueryRequest,
    default_limit: usize,
) -> Result<(String, Vec<crate::models::value::Row>)> {
    let graph = &conn.graph;

    // --- 1. 解析标识符与条件 ---
    let selections = parse_selections(graph, &req.columns, req.kind)?;
    let filter = compile_filters(graph, &req.filters)?;
    let order_by = resolve_columns(graph, &req.order_by)?;

    // --- 2. 构建查询 ---
    let mut builder = QueryBuilder::new(graph);
    if let Some(center) = &req.center {
        builder = builder.with_center(center)?;
    }
    let query = match req.kind {
        QueryKind::Select => builder.build_select(&selections, filter.as_ref(), &order_by)?,
        QueryKind::Distinct => builder.build_distinct(&selections, filter.as_ref())?,
        QueryKind::Count => builder.build_count(&selections, filter.as_ref())?,
    };
    let sql = query.to_statement(conn.pool.dialect()).sql;

    // --- 3. 执行 ---
    let rows = match &req.key {
        Some(key) => {
            let key = graph.get_column(key)?;
            let values = expression::coerce_values(&key, &req.values)?;
            let limit = req.limit.unwrap_or(default_limit);
            batch::execute_value_subqueries(&conn.pool, graph, &query, &key, &values, limit).await?
        }
        None => batch::execute(&conn.pool, &query).await?,
    };
    Ok((sql, rows))
}

/// 计数查询中 "distinct table.column" 表示 COUNT(DISTINCT ...)
pub fn parse_selections(graph: &SchemaGraph, columns: &[String], kind: QueryKind) -> Result<Vec<Selection>> {
    columns
        .iter()
        .map(|raw| {
            let raw = raw.trim();
            match raw.split_once(char::is_whitespace) {
                Some((prefix, rest)) if kind == QueryKind::Count && prefix.eq_ignore_ascii_case("distinct") => {
                    Ok(graph.get_column(rest.trim())?.distinct())
                }
                _ => Ok(Selection::from(graph.get_column(raw)?)),
            }
        })
        .collect()
}

pub fn resolve_columns(graph: &SchemaGraph, names: &[String]) -> Result<Vec<ColumnRef>> {
    names.iter().map(|n| graph.get_column(n)).collect()
}

/// 多个过滤字符串按 AND 合并
pub fn compile_filters(graph: &SchemaGraph, filters: &[String]) -> Result<Option<Predicate>> {
    let predicates = filters
        .iter()
        .map(|f| expression::compile(graph, f))
        .collect::<Result<Vec<_>>>()?;
    Ok(Predicate::all(predicates))
}
