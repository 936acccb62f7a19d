use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::query::{query_error_response, resolve_columns, source_not_found};
use crate::ax_state::AppState;
use crate::core::error::Result;
use crate::core::expression;
use crate::core::filter::FilterState;
use crate::core::grouping;
use crate::infra::db_external::Connection;
use crate::models::context::ExportRequest;
use crate::models::schema::{CreateDataSourceRequest, DataSource};
use crate::models::value::{Row, Value};

// --- 1. 数据源管理 ---

/// 注册数据源：建立连接池并反射 schema 图
pub async fn register_data_source(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDataSourceRequest>,
) -> impl IntoResponse {
    let source = DataSource {
        display_name: payload.display_name.unwrap_or_else(|| payload.id.clone()),
        id: payload.id,
        db_type: payload.db_type,
        connection_url: payload.connection_url,
    };
    match state.pool_manager.register(source).await {
        Ok(conn) => {
            let tables = conn.graph.tables().count();
            (
                StatusCode::CREATED,
                Json(json!({ "id": conn.source.id, "tables": tables })),
            )
                .into_response()
        }
        Err(e) => {
            warn!("数据源注册失败: {:#}", e);
            (StatusCode::BAD_REQUEST, Json(json!({ "error": format!("{:#}", e) }))).into_response()
        }
    }
}

pub async fn list_data_sources(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.pool_manager.list())
}

/// 数据源的表、列与外键关系
pub async fn list_tables(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    let Some(conn) = state.pool_manager.get(&id) else {
        return source_not_found(&id);
    };
    let tables: Vec<_> = conn.graph.tables().collect();
    let relationships: Vec<_> = conn.graph.relationships().collect();
    Json(json!({ "tables": tables, "relationships": relationships })).into_response()
}

// --- 2. 分组导出 ---

/// 过滤、排序后按 groups 逐层细分，每个分支返回所需列的行
pub async fn export_groups(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<ExportRequest>,
) -> impl IntoResponse {
    let Some(conn) = state.pool_manager.get(&id) else {
        return source_not_found(&id);
    };
    info!("导出请求: source={}, table={}, groups={:?}", id, payload.table, payload.groups);

    match export(&conn, &payload, state.settings.chunk_limit).await {
        Ok(groups) => {
            let total: usize = groups.iter().map(|(_, rows)| rows.len()).sum();
            let data: Vec<_> = groups
                .into_iter()
                .map(|(key, rows)| json!({ "group": key, "rows": rows }))
                .collect();
            Json(json!({
                "status": "success",
                "groups": data,
                "meta": { "row_count": total }
            }))
            .into_response()
        }
        Err(e) => query_error_response(e),
    }
}

async fn export(conn: &Connection, req: &ExportRequest, chunk_limit: usize) -> Result<Vec<(Vec<Value>, Vec<Row>)>> {
    let mut filter = FilterState::new(conn.graph.clone(), &req.table)?.with_chunk_limit(chunk_limit);
    for expr in &req.filters {
        filter.add(expr)?;
    }
    let values = expression::coerce_values(filter.key(), &req.values)?;
    filter.set_values(values);
    let sort = resolve_columns(&conn.graph, &req.sort)?;
    let columns = resolve_columns(&conn.graph, &req.columns)?;

    filter.update(&conn.pool).await?;
    // 空键值集合表示不限制，这里必须提前返回
    if filter.hits() == 0 {
        warn!("过滤条件没有命中任何 {}", filter.key());
        return Ok(Vec::new());
    }

    let groups: Vec<&str> = req.groups.iter().map(String::as_str).collect();
    grouping::export_groups(&conn.pool, &filter, &groups, &columns, &sort).await
}
