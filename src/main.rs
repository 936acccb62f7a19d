use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use genome_query::api::mapping::{export_groups, list_data_sources, list_tables, register_data_source};
use genome_query::api::query::run_query;
use genome_query::ax_state::AppState;
use genome_query::infra::config::Settings;
use genome_query::infra::db_external::PoolManager;
use genome_query::models::schema::DataSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;
    let pool_manager = PoolManager::new();

    // 配置了 DATABASE_URL 时预先注册为 "default" 数据源
    if let Some(url) = &settings.database_url {
        match &settings.database_type {
            Some(db_type) => {
                let source = DataSource {
                    id: "default".to_string(),
                    db_type: db_type.clone(),
                    connection_url: url.clone(),
                    display_name: "default".to_string(),
                };
                pool_manager.register(source).await?;
            }
            None => warn!("无法从 DATABASE_URL 推断数据库类型, 请设置 DATABASE_TYPE"),
        }
    }

    let addr = settings.bind_addr;
    let state = Arc::new(AppState { pool_manager, settings });

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/api/datasource", post(register_data_source))
        .route("/api/datasources", get(list_data_sources))
        .route("/api/datasources/{id}/tables", get(list_tables))
        .route("/api/datasources/{id}/query", post(run_query))
        .route("/api/datasources/{id}/export", post(export_groups))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    info!("🚀 genome-query 运行在 http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
