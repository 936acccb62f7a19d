use std::env;
use std::net::SocketAddr;

use anyhow::Context;

use crate::core::filter::DEFAULT_CHUNK_LIMIT;

/// 进程级配置，来自环境变量 (可由 .env 提供)
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub database_type: Option<String>,
    pub bind_addr: SocketAddr,
    pub chunk_limit: usize,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL").filter(|s| !s.trim().is_empty());
        let database_type = lookup("DATABASE_TYPE")
            .or_else(|| database_url.as_deref().and_then(infer_db_type).map(str::to_string));

        let bind_addr: SocketAddr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .context("BIND_ADDR 不是合法的 host:port")?;

        let chunk_limit: usize = match lookup("CHUNK_LIMIT") {
            Some(raw) => raw.trim().parse().context("CHUNK_LIMIT 必须是正整数")?,
            None => DEFAULT_CHUNK_LIMIT,
        };
        if chunk_limit == 0 {
            anyhow::bail!("CHUNK_LIMIT 必须是正整数");
        }

        Ok(Self {
            database_url,
            database_type,
            bind_addr,
            chunk_limit,
        })
    }
}

/// 由连接串前缀推断引擎类型
pub fn infer_db_type(url: &str) -> Option<&'static str> {
    let scheme = url.split(':').next()?.to_lowercase();
    match scheme.as_str() {
        "postgres" | "postgresql" => Some("postgres"),
        "mysql" | "mariadb" => Some("mysql"),
        "sqlite" => Some("sqlite"),
        _ => None,
    }
}
