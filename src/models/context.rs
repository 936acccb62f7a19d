use serde::Deserialize;

use crate::models::query::QueryKind;
use crate::models::value::Value;

/// 单次查询请求；列与条件均使用 table.column 写法
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default = "default_kind")]
    pub kind: QueryKind,
    pub columns: Vec<String>,
    #[serde(default)]
    pub filters: Vec<String>, // 多个条件之间按 AND 合并
    #[serde(default)]
    pub order_by: Vec<String>,
    pub center: Option<String>,
    /// 分批限制所用的键列，与 values 一起出现
    pub key: Option<String>,
    #[serde(default)]
    pub values: Vec<Value>,
    pub limit: Option<usize>,
}

fn default_kind() -> QueryKind {
    QueryKind::Select
}

/// 分组导出请求
#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub table: String, // 键表，或 table.column
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub sort: Vec<String>,
}
