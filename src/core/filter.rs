use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::batch::{self, Executor};
use crate::core::builder::QueryBuilder;
use crate::core::error::{QueryError, Result};
use crate::core::expression;
use crate::core::graph::SchemaGraph;
use crate::models::predicate::Predicate;
use crate::models::query::Selection;
use crate::models::schema::ColumnRef;
use crate::models::value::{Row, Value};

/// 单条 SQL 中 IN 列表的默认上限
pub const DEFAULT_CHUNK_LIMIT: usize = 8000;

/// 一个查询会话的过滤状态：键表、候选键值与累积的条件。
/// 只由持有者修改；并行探索时每个分支通过 copy() 持有独立副本
#[derive(Debug, Clone)]
pub struct FilterState {
    graph: Arc<SchemaGraph>,
    key: ColumnRef,
    values: Vec<Value>,
    predicates: Vec<Predicate>,
    chunk_limit: usize,
}

impl FilterState {
    /// key 为表名（取其主键）或 "table.column"
    pub fn new(graph: Arc<SchemaGraph>, key: &str) -> Result<Self> {
        let key = if key.contains('.') {
            graph.get_column(key)?
        } else {
            let table = graph.get_table(key)?;
            let pk = table.primary_key();
            let column = pk
                .first()
                .ok_or_else(|| QueryError::UnknownColumn(format!("{}.<primary key>", table.name())))?;
            table.column_ref(column)
        };
        Ok(Self {
            graph,
            key,
            values: Vec::new(),
            predicates: Vec::new(),
            chunk_limit: DEFAULT_CHUNK_LIMIT,
        })
    }

    pub fn with_chunk_limit(mut self, limit: usize) -> Self {
        self.chunk_limit = limit;
        self
    }

    pub fn graph(&self) -> &SchemaGraph {
        &self.graph
    }

    pub fn key(&self) -> &ColumnRef {
        &self.key
    }

    pub fn get_column(&self, name: &str) -> Result<ColumnRef> {
        self.graph.get_column(name)
    }

    /// 编译并追加一个过滤表达式
    pub fn add(&mut self, expr: &str) -> Result<()> {
        let predicate = expression::compile(&self.graph, expr)?;
        self.predicates.push(predicate);
        Ok(())
    }

    pub fn add_predicate(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// 所有累积条件的 AND；无条件时为 None
    pub fn where_clause(&self) -> Option<Predicate> {
        Predicate::all(self.predicates.clone())
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn set_values(&mut self, values: Vec<Value>) {
        self.values = values;
    }

    pub fn hits(&self) -> usize {
        self.values.len()
    }

    /// 独立副本：之后对副本的 add 不影响原状态
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// 清空累积条件，候选键值保留
    pub fn reset(&mut self) {
        self.predicates.clear();
    }

    /// column（默认键列）在 where（默认累积条件）与候选键值限制下的去重值
    pub async fn build_values<E: Executor>(
        &self,
        exec: &E,
        column: Option<&ColumnRef>,
        filter: Option<&Predicate>,
    ) -> Result<Vec<Value>> {
        let column = column.unwrap_or(&self.key);
        let filter = match filter {
            Some(p) => Some(p.clone()),
            None => self.where_clause(),
        };
        let query = QueryBuilder::new(&self.graph).build_distinct(&[column.into()], filter.as_ref())?;
        let mut values = batch::first_column_value_subqueries(
            exec,
            &self.graph,
            &query,
            &self.key,
            &self.values,
            self.chunk_limit,
        )
        .await?;

        // 分块之间可能出现重复值
        let mut seen = HashSet::with_capacity(values.len());
        values.retain(|v| seen.insert(v.key()));
        Ok(values)
    }

    /// 以当前条件重新计算候选键值
    pub async fn update<E: Executor>(&mut self, exec: &E) -> Result<()> {
        self.values = self.build_values(exec, None, None).await?;
        info!("过滤结果更新: {} -> {} 个键值", self.key, self.values.len());
        Ok(())
    }

    /// 候选键值对应的行，键列总在首位；行按候选键值的顺序排列
    pub async fn select<E: Executor>(&self, exec: &E, columns: &[ColumnRef]) -> Result<Vec<Row>> {
        let mut selections: Vec<Selection> = vec![(&self.key).into()];
        for column in columns {
            if !selections.iter().any(|s| s.column == *column) {
                selections.push(column.into());
            }
        }

        let query = QueryBuilder::new(&self.graph).build_select(&selections, self.where_clause().as_ref(), &[])?;
        let mut rows =
            batch::execute_value_subqueries(exec, &self.graph, &query, &self.key, &self.values, self.chunk_limit).await?;
        if !self.values.is_empty() {
            // 重复键值以首次出现的位置为准
            let position: HashMap<_, usize> =
                self.values.iter().enumerate().rev().map(|(i, v)| (v.key(), i)).collect();
            // 稳定排序，同一键的多行保持引擎顺序
            rows.sort_by_cached_key(|row| {
                row.first()
                    .and_then(|k| position.get(&k.key()).copied())
                    .unwrap_or(usize::MAX)
            });
        }
        Ok(rows)
    }

    /// 按给定列重新排列候选键值；在内存中全局排序，避免分块破坏顺序
    pub async fn sort<E: Executor>(&mut self, exec: &E, columns: &[ColumnRef]) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }
        // 排序列在投影中的位置；键列本身也可作为排序列
        let mut selections: Vec<Selection> = vec![(&self.key).into()];
        let mut order = Vec::with_capacity(columns.len());
        for column in columns {
            let index = match selections.iter().position(|s| s.column == *column) {
                Some(index) => index,
                None => {
                    selections.push(column.into());
                    selections.len() - 1
                }
            };
            order.push(index);
        }
        let query = QueryBuilder::new(&self.graph).build_select(&selections, self.where_clause().as_ref(), &[])?;
        let mut rows =
            batch::execute_value_subqueries(exec, &self.graph, &query, &self.key, &self.values, self.chunk_limit).await?;

        rows.sort_by(|a, b| {
            order
                .iter()
                .map(|&i| a.values()[i].sort_cmp(&b.values()[i]))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut seen = HashSet::with_capacity(rows.len());
        let mut sorted: Vec<Value> = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(key) = row.into_values().into_iter().next() {
                if seen.insert(key.key()) {
                    sorted.push(key);
                }
            }
        }
        debug!("按 {} 列排序候选键值: {} 个", columns.len(), sorted.len());
        self.values = sorted;
        Ok(())
    }
}
