use std::collections::HashSet;
use tracing::debug;

use crate::core::error::{QueryError, Result};
use crate::core::graph::{Relationship, SchemaGraph};
use crate::models::schema::ColumnRef;

/// 连接链中的一步：引入 table，ON 主键表.主键 = 外键表.外键
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinStep {
    pub table: String,
    pub on: Relationship,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPlan {
    pub center: String,
    /// 中心表到其余每张所需表的一条最短路径
    pub paths: Vec<Vec<String>>,
    pub joins: Vec<JoinStep>,
}

impl JoinPlan {
    pub fn single(table: &str) -> Self {
        Self {
            center: table.to_string(),
            paths: Vec::new(),
            joins: Vec::new(),
        }
    }

    /// FROM 子句依次引入的全部表
    pub fn tables(&self) -> Vec<&str> {
        std::iter::once(self.center.as_str())
            .chain(self.joins.iter().map(|j| j.table.as_str()))
            .collect()
    }
}

/// 按列首次出现的顺序去重得到所需表
pub fn get_table_list(graph: &SchemaGraph, columns: &[ColumnRef]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut tables = Vec::new();
    for column in columns {
        let table = graph.get_table(&column.table)?;
        if seen.insert(table.name().to_lowercase()) {
            tables.push(table.name().to_string());
        }
    }
    Ok(tables)
}

/// 为一组所需列计算连接计划，center 为调用方显式指定的中心表
pub fn plan(graph: &SchemaGraph, columns: &[ColumnRef], center: Option<&str>) -> Result<JoinPlan> {
    let tables = get_table_list(graph, columns)?;
    let center = match center {
        Some(name) => graph.get_table(name)?.name().to_string(),
        None => match tables.as_slice() {
            [] => return Err(QueryError::EmptySelection),
            [only] => return Ok(JoinPlan::single(only)),
            _ => choose_center(graph, &tables)?,
        },
    };

    let mut paths = Vec::new();
    for table in tables.iter().filter(|t| !t.eq_ignore_ascii_case(&center)) {
        let path = graph
            .shortest_path(&center, table)
            .ok_or_else(|| QueryError::Unreachable {
                from: center.clone(),
                to: table.clone(),
            })?;
        paths.push(path);
    }

    let joins = merge_paths(graph, &center, &paths)?;
    let plan = JoinPlan { center, paths, joins };
    debug!("连接计划: {:?}", plan.tables());
    Ok(plan)
}

/// 到其余所需表距离之和最小者为中心；并列时取最先出现的表
fn choose_center(graph: &SchemaGraph, tables: &[String]) -> Result<String> {
    let mut best: Option<(usize, &String)> = None;
    for candidate in tables {
        let dist = graph.distances(candidate);
        let total: Option<usize> = tables.iter().map(|t| dist.get(t).copied()).sum();
        if let Some(total) = total {
            if best.map_or(true, |(b, _)| total < b) {
                best = Some((total, candidate));
            }
        }
    }

    match best {
        Some((_, center)) => Ok(center.clone()),
        None => {
            let first = &tables[0];
            let dist = graph.distances(first);
            let missing = tables
                .iter()
                .find(|t| !dist.contains_key(*t))
                .unwrap_or(first);
            Err(QueryError::Unreachable {
                from: first.clone(),
                to: missing.clone(),
            })
        }
    }
}

/// 将各路径合并为一条连接链，已引入的表不会重复连接
fn merge_paths(graph: &SchemaGraph, center: &str, paths: &[Vec<String>]) -> Result<Vec<JoinStep>> {
    let mut joined: HashSet<String> = HashSet::from([center.to_lowercase()]);
    let mut joins = Vec::new();
    for path in paths {
        for pair in path.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            if !joined.insert(to.to_lowercase()) {
                continue;
            }
            let on = graph
                .relationship(from, to)
                .cloned()
                .ok_or_else(|| QueryError::Unreachable {
                    from: from.clone(),
                    to: to.clone(),
                })?;
            joins.push(JoinStep { table: to.clone(), on });
        }
    }
    Ok(joins)
}
