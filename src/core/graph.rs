use petgraph::graph::{NodeIndex, UnGraph};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

use crate::core::error::{QueryError, Result};
use crate::models::query::Selection;
use crate::models::schema::{ColumnRef, ColumnType, SchemaMetadata};

#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub primary_key: bool,
}

/// 反射得到的表，构建后不可变
#[derive(Debug, Clone, Serialize)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// 大小写不敏感的精确匹配
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    pub fn column_ref(&self, column: &Column) -> ColumnRef {
        ColumnRef {
            table: self.name.clone(),
            column: column.name.clone(),
            column_type: column.column_type,
        }
    }

    /// 整表投影
    pub fn selections(&self) -> Vec<Selection> {
        self.columns
            .iter()
            .map(|c| Selection::from(self.column_ref(c)))
            .collect()
    }
}

/// 外键边：无论路径从哪一侧走过来，ON 条件始终是 主键表.主键 = 外键表.外键
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub fk_table: String,
    pub fk_column: String,
    pub pk_table: String,
    pub pk_column: String,
}

/// 表为节点、外键为边的无向图；每个连接构建一次，之后只读
#[derive(Debug)]
pub struct SchemaGraph {
    graph: UnGraph<Table, Relationship>,
    index: HashMap<String, NodeIndex>,
}

impl SchemaGraph {
    /// 由反射元数据构建；外键指向不存在的表或列时直接失败
    pub fn build(metadata: SchemaMetadata) -> Result<Self> {
        let mut graph = UnGraph::new_undirected();
        let mut index = HashMap::new();

        for meta in metadata.tables {
            let key = meta.name.to_lowercase();
            if index.contains_key(&key) {
                warn!("重复的表名被忽略: {}", meta.name);
                continue;
            }
            let columns = meta
                .columns
                .into_iter()
                .map(|c| Column {
                    column_type: ColumnType::from_sql_type(&c.sql_type),
                    name: c.name,
                    primary_key: c.primary_key,
                })
                .collect();
            let node = graph.add_node(Table {
                name: meta.name,
                columns,
            });
            index.insert(key, node);
        }

        for fk in &metadata.foreign_keys {
            let dangling = |reference: String| QueryError::DanglingForeignKey {
                table: fk.table.clone(),
                column: fk.column.clone(),
                reference,
            };

            let fk_node = *index
                .get(&fk.table.to_lowercase())
                .ok_or_else(|| dangling(fk.table.clone()))?;
            let pk_node = *index
                .get(&fk.referenced_table.to_lowercase())
                .ok_or_else(|| dangling(fk.referenced_table.clone()))?;

            let fk_column = graph[fk_node]
                .column(&fk.column)
                .ok_or_else(|| dangling(format!("{}.{}", fk.table, fk.column)))?
                .name
                .clone();

            let pk_table = &graph[pk_node];
            let pk_column = match &fk.referenced_column {
                Some(col) => pk_table.column(col).map(|c| c.name.clone()),
                None => match pk_table.primary_key().as_slice() {
                    [only] => Some(only.name.clone()),
                    _ => None,
                },
            }
            .ok_or_else(|| {
                dangling(format!(
                    "{}.{}",
                    fk.referenced_table,
                    fk.referenced_column.as_deref().unwrap_or("<primary key>")
                ))
            })?;

            let rel = Relationship {
                fk_table: graph[fk_node].name.clone(),
                fk_column,
                pk_table: pk_table.name.clone(),
                pk_column,
            };
            debug!(
                "外键边: {}.{} -> {}.{}",
                rel.fk_table, rel.fk_column, rel.pk_table, rel.pk_column
            );
            graph.add_edge(fk_node, pk_node, rel);
        }

        info!(
            "Schema 图构建完成: {} 张表, {} 条外键边",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(Self { graph, index })
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.graph.node_weights()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.graph.edge_weights()
    }

    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.node(name)
            .map(|n| &self.graph[n])
            .ok_or_else(|| QueryError::UnknownTable(name.to_string()))
    }

    /// 解析 "table.column"，表与列均大小写不敏感，不做部分匹配
    pub fn get_column(&self, qualified: &str) -> Result<ColumnRef> {
        let (table_name, column_name) = match qualified.trim().split_once('.') {
            Some((t, c)) if !c.contains('.') => (t, c),
            _ => return Err(QueryError::UnknownColumn(qualified.to_string())),
        };
        let table = self.get_table(table_name)?;
        table
            .column(column_name)
            .map(|c| table.column_ref(c))
            .ok_or_else(|| QueryError::UnknownColumn(qualified.to_string()))
    }

    pub fn relationship(&self, a: &str, b: &str) -> Option<&Relationship> {
        let edge = self.graph.find_edge(self.node(a)?, self.node(b)?)?;
        self.graph.edge_weight(edge)
    }

    /// 从 start 出发的 BFS 距离（边数）
    pub fn distances(&self, start: &str) -> HashMap<String, usize> {
        let Some(start) = self.node(start) else {
            return HashMap::new();
        };
        let (dist, _) = self.bfs(start);
        dist.into_iter()
            .map(|(n, d)| (self.graph[n].name.clone(), d))
            .collect()
    }

    /// BFS 最短路径（含首尾表名），不可达时返回 None
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let start = self.node(from)?;
        let goal = self.node(to)?;
        let (_, parent) = self.bfs(start);
        if start != goal && !parent.contains_key(&goal) {
            return None;
        }

        let mut path = vec![goal];
        let mut cur = goal;
        while cur != start {
            cur = parent[&cur];
            path.push(cur);
        }
        path.reverse();
        Some(path.into_iter().map(|n| self.graph[n].name.clone()).collect())
    }

    pub(crate) fn node(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(&name.to_lowercase()).copied()
    }

    // 邻居按节点序号（即反射顺序）访问，保证同长路径的选择是确定的
    fn bfs(&self, start: NodeIndex) -> (HashMap<NodeIndex, usize>, HashMap<NodeIndex, NodeIndex>) {
        let mut dist = HashMap::from([(start, 0usize)]);
        let mut parent = HashMap::new();
        let mut queue = VecDeque::from([start]);

        while let Some(cur) = queue.pop_front() {
            let mut neighbors: Vec<NodeIndex> = self.graph.neighbors(cur).collect();
            neighbors.sort();
            neighbors.dedup();
            for next in neighbors {
                if dist.contains_key(&next) {
                    continue;
                }
                dist.insert(next, dist[&cur] + 1);
                parent.insert(next, cur);
                queue.push_back(next);
            }
        }
        (dist, parent)
    }
}
