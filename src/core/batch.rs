use std::future::Future;
use tracing::{debug, info, instrument};

use crate::core::builder::{Dialect, QuerySpec, Statement};
use crate::core::error::{QueryError, Result};
use crate::core::graph::SchemaGraph;
use crate::models::predicate::Predicate;
use crate::models::schema::ColumnRef;
use crate::models::value::{Row, Value};

/// 到关系引擎的一次往返；会话/连接由外部连接层提供
pub trait Executor: Sync {
    fn dialect(&self) -> Dialect;

    fn fetch_all(&self, statement: &Statement) -> impl Future<Output = Result<Vec<Row>>> + Send;
}

pub async fn execute<E: Executor>(exec: &E, query: &QuerySpec) -> Result<Vec<Row>> {
    let statement = query.to_statement(exec.dialect());
    exec.fetch_all(&statement).await
}

/// 只取每行第一列
pub async fn first_column<E: Executor>(exec: &E, query: &QuerySpec) -> Result<Vec<Value>> {
    let rows = execute(exec, query).await?;
    Ok(first_values(rows))
}

/// 按 limit 切分 values，每块追加 key IN (...) 后执行并按块顺序拼接结果。
/// values 为空时不追加任何限制，原样执行一次；任一块失败则整体失败
#[instrument(skip(exec, graph, query, values), fields(key = %key_column, values = values.len()))]
pub async fn execute_value_subqueries<E: Executor>(
    exec: &E,
    graph: &SchemaGraph,
    query: &QuerySpec,
    key_column: &ColumnRef,
    values: &[Value],
    limit: usize,
) -> Result<Vec<Row>> {
    if limit == 0 {
        return Err(QueryError::InvalidChunkLimit);
    }
    if values.is_empty() {
        return execute(exec, query).await;
    }

    let chunks = values.len().div_ceil(limit);
    let mut results = Vec::new();
    for (i, chunk) in values.chunks(limit).enumerate() {
        let restricted = query.restrict(
            graph,
            Predicate::In {
                column: key_column.clone(),
                values: chunk.to_vec(),
            },
        )?;
        let rows = execute(exec, &restricted).await?;
        debug!("分块 {}/{}: {} 个值, 返回 {} 行", i + 1, chunks, chunk.len(), rows.len());
        results.extend(rows);
    }
    info!("分批查询完成: {} 块, 共 {} 行", chunks, results.len());
    Ok(results)
}

pub async fn first_column_value_subqueries<E: Executor>(
    exec: &E,
    graph: &SchemaGraph,
    query: &QuerySpec,
    key_column: &ColumnRef,
    values: &[Value],
    limit: usize,
) -> Result<Vec<Value>> {
    let rows = execute_value_subqueries(exec, graph, query, key_column, values, limit).await?;
    Ok(first_values(rows))
}

fn first_values(rows: Vec<Row>) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|r| r.into_values().into_iter().next())
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::builder::QueryBuilder;
    use crate::core::fixtures::phamerator_graph;
    use std::sync::Mutex;

    /// 记录每条语句；每个绑定参数回显为一行
    #[derive(Default)]
    pub(crate) struct RecordingExecutor {
        pub statements: Mutex<Vec<Statement>>,
        pub fail_on: Option<usize>,
    }

    impl Executor for RecordingExecutor {
        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>> {
            let call = {
                let mut log = self.statements.lock().unwrap();
                log.push(statement.clone());
                log.len()
            };
            if self.fail_on == Some(call) {
                return Err(QueryError::Engine(sqlx::Error::RowNotFound));
            }
            Ok(statement
                .params
                .iter()
                .map(|v| {
                    let mut row = Row::new();
                    row.push("PhageID", v.clone());
                    row
                })
                .collect())
        }
    }

    fn phage_ids(n: usize) -> Vec<Value> {
        (0..n).map(|i| Value::Text(format!("phage_{:03}", i))).collect()
    }

    #[tokio::test]
    async fn splits_values_into_bounded_chunks() {
        let graph = phamerator_graph();
        let key = graph.get_column("phage.PhageID").unwrap();
        let query = QueryBuilder::new(&graph).build_select(&[key.clone().into()], None, &[]).unwrap();
        let exec = RecordingExecutor::default();
        let values = phage_ids(250);

        let rows = execute_value_subqueries(&exec, &graph, &query, &key, &values, 100).await.unwrap();

        let sizes: Vec<usize> = exec.statements.lock().unwrap().iter().map(|s| s.params.len()).collect();
        assert_eq!(sizes, vec![100, 100, 50]);

        let unchunked = RecordingExecutor::default();
        let single = execute_value_subqueries(&unchunked, &graph, &query, &key, &values, 1000).await.unwrap();
        assert_eq!(unchunked.statements.lock().unwrap().len(), 1);
        assert_eq!(rows, single);
    }

    #[tokio::test]
    async fn chunk_restriction_is_anded_onto_existing_filter() {
        let graph = phamerator_graph();
        let key = graph.get_column("phage.PhageID").unwrap();
        let filter = crate::core::expression::compile(&graph, "phage.Cluster=A").unwrap();
        let query = QueryBuilder::new(&graph).build_select(&[key.clone().into()], Some(&filter), &[]).unwrap();
        let exec = RecordingExecutor::default();

        execute_value_subqueries(&exec, &graph, &query, &key, &phage_ids(3), 2).await.unwrap();

        let log = exec.statements.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert!(log[0].sql.ends_with(r#"WHERE "phage"."Cluster" = ? AND "phage"."PhageID" IN (?, ?)"#));
        assert!(log[1].sql.ends_with(r#"WHERE "phage"."Cluster" = ? AND "phage"."PhageID" IN (?)"#));
        assert_eq!(log[1].params, vec![Value::from("A"), Value::from("phage_002")]);
    }

    #[tokio::test]
    async fn empty_values_mean_no_restriction() {
        let graph = phamerator_graph();
        let key = graph.get_column("phage.PhageID").unwrap();
        let query = QueryBuilder::new(&graph).build_select(&[key.clone().into()], None, &[]).unwrap();
        let exec = RecordingExecutor::default();

        execute_value_subqueries(&exec, &graph, &query, &key, &[], 10).await.unwrap();

        let log = exec.statements.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(!log[0].sql.contains("WHERE"));
    }

    #[tokio::test]
    async fn failing_chunk_aborts_without_partial_result() {
        let graph = phamerator_graph();
        let key = graph.get_column("phage.PhageID").unwrap();
        let query = QueryBuilder::new(&graph).build_select(&[key.clone().into()], None, &[]).unwrap();
        let exec = RecordingExecutor {
            fail_on: Some(2),
            ..Default::default()
        };

        let result = execute_value_subqueries(&exec, &graph, &query, &key, &phage_ids(5), 2).await;
        assert!(matches!(result, Err(QueryError::Engine(_))));
        assert_eq!(exec.statements.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn zero_limit_is_rejected() {
        let graph = phamerator_graph();
        let key = graph.get_column("phage.PhageID").unwrap();
        let query = QueryBuilder::new(&graph).build_select(&[key.clone().into()], None, &[]).unwrap();
        let exec = RecordingExecutor::default();
        let result = first_column_value_subqueries(&exec, &graph, &query, &key, &phage_ids(1), 0).await;
        assert!(matches!(result, Err(QueryError::InvalidChunkLimit)));
    }
}
