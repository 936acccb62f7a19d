use dashmap::DashMap;
use sqlx::mysql::{MySqlArguments, MySqlPoolOptions};
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions};
use sqlx::{MySql, Pool, Postgres, Row as _, Sqlite};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::core::batch::Executor;
use crate::core::builder::{Dialect, Statement};
use crate::core::error::Result;
use crate::core::graph::SchemaGraph;
use crate::infra::utils::{mysql_row_to_record, pg_row_to_record, sqlite_row_to_record};
use crate::models::schema::{ColumnMeta, DataSource, ForeignKeyMeta, SchemaMetadata};
use crate::models::value::{Row, Value};

pub enum DynamicPool {
    Postgres(Pool<Postgres>),
    MySql(Pool<MySql>),
    Sqlite(Pool<Sqlite>),
}

/// 一个已注册的数据源：连接池与反射得到的 schema 图
pub struct Connection {
    pub source: DataSource,
    pub pool: DynamicPool,
    pub graph: Arc<SchemaGraph>,
}

pub struct PoolManager {
    connections: DashMap<String, Arc<Connection>>,
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// 连接、反射并构建 schema 图；同 id 的旧连接被替换
    pub async fn register(&self, source: DataSource) -> anyhow::Result<Arc<Connection>> {
        let pool = DynamicPool::connect(&source).await?;
        let metadata = pool.reflect_schema().await?;
        let graph = Arc::new(SchemaGraph::build(metadata)?);
        info!("数据源已注册: id={}, type={}", source.id, source.db_type);

        let connection = Arc::new(Connection { source, pool, graph });
        self.connections
            .insert(connection.source.id.clone(), connection.clone());
        Ok(connection)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|c| c.clone())
    }

    pub fn list(&self) -> Vec<DataSource> {
        let mut sources: Vec<DataSource> = self
            .connections
            .iter()
            .map(|c| c.value().source.clone())
            .collect();
        sources.sort_by(|a, b| a.id.cmp(&b.id));
        sources
    }
}

// 约束名只在表内唯一，按 conrelid 定位；复合外键按 conkey/confkey 的位置成对展开
const PG_FOREIGN_KEYS: &str = "SELECT cl.relname::text, a.attname::text, rcl.relname::text, ra.attname::text
     FROM pg_constraint con
     JOIN pg_class cl ON cl.oid = con.conrelid
     JOIN pg_namespace n ON n.oid = cl.relnamespace
     JOIN pg_class rcl ON rcl.oid = con.confrelid
     CROSS JOIN LATERAL unnest(con.conkey, con.confkey) AS cols(attnum, ref_attnum)
     JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = cols.attnum
     JOIN pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = cols.ref_attnum
     WHERE con.contype = 'f' AND n.nspname = current_schema()
     ORDER BY cl.relname, con.conname, cols.attnum";

impl DynamicPool {
    pub async fn connect(source: &DataSource) -> anyhow::Result<Self> {
        let pool = match source.db_type.to_lowercase().as_str() {
            "postgres" | "postgresql" => {
                let pool = PgPoolOptions::new().max_connections(5).connect(&source.connection_url).await?;
                DynamicPool::Postgres(pool)
            }
            "mysql" => {
                let pool = MySqlPoolOptions::new().max_connections(5).connect(&source.connection_url).await?;
                DynamicPool::MySql(pool)
            }
            "sqlite" => {
                // 内存库随最后一个连接关闭而消失，只保留一个长期连接
                let options = if source.connection_url.contains(":memory:") {
                    SqlitePoolOptions::new()
                        .max_connections(1)
                        .idle_timeout(None)
                        .max_lifetime(None)
                } else {
                    SqlitePoolOptions::new().max_connections(5)
                };
                DynamicPool::Sqlite(options.connect(&source.connection_url).await?)
            }
            other => return Err(anyhow::anyhow!("Unsupported DB type: {}", other)),
        };
        Ok(pool)
    }

    // --- 1. Schema 反射 ---

    /// 读取全部表、列 (含主键标记) 与单列外键
    #[instrument(skip(self), fields(dialect = ?self.dialect()))]
    pub async fn reflect_schema(&self) -> Result<SchemaMetadata> {
        let mut metadata = SchemaMetadata::default();
        match self {
            DynamicPool::Postgres(p) => {
                let columns = sqlx::query(
                    "SELECT c.table_name::text, c.column_name::text, c.data_type::text,
                            EXISTS (
                                SELECT 1 FROM information_schema.table_constraints tc
                                JOIN information_schema.key_column_usage k
                                  ON tc.constraint_name = k.constraint_name AND tc.table_schema = k.table_schema
                                 AND tc.table_name = k.table_name
                                WHERE tc.constraint_type = 'PRIMARY KEY' AND k.table_schema = c.table_schema
                                  AND k.table_name = c.table_name AND k.column_name = c.column_name
                            ) AS is_pk
                     FROM information_schema.columns c
                     JOIN information_schema.tables t
                       ON t.table_schema = c.table_schema AND t.table_name = c.table_name
                     WHERE c.table_schema = current_schema() AND t.table_type = 'BASE TABLE'
                     ORDER BY c.table_name, c.ordinal_position",
                )
                .fetch_all(p)
                .await?;
                for r in columns {
                    let table: String = r.try_get(0)?;
                    metadata.push_column(
                        &table,
                        ColumnMeta {
                            name: r.try_get(1)?,
                            sql_type: r.try_get(2)?,
                            primary_key: r.try_get(3)?,
                        },
                    );
                }

                let fks = sqlx::query(PG_FOREIGN_KEYS).fetch_all(p).await?;
                for r in fks {
                    metadata.foreign_keys.push(ForeignKeyMeta {
                        table: r.try_get(0)?,
                        column: r.try_get(1)?,
                        referenced_table: r.try_get(2)?,
                        referenced_column: r.try_get(3)?,
                    });
                }
            }
            DynamicPool::MySql(p) => {
                // information_schema 在部分版本中返回二进制串，统一转为 CHAR
                let columns = sqlx::query(
                    "SELECT CAST(TABLE_NAME AS CHAR), CAST(COLUMN_NAME AS CHAR), CAST(COLUMN_TYPE AS CHAR),
                            CAST(COLUMN_KEY AS CHAR)
                     FROM information_schema.COLUMNS
                     WHERE TABLE_SCHEMA = DATABASE()
                     ORDER BY TABLE_NAME, ORDINAL_POSITION",
                )
                .fetch_all(p)
                .await?;
                for r in columns {
                    let table: String = r.try_get(0)?;
                    let key: Option<String> = r.try_get(3)?;
                    metadata.push_column(
                        &table,
                        ColumnMeta {
                            name: r.try_get(1)?,
                            sql_type: r.try_get(2)?,
                            primary_key: key.as_deref() == Some("PRI"),
                        },
                    );
                }

                let fks = sqlx::query(
                    "SELECT CAST(TABLE_NAME AS CHAR), CAST(COLUMN_NAME AS CHAR),
                            CAST(REFERENCED_TABLE_NAME AS CHAR), CAST(REFERENCED_COLUMN_NAME AS CHAR)
                     FROM information_schema.KEY_COLUMN_USAGE
                     WHERE TABLE_SCHEMA = DATABASE() AND REFERENCED_TABLE_NAME IS NOT NULL",
                )
                .fetch_all(p)
                .await?;
                for r in fks {
                    metadata.foreign_keys.push(ForeignKeyMeta {
                        table: r.try_get(0)?,
                        column: r.try_get(1)?,
                        referenced_table: r.try_get(2)?,
                        referenced_column: r.try_get(3)?,
                    });
                }
            }
            DynamicPool::Sqlite(p) => {
                let tables = sqlx::query(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                )
                .fetch_all(p)
                .await?;
                for t in tables {
                    let table: String = t.try_get(0)?;
                    let columns = sqlx::query("SELECT name, type, pk FROM pragma_table_info(?) ORDER BY cid")
                        .bind(&table)
                        .fetch_all(p)
                        .await?;
                    for r in columns {
                        let pk: i64 = r.try_get(2)?;
                        metadata.push_column(
                            &table,
                            ColumnMeta {
                                name: r.try_get(0)?,
                                sql_type: r.try_get(1)?,
                                primary_key: pk > 0,
                            },
                        );
                    }

                    let fks = sqlx::query(r#"SELECT "table", "from", "to" FROM pragma_foreign_key_list(?)"#)
                        .bind(&table)
                        .fetch_all(p)
                        .await?;
                    for r in fks {
                        metadata.foreign_keys.push(ForeignKeyMeta {
                            table: table.clone(),
                            column: r.try_get(1)?,
                            referenced_table: r.try_get(0)?,
                            referenced_column: r.try_get(2)?,
                        });
                    }
                }
            }
        }
        info!(
            "反射完成: {} 张表, {} 个外键",
            metadata.tables.len(),
            metadata.foreign_keys.len()
        );
        Ok(metadata)
    }

    // --- 2. 事务执行 ---

    /// 在一个显式事务中依次执行；任一语句失败即回滚并返回该错误
    pub async fn execute_transaction(&self, statements: &[Statement]) -> Result<u64> {
        let mut affected = 0;
        match self {
            DynamicPool::Postgres(p) => {
                let mut tx = p.begin().await?;
                for (i, s) in statements.iter().enumerate() {
                    match bind_pg(sqlx::query(&s.sql), &s.params).execute(&mut *tx).await {
                        Ok(r) => affected += r.rows_affected(),
                        Err(e) => {
                            warn!("事务第 {} 条语句失败, 回滚: {}", i + 1, e);
                            if let Err(rb) = tx.rollback().await {
                                warn!("回滚失败: {}", rb);
                            }
                            return Err(e.into());
                        }
                    }
                }
                tx.commit().await?;
            }
            DynamicPool::MySql(p) => {
                let mut tx = p.begin().await?;
                for (i, s) in statements.iter().enumerate() {
                    match bind_mysql(sqlx::query(&s.sql), &s.params).execute(&mut *tx).await {
                        Ok(r) => affected += r.rows_affected(),
                        Err(e) => {
                            warn!("事务第 {} 条语句失败, 回滚: {}", i + 1, e);
                            if let Err(rb) = tx.rollback().await {
                                warn!("回滚失败: {}", rb);
                            }
                            return Err(e.into());
                        }
                    }
                }
                tx.commit().await?;
            }
            DynamicPool::Sqlite(p) => {
                let mut tx = p.begin().await?;
                for (i, s) in statements.iter().enumerate() {
                    match bind_sqlite(sqlx::query(&s.sql), &s.params).execute(&mut *tx).await {
                        Ok(r) => affected += r.rows_affected(),
                        Err(e) => {
                            warn!("事务第 {} 条语句失败, 回滚: {}", i + 1, e);
                            if let Err(rb) = tx.rollback().await {
                                warn!("回滚失败: {}", rb);
                            }
                            return Err(e.into());
                        }
                    }
                }
                tx.commit().await?;
            }
        }
        info!("事务提交: {} 条语句, 影响 {} 行", statements.len(), affected);
        Ok(affected)
    }
}

// --- 3. 查询执行 ---

impl Executor for DynamicPool {
    fn dialect(&self) -> Dialect {
        match self {
            DynamicPool::Postgres(_) => Dialect::Postgres,
            DynamicPool::MySql(_) => Dialect::MySql,
            DynamicPool::Sqlite(_) => Dialect::Sqlite,
        }
    }

    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>> {
        let rows = match self {
            DynamicPool::Postgres(p) => bind_pg(sqlx::query(&statement.sql), &statement.params)
                .fetch_all(p)
                .await?
                .iter()
                .map(pg_row_to_record)
                .collect::<sqlx::Result<Vec<_>>>()?,
            DynamicPool::MySql(p) => bind_mysql(sqlx::query(&statement.sql), &statement.params)
                .fetch_all(p)
                .await?
                .iter()
                .map(mysql_row_to_record)
                .collect::<sqlx::Result<Vec<_>>>()?,
            DynamicPool::Sqlite(p) => bind_sqlite(sqlx::query(&statement.sql), &statement.params)
                .fetch_all(p)
                .await?
                .iter()
                .map(sqlite_row_to_record)
                .collect::<sqlx::Result<Vec<_>>>()?,
        };
        Ok(rows)
    }
}

fn bind_pg<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [Value],
) -> Query<'q, Postgres, PgArguments> {
    for v in params {
        query = match v {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Decimal(d) => query.bind(*d),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Date(d) => query.bind(*d),
            Value::DateTime(dt) => query.bind(*dt),
            Value::Bytes(b) => query.bind(b.as_slice()),
        };
    }
    query
}

fn bind_mysql<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q [Value],
) -> Query<'q, MySql, MySqlArguments> {
    for v in params {
        query = match v {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Decimal(d) => query.bind(*d),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Date(d) => query.bind(*d),
            Value::DateTime(dt) => query.bind(*dt),
            Value::Bytes(b) => query.bind(b.as_slice()),
        };
    }
    query
}

fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    use rust_decimal::prelude::ToPrimitive;
    for v in params {
        query = match v {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            // SQLite 没有定点小数类型
            Value::Decimal(d) => query.bind(d.to_f64()),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Date(d) => query.bind(*d),
            Value::DateTime(dt) => query.bind(*dt),
            Value::Bytes(b) => query.bind(b.as_slice()),
        };
    }
    query
}
