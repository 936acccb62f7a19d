use std::collections::HashMap;
use tracing::debug;

use crate::core::error::{QueryError, Result};
use crate::core::expression::extract_columns;
use crate::core::graph::SchemaGraph;
use crate::core::planner::{self, JoinPlan};
use crate::models::predicate::{Operator, Predicate};
use crate::models::query::{QueryKind, Selection};
use crate::models::schema::ColumnRef;
use crate::models::value::Value;

/// 目标引擎的 SQL 方言：标识符引用符与占位符风格
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// n 从 1 开始
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    fn column(&self, column: &ColumnRef) -> String {
        format!("{}.{}", self.quote(&column.table), self.quote(&column.column))
    }
}

/// 渲染后的语句：SQL 文本 + 按位置绑定的参数
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// 一条待执行查询的完整描述，渲染前与方言无关
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub kind: QueryKind,
    pub selections: Vec<Selection>,
    pub plan: JoinPlan,
    pub predicate: Option<Predicate>,
    pub order_by: Vec<ColumnRef>,
    center: Option<String>,
}

pub struct QueryBuilder<'g> {
    graph: &'g SchemaGraph,
    center: Option<String>,
}

impl<'g> QueryBuilder<'g> {
    pub fn new(graph: &'g SchemaGraph) -> Self {
        Self { graph, center: None }
    }

    /// 显式指定连接计划的中心表
    pub fn with_center(mut self, table: &str) -> Result<Self> {
        self.center = Some(self.graph.get_table(table)?.name().to_string());
        Ok(self)
    }

    /// 普通 SELECT，不去重：一对多关系中 "一" 侧的行会随 "多" 侧重复
    pub fn build_select(
        &self,
        columns: &[Selection],
        filter: Option<&Predicate>,
        order_by: &[ColumnRef],
    ) -> Result<QuerySpec> {
        self.build(QueryKind::Select, columns, filter, order_by)
    }

    /// SELECT DISTINCT，按输出列的值元组去重
    pub fn build_distinct(&self, columns: &[Selection], filter: Option<&Predicate>) -> Result<QuerySpec> {
        let aggregates = columns.iter().filter(|s| s.is_aggregate()).count();
        if aggregates > 0 && aggregates < columns.len() {
            let names: Vec<String> = columns.iter().map(|s| s.column.qualified()).collect();
            return Err(QueryError::MixedAggregate(names.join(", ")));
        }
        self.build(QueryKind::Distinct, columns, filter, &[])
    }

    /// 每个输入包装为 COUNT，结果依次命名 count_1, count_2, ...
    pub fn build_count(&self, columns: &[Selection], filter: Option<&Predicate>) -> Result<QuerySpec> {
        self.build(QueryKind::Count, columns, filter, &[])
    }

    fn build(
        &self,
        kind: QueryKind,
        columns: &[Selection],
        filter: Option<&Predicate>,
        order_by: &[ColumnRef],
    ) -> Result<QuerySpec> {
        if columns.is_empty() {
            return Err(QueryError::EmptySelection);
        }
        if kind != QueryKind::Count {
            check_plain_selections(columns)?;
        }
        let mut spec = QuerySpec {
            kind,
            selections: columns.to_vec(),
            plan: JoinPlan::single(&columns[0].column.table),
            predicate: filter.cloned(),
            order_by: order_by.to_vec(),
            center: self.center.clone(),
        };
        spec.replan(self.graph)?;
        Ok(spec)
    }
}

/// 非计数查询中：distinct 只能修饰 COUNT；同一列不能重复投影，否则输出标签冲突
fn check_plain_selections(columns: &[Selection]) -> Result<()> {
    let invalid = |s: &Selection, reason: &str| QueryError::InvalidSelection {
        column: s.column.qualified(),
        reason: reason.to_string(),
    };
    for (i, s) in columns.iter().enumerate() {
        if s.distinct && !s.is_aggregate() {
            return Err(invalid(s, "DISTINCT applies only to COUNT"));
        }
        if !s.is_aggregate() && columns[..i].iter().any(|p| !p.is_aggregate() && p.column == s.column) {
            return Err(invalid(s, "column selected more than once"));
        }
    }
    Ok(())
}

impl QuerySpec {
    /// 输出列 ∪ 条件列 ∪ 排序列
    pub fn required_columns(&self) -> Vec<ColumnRef> {
        let mut columns: Vec<ColumnRef> = self.selections.iter().map(|s| s.column.clone()).collect();
        if let Some(predicate) = &self.predicate {
            columns.extend(extract_columns(predicate));
        }
        columns.extend(self.order_by.iter().cloned());
        columns
    }

    /// 在已有 WHERE 上 AND 一个条件并重新规划连接
    pub fn restrict(&self, graph: &SchemaGraph, extra: Predicate) -> Result<QuerySpec> {
        let predicate = match &self.predicate {
            Some(existing) => existing.clone().combine(crate::models::predicate::Conjunction::And, extra),
            None => extra,
        };
        let mut spec = QuerySpec {
            predicate: Some(predicate),
            ..self.clone()
        };
        spec.replan(graph)?;
        Ok(spec)
    }

    fn replan(&mut self, graph: &SchemaGraph) -> Result<()> {
        self.plan = planner::plan(graph, &self.required_columns(), self.center.as_deref())?;
        Ok(())
    }

    /// 结果行中的列标签；重名的普通列改用 table_column
    pub fn output_labels(&self) -> Vec<String> {
        let mut name_counts: HashMap<String, usize> = HashMap::new();
        for s in self.selections.iter().filter(|s| !self.is_counted(s)) {
            *name_counts.entry(s.column.column.to_lowercase()).or_default() += 1;
        }

        let mut counts = 0;
        self.selections
            .iter()
            .map(|s| {
                if self.is_counted(s) {
                    counts += 1;
                    format!("count_{}", counts)
                } else if name_counts[&s.column.column.to_lowercase()] > 1 {
                    format!("{}_{}", s.column.table, s.column.column)
                } else {
                    s.column.column.clone()
                }
            })
            .collect()
    }

    fn is_counted(&self, selection: &Selection) -> bool {
        self.kind == QueryKind::Count || selection.is_aggregate()
    }

    pub fn to_statement(&self, dialect: Dialect) -> Statement {
        let mut params = Vec::new();

        let projection: Vec<String> = self
            .selections
            .iter()
            .zip(self.output_labels())
            .map(|(s, label)| {
                let column = dialect.column(&s.column);
                let expr = if self.is_counted(s) {
                    if s.distinct {
                        format!("COUNT(DISTINCT {})", column)
                    } else {
                        format!("COUNT({})", column)
                    }
                } else {
                    column
                };
                format!("{} AS {}", expr, dialect.quote(&label))
            })
            .collect();

        let mut sql = String::from("SELECT ");
        if self.kind == QueryKind::Distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&projection.join(", "));
        sql.push_str(&format!(" FROM {}", dialect.quote(&self.plan.center)));
        for step in &self.plan.joins {
            let on = &step.on;
            sql.push_str(&format!(
                " JOIN {} ON {}.{} = {}.{}",
                dialect.quote(&step.table),
                dialect.quote(&on.pk_table),
                dialect.quote(&on.pk_column),
                dialect.quote(&on.fk_table),
                dialect.quote(&on.fk_column),
            ));
        }

        if let Some(predicate) = &self.predicate {
            sql.push_str(" WHERE ");
            sql.push_str(&render_predicate(predicate, dialect, &mut params, false));
        }

        if !self.order_by.is_empty() {
            let order: Vec<String> = self.order_by.iter().map(|c| dialect.column(c)).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        debug!("生成 SQL: {}", sql);
        Statement { sql, params }
    }
}

fn render_predicate(predicate: &Predicate, dialect: Dialect, params: &mut Vec<Value>, nested: bool) -> String {
    match predicate {
        Predicate::Leaf { column, operator, value } => {
            let col = dialect.column(column);
            match (operator, value) {
                (Operator::Eq, Value::Null) => format!("{} IS NULL", col),
                (Operator::NotEq, Value::Null) => format!("{} IS NOT NULL", col),
                _ => {
                    params.push(value.clone());
                    format!("{} {} {}", col, operator.as_sql(), dialect.placeholder(params.len()))
                }
            }
        }
        Predicate::In { column, values } => {
            if values.is_empty() {
                return "1 = 0".to_string();
            }
            let placeholders: Vec<String> = values
                .iter()
                .map(|v| {
                    params.push(v.clone());
                    dialect.placeholder(params.len())
                })
                .collect();
            format!("{} IN ({})", dialect.column(column), placeholders.join(", "))
        }
        Predicate::Group { conjunction, children } => {
            let parts: Vec<String> = children
                .iter()
                .map(|c| render_predicate(c, dialect, params, true))
                .collect();
            let joined = parts.join(&format!(" {} ", conjunction.as_sql()));
            if nested && children.len() > 1 {
                format!("({})", joined)
            } else {
                joined
            }
        }
    }
}
