use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

use crate::core::error::{QueryError, Result};
use crate::core::graph::SchemaGraph;
use crate::models::predicate::{Conjunction, Operator, Predicate};
use crate::models::schema::{ColumnRef, ColumnType};
use crate::models::value::Value;

// 原子条件：table.column<op>value，值可用单/双引号包裹以容纳空格
static ATOMIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*([A-Za-z_][A-Za-z0-9_]*\.[A-Za-z_][A-Za-z0-9_]*)\s*(!=|>=|<=|=|>|<|(?i:like)\b)\s*('[^']*'|"[^"]*"|[^\s'"=<>!][^\s'"]*)"#,
    )
    .expect("atomic pattern compiles")
});

static CONJUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+(?i:(and|or))\s+").expect("conjunction pattern compiles"));

/// 编译过滤字符串：原子条件由 AND / OR 从左到右连接，无括号、无优先级
#[tracing::instrument(skip(graph))]
pub fn compile(graph: &SchemaGraph, expr: &str) -> Result<Predicate> {
    let predicate = Parser::new(graph, expr).parse_expression()?;
    debug!("表达式编译完成: {:?}", predicate);
    Ok(predicate)
}

/// 深度优先、从左到右展开条件树中的所有列
pub fn extract_columns(predicate: &Predicate) -> Vec<ColumnRef> {
    let mut columns = Vec::new();
    collect_columns(predicate, &mut columns);
    columns
}

fn collect_columns(predicate: &Predicate, out: &mut Vec<ColumnRef>) {
    match predicate {
        Predicate::Leaf { column, .. } | Predicate::In { column, .. } => out.push(column.clone()),
        Predicate::Group { children, .. } => {
            for child in children {
                collect_columns(child, out);
            }
        }
    }
}

/// 将字面量转换为列的原生类型；文本类列保持原样
pub fn coerce_literal(raw: &str, column_type: ColumnType) -> std::result::Result<Value, String> {
    let raw = raw.trim();
    match column_type {
        ColumnType::Integer => raw
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("'{}' is not an integer", raw)),
        ColumnType::Float => raw
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("'{}' is not a number", raw)),
        ColumnType::Decimal => Decimal::from_str(raw)
            .map(Value::Decimal)
            .map_err(|_| format!("'{}' is not a decimal", raw)),
        ColumnType::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|_| format!("'{}' is not a date (YYYY-MM-DD)", raw)),
        ColumnType::DateTime => parse_datetime(raw)
            .map(Value::DateTime)
            .ok_or_else(|| format!("'{}' is not a datetime", raw)),
        ColumnType::Boolean => match raw.to_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!("'{}' is not a boolean", raw)),
        },
        ColumnType::Text | ColumnType::Bytes => Ok(Value::Text(raw.to_string())),
    }
}

/// 请求中的候选键值统一转换为键列的原生类型，NULL 保持不变
pub fn coerce_values(column: &ColumnRef, values: &[Value]) -> Result<Vec<Value>> {
    values
        .iter()
        .map(|v| match v {
            Value::Null => Ok(Value::Null),
            other => {
                let raw = other.to_string();
                coerce_literal(&raw, column.column_type).map_err(|reason| QueryError::malformed(&raw, reason))
            }
        })
        .collect()
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// 递归下降解析器：expression := atomic (conjunction atomic)*
struct Parser<'s, 'g> {
    graph: &'g SchemaGraph,
    source: &'s str,
    pos: usize,
}

impl<'s, 'g> Parser<'s, 'g> {
    fn new(graph: &'g SchemaGraph, source: &'s str) -> Self {
        Self { graph, source, pos: 0 }
    }

    fn rest(&self) -> &'s str {
        &self.source[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.rest().trim().is_empty()
    }

    /// 出错位置处的下一个片段，用于错误信息
    fn offending(&self) -> String {
        self.rest()
            .split_whitespace()
            .next()
            .unwrap_or("<end of input>")
            .to_string()
    }

    fn parse_expression(&mut self) -> Result<Predicate> {
        if self.at_end() {
            return Err(QueryError::malformed("<end of input>", "empty expression"));
        }
        let mut predicate = self.parse_atomic()?;
        while !self.at_end() {
            let conjunction = self.parse_conjunction()?;
            let rhs = self.parse_atomic()?;
            predicate = predicate.combine(conjunction, rhs);
        }
        Ok(predicate)
    }

    fn parse_conjunction(&mut self) -> Result<Conjunction> {
        let caps = CONJUNCTION
            .captures(self.rest())
            .ok_or_else(|| QueryError::malformed(self.offending(), "expected AND or OR"))?;
        let conjunction = if caps[1].eq_ignore_ascii_case("and") {
            Conjunction::And
        } else {
            Conjunction::Or
        };
        self.pos += caps[0].len();
        Ok(conjunction)
    }

    fn parse_atomic(&mut self) -> Result<Predicate> {
        let caps = ATOMIC.captures(self.rest()).ok_or_else(|| {
            QueryError::malformed(self.offending(), "expected table.column<operator>value")
        })?;
        let (identifier, op, raw) = (&caps[1], &caps[2], &caps[3]);

        let column = self.graph.get_column(identifier)?;
        let operator = Operator::parse(op)
            .ok_or_else(|| QueryError::malformed(op, "unknown operator"))?;
        if !operator.allowed_for(column.category()) {
            return Err(QueryError::malformed(
                op,
                format!("operator not permitted on {:?} column {}", column.column_type, column),
            ));
        }

        let value = match unquote(raw) {
            Some(inner) => coerce_literal(inner, column.column_type),
            None if raw.eq_ignore_ascii_case("null") => Ok(Value::Null),
            None => coerce_literal(raw, column.column_type),
        }
        .map_err(|reason| QueryError::malformed(raw, reason))?;

        self.pos += caps[0].len();
        Ok(Predicate::leaf(column, operator, value))
    }
}

fn unquote(raw: &str) -> Option<&str> {
    let bytes = raw.as_bytes();
    match bytes.first() {
        Some(b'\'') | Some(b'"') if raw.len() >= 2 && bytes[raw.len() - 1] == bytes[0] => {
            Some(&raw[1..raw.len() - 1])
        }
        _ => None,
    }
}
