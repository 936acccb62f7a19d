use serde::{Deserialize, Serialize};

use crate::models::schema::{ColumnRef, ValueCategory};
use crate::models::value::Value;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
}

impl Operator {
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_uppercase().as_str() {
            "=" => Some(Operator::Eq),
            "!=" => Some(Operator::NotEq),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Gte),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Lte),
            "LIKE" => Some(Operator::Like),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
        }
    }

    /// 数值/日期列允许大小比较，其余列只允许 =, != 与 LIKE
    pub fn allowed_for(&self, category: ValueCategory) -> bool {
        match category {
            ValueCategory::Comparable => !matches!(self, Operator::Like),
            ValueCategory::Textual => matches!(self, Operator::Eq | Operator::NotEq | Operator::Like),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

impl Conjunction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

/// 编译后的过滤条件树
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Leaf {
        column: ColumnRef,
        operator: Operator,
        value: Value,
    },
    Group {
        conjunction: Conjunction,
        children: Vec<Predicate>,
    },
    /// 分批执行时追加的 key IN (...) 限制，表达式语法不会产生该节点
    In {
        column: ColumnRef,
        values: Vec<Value>,
    },
}

impl Predicate {
    pub fn leaf(column: ColumnRef, operator: Operator, value: Value) -> Self {
        Predicate::Leaf {
            column,
            operator,
            value,
        }
    }

    /// 以 AND 合并多个条件；单个条件原样返回，空集合返回 None
    pub fn all(mut predicates: Vec<Predicate>) -> Option<Predicate> {
        match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Predicate::Group {
                conjunction: Conjunction::And,
                children: predicates,
            }),
        }
    }

    /// 左结合地追加一个条件；同一连接词的组直接展平
    pub fn combine(self, conjunction: Conjunction, rhs: Predicate) -> Predicate {
        match self {
            Predicate::Group {
                conjunction: c,
                mut children,
            } if c == conjunction => {
                children.push(rhs);
                Predicate::Group {
                    conjunction: c,
                    children,
                }
            }
            lhs => Predicate::Group {
                conjunction,
                children: vec![lhs, rhs],
            },
        }
    }
}
