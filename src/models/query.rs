use serde::{Deserialize, Serialize};

use crate::models::schema::ColumnRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Select,
    Distinct,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregate {
    Count,
}

/// 投影项：普通列，或者 COUNT([DISTINCT] col)
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub column: ColumnRef,
    pub distinct: bool,
    pub aggregate: Option<Aggregate>,
}

impl Selection {
    pub fn is_aggregate(&self) -> bool {
        self.aggregate.is_some()
    }
}

impl From<ColumnRef> for Selection {
    fn from(column: ColumnRef) -> Self {
        Selection {
            column,
            distinct: false,
            aggregate: None,
        }
    }
}

impl From<&ColumnRef> for Selection {
    fn from(column: &ColumnRef) -> Self {
        Selection::from(column.clone())
    }
}
