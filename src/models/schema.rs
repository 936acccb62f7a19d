use serde::{Deserialize, Serialize};

use crate::models::query::{Aggregate, Selection};

/// 列的原生值类型，由反射得到的 SQL 类型名推断
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Decimal,
    Date,
    DateTime,
    Boolean,
    Text,
    Bytes,
}

/// 决定过滤表达式可用运算符的值类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueCategory {
    /// 数值与日期：{=, !=, >, >=, <, <=}
    Comparable,
    /// 文本、枚举及其他：{=, !=, LIKE}
    Textual,
}

impl ColumnType {
    /// 将 information_schema / PRAGMA 返回的类型名映射为 ColumnType
    pub fn from_sql_type(type_name: &str) -> Self {
        let t = type_name.trim().to_uppercase();
        // 注意顺序：DATETIME/TIMESTAMP 需在 DATE 之前判断，"POINT"/"INTERVAL" 含 "INT" 需排除
        if t.contains("TIMESTAMP") || t.contains("DATETIME") {
            ColumnType::DateTime
        } else if t.starts_with("DATE") {
            ColumnType::Date
        } else if t.starts_with("BOOL") || t == "TINYINT(1)" {
            ColumnType::Boolean
        } else if (t.contains("INT") && !t.contains("POINT") && !t.contains("INTERVAL")) || t.ends_with("SERIAL") {
            ColumnType::Integer
        } else if t.starts_with("DEC") || t.starts_with("NUMERIC") {
            ColumnType::Decimal
        } else if t.contains("REAL") || t.contains("FLOAT") || t.contains("DOUBLE") {
            ColumnType::Float
        } else if t.contains("BLOB") || t.contains("BINARY") || t == "BYTEA" {
            ColumnType::Bytes
        } else {
            ColumnType::Text
        }
    }

    pub fn category(&self) -> ValueCategory {
        match self {
            ColumnType::Integer
            | ColumnType::Float
            | ColumnType::Decimal
            | ColumnType::Date
            | ColumnType::DateTime => ValueCategory::Comparable,
            ColumnType::Boolean | ColumnType::Text | ColumnType::Bytes => ValueCategory::Textual,
        }
    }
}

// --- 反射得到的原始元数据 ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub sql_type: String,
    pub primary_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub columns: Vec<ColumnMeta>,
}

impl TableMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, name: &str, sql_type: &str, primary_key: bool) -> Self {
        self.columns.push(ColumnMeta {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            primary_key,
        });
        self
    }
}

/// 单列外键：table.column -> referenced_table.referenced_column
/// SQLite 允许省略被引用列，此时 referenced_column 为 None，指向被引用表主键
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyMeta {
    pub table: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub tables: Vec<TableMeta>,
    pub foreign_keys: Vec<ForeignKeyMeta>,
}

impl SchemaMetadata {
    pub fn table(mut self, table: TableMeta) -> Self {
        self.tables.push(table);
        self
    }

    pub fn foreign_key(mut self, table: &str, column: &str, referenced: &str, referenced_column: &str) -> Self {
        self.foreign_keys.push(ForeignKeyMeta {
            table: table.to_string(),
            column: column.to_string(),
            referenced_table: referenced.to_string(),
            referenced_column: Some(referenced_column.to_string()),
        });
        self
    }

    /// 反射时逐列追加，保持表的出现顺序与列的序号顺序
    pub fn push_column(&mut self, table: &str, column: ColumnMeta) {
        match self.tables.iter_mut().find(|t| t.name == table) {
            Some(t) => t.columns.push(column),
            None => self.tables.push(TableMeta {
                name: table.to_string(),
                columns: vec![column],
            }),
        }
    }
}

/// 已解析的列引用 (表名、列名均为反射时的规范写法)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
    pub column_type: ColumnType,
}

impl ColumnRef {
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }

    pub fn category(&self) -> ValueCategory {
        self.column_type.category()
    }

    /// 计数查询中的 COUNT(DISTINCT col)
    pub fn distinct(&self) -> Selection {
        Selection {
            column: self.clone(),
            distinct: true,
            aggregate: None,
        }
    }

    pub fn count(&self) -> Selection {
        Selection {
            column: self.clone(),
            distinct: false,
            aggregate: Some(Aggregate::Count),
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

// --- 数据源配置 ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DataSource {
    pub id: String,
    pub db_type: String,
    pub connection_url: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateDataSourceRequest {
    pub id: String,
    pub db_type: String,
    pub connection_url: String,
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_reflected_type_names() {
        assert_eq!(ColumnType::from_sql_type("int(10) unsigned"), ColumnType::Integer);
        assert_eq!(ColumnType::from_sql_type("BIGINT"), ColumnType::Integer);
        assert_eq!(ColumnType::from_sql_type("decimal(5,2)"), ColumnType::Decimal);
        assert_eq!(ColumnType::from_sql_type("DATETIME"), ColumnType::DateTime);
        assert_eq!(ColumnType::from_sql_type("timestamp without time zone"), ColumnType::DateTime);
        assert_eq!(ColumnType::from_sql_type("date"), ColumnType::Date);
        assert_eq!(ColumnType::from_sql_type("double precision"), ColumnType::Float);
        assert_eq!(ColumnType::from_sql_type("VARCHAR(25)"), ColumnType::Text);
        assert_eq!(ColumnType::from_sql_type("enum('draft','final')"), ColumnType::Text);
        assert_eq!(ColumnType::from_sql_type("mediumblob"), ColumnType::Bytes);
        assert_eq!(ColumnType::from_sql_type("POINT"), ColumnType::Text);
        assert_eq!(ColumnType::from_sql_type("interval"), ColumnType::Text);
        assert_eq!(ColumnType::from_sql_type("INTERVAL DAY TO SECOND"), ColumnType::Text);
        assert_eq!(ColumnType::from_sql_type(""), ColumnType::Text);
    }

    #[test]
    fn dates_and_numbers_are_comparable() {
        assert_eq!(ColumnType::Date.category(), ValueCategory::Comparable);
        assert_eq!(ColumnType::Decimal.category(), ValueCategory::Comparable);
        assert_eq!(ColumnType::Text.category(), ValueCategory::Textual);
        assert_eq!(ColumnType::Boolean.category(), ValueCategory::Textual);
    }
}
