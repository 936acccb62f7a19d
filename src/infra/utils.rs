use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::types::PgTimeTz;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::types::{JsonValue, Uuid};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

use crate::models::value::{Row, Value};

fn opt<T>(v: Option<T>, f: impl FnOnce(T) -> Value) -> Value {
    v.map(f).unwrap_or(Value::Null)
}

/// 能按 UTF-8 解码的按文本返回，否则保留原始字节
fn bytes_value(bytes: Vec<u8>) -> Value {
    String::from_utf8(bytes)
        .map(Value::Text)
        .unwrap_or_else(|e| Value::Bytes(e.into_bytes()))
}

/// MySQL BIT 以大端字节传输
fn bit_value(bytes: &[u8]) -> Value {
    let v = bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    i64::try_from(v).map(Value::Int).unwrap_or(Value::Float(v as f64))
}

/// 二进制协议下按字符串读取仍然安全的 Postgres 类型
fn is_pg_text(name: &str) -> bool {
    ["TEXT", "VARCHAR", "BPCHAR", "NAME", "CITEXT", "UNKNOWN"]
        .iter()
        .any(|t| name.eq_ignore_ascii_case(t))
}

fn is_mysql_text(name: &str) -> bool {
    matches!(
        name,
        "VARCHAR" | "CHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" | "JSON"
    )
}

// 按数据库原生类型名解码，如 "INT4", "NUMERIC"
pub fn pg_row_to_record(row: &PgRow) -> sqlx::Result<Row> {
    let mut record = Row::new();
    for (i, col) in row.columns().iter().enumerate() {
        let val = match col.type_info().name() {
            "INT2" => opt(row.try_get::<Option<i16>, _>(i)?, |v| Value::Int(v.into())),
            "INT4" => opt(row.try_get::<Option<i32>, _>(i)?, |v| Value::Int(v.into())),
            "INT8" => opt(row.try_get::<Option<i64>, _>(i)?, Value::Int),
            "FLOAT4" => opt(row.try_get::<Option<f32>, _>(i)?, |v| Value::Float(v.into())),
            "FLOAT8" => opt(row.try_get::<Option<f64>, _>(i)?, Value::Float),
            "NUMERIC" => opt(row.try_get::<Option<Decimal>, _>(i)?, Value::Decimal),
            "BOOL" => opt(row.try_get::<Option<bool>, _>(i)?, Value::Bool),
            "DATE" => opt(row.try_get::<Option<NaiveDate>, _>(i)?, Value::Date),
            "TIMESTAMP" => opt(row.try_get::<Option<NaiveDateTime>, _>(i)?, Value::DateTime),
            // 统一换算为 UTC
            "TIMESTAMPTZ" => opt(row.try_get::<Option<DateTime<Utc>>, _>(i)?, |v| Value::DateTime(v.naive_utc())),
            "TIME" => opt(row.try_get::<Option<NaiveTime>, _>(i)?, |v| Value::Text(v.to_string())),
            "TIMETZ" => opt(row.try_get::<Option<PgTimeTz<NaiveTime, FixedOffset>>, _>(i)?, |v| {
                Value::Text(format!("{}{}", v.time, v.offset))
            }),
            "UUID" => opt(row.try_get::<Option<Uuid>, _>(i)?, |v| Value::Text(v.to_string())),
            "JSON" | "JSONB" => opt(row.try_get::<Option<JsonValue>, _>(i)?, |v| Value::Text(v.to_string())),
            "BYTEA" => opt(row.try_get::<Option<Vec<u8>>, _>(i)?, Value::Bytes),
            name if is_pg_text(name) => opt(row.try_get_unchecked::<Option<String>, _>(i)?, Value::Text),
            // 枚举等自定义类型的二进制表示即文本，其余保留原始字节
            _ => opt(row.try_get_unchecked::<Option<Vec<u8>>, _>(i)?, bytes_value),
        };
        record.push(col.name(), val);
    }
    Ok(record)
}

pub fn mysql_row_to_record(row: &MySqlRow) -> sqlx::Result<Row> {
    let mut record = Row::new();
    for (i, col) in row.columns().iter().enumerate() {
        let val = match col.type_info().name() {
            "BOOLEAN" => opt(row.try_get::<Option<bool>, _>(i)?, Value::Bool),
            "TINYINT" | "SMALLINT" | "INT" | "MEDIUMINT" | "BIGINT" => {
                opt(row.try_get::<Option<i64>, _>(i)?, Value::Int)
            }
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "INT UNSIGNED" | "MEDIUMINT UNSIGNED" => {
                opt(row.try_get::<Option<u32>, _>(i)?, |v| Value::Int(v.into()))
            }
            "BIGINT UNSIGNED" => opt(row.try_get::<Option<u64>, _>(i)?, |v| {
                i64::try_from(v).map(Value::Int).unwrap_or(Value::Float(v as f64))
            }),
            "FLOAT" | "DOUBLE" => opt(row.try_get::<Option<f64>, _>(i)?, Value::Float),
            "DECIMAL" => opt(row.try_get::<Option<Decimal>, _>(i)?, Value::Decimal),
            "DATE" => opt(row.try_get::<Option<NaiveDate>, _>(i)?, Value::Date),
            "DATETIME" | "TIMESTAMP" => opt(row.try_get::<Option<NaiveDateTime>, _>(i)?, Value::DateTime),
            "TIME" => opt(row.try_get::<Option<NaiveTime>, _>(i)?, |v| Value::Text(v.to_string())),
            "YEAR" => opt(row.try_get_unchecked::<Option<u16>, _>(i)?, |v| Value::Int(v.into())),
            "BIT" => opt(row.try_get_unchecked::<Option<Vec<u8>>, _>(i)?, |bytes| bit_value(&bytes)),
            name if is_mysql_text(name) => opt(row.try_get_unchecked::<Option<String>, _>(i)?, Value::Text),
            // 二进制串与未列出的类型：能按 UTF-8 解码的按文本返回
            _ => opt(row.try_get_unchecked::<Option<Vec<u8>>, _>(i)?, bytes_value),
        };
        record.push(col.name(), val);
    }
    Ok(record)
}

/// SQLite 按值的实际存储类别解码，声明类型只是亲和性
pub fn sqlite_row_to_record(row: &SqliteRow) -> sqlx::Result<Row> {
    let mut record = Row::new();
    for (i, col) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let val = if raw.is_null() {
            Value::Null
        } else {
            let storage = raw.type_info().name().to_string();
            match storage.as_str() {
                "INTEGER" => Value::Int(row.try_get_unchecked::<i64, _>(i)?),
                "REAL" => Value::Float(row.try_get_unchecked::<f64, _>(i)?),
                "BLOB" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(i)?),
                _ => Value::Text(row.try_get_unchecked::<String, _>(i)?),
            }
        };
        record.push(col.name(), val);
    }
    Ok(record)
}
