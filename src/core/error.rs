use thiserror::Error;

/// 查询构建与执行过程中的错误
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("malformed expression near '{token}': {reason}")]
    MalformedExpression { token: String, reason: String },

    #[error("no join path from table '{from}' to table '{to}'")]
    Unreachable { from: String, to: String },

    #[error("foreign key {table}.{column} references missing '{reference}'")]
    DanglingForeignKey {
        table: String,
        column: String,
        reference: String,
    },

    #[error("DISTINCT query mixes aggregate and plain columns: {0}")]
    MixedAggregate(String),

    #[error("query selects no columns")]
    EmptySelection,

    #[error("invalid selection {column}: {reason}")]
    InvalidSelection { column: String, reason: String },

    #[error("chunk limit must be at least 1")]
    InvalidChunkLimit,

    /// 引擎侧错误原样透传，不做重试
    #[error("engine error: {0}")]
    Engine(#[from] sqlx::Error),
}

impl QueryError {
    pub fn malformed(token: impl Into<String>, reason: impl Into<String>) -> Self {
        QueryError::MalformedExpression {
            token: token.into(),
            reason: reason.into(),
        }
    }

    /// 调用方输入问题 (标识符、语法、图连通性)，可提示用户修正后重试
    pub fn is_input_error(&self) -> bool {
        !matches!(self, QueryError::Engine(_))
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
