//! 错误定义模块

use thiserror::Error;

/// 影像索引系统统一错误类型
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("索引后端错误: {0}")]
    Sink(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("验证错误: {0}")]
    Validation(String),
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for IndexError {
    fn from(error: sqlx::Error) -> Self {
        IndexError::Database(error.to_string())
    }
}

/// 影像索引系统统一结果类型
pub type Result<T> = std::result::Result<T, IndexError>;
