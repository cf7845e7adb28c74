//! # 影像索引数据库模块
//!
//! 负责影像元数据及相关临床、基因组数据的存储，提供SQLite连接池、只读仓储查询、
//! 存在性探测、持久化任务队列以及数据写入操作。

pub mod connection;
pub mod models;
pub mod queries;
pub mod tasks;
pub mod variants;
pub mod writes;

// 重新导出主要类型
pub use connection::DatabasePool;
pub use models::*;
pub use queries::DatabaseQueries;
pub use tasks::TaskQueue;
pub use variants::{Cnv, Ssm, Sv, VariantKind};
pub use writes::DatabaseWrites;
