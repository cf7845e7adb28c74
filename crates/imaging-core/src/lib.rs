//! # Imaging Core
//!
//! 影像索引系统的核心模块，提供领域数据结构、错误定义和通用工具。

pub mod error;
pub mod models;
pub mod utils;

pub use error::{IndexError, Result};
pub use models::*;
