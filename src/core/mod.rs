// 核心数据结构和类型定义

pub mod types;
pub mod clock;
pub mod error;

// 重新导出常用类型
pub use clock::*;
pub use error::*;
pub use types::*;
