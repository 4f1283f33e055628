//! 业务结果模型（biz-domain）
//!
//! 定义应用内所有处理器与管道行为共享的结果/错误值类型：
//! - [`BizResult`]：成功/失败的标签联合，替代以异常表达预期内的业务失败；
//! - [`BizError`] 与 [`ErrorType`]：稳定错误码、可读信息与分类；
//! - [`ValidationError`]：聚合多条字段校验失败。
//!
//! 本 crate 不依赖任何运行时或存储实现。
//!
pub mod error;
pub mod result;

pub use error::{BizError, ErrorType, ValidationError};
pub use result::BizResult;
