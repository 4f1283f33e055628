use serde::Serialize;

/// 数据传输对象（DTO）
///
/// - 作为应用层的输出载体，面向接口/外部系统序列化友好；
/// - 与领域模型解耦，避免将领域对象直接暴露到接口层；
/// - 任何可序列化且可跨线程传递的类型都自动满足该约束。
pub trait Dto: Serialize + Send + Sync + 'static {}

impl<T> Dto for T where T: Serialize + Send + Sync + 'static {}
