/// 应用层命令（Command）
///
/// 表达“意图”的写操作请求，通常会修改领域状态。
/// - 由唯一的处理器处理，返回 [`BizResult`](biz_domain::BizResult)；
/// - 经过事务行为包裹，处理器内的写入在同一事务中提交或回滚；
/// - 建议保持语义化的“动宾结构”命名，如 `CreateService`、`AssignStaff`。
///
/// 关联常量：
/// - `NAME`：命令的稳定名称，用于日志、追踪与路由。避免依赖 `type_name::<T>()`。
pub trait Command: Send + Sync + 'static {
    /// 命令的稳定名称（建议点分常量字符串，如 `"Catalog.CreateService"`）
    const NAME: &'static str;

    /// 成功时的返回值；无返回值的命令使用 `()`
    type Output: Send + 'static;
}
