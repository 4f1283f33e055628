//! 日志初始化
//!
//! - `LOG_FORMAT=json`：JSON 输出（生产环境、日志聚合）；
//! - 其他值：人类可读文本（开发环境，默认）；
//! - `RUST_LOG`：日志级别过滤，默认 `info`。
//!
//! 管道的 [`LoggingBehavior`](crate::pipeline::LoggingBehavior) 为每次分发创建 span，
//! 其中的 `request`、`request_id`、`correlation_id` 字段会出现在嵌套的所有日志中。
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// 初始化全局日志；已初始化时静默忽略（便于测试中重复调用）
pub fn init_logging(service_name: &str) {
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter());
    let result = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .flatten_event(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_ansi(true))
            .try_init()
    };

    if result.is_ok() {
        tracing::debug!(service = service_name, json, "logging initialized");
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
