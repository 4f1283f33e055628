use super::{Next, PipelineBehavior, PipelineResult, RequestInfo};
use crate::context::AppContext;
use async_trait::async_trait;
use biz_domain::BizResult;
use chrono::Utc;
use std::time::Instant;
use tracing::{Instrument, error, info, info_span};

/// 日志行为：记录进入、失败与完成，不改变结果
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingBehavior;

impl LoggingBehavior {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PipelineBehavior for LoggingBehavior {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn handle(
        &self,
        request: &RequestInfo<'_>,
        ctx: &AppContext,
        next: Next<'_>,
    ) -> PipelineResult {
        let name = request.name();
        let span = info_span!(
            "request",
            request = name,
            kind = %request.kind(),
            request_id = %ctx.request_id(),
            correlation_id = ctx.correlation_id().unwrap_or_default(),
        );

        async move {
            let started = Instant::now();
            info!(started_at = %Utc::now().to_rfc3339(), "processing request {name}");

            let result = next.run(ctx).await;

            match &result {
                Ok(outcome) => {
                    if let Some(err) = outcome.as_error() {
                        error!(
                            code = err.code(),
                            error_type = %err.error_type(),
                            message = err.message(),
                            details = ?err.details(),
                            "request {name} failed"
                        );
                    }
                }
                Err(fault) => error!(fault = %fault, "request {name} faulted"),
            }

            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                success = result.as_ref().is_ok_and(BizResult::is_success),
                "completed request {name}"
            );
            result
        }
        .instrument(span)
        .await
    }
}
