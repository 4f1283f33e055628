use super::{Next, PipelineBehavior, PipelineResult, RequestInfo};
use crate::context::AppContext;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::warn;

/// 性能行为：剩余链路耗时超过阈值时告警，不改变结果
#[derive(Debug, Clone, Copy)]
pub struct PerformanceBehavior {
    threshold: Duration,
}

impl PerformanceBehavior {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}

#[async_trait]
impl PipelineBehavior for PerformanceBehavior {
    fn name(&self) -> &'static str {
        "performance"
    }

    async fn handle(
        &self,
        request: &RequestInfo<'_>,
        ctx: &AppContext,
        next: Next<'_>,
    ) -> PipelineResult {
        let started = Instant::now();
        let result = next.run(ctx).await;
        let elapsed = started.elapsed();

        if elapsed > self.threshold {
            warn!(
                request = request.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.threshold.as_millis() as u64,
                "long running request"
            );
        }

        result
    }
}
