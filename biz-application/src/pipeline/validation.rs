use super::{Next, PipelineBehavior, PipelineResult, RequestInfo};
use crate::context::AppContext;
use crate::validator::Validators;
use async_trait::async_trait;
use biz_domain::{BizResult, ValidationError};
use std::any::TypeId;
use tracing::debug;

/// 校验行为
///
/// 运行该请求类型注册的全部校验器，任一规则失败即聚合为一个
/// [`ValidationError`] 返回，不再调用剩余链路（事务与处理器都不会执行）。
/// 未注册校验器的请求直接放行。
#[derive(Clone, Default)]
pub struct ValidationBehavior {
    validators: Validators,
}

impl ValidationBehavior {
    pub fn new(validators: Validators) -> Self {
        Self { validators }
    }
}

#[async_trait]
impl PipelineBehavior for ValidationBehavior {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn required_request_types(&self) -> Vec<(TypeId, &'static str)> {
        self.validators.registered_types().collect()
    }

    async fn handle(
        &self,
        request: &RequestInfo<'_>,
        ctx: &AppContext,
        next: Next<'_>,
    ) -> PipelineResult {
        let errors = self.validators.validate(request);

        match ValidationError::new(errors) {
            Some(validation) => {
                debug!(
                    request = request.name(),
                    failures = validation.errors().len(),
                    "validation failed, short-circuiting"
                );
                Ok(BizResult::failure(validation.into()))
            }
            None => next.run(ctx).await,
        }
    }
}
