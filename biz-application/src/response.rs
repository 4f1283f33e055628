//! 响应信封
//!
//! 将总线返回的 [`AppResult`] 映射为传输层可直接序列化的信封：
//! - 成功：`{ "data": ..., "meta": { "timestamp", "requestId" } }`；
//! - 业务失败：`{ "error": { "code", "message", "details"? } }`，状态码取自 [`ErrorType`]；
//! - 故障：统一为不含内部细节的 500，原始故障只写入日志。
//!
use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use biz_domain::{BizError, BizResult, ErrorType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

/// 故障对外的统一错误码
pub const SERVER_ERROR_CODE: &str = "Server.Error";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ErrorPayload>>,
}

impl From<&BizError> for ErrorPayload {
    fn from(err: &BizError) -> Self {
        let details = (!err.details().is_empty())
            .then(|| err.details().iter().map(ErrorPayload::from).collect());
        Self {
            code: err.code().to_string(),
            message: err.message().to_string(),
            details,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponseBody<T> {
    Data { data: T, meta: ResponseMeta },
    Error { error: ErrorPayload },
}

/// 带 HTTP 状态码的响应信封
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub body: ResponseBody<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn from_outcome(ctx: &AppContext, outcome: AppResult<T>) -> Self {
        match outcome.map(BizResult::into_result) {
            Ok(Ok(data)) => Self {
                status: 200,
                body: ResponseBody::Data {
                    data,
                    meta: ResponseMeta {
                        timestamp: Utc::now(),
                        request_id: ctx.request_id(),
                    },
                },
            },
            Ok(Err(err)) => Self::failure(&err),
            Err(fault) => Self::fault(ctx, &fault),
        }
    }

    pub fn failure(err: &BizError) -> Self {
        Self {
            status: err.error_type().http_status(),
            body: ResponseBody::Error {
                error: ErrorPayload::from(err),
            },
        }
    }

    fn fault(ctx: &AppContext, fault: &AppError) -> Self {
        error!(request_id = %ctx.request_id(), error = %fault, "request failed with fault");
        Self {
            status: ErrorType::Problem.http_status(),
            body: ResponseBody::Error {
                error: ErrorPayload {
                    code: SERVER_ERROR_CODE.to_string(),
                    message: "An unexpected error occurred".to_string(),
                    details: None,
                },
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.body, ResponseBody::Data { .. })
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&self.body)
    }
}
