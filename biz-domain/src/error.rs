//! 业务错误模型
//!
//! 预期内的业务失败（校验不通过、资源不存在、状态冲突等）以值的形式
//! 通过 [`BizResult`](crate::result::BizResult) 向外流动，不走异常/故障通道。
//! `code` 为稳定的机器可读标识（点分命名空间，如 `"Business.NotFound"`），
//! `message` 为面向人的描述。
//!
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// 错误分类
///
/// 边界层依赖该分类决定传输层状态码，见 [`ErrorType::http_status`]。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    /// 成功哨兵，永远不会与失败结果配对
    #[default]
    None,
    /// 调用方输入不合法，修正后可重试
    Validation,
    /// 引用的实体不存在
    NotFound,
    /// 状态或唯一性冲突
    Conflict,
    /// 未归类的领域失败
    Problem,
}

impl ErrorType {
    /// 建议的 HTTP 状态码
    pub const fn http_status(&self) -> u16 {
        match self {
            ErrorType::Validation => 400,
            ErrorType::NotFound => 404,
            ErrorType::Conflict => 409,
            ErrorType::Problem | ErrorType::None => 500,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorType::None => "None",
            ErrorType::Validation => "Validation",
            ErrorType::NotFound => "NotFound",
            ErrorType::Conflict => "Conflict",
            ErrorType::Problem => "Problem",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 业务错误值
///
/// 创建后不可变；校验失败时 `details` 按规则顺序携带逐字段的子错误。
/// 反序列化拒绝 `"type": "None"`，成功哨兵只能由 [`BizError::none`] 得到。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(try_from = "BizErrorRepr")]
#[error("[{code}] {message}")]
pub struct BizError {
    code: Cow<'static, str>,
    message: Cow<'static, str>,
    #[serde(rename = "type")]
    error_type: ErrorType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    details: Vec<BizError>,
}

#[derive(Deserialize)]
struct BizErrorRepr {
    code: Cow<'static, str>,
    message: Cow<'static, str>,
    #[serde(rename = "type")]
    error_type: ErrorType,
    #[serde(default)]
    details: Vec<BizError>,
}

impl TryFrom<BizErrorRepr> for BizError {
    type Error = &'static str;

    fn try_from(repr: BizErrorRepr) -> Result<Self, Self::Error> {
        if repr.error_type == ErrorType::None {
            return Err("error type `None` is the success sentinel and cannot be deserialized");
        }
        Ok(Self {
            code: repr.code,
            message: repr.message,
            error_type: repr.error_type,
            details: repr.details,
        })
    }
}

impl BizError {
    /// 成功哨兵
    pub fn none() -> Self {
        Self::new("", "", ErrorType::None)
    }

    fn new(
        code: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
        error_type: ErrorType,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            error_type,
            details: Vec::new(),
        }
    }

    pub fn validation(
        code: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(code, message, ErrorType::Validation)
    }

    pub fn not_found(
        code: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(code, message, ErrorType::NotFound)
    }

    pub fn conflict(
        code: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(code, message, ErrorType::Conflict)
    }

    pub fn problem(
        code: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(code, message, ErrorType::Problem)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    /// 子错误（仅校验错误非空）
    pub fn details(&self) -> &[BizError] {
        &self.details
    }

    pub fn is_none(&self) -> bool {
        self.error_type == ErrorType::None
    }
}

impl AsRef<str> for BizError {
    fn as_ref(&self) -> &str {
        self.code()
    }
}

impl From<BizError> for String {
    fn from(err: BizError) -> Self {
        err.code.into_owned()
    }
}

impl From<&BizError> for String {
    fn from(err: &BizError) -> Self {
        err.code().to_owned()
    }
}

/// 校验错误：聚合一次校验中全部失败的规则
///
/// 保证至少包含一个子错误，顺序与规则执行顺序一致。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    errors: Vec<BizError>,
}

impl ValidationError {
    pub const CODE: &'static str = "Validation.Error";
    pub const MESSAGE: &'static str = "One or more validation errors occurred.";

    /// 由子错误构造；为空时返回 `None`
    pub fn new(errors: Vec<BizError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    pub fn errors(&self) -> &[BizError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<BizError> {
        self.errors
    }
}

impl From<ValidationError> for BizError {
    fn from(err: ValidationError) -> Self {
        BizError {
            code: Cow::Borrowed(ValidationError::CODE),
            message: Cow::Borrowed(ValidationError::MESSAGE),
            error_type: ErrorType::Validation,
            details: err.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factories_tag_error_type() {
        assert_eq!(
            BizError::validation("Service.Name", "required").error_type(),
            ErrorType::Validation
        );
        assert_eq!(
            BizError::not_found("Business.NotFound", "missing").error_type(),
            ErrorType::NotFound
        );
        assert_eq!(
            BizError::conflict("Staff.EmailTaken", "taken").error_type(),
            ErrorType::Conflict
        );
        assert_eq!(
            BizError::problem("Schedule.Overlap", "overlap").error_type(),
            ErrorType::Problem
        );
    }

    #[test]
    fn none_is_the_success_sentinel() {
        let none = BizError::none();
        assert!(none.is_none());
        assert_eq!(none.code(), "");
        assert_eq!(none.error_type().http_status(), 500);
    }

    #[test]
    fn validation_error_preserves_order() {
        let first = BizError::validation("Service.Name", "Name is required");
        let second = BizError::validation("Service.Price", "Price must be positive");

        let aggregated: BizError = ValidationError::new(vec![first.clone(), second.clone()])
            .unwrap()
            .into();

        assert_eq!(aggregated.code(), "Validation.Error");
        assert_eq!(aggregated.error_type(), ErrorType::Validation);
        assert_eq!(aggregated.details(), &[first, second]);
    }

    #[test]
    fn empty_validation_error_is_rejected() {
        assert!(ValidationError::new(Vec::new()).is_none());
    }

    #[test]
    fn converts_to_code_string() {
        let err = BizError::not_found("Business.NotFound", "Business was not found");
        let code: String = (&err).into();
        assert_eq!(code, "Business.NotFound");
        assert_eq!(err.as_ref(), "Business.NotFound");
        assert_eq!(String::from(err), "Business.NotFound");
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(ErrorType::Validation.http_status(), 400);
        assert_eq!(ErrorType::NotFound.http_status(), 404);
        assert_eq!(ErrorType::Conflict.http_status(), 409);
        assert_eq!(ErrorType::Problem.http_status(), 500);
    }

    #[test]
    fn serializes_with_type_tag() {
        let err = BizError::conflict("Business.Duplicate", "Business already exists");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "Business.Duplicate");
        assert_eq!(json["type"], "Conflict");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn deserializes_real_errors_with_details() {
        let err: BizError = serde_json::from_value(serde_json::json!({
            "code": "Validation.Error",
            "message": "One or more validation errors occurred.",
            "type": "Validation",
            "details": [{"code": "Service.Name", "message": "required", "type": "Validation"}]
        }))
        .unwrap();

        assert_eq!(err.error_type(), ErrorType::Validation);
        assert_eq!(err.details()[0].code(), "Service.Name");
    }

    #[test]
    fn sentinel_type_is_rejected_on_deserialize() {
        let top_level = serde_json::from_value::<BizError>(serde_json::json!({
            "code": "", "message": "", "type": "None"
        }));
        assert!(top_level.is_err());

        let nested = serde_json::from_value::<BizError>(serde_json::json!({
            "code": "Validation.Error",
            "message": "invalid",
            "type": "Validation",
            "details": [{"code": "", "message": "", "type": "None"}]
        }));
        assert!(nested.is_err());
    }
}
