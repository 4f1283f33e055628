//! 请求校验器
//!
//! 校验规则内容由各业务模块提供，这里只定义执行约定：
//! - 一个请求类型可注册多个校验器，按注册顺序执行；
//! - 校验器返回全部失败规则，而不是遇到第一条就停止。
//!
use crate::pipeline::RequestInfo;
use biz_domain::BizError;
use std::any::{Any, TypeId, type_name};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

/// 请求校验器
pub trait Validator<R>: Send + Sync {
    /// 返回全部失败规则对应的错误；空表示通过
    fn validate(&self, request: &R) -> Vec<BizError>;
}

struct Rule<R> {
    code: Cow<'static, str>,
    message: Cow<'static, str>,
    check: Box<dyn Fn(&R) -> bool + Send + Sync>,
}

/// 由有序规则组成的校验器
///
/// ```rust
/// use biz_application::validator::{RuleValidator, Validator};
///
/// struct CreateService {
///     name: String,
///     duration_minutes: u32,
/// }
///
/// let validator = RuleValidator::<CreateService>::new()
///     .rule("Service.Name.Required", "Name is required", |c| !c.name.trim().is_empty())
///     .rule("Service.Duration.Positive", "Duration must be positive", |c| c.duration_minutes > 0);
///
/// let errors = validator.validate(&CreateService { name: "".into(), duration_minutes: 0 });
/// assert_eq!(errors.len(), 2);
/// assert_eq!(errors[0].code(), "Service.Name.Required");
/// ```
pub struct RuleValidator<R> {
    rules: Vec<Rule<R>>,
}

impl<R> Default for RuleValidator<R> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<R> RuleValidator<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条规则：`check` 返回 `true` 表示满足
    pub fn rule<F>(
        mut self,
        code: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
        check: F,
    ) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            code: code.into(),
            message: message.into(),
            check: Box::new(check),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<R> Validator<R> for RuleValidator<R> {
    fn validate(&self, request: &R) -> Vec<BizError> {
        self.rules
            .iter()
            .filter(|rule| !(rule.check)(request))
            .map(|rule| BizError::validation(rule.code.clone(), rule.message.clone()))
            .collect()
    }
}

type ErasedValidator = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Vec<BizError> + Send + Sync>;

/// 校验器注册表（按请求类型分组，启动时构建）
#[derive(Clone, Default)]
pub struct Validators {
    by_type: HashMap<TypeId, (&'static str, Vec<ErasedValidator>)>,
}

impl Validators {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为请求类型 `R` 追加一个校验器
    pub fn register<R, V>(mut self, validator: V) -> Self
    where
        R: Any + Send + Sync,
        V: Validator<R> + 'static,
    {
        let f: ErasedValidator = Arc::new(move |payload: &(dyn Any + Send + Sync)| {
            match payload.downcast_ref::<R>() {
                Some(request) => validator.validate(request),
                None => Vec::new(),
            }
        });

        self.by_type
            .entry(TypeId::of::<R>())
            .or_insert_with(|| (type_name::<R>(), Vec::new()))
            .1
            .push(f);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// 已注册校验器的请求类型
    pub fn registered_types(&self) -> impl Iterator<Item = (TypeId, &'static str)> + '_ {
        self.by_type.iter().map(|(id, (name, _))| (*id, *name))
    }

    pub(crate) fn validate(&self, request: &RequestInfo<'_>) -> Vec<BizError> {
        let Some((_, validators)) = self.by_type.get(&request.type_id()) else {
            return Vec::new();
        };

        validators
            .iter()
            .flat_map(|validate| validate(request.payload()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RequestKind;

    struct Rename {
        name: String,
    }

    struct NameLength;

    impl Validator<Rename> for NameLength {
        fn validate(&self, request: &Rename) -> Vec<BizError> {
            if request.name.len() > 5 {
                vec![BizError::validation("Rename.Name.TooLong", "Name is too long")]
            } else {
                Vec::new()
            }
        }
    }

    #[test]
    fn rules_report_every_failure_in_order() {
        let validator = RuleValidator::<Rename>::new()
            .rule("Rename.Name.Required", "Name is required", |r| !r.name.is_empty())
            .rule("Rename.Name.Ascii", "Name must be ascii", |r| r.name.is_ascii());

        assert!(validator.validate(&Rename { name: "ok".into() }).is_empty());

        let errors = validator.validate(&Rename {
            name: String::new(),
        });
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), "Rename.Name.Required");
    }

    #[test]
    fn registry_runs_validators_in_registration_order() {
        let validators = Validators::new()
            .register::<Rename, _>(RuleValidator::new().rule(
                "Rename.Name.Ascii",
                "Name must be ascii",
                |r: &Rename| r.name.is_ascii(),
            ))
            .register::<Rename, _>(NameLength);

        let request = Rename {
            name: "héllo wörld".into(),
        };
        let info = RequestInfo::new(
            "Rename",
            RequestKind::Command,
            TypeId::of::<Rename>(),
            &request,
        );

        let codes: Vec<String> = validators
            .validate(&info)
            .iter()
            .map(String::from)
            .collect();
        assert_eq!(codes, vec!["Rename.Name.Ascii", "Rename.Name.TooLong"]);
    }

    #[test]
    fn unregistered_type_passes() {
        let validators = Validators::new();
        let request = Rename {
            name: String::new(),
        };
        let info = RequestInfo::new(
            "Rename",
            RequestKind::Command,
            TypeId::of::<Rename>(),
            &request,
        );
        assert!(validators.validate(&info).is_empty());
    }
}
