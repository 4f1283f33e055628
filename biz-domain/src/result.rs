//! 业务结果类型
//!
//! 以值的形式表达成功/失败：
//! - 成功：携带成功值，仅在成功时可访问；
//! - 失败：携带业务错误，错误类型必定不是 [`ErrorType::None`]。
//!
//! 内部状态私有，失败只能经 [`BizResult::failure`] 构造；
//! 需要分支处理时使用 [`BizResult::into_result`] 或 [`BizResult::as_error`]。
//!
//! 基础设施故障不属于该通道，由应用层的故障类型经 `?` 传播。
//!
use crate::error::{BizError, ErrorType};

/// 业务结果
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct BizResult<T = ()> {
    outcome: Outcome<T>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome<T> {
    Success(T),
    Failure(BizError),
}

impl BizResult<()> {
    /// 无返回值的成功结果
    pub fn ok() -> Self {
        Self::success(())
    }
}

impl<T> BizResult<T> {
    pub fn success(value: T) -> Self {
        Self {
            outcome: Outcome::Success(value),
        }
    }

    /// 构造失败结果
    ///
    /// # Panics
    ///
    /// 传入成功哨兵 [`BizError::none`] 属于编程错误，直接 panic。
    pub fn failure(error: BizError) -> Self {
        assert!(
            error.error_type() != ErrorType::None,
            "BizResult::failure requires a real error, got the success sentinel"
        );
        Self {
            outcome: Outcome::Failure(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failure(_))
    }

    /// 成功值的引用；失败时为 `None`
    pub fn value(&self) -> Option<&T> {
        match &self.outcome {
            Outcome::Success(v) => Some(v),
            Outcome::Failure(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self.outcome {
            Outcome::Success(v) => Some(v),
            Outcome::Failure(_) => None,
        }
    }

    /// 失败时返回错误；成功时返回成功哨兵
    pub fn error(&self) -> BizError {
        match &self.outcome {
            Outcome::Success(_) => BizError::none(),
            Outcome::Failure(e) => e.clone(),
        }
    }

    pub fn as_error(&self) -> Option<&BizError> {
        match &self.outcome {
            Outcome::Success(_) => None,
            Outcome::Failure(e) => Some(e),
        }
    }

    /// 取出成功值
    ///
    /// # Panics
    ///
    /// 在失败结果上访问成功值属于编程错误。
    pub fn unwrap(self) -> T {
        match self.outcome {
            Outcome::Success(v) => v,
            Outcome::Failure(e) => panic!("called `BizResult::unwrap()` on a failure: {e}"),
        }
    }

    pub fn unwrap_err(self) -> BizError {
        match self.outcome {
            Outcome::Success(_) => panic!("called `BizResult::unwrap_err()` on a success"),
            Outcome::Failure(e) => e,
        }
    }

    pub fn map<U, F>(self, f: F) -> BizResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self.outcome {
            Outcome::Success(v) => BizResult::success(f(v)),
            Outcome::Failure(e) => BizResult {
                outcome: Outcome::Failure(e),
            },
        }
    }

    pub fn map_err<F>(self, f: F) -> BizResult<T>
    where
        F: FnOnce(BizError) -> BizError,
    {
        match self.outcome {
            Outcome::Success(v) => BizResult::success(v),
            Outcome::Failure(e) => BizResult::failure(f(e)),
        }
    }

    pub fn and_then<U, F>(self, f: F) -> BizResult<U>
    where
        F: FnOnce(T) -> BizResult<U>,
    {
        match self.outcome {
            Outcome::Success(v) => f(v),
            Outcome::Failure(e) => BizResult {
                outcome: Outcome::Failure(e),
            },
        }
    }

    pub fn into_result(self) -> Result<T, BizError> {
        match self.outcome {
            Outcome::Success(v) => Ok(v),
            Outcome::Failure(e) => Err(e),
        }
    }
}

impl<T> From<BizResult<T>> for Result<T, BizError> {
    fn from(result: BizResult<T>) -> Self {
        result.into_result()
    }
}

impl<T> From<BizError> for BizResult<T> {
    fn from(error: BizError) -> Self {
        BizResult::failure(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_exposes_value_and_no_error() {
        let result = BizResult::success(42);
        assert!(result.is_success());
        assert_eq!(result.value(), Some(&42));
        assert!(result.error().is_none());
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn failure_hides_value() {
        let result: BizResult<u32> =
            BizResult::failure(BizError::not_found("Business.NotFound", "not found"));
        assert!(result.is_failure());
        assert_eq!(result.value(), None);
        assert_eq!(result.error().code(), "Business.NotFound");
    }

    #[test]
    #[should_panic]
    fn failure_with_sentinel_panics() {
        let _ = BizResult::<()>::failure(BizError::none());
    }

    #[test]
    #[should_panic]
    fn unwrap_on_failure_panics() {
        let result: BizResult<u32> = BizResult::failure(BizError::problem("X.Y", "boom"));
        result.unwrap();
    }

    #[test]
    fn map_keeps_failure() {
        let result: BizResult<u32> = BizResult::failure(BizError::conflict("A.B", "conflict"));
        let mapped = result.map(|v| v * 2);
        assert_eq!(mapped.unwrap_err().code(), "A.B");

        let ok = BizResult::success(21).map(|v| v * 2);
        assert_eq!(ok.into_result(), Ok(42));
    }

    #[test]
    #[should_panic]
    fn sentinel_cannot_become_a_failure_through_from() {
        let _: BizResult<u32> = BizError::none().into();
    }

    #[test]
    #[should_panic]
    fn map_err_cannot_produce_the_sentinel() {
        let result: BizResult<u32> = BizResult::failure(BizError::problem("X.Y", "boom"));
        let _ = result.map_err(|_| BizError::none());
    }

    #[test]
    fn failure_branch_is_reached_through_into_result() {
        let result: BizResult<u32> = BizResult::failure(BizError::conflict("A.B", "conflict"));
        assert!(result.as_error().is_some_and(|e| !e.is_none()));
        match result.into_result() {
            Ok(_) => panic!("expected a failure"),
            Err(err) => assert_eq!(err.error_type(), ErrorType::Conflict),
        }
    }
}
