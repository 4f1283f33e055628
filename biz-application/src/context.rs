use crate::error::AppError;
use crate::transaction::ActiveTransaction;
use bon::Builder;
use std::any::{Any, type_name};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 租户请求头
pub const TENANT_HEADER: &str = "X-Business-Id";

/// 当前用户
///
/// 由边界层在认证后写入一次：外部身份声明解析为本地用户 ID。
/// 本地用户可能尚未建立（如注册流程），因此两项均可为空。
#[derive(Clone, Debug, Default)]
pub struct CurrentUserProvider {
    is_set: bool,
    user_id: Option<Uuid>,
    external_id: Option<String>,
}

impl CurrentUserProvider {
    /// 写入当前用户；同一请求内重复写入视为上下文复用缺陷
    pub fn set(
        &mut self,
        user_id: Option<Uuid>,
        external_id: Option<String>,
    ) -> Result<(), AppError> {
        if self.is_set {
            return Err(AppError::InvalidOperation(
                "current user has already been set for this request".into(),
            ));
        }
        self.is_set = true;
        self.user_id = user_id;
        self.external_id = external_id;
        Ok(())
    }

    pub fn is_set(&self) -> bool {
        self.is_set
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn require_user_id(&self) -> Result<Uuid, AppError> {
        self.user_id.ok_or_else(|| {
            AppError::InvalidOperation("no local user is associated with this request".into())
        })
    }
}

/// 当前租户（业务主体）
///
/// 每个请求只允许一次解析尝试：即便请求头缺失或非法，
/// 之后的再次解析同样视为上下文复用缺陷。
#[derive(Clone, Debug, Default)]
pub struct TenantProvider {
    attempted: bool,
    business_id: Option<Uuid>,
}

impl TenantProvider {
    pub fn set(&mut self, business_id: Uuid) -> Result<(), AppError> {
        self.begin_resolution()?;
        self.business_id = Some(business_id);
        Ok(())
    }

    /// 从 `X-Business-Id` 请求头解析租户
    ///
    /// 缺失或非法的值保持未解析状态（返回 `Ok(None)`），
    /// 需要租户的处理器通过 [`Self::get_current_business_id`] 显式要求。
    pub fn resolve_from_header(&mut self, header: Option<&str>) -> Result<Option<Uuid>, AppError> {
        self.begin_resolution()?;
        let parsed = header.and_then(|raw| Uuid::parse_str(raw.trim()).ok());
        self.business_id = parsed;
        Ok(parsed)
    }

    /// 是否已经尝试过解析（无论成功与否）
    pub fn is_attempted(&self) -> bool {
        self.attempted
    }

    fn begin_resolution(&mut self) -> Result<(), AppError> {
        if self.attempted {
            return Err(AppError::InvalidOperation(
                "tenant has already been resolved for this request".into(),
            ));
        }
        self.attempted = true;
        Ok(())
    }

    pub fn get_current_business_id(&self) -> Result<Uuid, AppError> {
        self.business_id.ok_or_else(|| {
            AppError::TenantUnresolved(format!("missing or invalid {TENANT_HEADER} header"))
        })
    }

    pub fn try_get_current_business_id(&self) -> Option<Uuid> {
        self.business_id
    }
}

/// 请求上下文（Request Context）
///
/// 承载一次入站请求所需的横切信息，并显式传递给每个行为与处理器：
/// - 当前用户（[`CurrentUserProvider`]）与租户（[`TenantProvider`]），每个请求最多写入一次；
/// - 追踪信息：`request_id`、`correlation_id`；
/// - 取消信号：外部取消后，管道在下一步骤前中止，事务回滚而不提交；
/// - 当前事务：由事务管理器在事务内部传入，支持重入判断。
///
/// 上下文不得跨请求复用；每个入站请求创建一个新实例。
///
/// 典型用法：
/// ```rust
/// use biz_application::context::AppContext;
/// use uuid::Uuid;
///
/// let mut ctx = AppContext::builder()
///     .maybe_correlation_id(Some("cor-123".into()))
///     .build();
/// ctx.current_user_mut()
///     .set(Some(Uuid::new_v4()), Some("auth0|42".into()))
///     .unwrap();
/// ctx.tenant_mut()
///     .resolve_from_header(Some("6f1c2d1e-54b9-4c1e-9a58-1d7d3c1b2a90"))
///     .unwrap();
/// assert!(ctx.tenant().get_current_business_id().is_ok());
/// ```
#[derive(Builder, Clone, Debug)]
pub struct AppContext {
    /// 请求 ID（默认随机生成）
    #[builder(default = Uuid::new_v4())]
    request_id: Uuid,
    /// 关联 ID（链路追踪）
    correlation_id: Option<String>,
    #[builder(default)]
    current_user: CurrentUserProvider,
    #[builder(default)]
    tenant: TenantProvider,
    #[builder(default = CancellationToken::new())]
    cancellation: CancellationToken,
    #[builder(skip)]
    transaction: Option<ActiveTransaction>,
}

impl Default for AppContext {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AppContext {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn current_user(&self) -> &CurrentUserProvider {
        &self.current_user
    }

    pub fn current_user_mut(&mut self) -> &mut CurrentUserProvider {
        &mut self.current_user
    }

    pub fn tenant(&self) -> &TenantProvider {
        &self.tenant
    }

    pub fn tenant_mut(&mut self) -> &mut TenantProvider {
        &mut self.tenant
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// 已取消时返回 [`AppError::Cancelled`]
    pub fn ensure_active(&self) -> Result<(), AppError> {
        if self.is_cancelled() {
            Err(AppError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// 当前活动事务（仅在事务内部可见）
    pub fn transaction(&self) -> Option<&ActiveTransaction> {
        self.transaction.as_ref()
    }

    /// 取出当前事务的后端句柄，供处理器在同一事务中读写
    pub fn transaction_handle<H>(&self) -> Result<Arc<H>, AppError>
    where
        H: Any + Send + Sync,
    {
        let tx = self
            .transaction
            .as_ref()
            .ok_or_else(|| AppError::InvalidOperation("no active transaction".into()))?;

        tx.handle::<H>().ok_or(AppError::TypeMismatch {
            expected: type_name::<H>(),
            found: "unknown",
        })
    }

    pub(crate) fn with_transaction(&self, tx: ActiveTransaction) -> Self {
        Self {
            transaction: Some(tx),
            ..self.clone()
        }
    }
}
