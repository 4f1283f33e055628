use async_trait::async_trait;
use biz_application::command_bus::CommandBus;
use biz_application::command_handler::CommandHandler;
use biz_application::context::TENANT_HEADER;
use biz_application::logging::init_logging;
use biz_application::query_bus::QueryBus;
use biz_application::query_handler::QueryHandler;
use biz_application::transaction::InMemoryTransaction;
use biz_application::validator::{RuleValidator, Validators};
use biz_application::{
    ApiResponse, AppContext, AppError, AppResult, ConfigLoader, InMemoryStore, Mediator,
    Pipeline, StoreTransactionManager,
};
use biz_domain::{BizError, BizResult};
use biz_macros::{command, query};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[command(name = "Catalog.CreateService", output = Uuid)]
#[derive(Debug, Clone)]
struct CreateService {
    name: String,
    duration_minutes: u32,
    price_cents: i64,
}

#[command(name = "Catalog.DeleteService")]
#[derive(Debug, Clone)]
struct DeleteService {
    id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServiceDto {
    id: Uuid,
    business_id: Uuid,
    name: String,
    duration_minutes: u32,
    price_cents: i64,
}

#[query(name = "Catalog.GetService", dto = ServiceDto)]
#[derive(Debug, Clone)]
struct GetService {
    id: Uuid,
}

fn service_key(id: Uuid) -> String {
    format!("service:{id}")
}

fn service_name_key(business_id: Uuid, name: &str) -> String {
    format!("service-name:{business_id}:{}", name.trim().to_lowercase())
}

// 删除以 `null` 墓碑表示
fn live(value: Option<serde_json::Value>) -> Option<serde_json::Value> {
    value.filter(|v| !v.is_null())
}

fn service_not_found(id: Uuid) -> BizError {
    BizError::not_found("Service.NotFound", format!("Service {id} was not found"))
}

fn decode(value: serde_json::Value) -> Result<ServiceDto, AppError> {
    serde_json::from_value(value).map_err(|e| AppError::Infra(format!("corrupt service record: {e}")))
}

fn encode(dto: &ServiceDto) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(dto).map_err(|e| AppError::Infra(e.to_string()))
}

struct CatalogCommandHandler;

#[async_trait]
impl CommandHandler<CreateService> for CatalogCommandHandler {
    async fn handle(&self, ctx: &AppContext, cmd: &CreateService) -> AppResult<Uuid> {
        let business_id = ctx.tenant().get_current_business_id()?;
        let tx = ctx.transaction_handle::<InMemoryTransaction>()?;

        let name_key = service_name_key(business_id, &cmd.name);
        if live(tx.get(&name_key)).is_some() {
            return Ok(BizResult::failure(BizError::conflict(
                "Service.Name.Taken",
                format!("A service named '{}' already exists", cmd.name.trim()),
            )));
        }

        let service = ServiceDto {
            id: Uuid::new_v4(),
            business_id,
            name: cmd.name.trim().to_string(),
            duration_minutes: cmd.duration_minutes,
            price_cents: cmd.price_cents,
        };
        tx.put(service_key(service.id), encode(&service)?)?;
        tx.put(name_key, serde_json::Value::String(service.id.to_string()))?;

        Ok(BizResult::success(service.id))
    }
}

#[async_trait]
impl CommandHandler<DeleteService> for CatalogCommandHandler {
    async fn handle(&self, ctx: &AppContext, cmd: &DeleteService) -> AppResult<()> {
        let business_id = ctx.tenant().get_current_business_id()?;
        let tx = ctx.transaction_handle::<InMemoryTransaction>()?;

        let Some(raw) = live(tx.get(&service_key(cmd.id))) else {
            return Ok(BizResult::failure(service_not_found(cmd.id)));
        };
        let service = decode(raw)?;
        if service.business_id != business_id {
            return Ok(BizResult::failure(service_not_found(cmd.id)));
        }

        tx.put(service_key(cmd.id), serde_json::Value::Null)?;
        tx.put(
            service_name_key(business_id, &service.name),
            serde_json::Value::Null,
        )?;
        Ok(BizResult::ok())
    }
}

struct CatalogQueryHandler {
    store: Arc<InMemoryStore>,
}

#[async_trait]
impl QueryHandler<GetService> for CatalogQueryHandler {
    async fn handle(&self, ctx: &AppContext, q: &GetService) -> AppResult<ServiceDto> {
        let business_id = ctx.tenant().get_current_business_id()?;

        let service = match live(self.store.get(&service_key(q.id))) {
            Some(raw) => Some(decode(raw)?),
            None => None,
        };

        match service {
            Some(service) if service.business_id == business_id => Ok(BizResult::success(service)),
            _ => Ok(BizResult::failure(service_not_found(q.id))),
        }
    }
}

fn catalog_validators() -> Validators {
    Validators::new().register::<CreateService, _>(
        RuleValidator::<CreateService>::new()
            .rule("Service.Name.Required", "Name is required", |c| {
                !c.name.trim().is_empty()
            })
            .rule(
                "Service.Name.TooLong",
                "Name must be at most 100 characters",
                |c| c.name.chars().count() <= 100,
            )
            .rule(
                "Service.Duration.Positive",
                "Duration must be positive",
                |c| c.duration_minutes > 0,
            )
            .rule(
                "Service.Price.Negative",
                "Price must not be negative",
                |c| c.price_cents >= 0,
            ),
    )
}

/// 模拟边界层：每个入站请求新建上下文，解析租户头并写入当前用户
fn request_context(tenant_header: Option<&str>) -> Result<AppContext, AppError> {
    let mut ctx = AppContext::builder()
        .maybe_correlation_id(Some(Uuid::new_v4().to_string()))
        .build();
    ctx.current_user_mut()
        .set(Some(Uuid::new_v4()), Some("demo|operator".into()))?;
    ctx.tenant_mut().resolve_from_header(tenant_header)?;
    Ok(ctx)
}

fn print_response<T: Serialize>(title: &str, response: &ApiResponse<T>) -> serde_json::Result<()> {
    println!("== {title} -> {}", response.status);
    println!("{}", serde_json::to_string_pretty(&response.to_json()?)?);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("catalog-demo");

    let config = ConfigLoader::new().load()?;
    let store = Arc::new(InMemoryStore::new());
    let manager = Arc::new(StoreTransactionManager::from_config(store.clone(), &config));

    let mediator = Mediator::builder()
        .command::<CreateService, _>(Arc::new(CatalogCommandHandler))?
        .command::<DeleteService, _>(Arc::new(CatalogCommandHandler))?
        .query::<GetService, _>(Arc::new(CatalogQueryHandler {
            store: store.clone(),
        }))?
        .behaviors(Pipeline::standard(&config, catalog_validators(), manager))
        .build()?;

    let business_id = Uuid::new_v4().to_string();
    info!(header = TENANT_HEADER, %business_id, "catalog demo started");

    // 1) 创建服务
    let ctx = request_context(Some(&business_id))?;
    let create = CreateService {
        name: "Haircut".into(),
        duration_minutes: 30,
        price_cents: 2500,
    };
    let outcome = mediator.send(&ctx, create.clone()).await;
    let created = outcome
        .as_ref()
        .ok()
        .and_then(|r| r.value().copied());
    print_response("create service", &ApiResponse::from_outcome(&ctx, outcome))?;

    // 2) 校验失败：不会进入处理器，也不会开启事务
    let ctx = request_context(Some(&business_id))?;
    let invalid = CreateService {
        name: "  ".into(),
        duration_minutes: 0,
        price_cents: 2500,
    };
    let outcome = mediator.send(&ctx, invalid).await;
    print_response("create invalid service", &ApiResponse::from_outcome(&ctx, outcome))?;

    // 3) 名称冲突
    let ctx = request_context(Some(&business_id))?;
    let outcome = mediator.send(&ctx, create).await;
    print_response("create duplicate service", &ApiResponse::from_outcome(&ctx, outcome))?;

    // 4) 查询
    if let Some(id) = created {
        let ctx = request_context(Some(&business_id))?;
        let outcome = mediator.query(&ctx, GetService { id }).await;
        print_response("get service", &ApiResponse::from_outcome(&ctx, outcome))?;

        let ctx = request_context(Some(&business_id))?;
        let outcome = mediator.send(&ctx, DeleteService { id }).await;
        print_response("delete service", &ApiResponse::from_outcome(&ctx, outcome))?;
    }

    // 5) 不存在的服务
    let ctx = request_context(Some(&business_id))?;
    let outcome = mediator.send(&ctx, DeleteService { id: Uuid::new_v4() }).await;
    print_response("delete missing service", &ApiResponse::from_outcome(&ctx, outcome))?;

    // 6) 缺少租户头：处理器要求租户，故障映射为 500
    let ctx = request_context(Some("not-a-uuid"))?;
    let outcome = mediator.query(&ctx, GetService { id: Uuid::new_v4() }).await;
    print_response("get without tenant", &ApiResponse::from_outcome(&ctx, outcome))?;

    info!(
        begun = store.begun(),
        committed = store.committed(),
        rolled_back = store.rolled_back(),
        "catalog demo finished"
    );
    Ok(())
}
