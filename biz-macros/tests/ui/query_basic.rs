use biz_application::query::Query;
use biz_macros::query;
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize)]
struct ServiceDto {
    id: Uuid,
    name: String,
}

#[query(name = "Catalog.GetService", dto = ServiceDto)]
struct GetService {
    id: Uuid,
}

#[query(dto = Vec<ServiceDto>)]
struct ListServices;

fn main() {
    assert_eq!(GetService::NAME, "Catalog.GetService");
    assert_eq!(ListServices::NAME, "ListServices");

    let q = GetService { id: Uuid::new_v4() };
    let dto: <GetService as Query>::Dto = ServiceDto { id: q.id, name: "Haircut".into() };
    let _ = dto.name;
    let _: <ListServices as Query>::Dto = Vec::new();
}
