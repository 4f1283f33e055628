use biz_application::command::Command;
use biz_macros::command;
use uuid::Uuid;

#[command(name = "Catalog.CreateService", output = Uuid)]
struct CreateService {
    name: String,
}

#[command]
struct ArchiveService {
    id: Uuid,
}

#[command(output = Vec<Uuid>)]
enum ReorderServices {
    ByName,
    ByPrice { descending: bool },
}

fn output_of<C: Command>(_: &C) -> &'static str {
    C::NAME
}

fn main() {
    let create = CreateService { name: "Haircut".into() };
    assert_eq!(output_of(&create), "Catalog.CreateService");
    let _ = create.name;

    let archive = ArchiveService { id: Uuid::new_v4() };
    assert_eq!(output_of(&archive), "ArchiveService");
    let _: <ArchiveService as Command>::Output = ();
    let _ = archive.id;

    let _: <ReorderServices as Command>::Output = vec![Uuid::new_v4()];
    let _ = [ReorderServices::ByName, ReorderServices::ByPrice { descending: true }];
}
