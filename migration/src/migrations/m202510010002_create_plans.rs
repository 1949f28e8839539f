use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202510010002_create_plans"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // plans
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("plans"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("student_id"))
                            .string_len(36)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("name")).string().not_null())
                    .col(
                        ColumnDef::new(Alias::new("status"))
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(Alias::new("start_date")).timestamp().not_null())
                    .col(ColumnDef::new(Alias::new("end_date")).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_plans_student")
                            .from(Alias::new("plans"), Alias::new("student_id"))
                            .to(Alias::new("students"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_plans_student_status")
                    .table(Alias::new("plans"))
                    .col(Alias::new("student_id"))
                    .col(Alias::new("status"))
                    .to_owned(),
            )
            .await?;

        // plan_courses (no rows for a plan = unrestricted)
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("plan_courses"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("plan_id"))
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("course_id"))
                            .string_len(36)
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(Alias::new("plan_id"))
                            .col(Alias::new("course_id")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_plan_courses_plan")
                            .from(Alias::new("plan_courses"), Alias::new("plan_id"))
                            .to(Alias::new("plans"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("plan_courses")).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Alias::new("plans")).to_owned())
            .await
    }
}
