use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A scheduled occurrence of a course.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "class_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub status: SessionStatus,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SessionStatus {
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "completed")]
    Completed,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    Records,
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Records.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create(
        db: &DbConn,
        id: &str,
        course_id: &str,
        title: &str,
        start_at: DateTime<Utc>,
        status: SessionStatus,
    ) -> Result<Model, DbErr> {
        ActiveModel {
            id: Set(id.to_owned()),
            course_id: Set(course_id.to_owned()),
            title: Set(title.to_owned()),
            start_at: Set(start_at),
            status: Set(status),
        }
        .insert(db)
        .await
    }

    pub async fn find(db: &DbConn, id: &str) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(id.to_owned()).one(db).await
    }

    pub async fn set_status(db: &DbConn, id: &str, status: SessionStatus) -> Result<Model, DbErr> {
        ActiveModel {
            id: Set(id.to_owned()),
            status: Set(status),
            ..Default::default()
        }
        .update(db)
        .await
    }
}
