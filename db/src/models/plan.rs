//! Student membership plans and their course restrictions.

use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use sea_orm::{QueryOrder, TransactionTrait};
use serde::{Deserialize, Serialize};

use super::plan_course;

/// A subscription/membership held by a student.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plans")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub student_id: String,
    pub name: String,
    pub status: PlanStatus,
    /// First instant the plan is valid (inclusive).
    pub start_date: DateTime<Utc>,
    /// Last instant the plan is valid (inclusive).
    pub end_date: DateTime<Utc>,
}

/// Lifecycle status of a plan. Only `Active` plans can back a check-in.
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
pub enum PlanStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "suspended")]
    Suspended,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::StudentId",
        to = "super::student::Column::Id",
        on_delete = "Cascade"
    )]
    Student,
    #[sea_orm(has_many = "super::plan_course::Entity")]
    Courses,
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl Related<super::plan_course::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Courses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Inserts a plan together with its course whitelist in one transaction.
    /// An empty `course_ids` slice leaves the plan unrestricted.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        db: &DbConn,
        id: &str,
        student_id: &str,
        name: &str,
        status: PlanStatus,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        course_ids: &[&str],
    ) -> Result<Model, DbErr> {
        let txn = db.begin().await?;

        let plan = ActiveModel {
            id: Set(id.to_owned()),
            student_id: Set(student_id.to_owned()),
            name: Set(name.to_owned()),
            status: Set(status),
            start_date: Set(start_date),
            end_date: Set(end_date),
        }
        .insert(&txn)
        .await?;

        for course_id in course_ids {
            plan_course::ActiveModel {
                plan_id: Set(plan.id.clone()),
                course_id: Set((*course_id).to_owned()),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(plan)
    }

    /// Plans that are `Active` and whose validity window contains `now`,
    /// each paired with its course ids, oldest first.
    pub async fn active_with_courses(
        db: &DbConn,
        student_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<(Model, Vec<String>)>, DbErr> {
        let rows = Entity::find()
            .filter(Column::StudentId.eq(student_id))
            .filter(Column::Status.eq(PlanStatus::Active))
            .filter(Column::StartDate.lte(now))
            .filter(Column::EndDate.gte(now))
            .order_by_asc(Column::StartDate)
            .order_by_asc(Column::Id)
            .find_with_related(plan_course::Entity)
            .all(db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(plan, courses)| {
                let ids = courses.into_iter().map(|c| c.course_id).collect();
                (plan, ids)
            })
            .collect())
    }
}
