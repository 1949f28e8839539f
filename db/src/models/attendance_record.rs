//! Durable attendance records.
//!
//! A record is written once per (student, session, calendar day) and never
//! updated afterwards. Uniqueness is enforced by the unique index on
//! `integrity_fingerprint`, so concurrent writers racing on the same
//! fingerprint resolve inside the database rather than in application memory.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::{PaginatorTrait, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "attendance_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub student_id: String,
    pub session_id: String,
    pub course_id: String,
    /// The active plan that authorised this check-in.
    pub plan_id: String,
    pub checked_at: DateTime<Utc>,
    pub source: Source,
    pub status: AttendanceStatus,
    #[sea_orm(unique)]
    pub integrity_fingerprint: String,
    pub device_meta: Option<Json>,
}

/// Who initiated the check-in.
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
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Source {
    /// The student checked in on their own (kiosk or phone).
    #[sea_orm(string_value = "self_service")]
    #[serde(rename = "SELF")]
    #[strum(serialize = "self_service")]
    SelfService,
    /// Front-desk staff recorded it on the student's behalf.
    #[sea_orm(string_value = "operator")]
    #[serde(rename = "OPERATOR")]
    Operator,
    /// Automated or integration caller.
    #[sea_orm(string_value = "api")]
    #[serde(rename = "API")]
    Api,
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
pub enum AttendanceStatus {
    #[sea_orm(string_value = "present")]
    Present,
    #[sea_orm(string_value = "late")]
    Late,
    #[sea_orm(string_value = "absent")]
    Absent,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::class_session::Entity",
        from = "Column::SessionId",
        to = "super::class_session::Column::Id"
    )]
    Session,
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::StudentId",
        to = "super::student::Column::Id"
    )]
    Student,
}

impl Related<super::class_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn find_by_fingerprint(db: &DbConn, fingerprint: &str) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::IntegrityFingerprint.eq(fingerprint))
            .one(db)
            .await
    }

    /// Inserts `record` unless a row with the same fingerprint already exists.
    ///
    /// Returns the committed row and whether this call inserted it. A losing
    /// writer gets the winner's row back with `false`.
    pub async fn insert_if_absent(db: &DbConn, record: ActiveModel) -> Result<(Model, bool), DbErr> {
        let fingerprint = match &record.integrity_fingerprint {
            sea_orm::ActiveValue::Set(fp) | sea_orm::ActiveValue::Unchanged(fp) => fp.clone(),
            sea_orm::ActiveValue::NotSet => {
                return Err(DbErr::Custom("integrity_fingerprint must be set".into()));
            }
        };

        let affected = Entity::insert(record)
            .on_conflict(
                OnConflict::column(Column::IntegrityFingerprint)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;

        let stored = Self::find_by_fingerprint(db, &fingerprint)
            .await?
            .ok_or_else(|| {
                DbErr::RecordNotFound(format!("attendance record {fingerprint} vanished after insert"))
            })?;

        Ok((stored, affected > 0))
    }

    /// Number of records for `student_id` with `checked_at` in `[from, to)`.
    pub async fn count_between(
        db: &DbConn,
        student_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        Entity::find()
            .filter(Column::StudentId.eq(student_id))
            .filter(Column::CheckedAt.gte(from))
            .filter(Column::CheckedAt.lt(to))
            .count(db)
            .await
    }

    /// Check-in timestamps for `student_id` since `since`, newest first.
    pub async fn checked_at_since(
        db: &DbConn,
        student_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, DbErr> {
        Entity::find()
            .select_only()
            .column(Column::CheckedAt)
            .filter(Column::StudentId.eq(student_id))
            .filter(Column::CheckedAt.gte(since))
            .order_by_desc(Column::CheckedAt)
            .into_tuple::<DateTime<Utc>>()
            .all(db)
            .await
    }

    pub async fn for_student_session(
        db: &DbConn,
        student_id: &str,
        session_id: &str,
    ) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::StudentId.eq(student_id))
            .filter(Column::SessionId.eq(session_id))
            .order_by_asc(Column::CheckedAt)
            .all(db)
            .await
    }
}
