//! SeaORM-backed collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::models::{attendance_record, class_session, plan, student};
use sea_orm::{ActiveModelTrait, DatabaseConnection, IntoActiveModel};

use crate::error::UpstreamError;
use crate::model::{AttendanceRecord, Plan, Session, Student};
use crate::sources::{
    AttendanceStore, Insertion, PlanDirectory, SessionDirectory, StudentDirectory,
};

/// Serves every lookup from the relational store. The unique index on
/// `integrity_fingerprint` makes `insert_if_absent` atomic across processes.
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StudentDirectory for SeaOrmStore {
    async fn student(&self, student_id: &str) -> Result<Student, UpstreamError> {
        student::Model::find(&self.db, student_id)
            .await?
            .ok_or_else(|| UpstreamError::not_found("student", student_id))
    }
}

#[async_trait]
impl SessionDirectory for SeaOrmStore {
    async fn session(&self, session_id: &str) -> Result<Session, UpstreamError> {
        class_session::Model::find(&self.db, session_id)
            .await?
            .ok_or_else(|| UpstreamError::not_found("session", session_id))
    }
}

#[async_trait]
impl PlanDirectory for SeaOrmStore {
    async fn active_plans(
        &self,
        student_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Plan>, UpstreamError> {
        let rows = plan::Model::active_with_courses(&self.db, student_id, now).await?;
        Ok(rows.into_iter().map(Plan::from).collect())
    }
}

#[async_trait]
impl AttendanceStore for SeaOrmStore {
    async fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<AttendanceRecord>, UpstreamError> {
        Ok(attendance_record::Model::find_by_fingerprint(&self.db, fingerprint).await?)
    }

    async fn insert_if_absent(&self, record: AttendanceRecord) -> Result<Insertion, UpstreamError> {
        let draft = record.into_active_model().reset_all();
        let (stored, inserted) = attendance_record::Model::insert_if_absent(&self.db, draft).await?;
        Ok(if inserted {
            Insertion::Inserted(stored)
        } else {
            Insertion::Existing(stored)
        })
    }

    async fn checked_at_since(
        &self,
        student_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, UpstreamError> {
        Ok(attendance_record::Model::checked_at_since(&self.db, student_id, since).await?)
    }

    async fn count_between(
        &self,
        student_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, UpstreamError> {
        Ok(attendance_record::Model::count_between(&self.db, student_id, from, to).await?)
    }
}
