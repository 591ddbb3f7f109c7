//! Data-store contract used by the attendance and payroll services.
//!
//! The services never talk to a database directly; they go through
//! [`HrStore`], which has a durable MySQL backend and an in-memory backend
//! for development and tests.
use crate::model::attendance::{AttendanceFilter, AttendanceSession, NewAttendance};
use crate::model::payroll::{NewPayroll, Payroll, PayrollStatus};
use crate::model::profile::Profile;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod memory;
pub mod mysql;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    /// The request never reached the store (connection, pool, I/O).
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait HrStore: Send + Sync {
    async fn get_profile(&self, user_id: u64) -> StoreResult<Option<Profile>>;

    /// Sessions matching `filter`, newest sign-in first.
    async fn list_attendance(&self, filter: &AttendanceFilter) -> StoreResult<Vec<AttendanceSession>>;
    async fn get_attendance(&self, id: u64) -> StoreResult<Option<AttendanceSession>>;
    /// Inserts `session` unless the user already has a session without a
    /// sign-out that started at or after `active_since` in the same tenant.
    /// Fails with [`StoreError::Conflict`] in that case.
    async fn open_session(
        &self,
        session: NewAttendance,
        active_since: DateTime<Utc>,
    ) -> StoreResult<AttendanceSession>;
    async fn insert_attendance(&self, rows: Vec<NewAttendance>) -> StoreResult<Vec<AttendanceSession>>;
    /// Sets the sign-out time on an open session. `None` when no open session
    /// has that id in that tenant.
    async fn close_session(
        &self,
        id: u64,
        company_id: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<AttendanceSession>>;

    async fn insert_payrolls(&self, rows: Vec<NewPayroll>) -> StoreResult<Vec<Payroll>>;
    async fn get_payroll(&self, id: u64) -> StoreResult<Option<Payroll>>;
    /// One page of a tenant's payrolls (inclusive offset range) and the
    /// total row count, newest period first.
    async fn list_payrolls(
        &self,
        company_id: u64,
        status: Option<PayrollStatus>,
        range: (u64, u64),
    ) -> StoreResult<(Vec<Payroll>, i64)>;
    async fn list_user_payrolls(&self, user_id: u64) -> StoreResult<Vec<Payroll>>;
    async fn set_payroll_status(&self, id: u64, status: PayrollStatus) -> StoreResult<Option<Payroll>>;
    /// Runs the store-side salary calculation for one payroll row.
    async fn calculate_payroll(&self, id: u64) -> StoreResult<Payroll>;

    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}
