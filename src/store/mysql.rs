//! MySQL implementation of [`HrStore`] on top of a sqlx pool.
//!
//! Queries are built at runtime so the crate compiles without a live
//! database. The schema lives in `migrations/`.
use super::{HrStore, StoreError, StoreResult};
use crate::model::attendance::{AttendanceFilter, AttendanceSession, NewAttendance, local_day};
use crate::model::payroll::{NewPayroll, Payroll, PayrollStatus};
use crate::model::profile::Profile;
use crate::utils::db_utils::{SqlValue, WhereClause, bind_query, bind_query_as, values_placeholders};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use tracing::debug;

const ATTENDANCE_COLUMNS: &str =
    "id, user_id, company_id, sign_in_time, sign_out_time, status, notes, created_at";
const PAYROLL_COLUMNS: &str = "id, user_id, company_id, month, year, base_salary, deductions, \
     net_salary, working_days, present_days, leave_days, status, created_at, updated_at";

pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn attendance_by_ids(&self, first_id: u64, count: usize) -> StoreResult<Vec<AttendanceSession>> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance_sessions WHERE id >= ? AND id < ? ORDER BY id"
        );
        sqlx::query_as::<_, AttendanceSession>(&sql)
            .bind(first_id)
            .bind(first_id + count as u64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn payrolls_by_ids(&self, first_id: u64, count: usize) -> StoreResult<Vec<Payroll>> {
        let sql = format!("SELECT {PAYROLL_COLUMNS} FROM payroll WHERE id >= ? AND id < ? ORDER BY id");
        sqlx::query_as::<_, Payroll>(&sql)
            .bind(first_id)
            .bind(first_id + count as u64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)
    }
}

/// Sorts a sqlx failure into the store error taxonomy.
pub fn map_sqlx(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
        sqlx::Error::Io(e) => StoreError::Unavailable(e.to_string()),
        sqlx::Error::Tls(e) => StoreError::Unavailable(e.to_string()),
        sqlx::Error::PoolTimedOut => StoreError::Unavailable("connection pool timed out".to_string()),
        sqlx::Error::PoolClosed => StoreError::Unavailable("connection pool closed".to_string()),
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23000") => {
            StoreError::Conflict(db_err.message().to_string())
        }
        other => StoreError::Unexpected(anyhow::Error::new(other)),
    }
}

fn insert_attendance_sql(rows: usize) -> String {
    format!(
        "INSERT INTO attendance_sessions \
         (user_id, company_id, sign_in_time, sign_out_time, status, notes, active_day) VALUES {}",
        values_placeholders(rows, 7)
    )
}

fn attendance_where(filter: &AttendanceFilter) -> WhereClause {
    let mut clause = WhereClause::new();
    clause
        .push_opt("company_id = ?", filter.company_id.map(SqlValue::U64))
        .push_opt("user_id = ?", filter.user_id.map(SqlValue::U64))
        .push_opt(
            "status = ?",
            filter.status.map(|s| SqlValue::String(s.to_string())),
        )
        .push_opt("sign_in_time >= ?", filter.from.map(SqlValue::DateTime))
        .push_opt("sign_in_time < ?", filter.to.map(SqlValue::DateTime));
    if filter.active_only {
        clause.push_raw("sign_out_time IS NULL");
    }
    clause
}

#[async_trait]
impl HrStore for MySqlStore {
    async fn get_profile(&self, user_id: u64) -> StoreResult<Option<Profile>> {
        sqlx::query_as::<_, Profile>("SELECT id, company_id, full_name FROM profiles WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn list_attendance(&self, filter: &AttendanceFilter) -> StoreResult<Vec<AttendanceSession>> {
        let clause = attendance_where(filter);
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance_sessions {} ORDER BY sign_in_time DESC, id DESC",
            clause.sql()
        );
        debug!(sql = %sql, bindings = ?clause.values(), "Listing attendance");

        bind_query_as(sqlx::query_as::<_, AttendanceSession>(&sql), clause.values())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn get_attendance(&self, id: u64) -> StoreResult<Option<AttendanceSession>> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance_sessions WHERE id = ?");
        sqlx::query_as::<_, AttendanceSession>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn open_session(
        &self,
        session: NewAttendance,
        active_since: DateTime<Utc>,
    ) -> StoreResult<AttendanceSession> {
        // The unique index on (user_id, company_id, active_day) backs this up
        // when two inserts interleave. `active_day` is the server-local day, the
        // same boundary as `active_since`.
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_sessions
                (user_id, company_id, sign_in_time, sign_out_time, status, notes, active_day)
            SELECT ?, ?, ?, NULL, ?, ?, ?
            FROM DUAL
            WHERE NOT EXISTS (
                SELECT 1 FROM attendance_sessions
                WHERE user_id = ? AND company_id = ?
                AND sign_out_time IS NULL
                AND sign_in_time >= ?
            )
            "#,
        )
        .bind(session.user_id)
        .bind(session.company_id)
        .bind(session.sign_in_time)
        .bind(session.status.to_string())
        .bind(session.notes.clone())
        .bind(local_day(session.sign_in_time))
        .bind(session.user_id)
        .bind(session.company_id)
        .bind(active_since)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "user {} already has an active session",
                session.user_id
            )));
        }

        self.get_attendance(result.last_insert_id())
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("attendance {}", result.last_insert_id())))
    }

    async fn insert_attendance(&self, rows: Vec<NewAttendance>) -> StoreResult<Vec<AttendanceSession>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let sql = insert_attendance_sql(rows.len());
        let mut query = sqlx::query(&sql);
        for row in &rows {
            query = query
                .bind(row.user_id)
                .bind(row.company_id)
                .bind(row.sign_in_time)
                .bind(row.sign_out_time)
                .bind(row.status.to_string())
                .bind(row.notes.clone())
                .bind(row.active_day());
        }

        // MySQL reports the id of the first row of a multi-row insert; ids of
        // one statement are consecutive under the default auto-inc lock mode.
        let result = query.execute(&self.pool).await.map_err(map_sqlx)?;
        self.attendance_by_ids(result.last_insert_id(), rows.len()).await
    }

    async fn close_session(
        &self,
        id: u64,
        company_id: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<AttendanceSession>> {
        let result = sqlx::query(
            r#"
            UPDATE attendance_sessions
            SET sign_out_time = ?, active_day = NULL
            WHERE id = ? AND company_id = ? AND sign_out_time IS NULL
            "#,
        )
        .bind(at)
        .bind(id)
        .bind(company_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_attendance(id).await
    }

    async fn insert_payrolls(&self, rows: Vec<NewPayroll>) -> StoreResult<Vec<Payroll>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "INSERT INTO payroll (user_id, company_id, month, year, base_salary, deductions, \
             net_salary, working_days, present_days, leave_days, status) VALUES {}",
            values_placeholders(rows.len(), 11)
        );
        let mut query = sqlx::query(&sql);
        for row in &rows {
            query = query
                .bind(row.user_id)
                .bind(row.company_id)
                .bind(row.month)
                .bind(row.year)
                .bind(row.base_salary)
                .bind(row.deductions)
                .bind(row.net_salary)
                .bind(row.working_days)
                .bind(row.present_days)
                .bind(row.leave_days)
                .bind(row.status.to_string());
        }

        let result = query.execute(&self.pool).await.map_err(map_sqlx)?;
        self.payrolls_by_ids(result.last_insert_id(), rows.len()).await
    }

    async fn get_payroll(&self, id: u64) -> StoreResult<Option<Payroll>> {
        let sql = format!("SELECT {PAYROLL_COLUMNS} FROM payroll WHERE id = ?");
        sqlx::query_as::<_, Payroll>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn list_payrolls(
        &self,
        company_id: u64,
        status: Option<PayrollStatus>,
        range: (u64, u64),
    ) -> StoreResult<(Vec<Payroll>, i64)> {
        let mut clause = WhereClause::new();
        clause
            .push_opt("company_id = ?", Some(SqlValue::U64(company_id)))
            .push_opt("status = ?", status.map(|s| SqlValue::String(s.to_string())));

        let count_sql = format!("SELECT COUNT(*) FROM payroll {}", clause.sql());
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for value in clause.values() {
            count_query = match value.clone() {
                SqlValue::String(v) => count_query.bind(v),
                SqlValue::U64(v) => count_query.bind(v),
                SqlValue::DateTime(v) => count_query.bind(v),
            };
        }
        let total = count_query.fetch_one(&self.pool).await.map_err(map_sqlx)?;

        let (from, to) = range;
        let data_sql = format!(
            "SELECT {PAYROLL_COLUMNS} FROM payroll {} ORDER BY year DESC, month DESC, id DESC LIMIT ? OFFSET ?",
            clause.sql()
        );
        debug!(sql = %data_sql, from, to, "Fetching payrolls");

        let data = bind_query_as(sqlx::query_as::<_, Payroll>(&data_sql), clause.values())
            .bind(to - from + 1)
            .bind(from)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok((data, total))
    }

    async fn list_user_payrolls(&self, user_id: u64) -> StoreResult<Vec<Payroll>> {
        let sql = format!(
            "SELECT {PAYROLL_COLUMNS} FROM payroll WHERE user_id = ? ORDER BY year DESC, month DESC, id DESC"
        );
        sqlx::query_as::<_, Payroll>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn set_payroll_status(&self, id: u64, status: PayrollStatus) -> StoreResult<Option<Payroll>> {
        let mut clause = WhereClause::new();
        clause.push_opt("id = ?", Some(SqlValue::U64(id)));
        let sql = format!(
            "UPDATE payroll SET status = ?, updated_at = CURRENT_TIMESTAMP {}",
            clause.sql()
        );

        bind_query(sqlx::query(&sql).bind(status.to_string()), clause.values())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        // rows_affected is 0 for a same-value update, so look the row up instead
        self.get_payroll(id).await
    }

    async fn calculate_payroll(&self, id: u64) -> StoreResult<Payroll> {
        sqlx::query("CALL calculate_payroll(?)")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        self.get_payroll(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("payroll {id}")))
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "mysql"
    }
}
