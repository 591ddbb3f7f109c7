//! In-memory implementation of [`HrStore`].
//!
//! State lives behind a single mutex, so the conditional insert used for
//! sign-in is atomic within the process. Nothing is durable. The store can
//! also be told to fail the next N calls with [`StoreError::Unavailable`],
//! which the retry tests rely on.
//!
//! Open rows follow the same rule as the MySQL `uq_open_session` index: one
//! per user, tenant and local day.
use super::{HrStore, StoreError, StoreResult};
use crate::model::attendance::{AttendanceFilter, AttendanceSession, NewAttendance, local_day};
use crate::model::payroll::{NewPayroll, Payroll, PayrollStatus};
use crate::model::profile::Profile;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
#[cfg(test)]
use std::sync::atomic::AtomicBool;

#[derive(Default)]
struct State {
    next_attendance_id: u64,
    next_payroll_id: u64,
    profiles: HashMap<u64, Profile>,
    attendance: HashMap<u64, AttendanceSession>,
    payroll: HashMap<u64, Payroll>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    /// Remaining calls to fail with `Unavailable`.
    failures: AtomicU32,
    calls: AtomicUsize,
    writes: AtomicUsize,
    /// Next `open_session` finds a concurrent sign-in already committed.
    #[cfg(test)]
    race_open: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, user_id: u64, company_id: Option<u64>) -> Self {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.profiles.insert(
            user_id,
            Profile {
                id: user_id,
                company_id,
                full_name: format!("user-{user_id}"),
            },
        );
        self
    }

    /// Makes the next `n` store calls fail as if the database were unreachable.
    #[cfg(test)]
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Total calls issued against the store, failed ones included.
    #[cfg(test)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that attempted to write.
    #[cfg(test)]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes the next `open_session` lose a race: a clashing open session
    /// is committed just before its own conditional insert runs.
    #[cfg(test)]
    pub fn race_next_open(&self) {
        self.race_open.store(true, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn apply_race(&self, state: &mut State, session: &NewAttendance) {
        if self.race_open.swap(false, Ordering::SeqCst) {
            materialize(state, session.clone(), Utc::now());
        }
    }

    #[cfg(not(test))]
    fn apply_race(&self, _state: &mut State, _session: &NewAttendance) {}

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unexpected(anyhow::anyhow!("in-memory store lock poisoned")))
    }

    fn enter(&self, write: bool) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if write {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

fn materialize(state: &mut State, row: NewAttendance, now: DateTime<Utc>) -> AttendanceSession {
    state.next_attendance_id += 1;
    let session = AttendanceSession {
        id: state.next_attendance_id,
        user_id: row.user_id,
        company_id: row.company_id,
        sign_in_time: row.sign_in_time,
        sign_out_time: row.sign_out_time,
        status: row.status,
        notes: row.notes,
        created_at: now,
    };
    state.attendance.insert(session.id, session.clone());
    session
}

fn newest_period_first(a: &Payroll, b: &Payroll) -> std::cmp::Ordering {
    (b.year, b.month, b.id).cmp(&(a.year, a.month, a.id))
}

#[async_trait]
impl HrStore for InMemoryStore {
    async fn get_profile(&self, user_id: u64) -> StoreResult<Option<Profile>> {
        self.enter(false)?;
        Ok(self.lock()?.profiles.get(&user_id).cloned())
    }

    async fn list_attendance(&self, filter: &AttendanceFilter) -> StoreResult<Vec<AttendanceSession>> {
        self.enter(false)?;
        let state = self.lock()?;
        let mut rows: Vec<_> = state
            .attendance
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.sign_in_time, b.id).cmp(&(a.sign_in_time, a.id)));
        Ok(rows)
    }

    async fn get_attendance(&self, id: u64) -> StoreResult<Option<AttendanceSession>> {
        self.enter(false)?;
        Ok(self.lock()?.attendance.get(&id).cloned())
    }

    async fn open_session(
        &self,
        session: NewAttendance,
        active_since: DateTime<Utc>,
    ) -> StoreResult<AttendanceSession> {
        self.enter(true)?;
        let mut state = self.lock()?;
        self.apply_race(&mut state, &session);
        let clash = state.attendance.values().any(|s| {
            s.user_id == session.user_id
                && s.company_id == session.company_id
                && s.is_active()
                && s.sign_in_time >= active_since
        });
        if clash {
            return Err(StoreError::Conflict(format!(
                "user {} already has an active session",
                session.user_id
            )));
        }
        Ok(materialize(&mut state, session, Utc::now()))
    }

    async fn insert_attendance(&self, rows: Vec<NewAttendance>) -> StoreResult<Vec<AttendanceSession>> {
        self.enter(true)?;
        let now = Utc::now();
        let mut state = self.lock()?;

        // The whole batch is rejected when an open row would clash.
        let mut claimed = HashSet::new();
        for row in &rows {
            let Some(day) = row.active_day() else { continue };
            let taken = state.attendance.values().any(|s| {
                s.user_id == row.user_id
                    && s.company_id == row.company_id
                    && s.is_active()
                    && local_day(s.sign_in_time) == day
            });
            if taken || !claimed.insert((row.user_id, row.company_id, day)) {
                return Err(StoreError::Conflict(format!(
                    "user {} already has an active session on {day}",
                    row.user_id
                )));
            }
        }

        Ok(rows
            .into_iter()
            .map(|row| materialize(&mut state, row, now))
            .collect())
    }

    async fn close_session(
        &self,
        id: u64,
        company_id: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<AttendanceSession>> {
        self.enter(true)?;
        let mut state = self.lock()?;
        match state.attendance.get_mut(&id) {
            Some(s) if s.company_id == company_id && s.is_active() => {
                s.sign_out_time = Some(at);
                Ok(Some(s.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_payrolls(&self, rows: Vec<NewPayroll>) -> StoreResult<Vec<Payroll>> {
        self.enter(true)?;
        let now = Utc::now();
        let mut state = self.lock()?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            state.next_payroll_id += 1;
            let payroll = Payroll {
                id: state.next_payroll_id,
                user_id: row.user_id,
                company_id: row.company_id,
                month: row.month,
                year: row.year,
                base_salary: row.base_salary,
                deductions: row.deductions,
                net_salary: row.net_salary,
                working_days: row.working_days,
                present_days: row.present_days,
                leave_days: row.leave_days,
                status: row.status,
                created_at: now,
                updated_at: now,
            };
            state.payroll.insert(payroll.id, payroll.clone());
            out.push(payroll);
        }
        Ok(out)
    }

    async fn get_payroll(&self, id: u64) -> StoreResult<Option<Payroll>> {
        self.enter(false)?;
        Ok(self.lock()?.payroll.get(&id).cloned())
    }

    async fn list_payrolls(
        &self,
        company_id: u64,
        status: Option<PayrollStatus>,
        range: (u64, u64),
    ) -> StoreResult<(Vec<Payroll>, i64)> {
        self.enter(false)?;
        let state = self.lock()?;
        let mut rows: Vec<_> = state
            .payroll
            .values()
            .filter(|p| p.company_id == company_id && status.is_none_or(|s| s == p.status))
            .cloned()
            .collect();
        rows.sort_by(newest_period_first);
        let total = rows.len() as i64;
        let (from, to) = range;
        let page = rows
            .into_iter()
            .skip(from as usize)
            .take((to - from + 1) as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_user_payrolls(&self, user_id: u64) -> StoreResult<Vec<Payroll>> {
        self.enter(false)?;
        let state = self.lock()?;
        let mut rows: Vec<_> = state
            .payroll
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(newest_period_first);
        Ok(rows)
    }

    async fn set_payroll_status(&self, id: u64, status: PayrollStatus) -> StoreResult<Option<Payroll>> {
        self.enter(true)?;
        let mut state = self.lock()?;
        Ok(state.payroll.get_mut(&id).map(|p| {
            p.status = status;
            p.updated_at = Utc::now();
            p.clone()
        }))
    }

    async fn calculate_payroll(&self, id: u64) -> StoreResult<Payroll> {
        self.enter(true)?;
        let mut state = self.lock()?;
        let payroll = state
            .payroll
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("payroll {id}")))?;
        payroll.net_salary = payroll.base_salary - payroll.deductions;
        payroll.updated_at = Utc::now();
        Ok(payroll.clone())
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.enter(false)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attendance::AttendanceStatus;

    fn row(user_id: u64) -> NewAttendance {
        NewAttendance {
            user_id,
            company_id: 1,
            sign_in_time: Utc::now(),
            sign_out_time: None,
            status: AttendanceStatus::Present,
            notes: None,
        }
    }

    #[actix_web::test]
    async fn open_session_rejects_second_active_session() {
        let store = InMemoryStore::new();
        let since = Utc::now() - chrono::Duration::hours(1);

        let first = store.open_session(row(5), since).await.unwrap();
        assert!(first.is_active());

        let err = store.open_session(row(5), since).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        store.close_session(first.id, 1, Utc::now()).await.unwrap();
        assert!(store.open_session(row(5), since).await.is_ok());
    }

    #[actix_web::test]
    async fn batch_with_clashing_open_row_is_rejected_whole() {
        let store = InMemoryStore::new();
        store
            .open_session(row(5), Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();

        let err = store.insert_attendance(vec![row(6), row(5)]).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let err = store.insert_attendance(vec![row(7), row(7)]).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let active = AttendanceFilter {
            active_only: true,
            ..Default::default()
        };
        assert_eq!(store.list_attendance(&active).await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn poisoned_lock_is_an_unexpected_error() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let held = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = held.state.lock().unwrap();
            panic!("writer died while holding the lock");
        })
        .join();

        assert!(matches!(
            store.get_profile(1).await,
            Err(StoreError::Unexpected(_))
        ));
    }

    #[actix_web::test]
    async fn closed_rows_never_clash() {
        let store = InMemoryStore::new();
        store
            .open_session(row(5), Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();

        let mut closed = row(5);
        closed.sign_out_time = Some(closed.sign_in_time);
        let inserted = store
            .insert_attendance(vec![closed.clone(), closed])
            .await
            .unwrap();
        assert_eq!(inserted.len(), 2);
    }

    #[actix_web::test]
    async fn close_session_checks_tenant() {
        let store = InMemoryStore::new();
        let session = store
            .open_session(row(5), Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();

        assert!(store.close_session(session.id, 2, Utc::now()).await.unwrap().is_none());
        assert!(store.close_session(session.id, 1, Utc::now()).await.unwrap().is_some());
        // already closed
        assert!(store.close_session(session.id, 1, Utc::now()).await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn injected_failures_are_consumed_in_order() {
        let store = InMemoryStore::new();
        store.fail_next(2);

        assert!(matches!(
            store.get_profile(1).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.get_profile(1).await.is_err());
        assert!(store.get_profile(1).await.unwrap().is_none());
        assert_eq!(store.calls(), 3);
        assert_eq!(store.writes(), 0);
    }
}
