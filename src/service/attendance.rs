//! Attendance sign-in/sign-out and attendance reads.
//!
//! A user moves through `no session -> active -> closed` once per local day
//! and tenant. Reads go through the service's own [`QueryCache`]; every write
//! clears the keys it can have made stale.
use super::{resolve_company, start_of_local_day, utc_day_start, with_retry};
use crate::error::{ServiceError, ServiceResult};
use crate::model::attendance::{
    AttendanceFilter, AttendanceReport, AttendanceSession, AttendanceStatus, BulkAttendanceItem,
    NewAttendance,
};
use crate::store::{HrStore, StoreError};
use crate::utils::query_cache::QueryCache;
use crate::utils::retry::RetryPolicy;
use chrono::{Duration, Local, NaiveDate, NaiveTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Absences are recorded at this UTC hour of the absent day.
const ABSENT_MARK_HOUR: u32 = 9;

pub struct AttendanceService {
    store: Arc<dyn HrStore>,
    cache: QueryCache,
    retry: RetryPolicy,
}

impl AttendanceService {
    pub fn new(store: Arc<dyn HrStore>, cache: QueryCache, retry: RetryPolicy) -> Self {
        Self { store, cache, retry }
    }

    /// Opens today's session for `user_id`.
    pub async fn sign_in(&self, user_id: u64, company_id: Option<u64>) -> ServiceResult<AttendanceSession> {
        if user_id == 0 {
            return Err(ServiceError::Validation("user_id is required".to_string()));
        }
        let company_id = resolve_company(self.store.as_ref(), &self.retry, user_id, company_id).await?;

        let now = Utc::now();
        let since = start_of_local_day(now);
        let filter = AttendanceFilter {
            company_id: Some(company_id),
            user_id: Some(user_id),
            from: Some(since),
            active_only: true,
            ..Default::default()
        };

        let existing = with_retry(&self.retry, "attendance.sign_in.check", || {
            self.store.list_attendance(&filter)
        })
        .await?;
        if !existing.is_empty() {
            return Err(ServiceError::AlreadySignedIn);
        }

        let row = NewAttendance {
            user_id,
            company_id,
            sign_in_time: now,
            sign_out_time: None,
            status: AttendanceStatus::Present,
            notes: None,
        };
        let session = with_retry(&self.retry, "attendance.sign_in.insert", || {
            self.store.open_session(row.clone(), since)
        })
        .await
        .map_err(|e| match e {
            // lost the race against a concurrent sign-in
            ServiceError::Store(StoreError::Conflict(_)) => ServiceError::AlreadySignedIn,
            other => other,
        })?;

        info!(user_id, company_id, session_id = session.id, "Signed in");
        self.invalidate_user(user_id, company_id).await;
        Ok(session)
    }

    /// Closes an active session.
    pub async fn sign_out(&self, session_id: u64, company_id: u64) -> ServiceResult<AttendanceSession> {
        if session_id == 0 {
            return Err(ServiceError::Validation("session_id is required".to_string()));
        }

        let closed = with_retry(&self.retry, "attendance.sign_out", || {
            self.store.close_session(session_id, company_id, Utc::now())
        })
        .await?;

        let session = match closed {
            Some(session) => session,
            None => {
                let current = with_retry(&self.retry, "attendance.sign_out.lookup", || {
                    self.store.get_attendance(session_id)
                })
                .await?;
                return Err(match current {
                    Some(s) if s.company_id == company_id => ServiceError::AlreadySignedOut,
                    _ => ServiceError::NotFound(format!("attendance session {session_id}")),
                });
            }
        };

        info!(user_id = session.user_id, company_id, session_id, "Signed out");
        self.cache.clear(&format!("attendance:id:{session_id}")).await;
        self.invalidate_user(session.user_id, company_id).await;
        Ok(session)
    }

    /// Records an absence at 09:00 UTC of `date` (today when `None`).
    ///
    /// The row is written closed, so it never counts as an active session.
    pub async fn mark_absent(
        &self,
        user_id: u64,
        date: Option<NaiveDate>,
        company_id: Option<u64>,
    ) -> ServiceResult<AttendanceSession> {
        if user_id == 0 {
            return Err(ServiceError::Validation("user_id is required".to_string()));
        }
        let company_id = resolve_company(self.store.as_ref(), &self.retry, user_id, company_id).await?;

        let day = date.unwrap_or_else(|| Utc::now().date_naive());
        let at = day
            .and_time(NaiveTime::from_hms_opt(ABSENT_MARK_HOUR, 0, 0).unwrap_or(NaiveTime::MIN))
            .and_utc();
        let row = NewAttendance {
            user_id,
            company_id,
            sign_in_time: at,
            sign_out_time: Some(at),
            status: AttendanceStatus::Absent,
            notes: None,
        };

        let mut inserted = with_retry(&self.retry, "attendance.mark_absent", || {
            self.store.insert_attendance(vec![row.clone()])
        })
        .await?;
        let session = inserted
            .pop()
            .ok_or_else(|| ServiceError::NotFound(format!("absence for user {user_id}")))?;

        info!(user_id, company_id, %day, "Marked absent");
        self.invalidate_user(user_id, company_id).await;
        Ok(session)
    }

    pub async fn get_attendance(&self, filter: &AttendanceFilter) -> ServiceResult<Vec<AttendanceSession>> {
        let key = format!("attendance:list:{}", filter.cache_fragment());
        if let Some(hit) = self.cache.get(&key).await {
            debug!(key, "Cache hit");
            return Ok(hit);
        }

        let rows = with_retry(&self.retry, "attendance.list", || self.store.list_attendance(filter)).await?;
        self.cache.set(&key, &rows).await;
        Ok(rows)
    }

    pub async fn get_attendance_by_id(&self, id: u64) -> ServiceResult<AttendanceSession> {
        let key = format!("attendance:id:{id}");
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let session = with_retry(&self.retry, "attendance.get", || self.store.get_attendance(id))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("attendance session {id}")))?;
        self.cache.set(&key, &session).await;
        Ok(session)
    }

    /// A user's sessions between two dates (both inclusive, UTC days).
    pub async fn get_user_attendance(
        &self,
        user_id: u64,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> ServiceResult<Vec<AttendanceSession>> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(ServiceError::Validation("from must not be after to".to_string()));
            }
        }

        let key = format!(
            "attendance:user:{user_id}:{}:{}",
            from.map(|d| d.to_string()).unwrap_or_default(),
            to.map(|d| d.to_string()).unwrap_or_default()
        );
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let filter = AttendanceFilter {
            user_id: Some(user_id),
            from: from.map(utc_day_start),
            to: to.map(|d| utc_day_start(d) + Duration::days(1)),
            ..Default::default()
        };
        let rows = with_retry(&self.retry, "attendance.user", || self.store.list_attendance(&filter)).await?;
        self.cache.set(&key, &rows).await;
        Ok(rows)
    }

    /// Sessions of a tenant that started since local midnight.
    pub async fn get_today_attendance(&self, company_id: u64) -> ServiceResult<Vec<AttendanceSession>> {
        let now = Utc::now();
        let today = now.with_timezone(&Local).date_naive();
        let key = format!("attendance:today:{company_id}:{today}");
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let since = start_of_local_day(now);
        let filter = AttendanceFilter {
            company_id: Some(company_id),
            from: Some(since),
            to: Some(since + Duration::days(1)),
            ..Default::default()
        };
        let rows = with_retry(&self.retry, "attendance.today", || self.store.list_attendance(&filter)).await?;
        self.cache.set(&key, &rows).await;
        Ok(rows)
    }

    pub async fn get_attendance_report(
        &self,
        company_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ServiceResult<AttendanceReport> {
        if from > to {
            return Err(ServiceError::Validation("from must not be after to".to_string()));
        }

        let key = format!("attendance:report:{company_id}:{from}:{to}");
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let filter = AttendanceFilter {
            company_id: Some(company_id),
            from: Some(utc_day_start(from)),
            to: Some(utc_day_start(to) + Duration::days(1)),
            ..Default::default()
        };
        let rows = with_retry(&self.retry, "attendance.report", || self.store.list_attendance(&filter)).await?;
        let report = AttendanceReport::build(company_id, from, to, &rows, Utc::now());
        self.cache.set(&key, &report).await;
        Ok(report)
    }

    /// Inserts one row per item in a single batch. The tenant is taken from
    /// `company_id` or from the first item's user. Every row is written
    /// closed, so bulk marking never opens a session.
    pub async fn bulk_mark_attendance(
        &self,
        items: Vec<BulkAttendanceItem>,
        company_id: Option<u64>,
    ) -> ServiceResult<Vec<AttendanceSession>> {
        let Some(first) = items.first() else {
            return Ok(Vec::new());
        };
        if items.iter().any(|i| i.user_id == 0) {
            return Err(ServiceError::Validation("every item needs a user_id".to_string()));
        }
        let company_id = resolve_company(self.store.as_ref(), &self.retry, first.user_id, company_id).await?;

        let now = Utc::now();
        let rows: Vec<NewAttendance> = items
            .into_iter()
            .map(|item| {
                let sign_in_time = item.sign_in_time.unwrap_or(now);
                NewAttendance {
                    user_id: item.user_id,
                    company_id,
                    sign_in_time,
                    // Marked rows are records, not live sessions.
                    sign_out_time: item.sign_out_time.or(Some(sign_in_time)),
                    status: item.status,
                    notes: item.notes,
                }
            })
            .collect();
        let users: BTreeSet<u64> = rows.iter().map(|r| r.user_id).collect();

        let inserted = with_retry(&self.retry, "attendance.bulk_mark", || {
            self.store.insert_attendance(rows.clone())
        })
        .await?;

        info!(company_id, rows = inserted.len(), users = users.len(), "Bulk attendance recorded");
        for user_id in users {
            self.invalidate_user(user_id, company_id).await;
        }
        Ok(inserted)
    }

    async fn invalidate_user(&self, user_id: u64, company_id: u64) {
        self.cache.clear_prefix(&format!("attendance:user:{user_id}:")).await;
        self.cache.clear_prefix(&format!("attendance:today:{company_id}:")).await;
        self.cache.clear_prefix(&format!("attendance:report:{company_id}:")).await;
        self.cache.clear_prefix("attendance:list:").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use std::time::Duration as StdDuration;

    const COMPANY: u64 = 10;

    fn service(store: Arc<InMemoryStore>) -> AttendanceService {
        AttendanceService::new(
            store,
            QueryCache::new(None),
            RetryPolicy::new(3, StdDuration::ZERO),
        )
    }

    fn store() -> Arc<InMemoryStore> {
        Arc::new(
            InMemoryStore::new()
                .with_profile(1, Some(COMPANY))
                .with_profile(2, Some(COMPANY))
                .with_profile(3, None),
        )
    }

    #[actix_web::test]
    async fn sign_in_creates_active_present_session() {
        let svc = service(store());

        let session = svc.sign_in(1, None).await.unwrap();

        assert_eq!(session.user_id, 1);
        assert_eq!(session.company_id, COMPANY);
        assert_eq!(session.status, AttendanceStatus::Present);
        assert!(session.sign_out_time.is_none());
    }

    #[actix_web::test]
    async fn second_sign_in_same_day_is_rejected() {
        let svc = service(store());
        svc.sign_in(1, Some(COMPANY)).await.unwrap();

        let err = svc.sign_in(1, Some(COMPANY)).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadySignedIn));
        assert_eq!(err.to_string(), "Already signed in today");
    }

    #[actix_web::test]
    async fn already_signed_in_is_not_retried() {
        let store = store();
        let svc = service(store.clone());
        svc.sign_in(1, Some(COMPANY)).await.unwrap();
        let before = store.calls();

        let _ = svc.sign_in(1, Some(COMPANY)).await;

        // one existence check, no retries, no insert
        assert_eq!(store.calls() - before, 1);
    }

    #[actix_web::test]
    async fn sign_in_after_sign_out_opens_new_session() {
        let svc = service(store());
        let first = svc.sign_in(1, None).await.unwrap();
        svc.sign_out(first.id, COMPANY).await.unwrap();

        let second = svc.sign_in(1, None).await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[actix_web::test]
    async fn sign_out_sets_timestamp_and_keeps_identity() {
        let svc = service(store());
        let session = svc.sign_in(2, None).await.unwrap();

        let closed = svc.sign_out(session.id, COMPANY).await.unwrap();

        assert_eq!(closed.id, session.id);
        assert!(closed.sign_out_time.is_some());
        assert!(closed.sign_out_time.unwrap() >= closed.sign_in_time);
    }

    #[actix_web::test]
    async fn sign_out_reports_missing_and_closed_sessions() {
        let svc = service(store());
        let session = svc.sign_in(2, None).await.unwrap();

        assert!(matches!(
            svc.sign_out(999, COMPANY).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            svc.sign_out(session.id, COMPANY + 1).await,
            Err(ServiceError::NotFound(_))
        ));

        svc.sign_out(session.id, COMPANY).await.unwrap();
        assert!(matches!(
            svc.sign_out(session.id, COMPANY).await,
            Err(ServiceError::AlreadySignedOut)
        ));
    }

    #[actix_web::test]
    async fn sign_in_without_company_or_profile_fails_validation() {
        let svc = service(store());
        assert!(matches!(
            svc.sign_in(3, None).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            svc.sign_in(0, Some(COMPANY)).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[actix_web::test]
    async fn user_attendance_reflects_sign_in_after_cached_read() {
        let svc = service(store());
        assert!(svc.get_user_attendance(1, None, None).await.unwrap().is_empty());

        let session = svc.sign_in(1, None).await.unwrap();

        let rows = svc.get_user_attendance(1, None, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, session.id);
    }

    #[actix_web::test]
    async fn reads_are_served_from_cache() {
        let store = store();
        let svc = service(store.clone());
        svc.sign_in(1, None).await.unwrap();

        svc.get_user_attendance(1, None, None).await.unwrap();
        let after_first = store.calls();
        svc.get_user_attendance(1, None, None).await.unwrap();

        assert_eq!(store.calls(), after_first);
    }

    #[actix_web::test]
    async fn sign_out_invalidates_cached_session() {
        let svc = service(store());
        let session = svc.sign_in(1, None).await.unwrap();
        assert!(svc.get_attendance_by_id(session.id).await.unwrap().is_active());

        svc.sign_out(session.id, COMPANY).await.unwrap();

        assert!(!svc.get_attendance_by_id(session.id).await.unwrap().is_active());
    }

    #[actix_web::test]
    async fn transient_failures_are_retried() {
        let store = store();
        let svc = service(store.clone());
        store.fail_next(2);

        let session = svc.sign_in(1, Some(COMPANY)).await.unwrap();
        assert!(session.is_active());
    }

    #[actix_web::test]
    async fn persistent_failures_surface_as_unavailable() {
        let store = store();
        let svc = service(store.clone());
        store.fail_next(10);

        let err = svc.sign_in(1, Some(COMPANY)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::Unavailable(_))));
        assert_eq!(store.calls(), 3);
    }

    #[actix_web::test]
    async fn mark_absent_writes_closed_row_at_nine_utc() {
        let svc = service(store());
        let day = NaiveDate::from_ymd_opt(2026, 2, 3).unwrap();

        let absent = svc.mark_absent(1, Some(day), None).await.unwrap();

        assert_eq!(absent.status, AttendanceStatus::Absent);
        assert_eq!(absent.sign_in_time.to_rfc3339(), "2026-02-03T09:00:00+00:00");
        assert!(!absent.is_active());
    }

    #[actix_web::test]
    async fn bulk_mark_with_no_items_writes_nothing() {
        let store = store();
        let svc = service(store.clone());

        let rows = svc.bulk_mark_attendance(Vec::new(), None).await.unwrap();

        assert!(rows.is_empty());
        assert_eq!(store.writes(), 0);
        assert_eq!(store.calls(), 0);
    }

    #[actix_web::test]
    async fn bulk_mark_uses_first_users_company_and_one_write() {
        let store = store();
        let svc = service(store.clone());
        let items = vec![
            BulkAttendanceItem {
                user_id: 1,
                status: AttendanceStatus::Present,
                sign_in_time: None,
                sign_out_time: None,
                notes: None,
            },
            BulkAttendanceItem {
                user_id: 3,
                status: AttendanceStatus::Absent,
                sign_in_time: None,
                sign_out_time: None,
                notes: Some("sick".to_string()),
            },
        ];

        let rows = svc.bulk_mark_attendance(items, None).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.company_id == COMPANY));
        assert!(rows.iter().all(|r| !r.is_active()));
        assert_eq!(store.writes(), 1);
    }

    #[actix_web::test]
    async fn bulk_mark_never_adds_an_active_session() {
        let store = store();
        let svc = service(store.clone());
        svc.sign_in(1, None).await.unwrap();
        let present = || BulkAttendanceItem {
            user_id: 1,
            status: AttendanceStatus::Present,
            sign_in_time: None,
            sign_out_time: None,
            notes: None,
        };

        let rows = svc.bulk_mark_attendance(vec![present(), present()], None).await.unwrap();
        assert_eq!(rows.len(), 2);

        let active = AttendanceFilter {
            user_id: Some(1),
            company_id: Some(COMPANY),
            from: Some(start_of_local_day(Utc::now())),
            active_only: true,
            ..Default::default()
        };
        assert_eq!(svc.get_attendance(&active).await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn lost_sign_in_race_reports_already_signed_in() {
        let store = store();
        let svc = service(store.clone());
        store.race_next_open();

        let err = svc.sign_in(1, None).await.unwrap_err();

        assert!(matches!(err, ServiceError::AlreadySignedIn));
        let active = AttendanceFilter {
            user_id: Some(1),
            active_only: true,
            ..Default::default()
        };
        assert_eq!(svc.get_attendance(&active).await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn today_and_report_cover_signed_in_users() {
        let svc = service(store());
        svc.sign_in(1, None).await.unwrap();
        svc.sign_in(2, None).await.unwrap();

        let today = svc.get_today_attendance(COMPANY).await.unwrap();
        assert_eq!(today.len(), 2);
        assert!(today[0].sign_in_time >= today[1].sign_in_time);

        let date = Utc::now().date_naive();
        let report = svc
            .get_attendance_report(COMPANY, date - Duration::days(1), date)
            .await
            .unwrap();
        assert_eq!(report.total_sessions, 2);
        assert_eq!(report.users.len(), 2);
    }

    #[actix_web::test]
    async fn report_rejects_inverted_range() {
        let svc = service(store());
        let day = NaiveDate::from_ymd_opt(2026, 2, 3).unwrap();
        assert!(matches!(
            svc.get_attendance_report(COMPANY, day, day - Duration::days(1)).await,
            Err(ServiceError::Validation(_))
        ));
    }
}
