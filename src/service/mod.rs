use crate::error::{ServiceError, ServiceResult};
use crate::store::{HrStore, StoreResult};
use crate::utils::retry::RetryPolicy;
use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use std::future::Future;

pub mod attendance;
pub mod payroll;

pub use attendance::AttendanceService;
pub use payroll::PayrollService;

/// Runs one store call under `retry`, lifting its error into the service taxonomy.
pub async fn with_retry<T, F, Fut>(retry: &RetryPolicy, label: &str, mut op: F) -> ServiceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    retry
        .run(label, || {
            let fut = op();
            async move { fut.await.map_err(ServiceError::from) }
        })
        .await
}

/// Returns `supplied` or the tenant on the user's profile.
pub async fn resolve_company(
    store: &dyn HrStore,
    retry: &RetryPolicy,
    user_id: u64,
    supplied: Option<u64>,
) -> ServiceResult<u64> {
    if let Some(company_id) = supplied {
        return Ok(company_id);
    }

    let profile = with_retry(retry, "profiles.get", || store.get_profile(user_id))
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("profile {user_id}")))?;

    profile
        .company_id
        .ok_or_else(|| ServiceError::Validation(format!("user {user_id} is not assigned to a company")))
}

/// Local midnight of the day containing `now`, in UTC.
pub fn start_of_local_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_timezone(&Local)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or(now)
}

/// Midnight UTC at the start of `date`.
pub fn utc_day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
