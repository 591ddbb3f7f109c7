use super::{resolve_company, with_retry};
use crate::error::{ServiceError, ServiceResult};
use crate::model::payroll::{
    DEFAULT_LEAVE_DAYS, DEFAULT_PRESENT_DAYS, DEFAULT_WORKING_DAYS, EmployeeSalary, NewPayroll, Page,
    Payroll, PayrollPeriod, PayrollStatus, ProcessPayroll, page_range,
};
use crate::store::{HrStore, StoreError};
use crate::utils::query_cache::QueryCache;
use crate::utils::retry::RetryPolicy;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

pub struct PayrollService {
    store: Arc<dyn HrStore>,
    cache: QueryCache,
    retry: RetryPolicy,
}

fn validate_period(period: PayrollPeriod) -> ServiceResult<()> {
    if !(1..=12).contains(&period.month) {
        return Err(ServiceError::Validation(format!(
            "month must be between 1 and 12, got {}",
            period.month
        )));
    }
    if !(2000..=2100).contains(&period.year) {
        return Err(ServiceError::Validation(format!("year {} is out of range", period.year)));
    }
    Ok(())
}

fn validate_amounts(user_id: u64, base_salary: f64, deductions: f64) -> ServiceResult<()> {
    if user_id == 0 {
        return Err(ServiceError::Validation("user_id is required".to_string()));
    }
    if !base_salary.is_finite() || base_salary < 0.0 {
        return Err(ServiceError::Validation(format!(
            "base_salary for user {user_id} must be a non-negative amount"
        )));
    }
    if !deductions.is_finite() || deductions < 0.0 {
        return Err(ServiceError::Validation(format!(
            "deductions for user {user_id} must be a non-negative amount"
        )));
    }
    if deductions > base_salary {
        return Err(ServiceError::Validation(format!(
            "deductions for user {user_id} exceed base salary"
        )));
    }
    Ok(())
}

/// Draft row for one employee; attendance figures are placeholders.
fn draft(user_id: u64, company_id: u64, period: PayrollPeriod, base_salary: f64, deductions: f64) -> NewPayroll {
    NewPayroll {
        user_id,
        company_id,
        month: period.month,
        year: period.year,
        base_salary,
        deductions,
        net_salary: base_salary - deductions,
        working_days: DEFAULT_WORKING_DAYS,
        present_days: DEFAULT_PRESENT_DAYS,
        leave_days: DEFAULT_LEAVE_DAYS,
        status: PayrollStatus::Draft,
    }
}

impl PayrollService {
    pub fn new(store: Arc<dyn HrStore>, cache: QueryCache, retry: RetryPolicy) -> Self {
        Self { store, cache, retry }
    }

    pub async fn process_payroll(&self, input: ProcessPayroll) -> ServiceResult<Payroll> {
        let period = PayrollPeriod {
            month: input.month,
            year: input.year,
        };
        validate_period(period)?;
        validate_amounts(input.user_id, input.base_salary, input.deductions)?;
        let company_id =
            resolve_company(self.store.as_ref(), &self.retry, input.user_id, input.company_id).await?;

        let row = draft(input.user_id, company_id, period, input.base_salary, input.deductions);
        let payroll = with_retry(&self.retry, "payroll.process", || {
            self.store.insert_payrolls(vec![row.clone()])
        })
        .await?
        .pop()
        .ok_or_else(|| ServiceError::NotFound(format!("payroll for user {}", input.user_id)))?;

        info!(
            payroll_id = payroll.id,
            user_id = payroll.user_id,
            company_id,
            month = period.month,
            year = period.year,
            "Payroll drafted"
        );
        self.invalidate(&[payroll.user_id], company_id).await;
        Ok(payroll)
    }

    /// Drafts one payroll per employee for `period` in a single batch.
    pub async fn bulk_process_payroll(
        &self,
        company_id: u64,
        period: PayrollPeriod,
        employees: Vec<EmployeeSalary>,
    ) -> ServiceResult<Vec<Payroll>> {
        if employees.is_empty() {
            return Ok(Vec::new());
        }
        validate_period(period)?;
        for e in &employees {
            validate_amounts(e.user_id, e.base_salary, e.deductions)?;
        }

        let rows: Vec<NewPayroll> = employees
            .iter()
            .map(|e| draft(e.user_id, company_id, period, e.base_salary, e.deductions))
            .collect();
        let inserted = with_retry(&self.retry, "payroll.bulk_process", || {
            self.store.insert_payrolls(rows.clone())
        })
        .await?;

        info!(company_id, rows = inserted.len(), month = period.month, year = period.year, "Bulk payroll drafted");
        let users: Vec<u64> = employees.iter().map(|e| e.user_id).collect();
        self.invalidate(&users, company_id).await;
        Ok(inserted)
    }

    /// Moves a payroll to `status`. Any status may follow any other.
    pub async fn update_payroll_status(&self, id: u64, status: PayrollStatus) -> ServiceResult<Payroll> {
        let payroll = with_retry(&self.retry, "payroll.update_status", || {
            self.store.set_payroll_status(id, status)
        })
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("payroll {id}")))?;

        info!(payroll_id = id, %status, "Payroll status updated");
        self.cache.clear(&format!("payroll:id:{id}")).await;
        self.invalidate(&[payroll.user_id], payroll.company_id).await;
        Ok(payroll)
    }

    /// Recomputes a payroll's figures with the store-side procedure.
    pub async fn calculate_payroll(&self, id: u64) -> ServiceResult<Payroll> {
        let payroll = with_retry(&self.retry, "payroll.calculate", || self.store.calculate_payroll(id))
            .await
            .map_err(|e| match e {
                ServiceError::Store(StoreError::NotFound(_)) => ServiceError::NotFound(format!("payroll {id}")),
                other => other,
            })?;

        info!(payroll_id = id, net_salary = payroll.net_salary, "Payroll calculated");
        self.cache.clear(&format!("payroll:id:{id}")).await;
        self.invalidate(&[payroll.user_id], payroll.company_id).await;
        Ok(payroll)
    }

    pub async fn get_payrolls(
        &self,
        company_id: u64,
        status: Option<PayrollStatus>,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> ServiceResult<Page<Payroll>> {
        let page = page.unwrap_or(1).max(1);
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let key = format!(
            "payroll:list:{company_id}:{}:{page}:{page_size}",
            status.map(|s| s.to_string()).unwrap_or_else(|| "*".to_string())
        );
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let range = page_range(page, page_size);
        let (data, total) = with_retry(&self.retry, "payroll.list", || {
            self.store.list_payrolls(company_id, status, range)
        })
        .await?;

        let result = Page {
            data,
            page,
            page_size,
            total,
        };
        self.cache.set(&key, &result).await;
        Ok(result)
    }

    pub async fn get_payroll_by_id(&self, id: u64) -> ServiceResult<Payroll> {
        let key = format!("payroll:id:{id}");
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let payroll = with_retry(&self.retry, "payroll.get", || self.store.get_payroll(id))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("payroll {id}")))?;
        self.cache.set(&key, &payroll).await;
        Ok(payroll)
    }

    pub async fn get_user_payrolls(&self, user_id: u64) -> ServiceResult<Vec<Payroll>> {
        let key = format!("payroll:user:{user_id}");
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let rows = with_retry(&self.retry, "payroll.user", || self.store.list_user_payrolls(user_id)).await?;
        self.cache.set(&key, &rows).await;
        Ok(rows)
    }

    async fn invalidate(&self, users: &[u64], company_id: u64) {
        let users: BTreeSet<u64> = users.iter().copied().collect();
        for user_id in users {
            self.cache.clear(&format!("payroll:user:{user_id}")).await;
        }
        self.cache.clear_prefix(&format!("payroll:list:{company_id}:")).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use std::time::Duration;

    const COMPANY: u64 = 10;

    fn service(store: Arc<InMemoryStore>) -> PayrollService {
        PayrollService::new(store, QueryCache::new(None), RetryPolicy::new(3, Duration::ZERO))
    }

    fn store() -> Arc<InMemoryStore> {
        Arc::new(InMemoryStore::new().with_profile(1, Some(COMPANY)))
    }

    fn input(base_salary: f64, deductions: f64) -> ProcessPayroll {
        ProcessPayroll {
            user_id: 1,
            company_id: None,
            month: 1,
            year: 2026,
            base_salary,
            deductions,
        }
    }

    #[actix_web::test]
    async fn processed_payroll_nets_deductions() {
        let svc = service(store());

        let payroll = svc.process_payroll(input(5000.0, 200.0)).await.unwrap();

        assert_eq!(payroll.net_salary, 4800.0);
        assert_eq!(payroll.status, PayrollStatus::Draft);
        assert_eq!(payroll.company_id, COMPANY);
        assert_eq!(payroll.working_days, DEFAULT_WORKING_DAYS);
    }

    #[actix_web::test]
    async fn invalid_input_is_rejected_before_any_store_call() {
        let store = store();
        let svc = service(store.clone());

        let mut bad_month = input(5000.0, 0.0);
        bad_month.month = 13;
        assert!(matches!(
            svc.process_payroll(bad_month).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            svc.process_payroll(input(100.0, 200.0)).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            svc.process_payroll(input(-1.0, 0.0)).await,
            Err(ServiceError::Validation(_))
        ));
        assert_eq!(store.calls(), 0);
    }

    #[actix_web::test]
    async fn status_may_move_in_any_direction() {
        let svc = service(store());
        let payroll = svc.process_payroll(input(3000.0, 0.0)).await.unwrap();

        let paid = svc.update_payroll_status(payroll.id, PayrollStatus::Paid).await.unwrap();
        assert_eq!(paid.status, PayrollStatus::Paid);

        let draft = svc.update_payroll_status(payroll.id, PayrollStatus::Draft).await.unwrap();
        assert_eq!(draft.status, PayrollStatus::Draft);

        assert!(matches!(
            svc.update_payroll_status(404, PayrollStatus::Paid).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[actix_web::test]
    async fn status_update_refreshes_cached_reads() {
        let svc = service(store());
        let payroll = svc.process_payroll(input(3000.0, 0.0)).await.unwrap();
        assert_eq!(
            svc.get_payroll_by_id(payroll.id).await.unwrap().status,
            PayrollStatus::Draft
        );
        svc.get_user_payrolls(1).await.unwrap();

        svc.update_payroll_status(payroll.id, PayrollStatus::Processed).await.unwrap();

        assert_eq!(
            svc.get_payroll_by_id(payroll.id).await.unwrap().status,
            PayrollStatus::Processed
        );
        assert_eq!(
            svc.get_user_payrolls(1).await.unwrap()[0].status,
            PayrollStatus::Processed
        );
    }

    #[actix_web::test]
    async fn calculate_delegates_to_store() {
        let svc = service(store());
        let payroll = svc.process_payroll(input(1000.0, 250.0)).await.unwrap();

        let calculated = svc.calculate_payroll(payroll.id).await.unwrap();
        assert_eq!(calculated.net_salary, 750.0);

        assert!(matches!(
            svc.calculate_payroll(999).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[actix_web::test]
    async fn bulk_process_paginates_newest_first() {
        let svc = service(store());
        let employees: Vec<EmployeeSalary> = (1..=5)
            .map(|user_id| EmployeeSalary {
                user_id,
                base_salary: 1000.0 * user_id as f64,
                deductions: 0.0,
            })
            .collect();

        let inserted = svc
            .bulk_process_payroll(COMPANY, PayrollPeriod { month: 2, year: 2026 }, employees)
            .await
            .unwrap();
        assert_eq!(inserted.len(), 5);

        let first = svc.get_payrolls(COMPANY, None, Some(1), Some(2)).await.unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.data.len(), 2);
        let last = svc.get_payrolls(COMPANY, None, Some(3), Some(2)).await.unwrap();
        assert_eq!(last.data.len(), 1);

        let processed = svc
            .get_payrolls(COMPANY, Some(PayrollStatus::Processed), None, None)
            .await
            .unwrap();
        assert_eq!(processed.total, 0);
    }

    #[actix_web::test]
    async fn new_payroll_shows_up_in_cached_list() {
        let svc = service(store());
        assert_eq!(svc.get_payrolls(COMPANY, None, None, None).await.unwrap().total, 0);

        svc.process_payroll(input(5000.0, 200.0)).await.unwrap();

        assert_eq!(svc.get_payrolls(COMPANY, None, None, None).await.unwrap().total, 1);
    }

    #[actix_web::test]
    async fn bulk_process_with_no_employees_is_a_no_op() {
        let store = store();
        let svc = service(store.clone());
        let rows = svc
            .bulk_process_payroll(COMPANY, PayrollPeriod { month: 1, year: 2026 }, Vec::new())
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(store.writes(), 0);
    }
}
