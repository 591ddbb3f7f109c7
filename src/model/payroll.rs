use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::{IntoParams, ToSchema};

/// Placeholder attendance figures written on every new payroll row.
pub const DEFAULT_WORKING_DAYS: u32 = 22;
pub const DEFAULT_PRESENT_DAYS: u32 = 22;
pub const DEFAULT_LEAVE_DAYS: u32 = 0;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PayrollStatus {
    Draft,
    Processed,
    Paid,
}

impl TryFrom<String> for PayrollStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Payroll {
    pub id: u64,
    pub user_id: u64,
    pub company_id: u64,
    #[schema(example = 1)]
    pub month: u32,
    #[schema(example = 2026)]
    pub year: i32,
    #[schema(example = 5000.0)]
    pub base_salary: f64,
    #[schema(example = 200.0)]
    pub deductions: f64,
    #[schema(example = 4800.0)]
    pub net_salary: f64,
    pub working_days: u32,
    pub present_days: u32,
    pub leave_days: u32,
    #[sqlx(try_from = "String")]
    pub status: PayrollStatus,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPayroll {
    pub user_id: u64,
    pub company_id: u64,
    pub month: u32,
    pub year: i32,
    pub base_salary: f64,
    pub deductions: f64,
    pub net_salary: f64,
    pub working_days: u32,
    pub present_days: u32,
    pub leave_days: u32,
    pub status: PayrollStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PayrollPeriod {
    #[schema(example = 1)]
    pub month: u32,
    #[schema(example = 2026)]
    pub year: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProcessPayroll {
    #[schema(example = 1001)]
    pub user_id: u64,
    /// Resolved from the user's profile when absent
    pub company_id: Option<u64>,
    #[schema(example = 1)]
    pub month: u32,
    #[schema(example = 2026)]
    pub year: i32,
    #[schema(example = 5000.0)]
    pub base_salary: f64,
    #[schema(example = 200.0)]
    #[serde(default)]
    pub deductions: f64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EmployeeSalary {
    #[schema(example = 1001)]
    pub user_id: u64,
    #[schema(example = 5000.0)]
    pub base_salary: f64,
    #[serde(default)]
    pub deductions: f64,
}

#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PayrollQuery {
    #[schema(example = 10)]
    pub company_id: u64,
    pub status: Option<PayrollStatus>,
    #[schema(example = 1)]
    pub page: Option<u32>,
    #[schema(example = 10)]
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[aliases(PayrollPage = Page<Payroll>)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
}

/// 1-based page to an inclusive `[from, to]` row range.
pub fn page_range(page: u32, page_size: u32) -> (u64, u64) {
    let page = page.max(1) as u64;
    let size = page_size.max(1) as u64;
    let from = (page - 1) * size;
    (from, from + size - 1)
}
