use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::{IntoParams, ToSchema};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    HalfDay,
}

impl TryFrom<String> for AttendanceStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "user_id": 1001,
    "company_id": 10,
    "sign_in_time": "2026-01-05T08:58:12Z",
    "sign_out_time": null,
    "status": "present",
    "notes": null,
    "created_at": "2026-01-05T08:58:12Z"
}))]
pub struct AttendanceSession {
    pub id: u64,
    pub user_id: u64,
    pub company_id: u64,
    #[schema(value_type = String, format = "date-time")]
    pub sign_in_time: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub sign_out_time: Option<DateTime<Utc>>,
    #[sqlx(try_from = "String")]
    pub status: AttendanceStatus,
    pub notes: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl AttendanceSession {
    pub fn is_active(&self) -> bool {
        self.sign_out_time.is_none()
    }

    /// Worked time, counting an open session up to `now`.
    pub fn worked_seconds(&self, now: DateTime<Utc>) -> i64 {
        let end = self.sign_out_time.unwrap_or(now);
        (end - self.sign_in_time).num_seconds().max(0)
    }
}

/// Row to be written; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttendance {
    pub user_id: u64,
    pub company_id: u64,
    pub sign_in_time: DateTime<Utc>,
    pub sign_out_time: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
    pub notes: Option<String>,
}

/// Server-local calendar day of `at`; "today" for sign-in purposes.
pub fn local_day(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Local).date_naive()
}

impl NewAttendance {
    /// The local day an open row occupies. Closed rows occupy none.
    pub fn active_day(&self) -> Option<NaiveDate> {
        self.sign_out_time
            .is_none()
            .then(|| local_day(self.sign_in_time))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AttendanceFilter {
    /// Filter by tenant
    pub company_id: Option<u64>,
    /// Filter by user
    pub user_id: Option<u64>,
    pub status: Option<AttendanceStatus>,
    /// Inclusive lower bound on sign-in time
    #[schema(value_type = Option<String>, format = "date-time")]
    #[param(value_type = Option<String>, format = "date-time")]
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on sign-in time
    #[schema(value_type = Option<String>, format = "date-time")]
    #[param(value_type = Option<String>, format = "date-time")]
    pub to: Option<DateTime<Utc>>,
    /// Only sessions without a sign-out timestamp
    #[serde(default)]
    pub active_only: bool,
}

impl AttendanceFilter {
    /// Deterministic fragment used to build cache keys.
    pub fn cache_fragment(&self) -> String {
        fn opt<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(ToString::to_string).unwrap_or_else(|| "*".to_string())
        }

        format!(
            "c={};u={};s={};f={};t={};a={}",
            opt(&self.company_id),
            opt(&self.user_id),
            opt(&self.status),
            opt(&self.from.map(|d| d.timestamp())),
            opt(&self.to.map(|d| d.timestamp())),
            self.active_only
        )
    }

    pub fn matches(&self, session: &AttendanceSession) -> bool {
        self.company_id.is_none_or(|c| c == session.company_id)
            && self.user_id.is_none_or(|u| u == session.user_id)
            && self.status.is_none_or(|s| s == session.status)
            && self.from.is_none_or(|f| session.sign_in_time >= f)
            && self.to.is_none_or(|t| session.sign_in_time < t)
            && (!self.active_only || session.is_active())
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BulkAttendanceItem {
    #[schema(example = 1001)]
    pub user_id: u64,
    #[schema(example = "present", value_type = String)]
    pub status: AttendanceStatus,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub sign_in_time: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub sign_out_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserAttendanceSummary {
    pub user_id: u64,
    pub present: u32,
    pub absent: u32,
    pub late: u32,
    pub half_day: u32,
    pub worked_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceReport {
    pub company_id: u64,
    #[schema(value_type = String, format = "date")]
    pub from: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub to: NaiveDate,
    pub total_sessions: u32,
    pub users: Vec<UserAttendanceSummary>,
}

impl AttendanceReport {
    /// Summarises sessions per user, ordered by user id.
    pub fn build(
        company_id: u64,
        from: NaiveDate,
        to: NaiveDate,
        sessions: &[AttendanceSession],
        now: DateTime<Utc>,
    ) -> Self {
        let mut users: std::collections::BTreeMap<u64, UserAttendanceSummary> =
            std::collections::BTreeMap::new();

        for session in sessions {
            let line = users
                .entry(session.user_id)
                .or_insert_with(|| UserAttendanceSummary {
                    user_id: session.user_id,
                    present: 0,
                    absent: 0,
                    late: 0,
                    half_day: 0,
                    worked_seconds: 0,
                });

            match session.status {
                AttendanceStatus::Present => line.present += 1,
                AttendanceStatus::Absent => line.absent += 1,
                AttendanceStatus::Late => line.late += 1,
                AttendanceStatus::HalfDay => line.half_day += 1,
            }

            if session.status != AttendanceStatus::Absent {
                line.worked_seconds += session.worked_seconds(now);
            }
        }

        Self {
            company_id,
            from,
            to,
            total_sessions: sessions.len() as u32,
            users: users.into_values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session(id: u64, user_id: u64, status: AttendanceStatus, hours: i64) -> AttendanceSession {
        let sign_in = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        AttendanceSession {
            id,
            user_id,
            company_id: 10,
            sign_in_time: sign_in,
            sign_out_time: Some(sign_in + chrono::Duration::hours(hours)),
            status,
            notes: None,
            created_at: sign_in,
        }
    }

    #[test]
    fn only_open_rows_occupy_a_local_day() {
        let sign_in = Utc.with_ymd_and_hms(2026, 1, 5, 23, 30, 0).unwrap();
        let mut row = NewAttendance {
            user_id: 1,
            company_id: 10,
            sign_in_time: sign_in,
            sign_out_time: None,
            status: AttendanceStatus::Present,
            notes: None,
        };
        assert_eq!(row.active_day(), Some(sign_in.with_timezone(&Local).date_naive()));

        row.sign_out_time = Some(sign_in);
        assert_eq!(row.active_day(), None);
    }

    #[test]
    fn status_uses_snake_case_strings() {
        assert_eq!(AttendanceStatus::HalfDay.to_string(), "half_day");
        assert_eq!(
            AttendanceStatus::try_from("absent".to_string()).unwrap(),
            AttendanceStatus::Absent
        );
        assert!(AttendanceStatus::try_from("on_leave".to_string()).is_err());
    }

    #[test]
    fn report_groups_by_user_and_skips_absent_time() {
        let now = Utc.with_ymd_and_hms(2026, 1, 6, 0, 0, 0).unwrap();
        let sessions = vec![
            session(1, 2, AttendanceStatus::Present, 8),
            session(2, 1, AttendanceStatus::Absent, 0),
            session(3, 2, AttendanceStatus::Late, 4),
        ];
        let day = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();

        let report = AttendanceReport::build(10, day, day, &sessions, now);

        assert_eq!(report.total_sessions, 3);
        assert_eq!(report.users.len(), 2);
        assert_eq!(report.users[0].user_id, 1);
        assert_eq!(report.users[0].absent, 1);
        assert_eq!(report.users[0].worked_seconds, 0);
        assert_eq!(report.users[1].present, 1);
        assert_eq!(report.users[1].late, 1);
        assert_eq!(report.users[1].worked_seconds, 12 * 3600);
    }

    #[test]
    fn filter_fragment_is_stable_and_distinguishes_fields() {
        let a = AttendanceFilter {
            user_id: Some(7),
            ..Default::default()
        };
        let b = AttendanceFilter {
            company_id: Some(7),
            ..Default::default()
        };
        assert_eq!(a.cache_fragment(), a.clone().cache_fragment());
        assert_ne!(a.cache_fragment(), b.cache_fragment());
    }
}
