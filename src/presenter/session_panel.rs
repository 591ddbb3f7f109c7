//! Attendance session panel: clock display, elapsed-session display and
//! sign-in/sign-out actions turned into user-facing notifications.
//!
//! All display state is derived from the current time and the active
//! session; nothing here is persisted.
use crate::error::{ServiceError, ServiceResult};
use crate::model::attendance::{AttendanceFilter, AttendanceSession};
use crate::service::{AttendanceService, start_of_local_day};
use crate::store::StoreError;
use actix_web::rt::time::interval;
use chrono::{DateTime, Local, Utc};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Serialize;
use std::time::Duration;
use utoipa::ToSchema;

pub const TICK: Duration = Duration::from_secs(1);

/// `HH:MM:SS`; hours keep counting past 24.
pub fn format_hms(total_seconds: i64) -> String {
    let s = total_seconds.max(0);
    format!("{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ClockView {
    /// Local wall clock
    #[schema(example = "14:03:27")]
    pub clock: String,
    /// Time since sign-in of the active session
    #[schema(example = "05:01:09")]
    pub elapsed: Option<String>,
    pub session_id: Option<u64>,
}

impl ClockView {
    pub fn derive(now: DateTime<Utc>, active: Option<&AttendanceSession>) -> Self {
        Self {
            clock: now.with_timezone(&Local).format("%H:%M:%S").to_string(),
            elapsed: active.map(|s| format_hms((now - s.sign_in_time).num_seconds())),
            session_id: active.map(|s| s.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockEvent {
    Clock(String),
    Elapsed(String),
}

impl ClockEvent {
    /// Server-sent-events frame.
    pub fn to_sse(&self) -> String {
        match self {
            ClockEvent::Clock(v) => format!("event: clock\ndata: {v}\n\n"),
            ClockEvent::Elapsed(v) => format!("event: elapsed\ndata: {v}\n\n"),
        }
    }
}

fn ticks(period: Duration) -> impl Stream<Item = ()> {
    stream::unfold(interval(period), |mut timer| async move {
        timer.tick().await;
        Some(((), timer))
    })
}

/// Two independent timers, one for the wall clock and one for the elapsed
/// time of `active`, merged into one stream. Without an active session only
/// the clock ticks.
pub fn clock_events(active: Option<AttendanceSession>, period: Duration) -> BoxStream<'static, ClockEvent> {
    let clock = ticks(period).map(|_| ClockEvent::Clock(ClockView::derive(Utc::now(), None).clock));

    match active {
        Some(session) => {
            let elapsed = ticks(period).map(move |_| {
                ClockEvent::Elapsed(format_hms((Utc::now() - session.sign_in_time).num_seconds()))
            });
            stream::select(clock, elapsed).boxed()
        }
        None => clock.boxed(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Failure,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PanelOutcome {
    pub notification: Notification,
    /// The caller should reload session state.
    pub refresh: bool,
    pub session: Option<AttendanceSession>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PanelView {
    pub clock: ClockView,
    pub session: Option<AttendanceSession>,
}

/// Copy shown for failures shared by both actions.
fn failure_copy(err: &ServiceError, fallback: &str) -> String {
    match err {
        ServiceError::Validation(msg) => msg.clone(),
        ServiceError::Store(StoreError::Unavailable(_)) => {
            "Attendance service is unavailable, please try again".to_string()
        }
        _ => fallback.to_string(),
    }
}

pub fn sign_in_outcome(result: ServiceResult<AttendanceSession>) -> PanelOutcome {
    match result {
        Ok(session) => PanelOutcome {
            notification: Notification::success(format!(
                "Signed in at {}",
                session.sign_in_time.with_timezone(&Local).format("%H:%M")
            )),
            refresh: true,
            session: Some(session),
        },
        Err(ServiceError::AlreadySignedIn) => PanelOutcome {
            notification: Notification::failure("You are already signed in today"),
            refresh: true,
            session: None,
        },
        Err(e) => PanelOutcome {
            notification: Notification::failure(failure_copy(&e, "Failed to sign in")),
            refresh: false,
            session: None,
        },
    }
}

pub fn sign_out_outcome(result: ServiceResult<AttendanceSession>) -> PanelOutcome {
    match result {
        Ok(session) => {
            let worked = session
                .sign_out_time
                .map(|end| format_hms((end - session.sign_in_time).num_seconds()))
                .unwrap_or_else(|| format_hms(0));
            PanelOutcome {
                notification: Notification::success(format!("Signed out after {worked}")),
                refresh: true,
                session: Some(session),
            }
        }
        Err(ServiceError::AlreadySignedOut) => PanelOutcome {
            notification: Notification::failure("This session is already closed"),
            refresh: true,
            session: None,
        },
        Err(ServiceError::NotFound(_)) => PanelOutcome {
            notification: Notification::failure("No active session found"),
            refresh: true,
            session: None,
        },
        Err(e) => PanelOutcome {
            notification: Notification::failure(failure_copy(&e, "Failed to sign out")),
            refresh: false,
            session: None,
        },
    }
}

pub struct SessionPanel<'a> {
    service: &'a AttendanceService,
}

impl<'a> SessionPanel<'a> {
    pub fn new(service: &'a AttendanceService) -> Self {
        Self { service }
    }

    /// The user's open session of today, if any.
    pub async fn active_session(&self, user_id: u64, company_id: Option<u64>) -> ServiceResult<Option<AttendanceSession>> {
        let filter = AttendanceFilter {
            user_id: Some(user_id),
            company_id,
            from: Some(start_of_local_day(Utc::now())),
            active_only: true,
            ..Default::default()
        };
        Ok(self.service.get_attendance(&filter).await?.into_iter().next())
    }

    pub async fn view(&self, user_id: u64, company_id: Option<u64>) -> ServiceResult<PanelView> {
        let session = self.active_session(user_id, company_id).await?;
        Ok(PanelView {
            clock: ClockView::derive(Utc::now(), session.as_ref()),
            session,
        })
    }

    pub async fn sign_in(&self, user_id: u64, company_id: Option<u64>) -> PanelOutcome {
        sign_in_outcome(self.service.sign_in(user_id, company_id).await)
    }

    pub async fn sign_out(&self, session_id: u64, company_id: u64) -> PanelOutcome {
        sign_out_outcome(self.service.sign_out(session_id, company_id).await)
    }
}
