//! Role-specific dashboard summaries.
//!
//! Every payload is assembled from independent count queries that run
//! concurrently on the pool; alerts are then derived from those counts by the
//! pure `*_alerts` functions below.

use crate::{
    auth::auth::{ADMIN_ONLY, AuthUser, HR_STAFF, MANAGERS},
    config::Config,
    error::ApiResult,
    model::{
        audit_log::AuditLog,
        process::{ProcessStatus, progress_percent},
        role::Role,
        time_entry::TimeEntry,
    },
};
use actix_web::{HttpResponse, http::header, web};
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::BTreeMap;
use tracing::debug;
use utoipa::ToSchema;

pub const ERROR_SPIKE_WARNING: i64 = 10;
pub const ERROR_SPIKE_CRITICAL: i64 = 50;
pub const PENDING_APPROVALS_WARNING: i64 = 10;
pub const WEEKLY_TARGET_HOURS: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Alert {
    pub severity: Severity,
    #[schema(example = "error_spike")]
    pub code: String,
    pub message: String,
}

impl Alert {
    fn new(severity: Severity, code: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Counts keyed by status (or role) name.
pub type Breakdown = BTreeMap<String, i64>;

#[derive(Debug, Serialize, ToSchema)]
pub struct UserCounts {
    pub total: i64,
    pub active: i64,
    pub by_role: Breakdown,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminDashboard {
    pub users: UserCounts,
    pub departments: i64,
    pub projects_by_status: Breakdown,
    pub pending_time_entries: i64,
    pub errors_last_24h: i64,
    pub recent_activity: Vec<AuditLog>,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RrhhDashboard {
    pub active_employees: i64,
    pub new_hires_last_30_days: i64,
    pub processes_by_status: Breakdown,
    pub overdue_processes: i64,
    pub pending_time_entries: i64,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ManagerDashboard {
    pub projects_by_status: Breakdown,
    pub tasks_by_status: Breakdown,
    pub team_hours_this_week: f64,
    pub pending_approvals: i64,
    pub overdue_tasks: i64,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OnboardingProgress {
    pub process_id: i64,
    pub status: ProcessStatus,
    #[schema(value_type = String, format = "date")]
    pub due_date: NaiveDate,
    pub completed_tasks: i64,
    pub total_tasks: i64,
    pub percent: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmployeeDashboard {
    pub hours_this_week: f64,
    pub hours_this_month: f64,
    pub entries_by_status: Breakdown,
    pub open_tasks: i64,
    pub overdue_tasks: i64,
    pub onboarding: Option<OnboardingProgress>,
    pub recent_entries: Vec<TimeEntry>,
    pub alerts: Vec<Alert>,
}

// ------------------------------------------------------------------
// Alert rules
// ------------------------------------------------------------------

pub fn admin_alerts(errors_last_24h: i64, pending_time_entries: i64, inactive_users: i64) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if errors_last_24h >= ERROR_SPIKE_CRITICAL {
        alerts.push(Alert::new(
            Severity::Critical,
            "error_spike",
            format!("{errors_last_24h} errors reported in the last 24 hours"),
        ));
    } else if errors_last_24h >= ERROR_SPIKE_WARNING {
        alerts.push(Alert::new(
            Severity::Warning,
            "error_spike",
            format!("{errors_last_24h} errors reported in the last 24 hours"),
        ));
    }

    if pending_time_entries > 0 {
        alerts.push(Alert::new(
            Severity::Info,
            "pending_time_entries",
            format!("{pending_time_entries} time entries awaiting approval"),
        ));
    }

    if inactive_users > 0 {
        alerts.push(Alert::new(
            Severity::Info,
            "inactive_users",
            format!("{inactive_users} deactivated accounts"),
        ));
    }

    alerts
}

pub fn rrhh_alerts(overdue_processes: i64, pending_processes: i64, pending_time_entries: i64) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if overdue_processes > 0 {
        alerts.push(Alert::new(
            Severity::Warning,
            "overdue_onboarding",
            format!("{overdue_processes} onboarding processes are past their due date"),
        ));
    }
    if pending_processes > 0 {
        alerts.push(Alert::new(
            Severity::Info,
            "onboarding_not_started",
            format!("{pending_processes} onboarding processes have not started"),
        ));
    }
    if pending_time_entries > 0 {
        alerts.push(Alert::new(
            Severity::Info,
            "pending_time_entries",
            format!("{pending_time_entries} time entries awaiting approval"),
        ));
    }

    alerts
}

pub fn manager_alerts(overdue_tasks: i64, pending_approvals: i64) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if overdue_tasks > 0 {
        alerts.push(Alert::new(
            Severity::Warning,
            "overdue_tasks",
            format!("{overdue_tasks} open tasks are past their due date"),
        ));
    }

    if pending_approvals >= PENDING_APPROVALS_WARNING {
        alerts.push(Alert::new(
            Severity::Warning,
            "pending_approvals",
            format!("{pending_approvals} time entries awaiting your approval"),
        ));
    } else if pending_approvals > 0 {
        alerts.push(Alert::new(
            Severity::Info,
            "pending_approvals",
            format!("{pending_approvals} time entries awaiting your approval"),
        ));
    }

    alerts
}

/// `weekday` is the current day; the weekly target is only checked from Friday on.
pub fn employee_alerts(
    hours_this_week: f64,
    weekday: Weekday,
    overdue_tasks: i64,
    rejected_entries: i64,
    onboarding_overdue: bool,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    let late_in_week = weekday.number_from_monday() >= Weekday::Fri.number_from_monday();
    if late_in_week && hours_this_week < WEEKLY_TARGET_HOURS {
        alerts.push(Alert::new(
            Severity::Warning,
            "weekly_hours_low",
            format!("{hours_this_week} of {WEEKLY_TARGET_HOURS} hours logged this week"),
        ));
    }
    if overdue_tasks > 0 {
        alerts.push(Alert::new(
            Severity::Warning,
            "overdue_tasks",
            format!("{overdue_tasks} of your tasks are past their due date"),
        ));
    }
    if rejected_entries > 0 {
        alerts.push(Alert::new(
            Severity::Info,
            "rejected_entries",
            format!("{rejected_entries} of your time entries were rejected"),
        ));
    }
    if onboarding_overdue {
        alerts.push(Alert::new(
            Severity::Warning,
            "onboarding_overdue",
            "Your onboarding is past its due date",
        ));
    }

    alerts
}

// ------------------------------------------------------------------
// Query helpers
// ------------------------------------------------------------------

fn week_start(today: NaiveDate) -> NaiveDate {
    today - Duration::days(i64::from(today.weekday().num_days_from_monday()))
}

fn month_start(today: NaiveDate) -> NaiveDate {
    today.with_day(1).unwrap_or(today)
}

async fn count(pool: &PgPool, sql: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await
}

/// Like [`count`] with `$1` bound to a (possibly null) user id.
async fn count_for(pool: &PgPool, sql: &str, id: Option<i64>) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(sql).bind(id).fetch_one(pool).await
}

async fn hours_since(pool: &PgPool, sql: &str, id: Option<i64>, since: NaiveDate) -> Result<f64, sqlx::Error> {
    sqlx::query_scalar::<_, f64>(sql).bind(id).bind(since).fetch_one(pool).await
}

/// Runs a `SELECT key, COUNT(*) ... GROUP BY key` query.
async fn breakdown(pool: &PgPool, sql: &str) -> Result<Breakdown, sqlx::Error> {
    let rows: Vec<(String, i64)> = sqlx::query_as(sql).fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}

async fn breakdown_for(pool: &PgPool, sql: &str, id: Option<i64>) -> Result<Breakdown, sqlx::Error> {
    let rows: Vec<(String, i64)> = sqlx::query_as(sql).bind(id).fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}

fn with_cache(config: &Config, body: impl Serialize) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((
            header::CACHE_CONTROL,
            format!("private, max-age={}", config.cache_short_secs),
        ))
        .json(body)
}

// ------------------------------------------------------------------
// Payload builders
// ------------------------------------------------------------------

pub async fn build_admin(pool: &PgPool) -> Result<AdminDashboard, sqlx::Error> {
    let (total, active, by_role, departments, projects_by_status, pending, errors, recent) = futures::try_join!(
        count(pool, "SELECT COUNT(*) FROM users"),
        count(pool, "SELECT COUNT(*) FROM users WHERE is_active"),
        breakdown(pool, "SELECT role, COUNT(*) FROM users WHERE is_active GROUP BY role"),
        count(pool, "SELECT COUNT(*) FROM departments"),
        breakdown(pool, "SELECT status, COUNT(*) FROM projects GROUP BY status"),
        count(pool, "SELECT COUNT(*) FROM time_entries WHERE status = 'pending'"),
        count(pool, "SELECT COUNT(*) FROM error_logs WHERE created_at > NOW() - INTERVAL '24 hours'"),
        sqlx::query_as::<_, AuditLog>("SELECT * FROM audit_logs ORDER BY created_at DESC, id DESC LIMIT 10")
            .fetch_all(pool),
    )?;

    Ok(AdminDashboard {
        alerts: admin_alerts(errors, pending, total - active),
        users: UserCounts { total, active, by_role },
        departments,
        projects_by_status,
        pending_time_entries: pending,
        errors_last_24h: errors,
        recent_activity: recent,
    })
}

pub async fn build_rrhh(pool: &PgPool) -> Result<RrhhDashboard, sqlx::Error> {
    let (active_employees, new_hires, processes_by_status, overdue, pending_entries) = futures::try_join!(
        count(pool, "SELECT COUNT(*) FROM users WHERE is_active AND role = 'employee'"),
        count(pool, "SELECT COUNT(*) FROM users WHERE created_at > NOW() - INTERVAL '30 days'"),
        breakdown(pool, "SELECT status, COUNT(*) FROM onboarding_processes GROUP BY status"),
        count(
            pool,
            r#"SELECT COUNT(*) FROM onboarding_processes
               WHERE status IN ('pending', 'in_progress') AND due_date < CURRENT_DATE"#
        ),
        count(pool, "SELECT COUNT(*) FROM time_entries WHERE status = 'pending'"),
    )?;

    let not_started = processes_by_status
        .get(ProcessStatus::Pending.as_ref())
        .copied()
        .unwrap_or(0);

    Ok(RrhhDashboard {
        alerts: rrhh_alerts(overdue, not_started, pending_entries),
        active_employees,
        new_hires_last_30_days: new_hires,
        processes_by_status,
        overdue_processes: overdue,
        pending_time_entries: pending_entries,
    })
}

/// `manager_id = None` aggregates over every project (admin view).
pub async fn build_manager(pool: &PgPool, manager_id: Option<i64>, today: NaiveDate) -> Result<ManagerDashboard, sqlx::Error> {
    let (projects_by_status, tasks_by_status, team_hours, pending_approvals, overdue_tasks) = futures::try_join!(
        breakdown_for(
            pool,
            "SELECT status, COUNT(*) FROM projects WHERE ($1::BIGINT IS NULL OR manager_id = $1) GROUP BY status",
            manager_id
        ),
        breakdown_for(
            pool,
            r#"SELECT t.status, COUNT(*) FROM tasks t JOIN projects p ON p.id = t.project_id
               WHERE ($1::BIGINT IS NULL OR p.manager_id = $1) GROUP BY t.status"#,
            manager_id
        ),
        hours_since(
            pool,
            r#"SELECT COALESCE(SUM(te.hours), 0)::DOUBLE PRECISION
               FROM time_entries te JOIN projects p ON p.id = te.project_id
               WHERE ($1::BIGINT IS NULL OR p.manager_id = $1) AND te.date >= $2 AND te.status <> 'rejected'"#,
            manager_id,
            week_start(today)
        ),
        count_for(
            pool,
            r#"SELECT COUNT(*) FROM time_entries te JOIN projects p ON p.id = te.project_id
               WHERE ($1::BIGINT IS NULL OR p.manager_id = $1) AND te.status = 'pending'
                 AND ($1::BIGINT IS NULL OR te.user_id <> $1)"#,
            manager_id
        ),
        count_for(
            pool,
            r#"SELECT COUNT(*) FROM tasks t JOIN projects p ON p.id = t.project_id
               WHERE ($1::BIGINT IS NULL OR p.manager_id = $1)
                 AND t.status NOT IN ('done', 'cancelled') AND t.due_date < CURRENT_DATE"#,
            manager_id
        ),
    )?;

    Ok(ManagerDashboard {
        alerts: manager_alerts(overdue_tasks, pending_approvals),
        projects_by_status,
        tasks_by_status,
        team_hours_this_week: team_hours,
        pending_approvals,
        overdue_tasks,
    })
}

#[derive(sqlx::FromRow)]
struct OnboardingRow {
    id: i64,
    #[sqlx(try_from = "String")]
    status: ProcessStatus,
    due_date: NaiveDate,
    completed: i64,
    total: i64,
}

pub async fn build_employee(pool: &PgPool, user_id: i64, today: NaiveDate) -> Result<EmployeeDashboard, sqlx::Error> {
    let own = Some(user_id);
    let own_hours_sql = r#"SELECT COALESCE(SUM(hours), 0)::DOUBLE PRECISION FROM time_entries
                           WHERE user_id = $1 AND date >= $2 AND status <> 'rejected'"#;

    let (week, month, entries_by_status, open_tasks, overdue_tasks, onboarding, recent) = futures::try_join!(
        hours_since(pool, own_hours_sql, own, week_start(today)),
        hours_since(pool, own_hours_sql, own, month_start(today)),
        breakdown_for(
            pool,
            "SELECT status, COUNT(*) FROM time_entries WHERE user_id = $1 GROUP BY status",
            own
        ),
        count_for(
            pool,
            "SELECT COUNT(*) FROM tasks WHERE assignee_id = $1 AND status NOT IN ('done', 'cancelled')",
            own
        ),
        count_for(
            pool,
            r#"SELECT COUNT(*) FROM tasks
               WHERE assignee_id = $1 AND status NOT IN ('done', 'cancelled') AND due_date < CURRENT_DATE"#,
            own
        ),
        sqlx::query_as::<_, OnboardingRow>(
            r#"
            SELECT op.id, op.status, op.due_date,
                   COUNT(pt.id) FILTER (WHERE pt.completed) AS completed,
                   COUNT(pt.id) AS total
            FROM onboarding_processes op
            LEFT JOIN process_tasks pt ON pt.process_id = op.id
            WHERE op.employee_id = $1 AND op.status <> 'cancelled'
            GROUP BY op.id
            ORDER BY op.start_date DESC, op.id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool),
        sqlx::query_as::<_, TimeEntry>(
            "SELECT * FROM time_entries WHERE user_id = $1 ORDER BY date DESC, id DESC LIMIT 5"
        )
        .bind(user_id)
        .fetch_all(pool),
    )?;

    let onboarding = onboarding.map(|row| OnboardingProgress {
        process_id: row.id,
        status: row.status,
        due_date: row.due_date,
        completed_tasks: row.completed,
        total_tasks: row.total,
        percent: progress_percent(row.completed, row.total),
    });

    let onboarding_overdue = onboarding
        .as_ref()
        .is_some_and(|o| !o.status.is_closed() && o.due_date < today);
    let rejected = entries_by_status.get("rejected").copied().unwrap_or(0);

    Ok(EmployeeDashboard {
        alerts: employee_alerts(week, today.weekday(), overdue_tasks, rejected, onboarding_overdue),
        hours_this_week: week,
        hours_this_month: month,
        entries_by_status,
        open_tasks,
        overdue_tasks,
        onboarding,
        recent_entries: recent,
    })
}

// ------------------------------------------------------------------
// Handlers
// ------------------------------------------------------------------

/// Dashboard for the caller's role
#[utoipa::path(
    get,
    path = "/api/dashboard",
    responses(
        (status = 200, description = "One of the role dashboards, picked by the caller's role"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Dashboard",
    security(("bearer_auth" = []))
)]
pub async fn my_dashboard(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let today = Utc::now().date_naive();
    debug!(role = %auth.role, "Building dashboard");

    let response = match auth.role {
        Role::Admin => with_cache(&config, build_admin(pool.get_ref()).await?),
        Role::Rrhh => with_cache(&config, build_rrhh(pool.get_ref()).await?),
        Role::Manager => with_cache(
            &config,
            build_manager(pool.get_ref(), Some(auth.user_id), today).await?,
        ),
        Role::Employee => with_cache(&config, build_employee(pool.get_ref(), auth.user_id, today).await?),
    };

    Ok(response)
}

/// Admin dashboard
#[utoipa::path(
    get,
    path = "/api/dashboard/admin",
    responses((status = 200, description = "Admin dashboard", body = AdminDashboard), (status = 403, description = "Forbidden")),
    tag = "Dashboard",
    security(("bearer_auth" = []))
)]
pub async fn admin_dashboard(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    auth.require_roles(ADMIN_ONLY)?;
    Ok(with_cache(&config, build_admin(pool.get_ref()).await?))
}

/// HR dashboard
#[utoipa::path(
    get,
    path = "/api/dashboard/rrhh",
    responses((status = 200, description = "HR dashboard", body = RrhhDashboard), (status = 403, description = "Forbidden")),
    tag = "Dashboard",
    security(("bearer_auth" = []))
)]
pub async fn rrhh_dashboard(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    auth.require_roles(HR_STAFF)?;
    Ok(with_cache(&config, build_rrhh(pool.get_ref()).await?))
}

/// Manager dashboard
///
/// Admins get the aggregate over every project.
#[utoipa::path(
    get,
    path = "/api/dashboard/manager",
    responses((status = 200, description = "Manager dashboard", body = ManagerDashboard), (status = 403, description = "Forbidden")),
    tag = "Dashboard",
    security(("bearer_auth" = []))
)]
pub async fn manager_dashboard(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    auth.require_roles(MANAGERS)?;
    let scope = (!auth.is_admin()).then_some(auth.user_id);
    let dashboard = build_manager(pool.get_ref(), scope, Utc::now().date_naive()).await?;
    Ok(with_cache(&config, dashboard))
}

/// Employee dashboard
#[utoipa::path(
    get,
    path = "/api/dashboard/employee",
    responses((status = 200, description = "Employee dashboard", body = EmployeeDashboard), (status = 403, description = "Forbidden")),
    tag = "Dashboard",
    security(("bearer_auth" = []))
)]
pub async fn employee_dashboard(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    auth.require_roles(&[Role::Admin, Role::Employee])?;
    let dashboard = build_employee(pool.get_ref(), auth.user_id, Utc::now().date_naive()).await?;
    Ok(with_cache(&config, dashboard))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(alerts: &[Alert]) -> Vec<&str> {
        alerts.iter().map(|a| a.code.as_str()).collect()
    }

    #[test]
    fn error_spike_escalates() {
        assert!(admin_alerts(9, 0, 0).is_empty());
        assert_eq!(admin_alerts(10, 0, 0)[0].severity, Severity::Warning);
        assert_eq!(admin_alerts(50, 0, 0)[0].severity, Severity::Critical);
        assert_eq!(codes(&admin_alerts(0, 3, 1)), ["pending_time_entries", "inactive_users"]);
    }

    #[test]
    fn rrhh_overdue_is_a_warning() {
        let alerts = rrhh_alerts(2, 0, 0);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(codes(&rrhh_alerts(0, 1, 4)), ["onboarding_not_started", "pending_time_entries"]);
        assert!(rrhh_alerts(0, 0, 0).is_empty());
    }

    #[test]
    fn manager_approvals_escalate() {
        assert!(manager_alerts(0, 0).is_empty());
        assert_eq!(manager_alerts(0, 1)[0].severity, Severity::Info);
        assert_eq!(manager_alerts(0, 10)[0].severity, Severity::Warning);
        assert_eq!(codes(&manager_alerts(3, 2)), ["overdue_tasks", "pending_approvals"]);
    }

    #[test]
    fn weekly_target_only_checked_late_in_week() {
        assert!(employee_alerts(12.0, Weekday::Wed, 0, 0, false).is_empty());
        assert_eq!(codes(&employee_alerts(32.0, Weekday::Fri, 0, 0, false)), ["weekly_hours_low"]);
        assert_eq!(codes(&employee_alerts(32.0, Weekday::Sun, 0, 0, false)), ["weekly_hours_low"]);
        assert!(employee_alerts(40.0, Weekday::Fri, 0, 0, false).is_empty());
    }

    #[test]
    fn employee_alerts_cover_tasks_entries_and_onboarding() {
        let alerts = employee_alerts(40.0, Weekday::Mon, 1, 2, true);
        assert_eq!(codes(&alerts), ["overdue_tasks", "rejected_entries", "onboarding_overdue"]);
    }

    #[test]
    fn alerts_are_deterministic() {
        assert_eq!(admin_alerts(12, 4, 2), admin_alerts(12, 4, 2));
        assert_eq!(
            employee_alerts(10.0, Weekday::Sat, 1, 1, true),
            employee_alerts(10.0, Weekday::Sat, 1, 1, true)
        );
    }

    #[test]
    fn week_and_month_boundaries() {
        let thursday = NaiveDate::from_ymd_opt(2026, 1, 29).unwrap();
        assert_eq!(week_start(thursday), NaiveDate::from_ymd_opt(2026, 1, 26).unwrap());
        assert_eq!(week_start(NaiveDate::from_ymd_opt(2026, 1, 26).unwrap()).weekday(), Weekday::Mon);
        assert_eq!(month_start(thursday), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
    }
}
