use crate::api::dashboard::{
    AdminDashboard, Alert, EmployeeDashboard, ManagerDashboard, OnboardingProgress, RrhhDashboard, Severity,
    UserCounts,
};
use crate::api::departments::CreateDepartmentReq;
use crate::api::error_logs::ReportErrorReq;
use crate::api::processes::{CreateProcessReq, ProcessDetail, ProcessProgress, UpdateProcessStatusReq};
use crate::api::projects::CreateProjectReq;
use crate::api::tasks::CreateTaskReq;
use crate::api::templates::{TemplateDetail, TemplateReq, TemplateTaskReq};
use crate::api::time_tracking::{CreateTimeEntryReq, RejectReq, TimeSummary};
use crate::api::users::CreateUserReq;
use crate::model::audit_log::AuditLog;
use crate::model::department::Department;
use crate::model::error_log::{ErrorLevel, ErrorLog, ErrorSource};
use crate::model::process::{OnboardingProcess, ProcessStatus, ProcessTask};
use crate::model::project::{Project, ProjectStatus};
use crate::model::role::Role;
use crate::model::task::{Task, TaskPriority, TaskStatus};
use crate::model::template::{OnboardingTemplate, TemplateTask};
use crate::model::time_entry::{ApprovalStatus, TimeEntry};
use crate::model::user::UserProfile;
use crate::models::{
    ChangePasswordReq, ForgotPasswordReq, LoginReqDto, LoginResponse, MfaChallenge, MfaCodeReq, MfaDisableReq,
    MfaSetupResponse, MfaVerifyReq, RefreshReq, ResetPasswordReq, TokenPair,
};
use crate::utils::pagination::{
    PaginatedAuditLogs, PaginatedErrorLogs, PaginatedProcesses, PaginatedProjects, PaginatedTasks,
    PaginatedTimeEntries, PaginatedUsers,
};
use crate::validation::FieldError;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "TeamHub API",
        version = "1.0.0",
        description = r#"
## TeamHub

Role-based HR and onboarding backend.

### Key Features
- **Authentication**: login, TOTP multi-factor auth, refresh rotation, password reset/change
- **People**: users, departments
- **Onboarding**: templates and the processes started from them
- **Projects & time**: projects, tasks, time entries with approval
- **Dashboards**: admin, HR (`rrhh`), manager and employee summaries

### Security
Endpoints under `/api` require a **JWT Bearer** access token, except `POST /api/errors`.
Roles: `admin`, `rrhh`, `manager`, `employee`.

### Errors
Errors are `{"error": "..."}`; validation failures add a `fields` array.
"#,
    ),
    paths(
        crate::api::health::health,

        crate::auth::handlers::login,
        crate::auth::handlers::verify_mfa,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::forgot_password,
        crate::auth::handlers::reset_password,
        crate::auth::handlers::change_password,
        crate::auth::handlers::me,
        crate::auth::handlers::mfa_setup,
        crate::auth::handlers::mfa_enable,
        crate::auth::handlers::mfa_disable,

        crate::api::users::list_users,
        crate::api::users::create_user,
        crate::api::users::get_user,
        crate::api::users::update_user,
        crate::api::users::deactivate_user,

        crate::api::departments::list_departments,
        crate::api::departments::get_department,
        crate::api::departments::create_department,
        crate::api::departments::update_department,
        crate::api::departments::delete_department,

        crate::api::templates::list_templates,
        crate::api::templates::get_template,
        crate::api::templates::create_template,
        crate::api::templates::update_template,
        crate::api::templates::delete_template,

        crate::api::processes::create_process,
        crate::api::processes::list_processes,
        crate::api::processes::get_process,
        crate::api::processes::update_process_status,
        crate::api::processes::complete_process_task,

        crate::api::projects::list_projects,
        crate::api::projects::get_project,
        crate::api::projects::create_project,
        crate::api::projects::update_project,
        crate::api::projects::delete_project,

        crate::api::tasks::list_project_tasks,
        crate::api::tasks::create_task,
        crate::api::tasks::get_task,
        crate::api::tasks::update_task,
        crate::api::tasks::delete_task,

        crate::api::time_tracking::create_time_entry,
        crate::api::time_tracking::list_time_entries,
        crate::api::time_tracking::update_time_entry,
        crate::api::time_tracking::delete_time_entry,
        crate::api::time_tracking::approve_time_entry,
        crate::api::time_tracking::reject_time_entry,
        crate::api::time_tracking::time_summary,

        crate::api::dashboard::my_dashboard,
        crate::api::dashboard::admin_dashboard,
        crate::api::dashboard::rrhh_dashboard,
        crate::api::dashboard::manager_dashboard,
        crate::api::dashboard::employee_dashboard,

        crate::api::error_logs::report_error,
        crate::api::error_logs::list_errors,

        crate::api::audit_logs::list_audit_logs
    ),
    components(
        schemas(
            FieldError,
            Role,
            LoginReqDto,
            LoginResponse,
            MfaChallenge,
            MfaVerifyReq,
            MfaCodeReq,
            MfaDisableReq,
            MfaSetupResponse,
            TokenPair,
            RefreshReq,
            ForgotPasswordReq,
            ResetPasswordReq,
            ChangePasswordReq,
            UserProfile,
            CreateUserReq,
            PaginatedUsers,
            Department,
            CreateDepartmentReq,
            OnboardingTemplate,
            TemplateTask,
            TemplateReq,
            TemplateTaskReq,
            TemplateDetail,
            OnboardingProcess,
            ProcessTask,
            ProcessStatus,
            ProcessProgress,
            ProcessDetail,
            CreateProcessReq,
            UpdateProcessStatusReq,
            PaginatedProcesses,
            Project,
            ProjectStatus,
            CreateProjectReq,
            PaginatedProjects,
            Task,
            TaskStatus,
            TaskPriority,
            CreateTaskReq,
            PaginatedTasks,
            TimeEntry,
            ApprovalStatus,
            CreateTimeEntryReq,
            RejectReq,
            TimeSummary,
            PaginatedTimeEntries,
            Severity,
            Alert,
            UserCounts,
            AdminDashboard,
            RrhhDashboard,
            ManagerDashboard,
            OnboardingProgress,
            EmployeeDashboard,
            ErrorLog,
            ErrorSource,
            ErrorLevel,
            ReportErrorReq,
            PaginatedErrorLogs,
            AuditLog,
            PaginatedAuditLogs
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Auth", description = "Sessions, MFA and passwords"),
        (name = "Users", description = "User administration"),
        (name = "Departments", description = "Departments"),
        (name = "Onboarding", description = "Onboarding templates and processes"),
        (name = "Projects", description = "Projects"),
        (name = "Tasks", description = "Project tasks"),
        (name = "Time tracking", description = "Time entries and approvals"),
        (name = "Dashboard", description = "Role-specific summaries"),
        (name = "Errors", description = "Error reporting"),
        (name = "Audit", description = "Audit trail"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_declares_bearer_scheme_and_core_paths() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();

        assert!(json["components"]["securitySchemes"]["bearer_auth"].is_object());
        for path in ["/auth/login", "/auth/mfa/verify", "/api/time-entries/{entry_id}/approve", "/api/dashboard"] {
            assert!(json["paths"][path].is_object(), "missing {path}");
        }
    }
}
