use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::model::audit_log::AuditLog;
use crate::model::error_log::ErrorLog;
use crate::model::process::OnboardingProcess;
use crate::model::project::Project;
use crate::model::task::Task;
use crate::model::time_entry::TimeEntry;
use crate::model::user::UserProfile;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Page number, starting at 1
    pub page: Option<u32>,
    /// Items per page (max 100)
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn resolve(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }

    pub fn wrap<T>(&self, data: Vec<T>, total: i64) -> Paginated<T> {
        Paginated {
            data,
            page: self.page,
            per_page: self.per_page,
            total,
        }
    }
}

impl From<&PageQuery> for Page {
    fn from(q: &PageQuery) -> Self {
        Page::resolve(q.page, q.per_page)
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[aliases(
    PaginatedUsers = Paginated<UserProfile>,
    PaginatedProjects = Paginated<Project>,
    PaginatedTasks = Paginated<Task>,
    PaginatedTimeEntries = Paginated<TimeEntry>,
    PaginatedProcesses = Paginated<OnboardingProcess>,
    PaginatedAuditLogs = Paginated<AuditLog>,
    PaginatedErrorLogs = Paginated<ErrorLog>
)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 57)]
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamps() {
        assert_eq!(Page::resolve(None, None), Page { page: 1, per_page: 20 });
        assert_eq!(Page::resolve(Some(0), Some(0)), Page { page: 1, per_page: 1 });
        assert_eq!(Page::resolve(Some(3), Some(500)), Page { page: 3, per_page: 100 });
    }

    #[test]
    fn offset_is_zero_based() {
        let page = Page::resolve(Some(3), Some(25));
        assert_eq!(page.limit(), 25);
        assert_eq!(page.offset(), 50);
    }

    #[test]
    fn wrap_carries_the_page_metadata() {
        let wrapped = Page::resolve(Some(2), Some(10)).wrap(vec![1, 2, 3], 13);
        assert_eq!(wrapped.page, 2);
        assert_eq!(wrapped.per_page, 10);
        assert_eq!(wrapped.total, 13);
        assert_eq!(wrapped.data.len(), 3);
    }

    #[test]
    fn aliases_serialize_as_the_documented_envelope() {
        let body: PaginatedAuditLogs = Page::resolve(None, None).wrap(Vec::new(), 0);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["data"], serde_json::json!([]));
        assert_eq!(json["per_page"], 20);
        assert_eq!(json["total"], 0);
    }
}
