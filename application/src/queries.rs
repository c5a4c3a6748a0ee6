//! Queries, served from the read model only.

use crate::error::ApplicationError;
use crate::read_model::{ApplicationDetails, ApplicationDetailsRepository, ApplicationFilter, Page};
use filplus_runtime::{Query, QueryHandler};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Largest accepted page size.
pub const MAX_PAGE_LIMIT: usize = 100;

const fn default_page() -> usize {
    1
}

const fn default_limit() -> usize {
    20
}

/// Fetch one application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetApplicationById {
    /// Application id.
    pub application_id: String,
}

impl Query for GetApplicationById {
    const NAME: &'static str = "GetApplicationById";
    type Output = ApplicationDetails;
    type Error = ApplicationError;
}

/// List applications.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetApplications {
    /// Status and text filter.
    #[serde(default)]
    pub filter: ApplicationFilter,
    /// 1-based page number.
    #[serde(default = "default_page")]
    pub page: usize,
    /// Page size, at most [`MAX_PAGE_LIMIT`].
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for GetApplications {
    fn default() -> Self {
        Self {
            filter: ApplicationFilter::default(),
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl Query for GetApplications {
    const NAME: &'static str = "GetApplications";
    type Output = Page<ApplicationDetails>;
    type Error = ApplicationError;
}

/// Handles every application query.
#[derive(Clone)]
pub struct ApplicationQueryHandler {
    details: Arc<dyn ApplicationDetailsRepository>,
}

impl ApplicationQueryHandler {
    /// Create a handler reading from `details`.
    #[must_use]
    pub fn new(details: Arc<dyn ApplicationDetailsRepository>) -> Self {
        Self { details }
    }
}

impl std::fmt::Debug for ApplicationQueryHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationQueryHandler").finish_non_exhaustive()
    }
}

impl QueryHandler<GetApplicationById> for ApplicationQueryHandler {
    fn handle(&self, query: GetApplicationById) -> BoxFuture<'_, Result<ApplicationDetails, ApplicationError>> {
        Box::pin(async move {
            self.details
                .get_by_id(&query.application_id)
                .await?
                .ok_or(ApplicationError::NotFound(query.application_id))
        })
    }
}

impl QueryHandler<GetApplications> for ApplicationQueryHandler {
    fn handle(&self, query: GetApplications) -> BoxFuture<'_, Result<Page<ApplicationDetails>, ApplicationError>> {
        Box::pin(async move {
            if query.page == 0 {
                return Err(ApplicationError::validation("page starts at 1"));
            }
            if query.limit == 0 || query.limit > MAX_PAGE_LIMIT {
                return Err(ApplicationError::validation(format!(
                    "limit must be between 1 and {MAX_PAGE_LIMIT}"
                )));
            }
            Ok(self.details.find(query.filter, query.page, query.limit).await?)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::read_model::{ApplicationDetailsUpdate, InMemoryApplicationDetailsRepository};
    use chrono::{DateTime, Utc};
    use tokio_test::{assert_err, assert_ok};

    async fn handler_with(ids: &[&str]) -> ApplicationQueryHandler {
        let repo = Arc::new(InMemoryApplicationDetailsRepository::new());
        for (number, id) in (1_u64..).zip(ids) {
            let update = ApplicationDetailsUpdate {
                number: Some(number),
                ..ApplicationDetailsUpdate::new(*id, DateTime::<Utc>::default())
            };
            assert_ok!(repo.upsert(update).await);
        }
        ApplicationQueryHandler::new(repo)
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let handler = handler_with(&[]).await;
        let result = handler
            .handle(GetApplicationById {
                application_id: "app-9".into(),
            })
            .await;
        assert_eq!(result, Err(ApplicationError::NotFound("app-9".into())));
    }

    #[tokio::test]
    async fn page_bounds_are_validated() {
        let handler = handler_with(&["app-1"]).await;
        for (page, limit) in [(0, 10), (1, 0), (1, MAX_PAGE_LIMIT + 1)] {
            let result = handler
                .handle(GetApplications {
                    page,
                    limit,
                    ..GetApplications::default()
                })
                .await;
            let error = assert_err!(result);
            assert_eq!(error.category(), crate::error::ErrorCategory::ValidationError);
        }
    }

    #[tokio::test]
    async fn lists_in_number_order() {
        let handler = handler_with(&["app-b", "app-a"]).await;
        let page = handler.handle(GetApplications::default()).await.unwrap();
        let ids: Vec<_> = page.items.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["app-b", "app-a"]);
        assert_eq!(page.total, 2);
    }

    #[test]
    fn list_query_defaults_from_json() {
        let query: GetApplications = serde_json::from_str("{}").unwrap();
        assert_eq!(query, GetApplications::default());
    }
}
