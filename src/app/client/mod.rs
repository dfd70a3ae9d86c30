//! Remote API client
//!
//! The production [`RemoteApi`]: issue, moment, front page, app and resource
//! metadata plus the download telemetry endpoints, all exchanged as JSON.
//!
//! The module is organized into specialized components:
//! - `config`: API client configuration and building
//! - `http`: JSON requests and failure mapping
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | issue of a publication | `GET issues/{feed}/{date}` |
//! | moment of a publication | `GET moments/{feed}/{date}` |
//! | front page of a publication | `GET frontpages/{feed}/{date}` |
//! | app info | `GET app-info` |
//! | newest resource pack | `GET resources` |
//! | download started | `POST downloads` |
//! | download finished | `POST downloads/{id}/stop` |

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app::models::{AppInfo, FrontPage, Issue, IssuePublication, Moment, ResourceInfo};
use crate::app::services::RemoteApi;
use crate::constants::api;
use crate::errors::{ConfigError, ConnectivityError};

pub mod config;
pub mod http;

#[cfg(test)]
pub(crate) mod tests;

pub use config::ApiConfig;
pub use http::JsonHandler;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadStart<'a> {
    feed_name: &'a str,
    issue_date: NaiveDate,
    is_automatic: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadStarted {
    download_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadStop {
    seconds_taken: f64,
}

#[derive(Debug, Deserialize)]
struct Acknowledged {
    #[serde(default)]
    ok: bool,
}

/// JSON client of the remote API
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    handler: JsonHandler,
}

impl HttpApiClient {
    /// Build a client from `config`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid or the HTTP
    /// client cannot be built
    pub fn new(config: &ApiConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = config.build_http_client()?;
        Ok(Self {
            handler: JsonHandler::new(client, config.base_url()?),
        })
    }

    pub fn handler(&self) -> &JsonHandler {
        &self.handler
    }

    fn publication_path(resource: &str, publication: &IssuePublication) -> String {
        format!(
            "{}/{}/{}",
            resource,
            publication.feed_name,
            publication.date.format("%Y-%m-%d")
        )
    }
}

/// Error for an answer about another publication than the requested one
fn unexpected_publication(
    requested: &IssuePublication,
    feed_name: &str,
    date: NaiveDate,
) -> ConnectivityError {
    ConnectivityError::Implementation {
        message: format!(
            "requested {} but received {}/{}",
            requested.tag(),
            feed_name,
            date
        ),
        status: None,
    }
}

#[async_trait]
impl RemoteApi for HttpApiClient {
    async fn get_issue_by_publication(
        &self,
        publication: &IssuePublication,
    ) -> Result<Issue, ConnectivityError> {
        let path = Self::publication_path(api::ISSUES, publication);
        let issue: Issue = self.handler.get(&path).await?;
        if issue.feed_name != publication.feed_name || issue.date != publication.date {
            return Err(unexpected_publication(publication, &issue.feed_name, issue.date));
        }
        debug!("Received {} with status {:?}", publication.tag(), issue.status);
        Ok(issue)
    }

    async fn get_moment_by_publication(
        &self,
        publication: &IssuePublication,
    ) -> Result<Moment, ConnectivityError> {
        let path = Self::publication_path(api::MOMENTS, publication);
        let moment: Moment = self.handler.get(&path).await?;
        if moment.issue_feed_name != publication.feed_name || moment.issue_date != publication.date {
            return Err(unexpected_publication(
                publication,
                &moment.issue_feed_name,
                moment.issue_date,
            ));
        }
        Ok(moment)
    }

    async fn get_front_page(
        &self,
        publication: &IssuePublication,
    ) -> Result<FrontPage, ConnectivityError> {
        let path = Self::publication_path(api::FRONT_PAGES, publication);
        let front_page: FrontPage = self.handler.get(&path).await?;
        let page = &front_page.page;
        if page.issue_feed_name != publication.feed_name || page.issue_date != publication.date {
            return Err(unexpected_publication(
                publication,
                &page.issue_feed_name,
                page.issue_date,
            ));
        }
        Ok(front_page)
    }

    async fn get_app_info(&self) -> Result<AppInfo, ConnectivityError> {
        self.handler.get(api::APP_INFO).await
    }

    async fn get_resource_info(&self) -> Result<ResourceInfo, ConnectivityError> {
        self.handler.get(api::RESOURCES).await
    }

    async fn notify_download_start(
        &self,
        feed_name: &str,
        date: NaiveDate,
        is_automatic: bool,
    ) -> Result<String, ConnectivityError> {
        let started: DownloadStarted = self
            .handler
            .post(
                api::DOWNLOADS,
                &DownloadStart {
                    feed_name,
                    issue_date: date,
                    is_automatic,
                },
            )
            .await?;
        Ok(started.download_id)
    }

    async fn notify_download_stop(
        &self,
        download_id: &str,
        seconds_taken: f64,
    ) -> Result<(), ConnectivityError> {
        let path = format!("{}/{}/stop", api::DOWNLOADS, download_id);
        let answer: Acknowledged = self
            .handler
            .post(&path, &DownloadStop { seconds_taken })
            .await?;
        if !answer.ok {
            debug!("Server did not acknowledge stop of download {}", download_id);
        }
        Ok(())
    }
}
