//! Test doubles and fixtures shared by the cache tests

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tempfile::TempDir;
use tokio::sync::Semaphore;

use crate::app::cache::{
    CacheContext, CacheItem, CacheOperation, CacheSettings, CacheState, ContentDownload,
    DownloadPriority, OperationCore, OperationDescriptor, OperationHandle, OperationRegistry,
};
use crate::app::models::{
    AppInfo, Article, ArticleType, Author, FileEntry, FrontPage, Image, Issue, IssuePublication,
    IssueStatus, Moment, Page, ResourceInfo, Section, StorageType,
};
use crate::app::services::{FileTransport, MetadataStore, RemoteApi};
use crate::app::storage::FsStorageService;
use crate::app::store::MemoryMetadataStore;
use crate::errors::{CacheError, CacheResult, ConnectivityError};

pub const FEED: &str = "taz";
pub const BASE_URL: &str = "https://cdn.example.test/taz/2024-01-31";
pub const RESOURCE_URL: &str = "https://cdn.example.test/resources";

pub fn issue_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
}

pub fn publication() -> IssuePublication {
    IssuePublication::new(FEED, issue_date())
}

/// Ordered record of what the doubles were asked to do
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.events().iter().position(|e| e.starts_with(prefix))
    }
}

/// Transport that "downloads" files by writing their name to the destination
pub struct FakeTransport {
    events: EventLog,
    store: Arc<MemoryMetadataStore>,
    failing: Mutex<HashSet<String>>,
}

impl FakeTransport {
    pub fn new(events: EventLog, store: Arc<MemoryMetadataStore>) -> Self {
        Self {
            events,
            store,
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make every transfer of `name` fail with a 404
    pub fn fail_file(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }
}

#[async_trait]
impl FileTransport for FakeTransport {
    async fn enqueue_download(&self, operation: Arc<ContentDownload>) -> CacheResult<()> {
        self.events.push(format!("enqueue:{}", operation.core().tag()));
        let failing = self.failing.lock().unwrap().clone();
        let store = self.store.clone();

        tokio::spawn(async move {
            let core = operation.core();
            core.notify_start().await;
            for item in core.items().await {
                let Some(file) = item.item().as_file() else {
                    continue;
                };
                let name = &file.file_entry.name;
                if failing.contains(name) {
                    let origin = file.origin.clone().unwrap_or_default();
                    core.notify_failed_item(ConnectivityError::from_status(404, &origin).into())
                        .await;
                    continue;
                }
                if let Some(destination) = &file.destination {
                    tokio::fs::create_dir_all(destination.parent().unwrap())
                        .await
                        .unwrap();
                    tokio::fs::write(destination, name.as_bytes()).await.unwrap();
                }
                store
                    .set_file_download_date(name, Some(Utc::now()))
                    .await
                    .unwrap();
                core.notify_successful_item().await;
            }
        });
        Ok(())
    }
}

/// Remote API serving fixed metadata
pub struct FakeApi {
    events: EventLog,
    issue: Mutex<Option<Issue>>,
    resources: Mutex<Option<ResourceInfo>>,
    app_info: Mutex<Option<AppInfo>>,
    failures_left: AtomicU32,
    pub issue_calls: AtomicUsize,
    pub resource_calls: AtomicUsize,
}

impl FakeApi {
    pub fn new(events: EventLog) -> Self {
        Self {
            events,
            issue: Mutex::new(None),
            resources: Mutex::new(None),
            app_info: Mutex::new(None),
            failures_left: AtomicU32::new(0),
            issue_calls: AtomicUsize::new(0),
            resource_calls: AtomicUsize::new(0),
        }
    }

    pub fn serve_issue(&self, issue: Issue) {
        *self.issue.lock().unwrap() = Some(issue);
    }

    pub fn serve_resources(&self, info: ResourceInfo) {
        *self.resources.lock().unwrap() = Some(info);
    }

    pub fn serve_app_info(&self, info: AppInfo) {
        *self.app_info.lock().unwrap() = Some(info);
    }

    fn served_issue(&self, publication: &IssuePublication) -> Result<Issue, ConnectivityError> {
        self.issue
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ConnectivityError::from_status(404, &publication.tag()))
    }

    /// Fail the next `count` metadata requests with a recoverable error
    pub fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    fn take_failure(&self) -> Result<(), ConnectivityError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(ConnectivityError::recoverable("connection reset"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for FakeApi {
    async fn get_issue_by_publication(
        &self,
        publication: &IssuePublication,
    ) -> Result<Issue, ConnectivityError> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        self.events.push(format!("api:issue:{}", publication.tag()));
        self.take_failure()?;
        self.served_issue(publication)
    }

    async fn get_moment_by_publication(
        &self,
        publication: &IssuePublication,
    ) -> Result<Moment, ConnectivityError> {
        self.events.push(format!("api:moment:{}", publication.tag()));
        self.take_failure()?;
        let issue = self.served_issue(publication)?;
        Ok(Moment {
            base_url: issue.base_url,
            ..issue.moment
        })
    }

    async fn get_front_page(
        &self,
        publication: &IssuePublication,
    ) -> Result<FrontPage, ConnectivityError> {
        self.events.push(format!("api:frontpage:{}", publication.tag()));
        self.take_failure()?;
        let issue = self.served_issue(publication)?;
        let page = issue
            .page_list
            .first()
            .cloned()
            .ok_or_else(|| ConnectivityError::from_status(404, &publication.tag()))?;
        Ok(FrontPage {
            page: Page {
                base_url: issue.base_url.clone(),
                ..page
            },
            issue_status: issue.status,
        })
    }

    async fn get_app_info(&self) -> Result<AppInfo, ConnectivityError> {
        self.events.push("api:app-info");
        self.take_failure()?;
        self.app_info
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ConnectivityError::from_status(404, "app-info"))
    }

    async fn get_resource_info(&self) -> Result<ResourceInfo, ConnectivityError> {
        self.resource_calls.fetch_add(1, Ordering::SeqCst);
        self.events.push("api:resources");
        self.take_failure()?;
        self.resources
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ConnectivityError::from_status(404, "resources"))
    }

    async fn notify_download_start(
        &self,
        feed_name: &str,
        date: NaiveDate,
        is_automatic: bool,
    ) -> Result<String, ConnectivityError> {
        self.events
            .push(format!("telemetry:start:{}/{}:{}", feed_name, date, is_automatic));
        Ok("download-1".to_string())
    }

    async fn notify_download_stop(
        &self,
        download_id: &str,
        _seconds_taken: f64,
    ) -> Result<(), ConnectivityError> {
        self.events.push(format!("telemetry:stop:{}", download_id));
        Ok(())
    }
}

/// Context wired to the doubles, storing files in a temporary directory
pub struct TestEnv {
    pub ctx: CacheContext,
    pub store: Arc<MemoryMetadataStore>,
    pub storage: Arc<FsStorageService>,
    pub transport: Arc<FakeTransport>,
    pub api: Arc<FakeApi>,
    pub events: EventLog,
    _temp_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let events = EventLog::default();
        let store = Arc::new(MemoryMetadataStore::new());
        let storage = Arc::new(FsStorageService::new(temp_dir.path()));
        let transport = Arc::new(FakeTransport::new(events.clone(), store.clone()));
        let api = Arc::new(FakeApi::new(events.clone()));

        let ctx = CacheContext {
            store: store.clone(),
            transport: transport.clone(),
            storage: storage.clone(),
            api: api.clone(),
            registry: Arc::new(OperationRegistry::default()),
            settings: CacheSettings::for_testing(),
        };

        Self {
            ctx,
            store,
            storage,
            transport,
            api,
            events,
            _temp_dir: temp_dir,
        }
    }

    /// Serve the fixture issue and a resource pack new enough for it
    pub fn serve_fixture(&self) -> Issue {
        let issue = test_issue(IssueStatus::Regular);
        self.api.serve_issue(issue.clone());
        self.api.serve_resources(test_resources(issue.min_resource_version));
        issue
    }

    pub async fn stored_issue(&self) -> Option<Issue> {
        self.store
            .get_issues_by_publication(&publication())
            .await
            .unwrap()
            .into_iter()
            .next()
    }

    pub fn path_of(&self, file: &FileEntry) -> std::path::PathBuf {
        use crate::app::services::StorageService;
        let mut file = file.clone();
        file.storage_location = Some(self.ctx.settings.storage_location);
        self.storage.absolute_path(&file).unwrap()
    }
}

fn issue_file(name: &str) -> FileEntry {
    FileEntry::new(name, StorageType::Issue, "taz/2024-01-31", "", 10)
}

fn article(name: &str) -> Article {
    Article {
        article_html: issue_file(name),
        issue_feed_name: FEED.to_string(),
        issue_date: issue_date(),
        title: Some(name.to_string()),
        audio_file: None,
        image_list: vec![Image {
            file: issue_file(&format!("{}.jpg", name.trim_end_matches(".html"))),
            high_resolution: false,
        }],
        author_list: vec![Author {
            name: "A. Writer".to_string(),
            image: Some(FileEntry::new("author.png", StorageType::Global, "", "", 5)),
        }],
        bookmarked: false,
        article_type: ArticleType::Standard,
    }
}

/// Issue with an imprint, one section holding two articles that share an
/// author image, a moment and one page
pub fn test_issue(status: IssueStatus) -> Issue {
    let mut imprint = article("imprint.html");
    imprint.article_type = ArticleType::Imprint;
    imprint.author_list.clear();

    Issue {
        feed_name: FEED.to_string(),
        date: issue_date(),
        status,
        base_url: BASE_URL.to_string(),
        min_resource_version: 2,
        moment: Moment {
            issue_feed_name: FEED.to_string(),
            issue_date: issue_date(),
            issue_status: status,
            image_list: vec![Image {
                file: issue_file("moment.jpg"),
                high_resolution: true,
            }],
            base_url: String::new(),
        },
        imprint: Some(imprint),
        section_list: vec![Section {
            section_html: issue_file("s1.html"),
            issue_feed_name: FEED.to_string(),
            issue_date: issue_date(),
            title: Some("Politics".to_string()),
            image_list: vec![],
            article_list: vec![article("a1.html"), article("a2.html")],
        }],
        page_list: vec![Page {
            page_pdf: issue_file("p1.pdf"),
            issue_feed_name: FEED.to_string(),
            issue_date: issue_date(),
            title: None,
            base_url: String::new(),
        }],
    }
}

pub fn test_resources(version: u32) -> ResourceInfo {
    ResourceInfo {
        resource_version: version,
        resource_base_url: RESOURCE_URL.to_string(),
        resource_list: vec![FileEntry::new("style.css", StorageType::Resource, "", "", 3)],
    }
}

/// Marker making a second, distinct scripted operation type
pub struct Other;

/// Operation whose work blocks until the test hands out a permit
pub struct ScriptedOperation<K: 'static = ()> {
    core: OperationCore<u32>,
    gate: Arc<Semaphore>,
    runs: Arc<AtomicUsize>,
    outcome: CacheResult<u32>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: 'static> ScriptedOperation<K> {
    pub fn new(
        registry: &Arc<OperationRegistry>,
        tag: &str,
        priority: DownloadPriority,
        gate: &Arc<Semaphore>,
        outcome: CacheResult<u32>,
    ) -> Arc<Self> {
        Self::with_items(registry, tag, priority, gate, outcome, Vec::new())
    }

    pub fn with_items(
        registry: &Arc<OperationRegistry>,
        tag: &str,
        priority: DownloadPriority,
        gate: &Arc<Semaphore>,
        outcome: CacheResult<u32>,
        items: Vec<CacheItem>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|owner: &Weak<Self>| {
            let owner: Weak<dyn OperationHandle> = owner.clone();
            Self {
                core: OperationCore::new(
                    owner,
                    OperationDescriptor {
                        tag: tag.to_string(),
                        loading_state: CacheState::LoadingContent,
                        target_state: CacheState::Present,
                        priority,
                    },
                    items,
                    registry.clone(),
                ),
                gate: gate.clone(),
                runs: Arc::new(AtomicUsize::new(0)),
                outcome,
                _kind: PhantomData,
            }
        })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<K: 'static> CacheOperation for ScriptedOperation<K> {
    type Output = u32;

    fn core(&self) -> &OperationCore<u32> {
        &self.core
    }

    async fn do_work(self: Arc<Self>) -> CacheResult<u32> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.core.notify_start().await;
        self.gate.acquire().await.unwrap().forget();
        self.outcome.clone()
    }
}

/// Poll `condition` until it holds, failing the test after a second
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

pub fn failure(message: &str) -> CacheResult<u32> {
    Err(CacheError::failed(message))
}
