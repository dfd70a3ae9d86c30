//! In-memory metadata store with optional JSON persistence
//!
//! Keeps issues, moments and front pages fetched on their own, the app info,
//! resource packs, file entries and download dates in memory.
//! When opened with a path, every mutation rewrites a JSON snapshot using
//! the temp-file and rename pattern, so a crash never leaves a torn file.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::app::models::{
    AppInfo, Article, Collection, FileEntry, Issue, IssueKey, IssuePublication, IssueStatus,
    Moment, Page, ResourceInfo,
};
use crate::app::services::MetadataStore;
use crate::app::storage::FsStorageService;
use crate::errors::{StoreError, StoreResult};

/// Serialized form of the store
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreSnapshot {
    #[serde(default)]
    issues: Vec<Issue>,
    #[serde(default)]
    moments: Vec<Moment>,
    #[serde(default)]
    front_pages: Vec<StoredFrontPage>,
    #[serde(default)]
    app_info: Option<AppInfo>,
    #[serde(default)]
    resource_infos: Vec<ResourceInfo>,
    #[serde(default)]
    file_entries: Vec<FileEntry>,
    #[serde(default)]
    download_dates: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    file_download_dates: BTreeMap<String, DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredFrontPage {
    status: IssueStatus,
    page: Page,
}

#[derive(Debug, Default)]
struct StoreState {
    issues: HashMap<IssueKey, Issue>,
    /// Moments fetched without their issue
    moments: HashMap<IssueKey, Moment>,
    /// Front pages fetched without their issue
    front_pages: HashMap<IssueKey, Page>,
    app_info: Option<AppInfo>,
    resource_infos: BTreeMap<u32, ResourceInfo>,
    file_entries: HashMap<String, FileEntry>,
    download_dates: HashMap<String, DateTime<Utc>>,
    file_download_dates: HashMap<String, DateTime<Utc>>,
}

impl StoreState {
    fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            issues: snapshot
                .issues
                .into_iter()
                .map(|issue| (issue.key(), issue))
                .collect(),
            moments: snapshot
                .moments
                .into_iter()
                .map(|moment| (moment.issue_key(), moment))
                .collect(),
            front_pages: snapshot
                .front_pages
                .into_iter()
                .map(|stored| {
                    let key = IssueKey::new(
                        stored.page.issue_feed_name.clone(),
                        stored.page.issue_date,
                        stored.status,
                    );
                    (key, stored.page)
                })
                .collect(),
            app_info: snapshot.app_info,
            resource_infos: snapshot
                .resource_infos
                .into_iter()
                .map(|info| (info.resource_version, info))
                .collect(),
            file_entries: snapshot
                .file_entries
                .into_iter()
                .map(|entry| (entry.name.clone(), entry))
                .collect(),
            download_dates: snapshot.download_dates.into_iter().collect(),
            file_download_dates: snapshot.file_download_dates.into_iter().collect(),
        }
    }

    fn to_snapshot(&self) -> StoreSnapshot {
        let mut issues: Vec<Issue> = self.issues.values().cloned().collect();
        issues.sort_by(|a, b| a.key().tag().cmp(&b.key().tag()));
        let mut file_entries: Vec<FileEntry> = self.file_entries.values().cloned().collect();
        file_entries.sort_by(|a, b| a.name.cmp(&b.name));

        let mut moments: Vec<Moment> = self.moments.values().cloned().collect();
        moments.sort_by_key(Moment::tag);
        let mut front_pages: Vec<StoredFrontPage> = self
            .front_pages
            .iter()
            .map(|(key, page)| StoredFrontPage {
                status: key.status,
                page: page.clone(),
            })
            .collect();
        front_pages.sort_by(|a, b| a.page.page_pdf.name.cmp(&b.page.page_pdf.name));

        StoreSnapshot {
            issues,
            moments,
            front_pages,
            app_info: self.app_info.clone(),
            resource_infos: self.resource_infos.values().cloned().collect(),
            file_entries,
            download_dates: self.download_dates.clone().into_iter().collect(),
            file_download_dates: self.file_download_dates.clone().into_iter().collect(),
        }
    }

    /// Insert a file entry, keeping an already assigned storage location
    fn upsert_file_entry(&mut self, mut entry: FileEntry) -> FileEntry {
        if entry.storage_location.is_none() {
            entry.storage_location = self
                .file_entries
                .get(&entry.name)
                .and_then(|existing| existing.storage_location);
        }
        self.file_entries.insert(entry.name.clone(), entry.clone());
        entry
    }

    fn articles(&self) -> impl Iterator<Item = &Article> {
        self.issues
            .values()
            .flat_map(|issue| issue.imprint.iter().chain(issue.articles()))
    }

    /// Most complete stored issue of the publication matching `predicate`
    fn best_issue_where(
        &self,
        feed_name: &str,
        date: chrono::NaiveDate,
        predicate: impl Fn(&Issue) -> bool,
    ) -> Option<Issue> {
        self.issues
            .values()
            .filter(|issue| issue.feed_name == feed_name && issue.date == date)
            .filter(|issue| predicate(issue))
            .max_by_key(|issue| issue.status)
            .cloned()
    }
}

/// Metadata store held in memory, optionally mirrored to a JSON file
#[derive(Debug)]
pub struct MemoryMetadataStore {
    state: RwLock<StoreState>,
    snapshot_path: Option<PathBuf>,
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMetadataStore {
    /// Store without persistence
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            snapshot_path: None,
        }
    }

    /// Open the store persisted at `path`, starting empty if the file does not exist
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the file exists but cannot be
    /// read or parsed
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let state = match fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: StoreSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    StoreError::Persistence {
                        message: format!("{} is not a valid snapshot: {}", path.display(), e),
                    }
                })?;
                info!(
                    "Loaded {} issues from {}",
                    snapshot.issues.len(),
                    path.display()
                );
                StoreState::from_snapshot(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No metadata snapshot at {}, starting empty", path.display());
                StoreState::default()
            }
            Err(e) => {
                return Err(StoreError::Persistence {
                    message: format!("Cannot read {}: {}", path.display(), e),
                })
            }
        };

        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// All stored issues, ordered by tag
    pub async fn list_issues(&self) -> Vec<Issue> {
        self.state.read().await.to_snapshot().issues
    }

    async fn persist(&self, state: &StoreState) -> StoreResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let persistence = |e: std::io::Error| StoreError::Persistence {
            message: format!("Cannot write {}: {}", path.display(), e),
        };
        let json = serde_json::to_vec_pretty(&state.to_snapshot()).map_err(|e| {
            StoreError::Persistence {
                message: format!("Cannot serialize snapshot: {}", e),
            }
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(persistence)?;
        }
        let temp_path = FsStorageService::temp_path(path);
        fs::write(&temp_path, json).await.map_err(persistence)?;
        fs::rename(&temp_path, path).await.map_err(persistence)?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get_issue(&self, key: &IssueKey) -> StoreResult<Option<Issue>> {
        Ok(self.state.read().await.issues.get(key).cloned())
    }

    async fn get_issues_by_publication(
        &self,
        publication: &IssuePublication,
    ) -> StoreResult<Vec<Issue>> {
        let state = self.state.read().await;
        let mut issues: Vec<Issue> = state
            .issues
            .values()
            .filter(|issue| issue.publication() == *publication)
            .cloned()
            .collect();
        issues.sort_by(|a, b| b.status.cmp(&a.status));
        Ok(issues)
    }

    async fn save_issue(&self, issue: Issue) -> StoreResult<Issue> {
        let mut state = self.state.write().await;
        for file in Collection::issue(issue.clone(), true).all_files() {
            state.upsert_file_entry(file);
        }
        debug!("Saving metadata of {}", issue.key().tag());
        state.issues.insert(issue.key(), issue.clone());
        self.persist(&state).await?;
        Ok(issue)
    }

    async fn delete_issue(&self, key: &IssueKey) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let issue = state.issues.remove(key).ok_or_else(|| StoreError::NotFound {
            kind: "issue",
            key: key.tag(),
        })?;

        let mut still_referenced: HashSet<String> = state
            .issues
            .values()
            .flat_map(|other| Collection::issue(other.clone(), true).all_files())
            .map(|file| file.name)
            .collect();
        still_referenced.extend(
            state
                .moments
                .values()
                .flat_map(|moment| Collection::Moment(moment.clone()).all_files())
                .chain(state.front_pages.values().map(|page| page.page_pdf.clone()))
                .map(|file| file.name),
        );

        for with_pages in [false, true] {
            let tag = Collection::issue(issue.clone(), with_pages).download_tag();
            state.download_dates.remove(&tag);
        }
        for file in Collection::issue(issue, true).all_files() {
            if !still_referenced.contains(&file.name)
                && !state.file_download_dates.contains_key(&file.name)
            {
                state.file_entries.remove(&file.name);
            }
        }

        info!("Deleted metadata of {}", key.tag());
        self.persist(&state).await
    }

    async fn owning_issue(&self, collection: &Collection) -> StoreResult<Option<Issue>> {
        let state = self.state.read().await;
        let owner = match collection {
            Collection::Issue { issue, .. } => state.issues.get(&issue.key()).cloned(),
            Collection::Moment(moment) => state.issues.get(&moment.issue_key()).cloned(),
            Collection::Article(article) => {
                state.best_issue_where(&article.issue_feed_name, article.issue_date, |issue| {
                    issue
                        .imprint
                        .iter()
                        .chain(issue.articles())
                        .any(|a| a.key() == article.key())
                })
            }
            Collection::Section(section) => {
                state.best_issue_where(&section.issue_feed_name, section.issue_date, |issue| {
                    issue.section_list.iter().any(|s| s.key() == section.key())
                })
            }
            Collection::Page(page) => {
                state.best_issue_where(&page.issue_feed_name, page.issue_date, |issue| {
                    issue.page_list.iter().any(|p| p.key() == page.key())
                })
            }
            Collection::ResourceInfo(_) => None,
        };
        Ok(owner)
    }

    async fn get_moment(&self, key: &IssueKey) -> StoreResult<Option<Moment>> {
        let state = self.state.read().await;
        Ok(state
            .moments
            .get(key)
            .or_else(|| state.issues.get(key).map(|issue| &issue.moment))
            .cloned())
    }

    async fn save_moment(&self, moment: Moment) -> StoreResult<Moment> {
        let mut state = self.state.write().await;
        for file in Collection::Moment(moment.clone()).all_files() {
            state.upsert_file_entry(file);
        }
        debug!("Saving {}", moment.tag());
        state.moments.insert(moment.issue_key(), moment.clone());
        self.persist(&state).await?;
        Ok(moment)
    }

    async fn get_front_page(&self, key: &IssueKey) -> StoreResult<Option<Page>> {
        let state = self.state.read().await;
        Ok(state
            .front_pages
            .get(key)
            .or_else(|| state.issues.get(key).and_then(|issue| issue.page_list.first()))
            .cloned())
    }

    async fn save_front_page(&self, page: Page, key: &IssueKey) -> StoreResult<Page> {
        let mut state = self.state.write().await;
        state.upsert_file_entry(page.page_pdf.clone());
        debug!("Saving front page of {}", key.tag());
        state.front_pages.insert(key.clone(), page.clone());
        self.persist(&state).await?;
        Ok(page)
    }

    async fn get_app_info(&self) -> StoreResult<Option<AppInfo>> {
        Ok(self.state.read().await.app_info.clone())
    }

    async fn save_app_info(&self, info: AppInfo) -> StoreResult<AppInfo> {
        let mut state = self.state.write().await;
        state.app_info = Some(info.clone());
        self.persist(&state).await?;
        Ok(info)
    }

    async fn get_newest_resource_info(&self) -> StoreResult<Option<ResourceInfo>> {
        let state = self.state.read().await;
        Ok(state.resource_infos.values().next_back().cloned())
    }

    async fn save_resource_info(&self, info: ResourceInfo) -> StoreResult<ResourceInfo> {
        let mut state = self.state.write().await;
        for file in &info.resource_list {
            state.upsert_file_entry(file.clone());
        }
        debug!("Saving resource version {}", info.resource_version);
        state.resource_infos.insert(info.resource_version, info.clone());
        self.persist(&state).await?;
        Ok(info)
    }

    async fn get_file_entry(&self, name: &str) -> StoreResult<Option<FileEntry>> {
        Ok(self.state.read().await.file_entries.get(name).cloned())
    }

    async fn save_file_entry(&self, entry: FileEntry) -> StoreResult<FileEntry> {
        let mut state = self.state.write().await;
        let entry = state.upsert_file_entry(entry);
        self.persist(&state).await?;
        Ok(entry)
    }

    async fn get_download_date(&self, tag: &str) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.state.read().await.download_dates.get(tag).copied())
    }

    async fn set_download_date(&self, tag: &str, date: Option<DateTime<Utc>>) -> StoreResult<()> {
        let mut state = self.state.write().await;
        match date {
            Some(date) => state.download_dates.insert(tag.to_string(), date),
            None => state.download_dates.remove(tag),
        };
        self.persist(&state).await
    }

    async fn get_file_download_date(&self, name: &str) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.state.read().await.file_download_dates.get(name).copied())
    }

    async fn set_file_download_date(
        &self,
        name: &str,
        date: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        match date {
            Some(date) => state.file_download_dates.insert(name.to_string(), date),
            None => state.file_download_dates.remove(name),
        };
        self.persist(&state).await
    }

    async fn downloaded_article_references(&self, file_name: &str) -> StoreResult<usize> {
        let state = self.state.read().await;
        let mut image_refs = HashSet::new();
        let mut author_refs = HashSet::new();

        for article in state.articles() {
            if !state.download_dates.contains_key(article.key()) {
                continue;
            }
            if article.image_list.iter().any(|i| i.file.name == file_name) {
                image_refs.insert(article.key());
            }
            if article
                .author_list
                .iter()
                .filter_map(|a| a.image.as_ref())
                .any(|image| image.name == file_name)
            {
                author_refs.insert(article.key());
            }
        }
        Ok(image_refs.len().max(author_refs.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::{Author, IssueStatus, Moment, Section, StorageLocation, StorageType};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
    }

    fn article(name: &str, author_image: &str) -> Article {
        Article {
            article_html: FileEntry::new(name, StorageType::Issue, "taz/2024-01-31", "", 1),
            issue_feed_name: "taz".to_string(),
            issue_date: date(),
            title: None,
            audio_file: None,
            image_list: vec![],
            author_list: vec![Author {
                name: "A. Writer".to_string(),
                image: Some(FileEntry::new(author_image, StorageType::Global, "", "", 1)),
            }],
            bookmarked: false,
            article_type: Default::default(),
        }
    }

    fn issue(status: IssueStatus, articles: Vec<Article>) -> Issue {
        Issue {
            feed_name: "taz".to_string(),
            date: date(),
            status,
            base_url: "https://cdn.example.test/taz/2024-01-31".to_string(),
            min_resource_version: 1,
            moment: Moment {
                issue_feed_name: "taz".to_string(),
                issue_date: date(),
                issue_status: status,
                image_list: vec![],
                base_url: String::new(),
            },
            imprint: None,
            section_list: vec![Section {
                section_html: FileEntry::new("s1.html", StorageType::Issue, "taz/2024-01-31", "", 1),
                issue_feed_name: "taz".to_string(),
                issue_date: date(),
                title: None,
                image_list: vec![],
                article_list: articles,
            }],
            page_list: vec![],
        }
    }

    #[tokio::test]
    async fn test_issues_by_publication_most_complete_first() {
        let store = MemoryMetadataStore::new();
        store.save_issue(issue(IssueStatus::Public, vec![])).await.unwrap();
        store.save_issue(issue(IssueStatus::Regular, vec![])).await.unwrap();

        let publication = IssuePublication::new("taz", date());
        let issues = store.get_issues_by_publication(&publication).await.unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].status, IssueStatus::Regular);
    }

    #[tokio::test]
    async fn test_owning_issue_of_article() {
        let store = MemoryMetadataStore::new();
        let a1 = article("a1.html", "author.png");
        store
            .save_issue(issue(IssueStatus::Regular, vec![a1.clone()]))
            .await
            .unwrap();

        let owner = store.owning_issue(&Collection::Article(a1)).await.unwrap();
        assert_eq!(owner.map(|i| i.status), Some(IssueStatus::Regular));

        let stranger = article("other.html", "author.png");
        assert!(store
            .owning_issue(&Collection::Article(stranger))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_downloaded_article_references() {
        // Only downloaded articles count
        let store = MemoryMetadataStore::new();
        let a1 = article("a1.html", "author.png");
        let a2 = article("a2.html", "author.png");
        store
            .save_issue(issue(IssueStatus::Regular, vec![a1, a2]))
            .await
            .unwrap();
        assert_eq!(store.downloaded_article_references("author.png").await.unwrap(), 0);

        store.set_download_date("a1.html", Some(Utc::now())).await.unwrap();
        assert_eq!(store.downloaded_article_references("author.png").await.unwrap(), 1);

        store.set_download_date("a2.html", Some(Utc::now())).await.unwrap();
        assert_eq!(store.downloaded_article_references("author.png").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_save_file_entry_keeps_storage_location() {
        let store = MemoryMetadataStore::new();
        let mut entry = FileEntry::new("a1.html", StorageType::Issue, "taz", "", 1);
        entry.storage_location = Some(StorageLocation::External);
        store.save_file_entry(entry.clone()).await.unwrap();

        // Re-saving metadata without a location must not forget it
        entry.storage_location = None;
        let saved = store.save_file_entry(entry).await.unwrap();
        assert_eq!(saved.storage_location, Some(StorageLocation::External));
    }

    #[tokio::test]
    async fn test_delete_issue() {
        let store = MemoryMetadataStore::new();
        let saved = store.save_issue(issue(IssueStatus::Demo, vec![])).await.unwrap();
        store.delete_issue(&saved.key()).await.unwrap();

        assert!(store.get_issue(&saved.key()).await.unwrap().is_none());
        assert!(store.get_file_entry("s1.html").await.unwrap().is_none());
        assert!(matches!(
            store.delete_issue(&saved.key()).await,
            Err(StoreError::NotFound { kind: "issue", .. })
        ));
    }

    fn front_page(name: &str) -> Page {
        Page {
            page_pdf: FileEntry::new(name, StorageType::Issue, "taz/2024-01-31", "", 1),
            issue_feed_name: "taz".to_string(),
            issue_date: date(),
            title: None,
            base_url: "https://cdn.example.test/taz/2024-01-31".to_string(),
        }
    }

    #[tokio::test]
    async fn test_moment_and_front_page_fall_back_to_the_issue() {
        let store = MemoryMetadataStore::new();
        let mut regular = issue(IssueStatus::Regular, vec![]);
        regular.page_list = vec![front_page("p1.pdf"), front_page("p2.pdf")];
        let regular = store.save_issue(regular).await.unwrap();

        let key = regular.key();
        assert_eq!(store.get_moment(&key).await.unwrap(), Some(regular.moment.clone()));
        let page = store.get_front_page(&key).await.unwrap().unwrap();
        assert_eq!(page.key(), "p1.pdf");

        // Stored on their own, without an issue
        let demo = IssueKey::new("taz", date(), IssueStatus::Demo);
        assert!(store.get_moment(&demo).await.unwrap().is_none());
        store.save_front_page(front_page("demo.pdf"), &demo).await.unwrap();
        assert_eq!(store.get_front_page(&demo).await.unwrap().unwrap().key(), "demo.pdf");
        assert!(store.get_file_entry("demo.pdf").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_issue_keeps_files_of_standalone_front_page() {
        let store = MemoryMetadataStore::new();
        let mut regular = issue(IssueStatus::Regular, vec![]);
        regular.page_list = vec![front_page("p1.pdf")];
        let regular = store.save_issue(regular).await.unwrap();
        store
            .save_front_page(front_page("p1.pdf"), &regular.key())
            .await
            .unwrap();

        store.delete_issue(&regular.key()).await.unwrap();
        assert!(store.get_file_entry("p1.pdf").await.unwrap().is_some());
        assert!(store.get_file_entry("s1.html").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("metadata.json");

        {
            let store = MemoryMetadataStore::open(&path).await.unwrap();
            store.save_issue(issue(IssueStatus::Regular, vec![])).await.unwrap();
            store
                .save_resource_info(ResourceInfo {
                    resource_version: 4,
                    resource_base_url: "https://cdn.example.test/resources".to_string(),
                    resource_list: vec![],
                })
                .await
                .unwrap();
            store.set_download_date("resources", Some(Utc::now())).await.unwrap();
            let demo = IssueKey::new("taz", date(), IssueStatus::Demo);
            store.save_front_page(front_page("demo.pdf"), &demo).await.unwrap();
            store
                .save_app_info(AppInfo {
                    app_name: "taz".to_string(),
                    global_base_url: "https://cdn.example.test/global".to_string(),
                    app_type: "production".to_string(),
                    app_version: 7,
                })
                .await
                .unwrap();
        }

        let reopened = MemoryMetadataStore::open(&path).await.unwrap();
        assert_eq!(reopened.list_issues().await.len(), 1);
        let info = reopened.get_newest_resource_info().await.unwrap().unwrap();
        assert_eq!(info.resource_version, 4);
        assert!(reopened.get_download_date("resources").await.unwrap().is_some());
        let demo = IssueKey::new("taz", date(), IssueStatus::Demo);
        assert!(reopened.get_front_page(&demo).await.unwrap().is_some());
        assert_eq!(reopened.get_app_info().await.unwrap().unwrap().app_version, 7);
        assert!(!FsStorageService::temp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_open_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("metadata.json");
        fs::write(&path, b"not json").await.unwrap();

        assert!(matches!(
            MemoryMetadataStore::open(&path).await,
            Err(StoreError::Persistence { .. })
        ));
    }
}
