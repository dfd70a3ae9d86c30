//! Domain models for publication content
//!
//! Issues, sections, articles, pages, moments and the shared resource pack,
//! together with the two sum types the cache operations work on:
//! [`Collection`] (something that owns files) and [`DownloadTarget`]
//! (anything a download can be requested for).

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::constants::tags;

/// Access level of an issue, ordered from least to most complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Public,
    Demo,
    Regular,
}

impl IssueStatus {
    /// All statuses, most complete first
    pub const DESCENDING: [IssueStatus; 3] =
        [IssueStatus::Regular, IssueStatus::Demo, IssueStatus::Public];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Public => "public",
            IssueStatus::Demo => "demo",
            IssueStatus::Regular => "regular",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(IssueStatus::Public),
            "demo" => Ok(IssueStatus::Demo),
            "regular" => Ok(IssueStatus::Regular),
            other => Err(format!("unknown issue status: {}", other)),
        }
    }
}

/// Feed and date of an issue, independent of its status
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssuePublication {
    pub feed_name: String,
    pub date: NaiveDate,
}

impl IssuePublication {
    pub fn new(feed_name: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            feed_name: feed_name.into(),
            date,
        }
    }

    pub fn tag(&self) -> String {
        format!("{}/{}", self.feed_name, self.date)
    }
}

/// Natural key of a stored issue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueKey {
    pub feed_name: String,
    pub date: NaiveDate,
    pub status: IssueStatus,
}

impl IssueKey {
    pub fn new(feed_name: impl Into<String>, date: NaiveDate, status: IssueStatus) -> Self {
        Self {
            feed_name: feed_name.into(),
            date,
            status,
        }
    }

    pub fn tag(&self) -> String {
        format!("{}/{}/{}", self.feed_name, self.date, self.status)
    }

    pub fn publication(&self) -> IssuePublication {
        IssuePublication::new(self.feed_name.clone(), self.date)
    }
}

/// Where a file's base URL comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Issue content, served from the issue's base URL
    Issue,
    /// Part of the shared resource pack
    Resource,
    /// Shared between issues, served from the global base URL
    Global,
}

/// Physical storage area a file is kept in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageLocation {
    #[default]
    Internal,
    External,
}

/// A single downloadable file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// File name, unique across all content
    pub name: String,
    pub storage_type: StorageType,
    /// Folder below the storage location, e.g. `taz/2024-01-31`
    pub folder: String,
    /// Lowercase hex sha256 of the expected content
    pub sha256: String,
    pub size: u64,
    /// Set once the file has been assigned a physical location
    #[serde(default)]
    pub storage_location: Option<StorageLocation>,
}

impl FileEntry {
    pub fn new(
        name: impl Into<String>,
        storage_type: StorageType,
        folder: impl Into<String>,
        sha256: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            name: name.into(),
            storage_type,
            folder: folder.into(),
            sha256: sha256.into(),
            size,
            storage_location: None,
        }
    }

    /// Path of the file relative to its storage location
    pub fn relative_path(&self) -> String {
        if self.folder.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.folder, self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub file: FileEntry,
    #[serde(default)]
    pub high_resolution: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default)]
    pub image: Option<FileEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArticleType {
    #[default]
    Standard,
    Imprint,
}

/// An article, keyed by the name of its HTML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub article_html: FileEntry,
    pub issue_feed_name: String,
    pub issue_date: NaiveDate,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub audio_file: Option<FileEntry>,
    #[serde(default)]
    pub image_list: Vec<Image>,
    #[serde(default)]
    pub author_list: Vec<Author>,
    #[serde(default)]
    pub bookmarked: bool,
    #[serde(default)]
    pub article_type: ArticleType,
}

impl Article {
    pub fn key(&self) -> &str {
        &self.article_html.name
    }

    /// Files an article may share with other articles
    pub fn shared_files(&self) -> impl Iterator<Item = &FileEntry> {
        self.image_list
            .iter()
            .map(|image| &image.file)
            .chain(self.author_list.iter().filter_map(|a| a.image.as_ref()))
    }

    pub fn all_files(&self) -> Vec<FileEntry> {
        let mut files = vec![self.article_html.clone()];
        files.extend(self.audio_file.iter().cloned());
        files.extend(self.shared_files().cloned());
        files
    }
}

/// A section, keyed by the name of its HTML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub section_html: FileEntry,
    pub issue_feed_name: String,
    pub issue_date: NaiveDate,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub image_list: Vec<Image>,
    #[serde(default)]
    pub article_list: Vec<Article>,
}

impl Section {
    pub fn key(&self) -> &str {
        &self.section_html.name
    }

    /// Files of the section itself, articles not included
    pub fn all_files(&self) -> Vec<FileEntry> {
        let mut files = vec![self.section_html.clone()];
        files.extend(self.image_list.iter().map(|image| image.file.clone()));
        files
    }
}

/// A PDF page, keyed by the name of its PDF file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page_pdf: FileEntry,
    pub issue_feed_name: String,
    pub issue_date: NaiveDate,
    #[serde(default)]
    pub title: Option<String>,
    /// Set when the page was fetched on its own, empty inside an issue
    #[serde(default)]
    pub base_url: String,
}

impl Page {
    pub fn key(&self) -> &str {
        &self.page_pdf.name
    }
}

/// The cover images of an issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moment {
    pub issue_feed_name: String,
    pub issue_date: NaiveDate,
    pub issue_status: IssueStatus,
    #[serde(default)]
    pub image_list: Vec<Image>,
    /// Set when the moment was fetched on its own, empty inside an issue
    #[serde(default)]
    pub base_url: String,
}

impl Moment {
    pub fn issue_key(&self) -> IssueKey {
        IssueKey::new(self.issue_feed_name.clone(), self.issue_date, self.issue_status)
    }

    pub fn tag(&self) -> String {
        format!("{}{}", tags::MOMENT_PREFIX, self.issue_key().tag())
    }
}

/// Front page of an issue as the remote API answers it, with the status it was published in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontPage {
    pub page: Page,
    pub issue_status: IssueStatus,
}

impl FrontPage {
    pub fn issue_key(&self) -> IssueKey {
        IssueKey::new(
            self.page.issue_feed_name.clone(),
            self.page.issue_date,
            self.issue_status,
        )
    }
}

/// What the server announces about the app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub app_name: String,
    pub global_base_url: String,
    #[serde(default)]
    pub app_type: String,
    /// Newest released app version
    #[serde(default)]
    pub app_version: u32,
}

/// The shared resource pack (stylesheets, fonts, scripts)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub resource_version: u32,
    pub resource_base_url: String,
    #[serde(default)]
    pub resource_list: Vec<FileEntry>,
}

/// A complete issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub feed_name: String,
    pub date: NaiveDate,
    pub status: IssueStatus,
    pub base_url: String,
    /// Oldest resource pack version able to render this issue
    pub min_resource_version: u32,
    pub moment: Moment,
    #[serde(default)]
    pub imprint: Option<Article>,
    #[serde(default)]
    pub section_list: Vec<Section>,
    #[serde(default)]
    pub page_list: Vec<Page>,
}

impl Issue {
    pub fn key(&self) -> IssueKey {
        IssueKey::new(self.feed_name.clone(), self.date, self.status)
    }

    pub fn publication(&self) -> IssuePublication {
        IssuePublication::new(self.feed_name.clone(), self.date)
    }

    /// Articles of all sections, without the imprint
    pub fn articles(&self) -> impl Iterator<Item = &Article> {
        self.section_list
            .iter()
            .flat_map(|section| section.article_list.iter())
    }

    pub fn has_bookmarked_articles(&self) -> bool {
        self.articles().any(|article| article.bookmarked)
    }
}

/// Something that owns downloadable files
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collection {
    Issue { issue: Box<Issue>, with_pages: bool },
    Article(Article),
    Section(Section),
    Page(Page),
    Moment(Moment),
    ResourceInfo(ResourceInfo),
}

impl Collection {
    pub fn issue(issue: Issue, with_pages: bool) -> Self {
        Collection::Issue {
            issue: Box::new(issue),
            with_pages,
        }
    }

    /// Tag identifying download and deletion operations on this collection
    pub fn download_tag(&self) -> String {
        match self {
            Collection::Issue { issue, with_pages } => with_pdf_suffix(issue.key().tag(), *with_pages),
            Collection::Article(article) => article.key().to_string(),
            Collection::Section(section) => section.key().to_string(),
            Collection::Page(page) => page.key().to_string(),
            Collection::Moment(moment) => moment.tag(),
            Collection::ResourceInfo(_) => tags::RESOURCES.to_string(),
        }
    }

    pub fn all_files(&self) -> Vec<FileEntry> {
        match self {
            Collection::Issue { issue, with_pages } => {
                let mut files = Collection::Moment(issue.moment.clone()).all_files();
                files.extend(issue.imprint.iter().flat_map(Article::all_files));
                for section in &issue.section_list {
                    files.extend(section.all_files());
                    files.extend(section.article_list.iter().flat_map(Article::all_files));
                }
                if *with_pages {
                    files.extend(issue.page_list.iter().map(|page| page.page_pdf.clone()));
                }
                files
            }
            Collection::Article(article) => article.all_files(),
            Collection::Section(section) => section.all_files(),
            Collection::Page(page) => vec![page.page_pdf.clone()],
            Collection::Moment(moment) => moment.image_list.iter().map(|i| i.file.clone()).collect(),
            Collection::ResourceInfo(info) => info.resource_list.clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Collection::Issue { .. } => "issue",
            Collection::Article(_) => "article",
            Collection::Section(_) => "section",
            Collection::Page(_) => "page",
            Collection::Moment(_) => "moment",
            Collection::ResourceInfo(_) => "resource info",
        }
    }
}

/// Anything a download can be requested for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    /// Newest available status of a publication
    IssuePublication {
        publication: IssuePublication,
        with_pages: bool,
    },
    /// A specific stored or remote issue
    IssueKey { key: IssueKey, with_pages: bool },
    /// An already loaded collection
    Collection(Collection),
    /// Cover of the newest available status of a publication
    MomentPublication(IssuePublication),
    MomentKey(IssueKey),
    /// First page of the newest available status of a publication
    FrontPagePublication(IssuePublication),
    FrontPageKey(IssueKey),
    /// Resource pack of at least the given version
    ResourceInfoKey { min_version: u32 },
    AppInfoKey,
    /// App info as loaded; it owns no files
    AppInfo(AppInfo),
    /// A single file
    File(FileEntry),
}

impl DownloadTarget {
    pub fn download_tag(&self) -> String {
        match self {
            DownloadTarget::IssuePublication {
                publication,
                with_pages,
            } => with_pdf_suffix(publication.tag(), *with_pages),
            DownloadTarget::IssueKey { key, with_pages } => with_pdf_suffix(key.tag(), *with_pages),
            DownloadTarget::Collection(collection) => collection.download_tag(),
            DownloadTarget::MomentPublication(publication) => {
                format!("{}{}", tags::MOMENT_PREFIX, publication.tag())
            }
            DownloadTarget::MomentKey(key) => format!("{}{}", tags::MOMENT_PREFIX, key.tag()),
            DownloadTarget::FrontPagePublication(publication) => {
                format!("{}{}", tags::FRONT_PAGE_PREFIX, publication.tag())
            }
            DownloadTarget::FrontPageKey(key) => {
                format!("{}{}", tags::FRONT_PAGE_PREFIX, key.tag())
            }
            DownloadTarget::ResourceInfoKey { .. } => tags::RESOURCES.to_string(),
            DownloadTarget::AppInfoKey | DownloadTarget::AppInfo(_) => tags::APP_INFO.to_string(),
            DownloadTarget::File(file) => file.name.clone(),
        }
    }

    /// Whether the target stands for an issue in any of its shapes
    pub fn is_issue_shaped(&self) -> bool {
        matches!(
            self,
            DownloadTarget::IssuePublication { .. }
                | DownloadTarget::IssueKey { .. }
                | DownloadTarget::Collection(Collection::Issue { .. })
        )
    }
}

impl From<Collection> for DownloadTarget {
    fn from(collection: Collection) -> Self {
        DownloadTarget::Collection(collection)
    }
}

fn with_pdf_suffix(tag: String, with_pages: bool) -> String {
    if with_pages {
        format!("{}{}", tag, tags::PDF_SUFFIX)
    } else {
        tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
    }

    #[test]
    fn test_status_ordering() {
        // Regular issues are the most complete ones
        assert!(IssueStatus::Regular > IssueStatus::Demo);
        assert!(IssueStatus::Demo > IssueStatus::Public);
        assert_eq!(IssueStatus::DESCENDING[0], IssueStatus::Regular);
        assert_eq!("Demo".parse::<IssueStatus>(), Ok(IssueStatus::Demo));
    }

    #[test]
    fn test_download_tags() {
        // Issue tags carry the pdf suffix only when pages are included
        let publication = IssuePublication::new("taz", date());
        let target = DownloadTarget::IssuePublication {
            publication: publication.clone(),
            with_pages: true,
        };
        assert_eq!(target.download_tag(), "taz/2024-01-31/pdf");
        assert!(target.is_issue_shaped());

        let key = IssueKey::new("taz", date(), IssueStatus::Regular);
        assert_eq!(key.tag(), "taz/2024-01-31/regular");
        assert_eq!(key.publication(), publication);

        let resources = DownloadTarget::ResourceInfoKey { min_version: 3 };
        assert_eq!(resources.download_tag(), "resources");
        assert!(!resources.is_issue_shaped());
    }

    #[test]
    fn test_moment_key_tag_matches_its_collection() {
        let moment = Moment {
            issue_feed_name: "taz".to_string(),
            issue_date: date(),
            issue_status: IssueStatus::Demo,
            image_list: vec![],
            base_url: String::new(),
        };
        let target = DownloadTarget::MomentKey(moment.issue_key());
        assert_eq!(target.download_tag(), "moment/taz/2024-01-31/demo");
        assert_eq!(target.download_tag(), Collection::Moment(moment).download_tag());
        assert!(!target.is_issue_shaped());

        let publication = IssuePublication::new("taz", date());
        assert_eq!(
            DownloadTarget::FrontPagePublication(publication).download_tag(),
            "frontpage/taz/2024-01-31"
        );
        assert_eq!(DownloadTarget::AppInfoKey.download_tag(), "app-info");
    }

    #[test]
    fn test_article_files() {
        // Author images and article images count as shared files
        let html = FileEntry::new("a1.html", StorageType::Issue, "taz/2024-01-31", "00", 10);
        let author_image = FileEntry::new("author.png", StorageType::Global, "global", "11", 5);
        let article = Article {
            article_html: html,
            issue_feed_name: "taz".to_string(),
            issue_date: date(),
            title: None,
            audio_file: None,
            image_list: vec![],
            author_list: vec![Author {
                name: "A. Writer".to_string(),
                image: Some(author_image.clone()),
            }],
            bookmarked: false,
            article_type: ArticleType::Standard,
        };

        assert_eq!(article.shared_files().collect::<Vec<_>>(), vec![&author_image]);
        assert_eq!(article.all_files().len(), 2);
        assert_eq!(Collection::Article(article).download_tag(), "a1.html");
    }
}
