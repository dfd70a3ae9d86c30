//! End-to-end tests of the content service against a local HTTP server
//!
//! The server plays both roles of the backend: the JSON API below `/v1/`
//! and the file hosts below `/files/`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use issue_cache::app::cache::{parent_tag, CacheState, RetryPolicy, UpdateType};
use issue_cache::app::models::{
    Article, ArticleType, DownloadTarget, FileEntry, Image, Issue, IssuePublication, IssueStatus,
    Moment, ResourceInfo, Section, StorageType,
};
use issue_cache::app::{ContentService, DownloadPriority};
use issue_cache::cli::{handle_file, FileArgs, PriorityArg};
use issue_cache::config::AppConfig;

const FOLDER: &str = "taz/2024-01-31";

type Shared<T> = Arc<Mutex<HashMap<String, T>>>;

/// Backend answering fixed routes; everything else is a 404
struct Backend {
    base_url: String,
    routes: Shared<String>,
    hits: Shared<usize>,
}

impl Backend {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let routes: Shared<String> = Arc::default();
        let hits: Shared<usize> = Arc::default();

        tokio::spawn({
            let routes = routes.clone();
            let hits = hits.clone();
            async move {
                while let Ok((socket, _)) = listener.accept().await {
                    tokio::spawn(answer(socket, routes.clone(), hits.clone()));
                }
            }
        });

        Self {
            base_url,
            routes,
            hits,
        }
    }

    fn route(&self, path: &str, body: impl Into<String>) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), body.into());
    }

    fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

async fn answer(
    mut socket: TcpStream,
    routes: Shared<String>,
    hits: Shared<usize>,
) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        if let Some(end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break end + 4;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
        }
    };
    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let Some(path) = head.split_whitespace().nth(1).map(str::to_string) else {
        return;
    };

    // Drain a request body so the client sees a clean close
    let length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buffer.len() < header_end + length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
        }
    }

    *hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;
    let route = routes.lock().unwrap().get(&path).cloned();
    let (status, body) = match route {
        Some(body) => (200, body),
        None => (404, String::new()),
    };
    let response = format!(
        "HTTP/1.1 {} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
}

fn publication() -> IssuePublication {
    IssuePublication::new("taz", date())
}

fn issue_file(name: &str) -> FileEntry {
    FileEntry::new(name, StorageType::Issue, FOLDER, "", 0)
}

fn issue(base_url: &str) -> Issue {
    let article = Article {
        article_html: issue_file("art01.html"),
        issue_feed_name: "taz".to_string(),
        issue_date: date(),
        title: Some("Lead".to_string()),
        audio_file: None,
        image_list: vec![Image {
            file: issue_file("art01.jpg"),
            high_resolution: false,
        }],
        author_list: Vec::new(),
        bookmarked: false,
        article_type: ArticleType::Standard,
    };
    Issue {
        feed_name: "taz".to_string(),
        date: date(),
        status: IssueStatus::Regular,
        base_url: format!("{}/files/issue", base_url),
        min_resource_version: 1,
        moment: Moment {
            issue_feed_name: "taz".to_string(),
            issue_date: date(),
            issue_status: IssueStatus::Regular,
            image_list: vec![Image {
                file: issue_file("moment.jpg"),
                high_resolution: true,
            }],
            base_url: String::new(),
        },
        imprint: None,
        section_list: vec![Section {
            section_html: issue_file("section.title.html"),
            issue_feed_name: "taz".to_string(),
            issue_date: date(),
            title: Some("Title".to_string()),
            image_list: Vec::new(),
            article_list: vec![article],
        }],
        page_list: Vec::new(),
    }
}

fn resources(base_url: &str) -> ResourceInfo {
    ResourceInfo {
        resource_version: 1,
        resource_base_url: format!("{}/files/resources", base_url),
        resource_list: vec![FileEntry::new("style.css", StorageType::Resource, "", "", 0)],
    }
}

/// Backend serving one complete issue, or none if `with_issue` is false
async fn backend(with_issue: bool) -> Backend {
    let server = Backend::start().await;
    if with_issue {
        server.route(
            "/v1/issues/taz/2024-01-31",
            serde_json::to_string(&issue(&server.base_url)).unwrap(),
        );
    }
    server.route(
        "/v1/resources",
        serde_json::to_string(&resources(&server.base_url)).unwrap(),
    );
    server.route("/v1/downloads", r#"{"downloadId":"d1"}"#);
    server.route("/v1/downloads/d1/stop", r#"{"ok":true}"#);
    for name in ["art01.html", "art01.jpg", "moment.jpg", "section.title.html"] {
        server.route(&format!("/files/issue/{}", name), format!("<{}>", name));
    }
    server.route("/files/resources/style.css", "body {}");
    server
}

async fn service(server: &Backend, root: &Path) -> ContentService {
    let mut config = AppConfig::default();
    config.storage.root = Some(root.to_path_buf());
    config.api.base_url = format!("{}/v1/", server.base_url);
    config.api.global_base_url = format!("{}/files/global", server.base_url);
    config.transport.max_retries = Some(1);
    config.transport.retry_base_delay_ms = 1;
    config.transport.retry_max_delay_secs = 1;
    config.cache.metadata_retries = Some(1);
    ContentService::from_config(&config).await.unwrap()
}

fn stored(root: &Path, folder: &str, name: &str) -> PathBuf {
    root.join("internal").join(folder).join(name)
}

fn target(with_pages: bool) -> DownloadTarget {
    DownloadTarget::IssuePublication {
        publication: publication(),
        with_pages,
    }
}

#[tokio::test]
async fn test_download_issue_to_cache() {
    let server = backend(true).await;
    let dir = TempDir::new().unwrap();
    let service = service(&server, dir.path()).await;
    let mut events = service.subscribe();

    service
        .download_issue_publication_to_cache(publication(), DownloadPriority::High, false)
        .await
        .unwrap();

    assert_eq!(
        tokio::fs::read_to_string(stored(dir.path(), FOLDER, "art01.html"))
            .await
            .unwrap(),
        "<art01.html>"
    );
    assert!(stored(dir.path(), FOLDER, "moment.jpg").exists());
    assert!(stored(dir.path(), "resources", "style.css").exists());
    assert!(service.is_present(&target(false)).await.unwrap());
    assert_eq!(
        service.cache_state(&target(false)).await.unwrap(),
        CacheState::Present
    );
    assert_eq!(server.hits("/v1/issues/taz/2024-01-31"), 1);
    assert_eq!(server.hits("/v1/resources"), 1);

    // The wrapper reported its completion
    let parent = parent_tag(&target(false).download_tag());
    let mut succeeded = false;
    while let Ok(event) = events.try_recv() {
        if event.tag == parent && event.update.update_type == UpdateType::Succeeded {
            succeeded = true;
        }
    }
    assert!(succeeded);
}

#[tokio::test]
async fn test_present_issue_is_not_downloaded_again() {
    let server = backend(true).await;
    let dir = TempDir::new().unwrap();
    let service = service(&server, dir.path()).await;

    for _ in 0..2 {
        service
            .download_to_cache(target(false), DownloadPriority::Normal, true, true)
            .await
            .unwrap();
    }

    assert_eq!(server.hits("/v1/issues/taz/2024-01-31"), 1);
    assert_eq!(server.hits("/files/issue/art01.html"), 1);
    assert_eq!(server.hits("/files/resources/style.css"), 1);
}

#[tokio::test]
async fn test_delete_issue_removes_content_and_metadata() {
    let server = backend(true).await;
    let dir = TempDir::new().unwrap();
    let service = service(&server, dir.path()).await;

    service
        .download_issue_publication_to_cache(publication(), DownloadPriority::Normal, false)
        .await
        .unwrap();
    service.delete_issue(publication()).await.unwrap();

    assert!(!stored(dir.path(), FOLDER, "art01.html").exists());
    assert!(!stored(dir.path(), FOLDER, "moment.jpg").exists());
    assert_eq!(
        service.cache_state(&target(false)).await.unwrap(),
        CacheState::Absent
    );
}

#[tokio::test]
async fn test_metadata_only() {
    let server = backend(true).await;
    let dir = TempDir::new().unwrap();
    let service = service(&server, dir.path()).await;

    let resolved = service
        .download_metadata(
            target(false),
            RetryPolicy::Never,
            false,
            IssueStatus::Public,
            true,
        )
        .await
        .unwrap();

    assert!(matches!(resolved, DownloadTarget::Collection(_)));
    assert!(!stored(dir.path(), FOLDER, "art01.html").exists());
    assert_eq!(
        service.cache_state(&target(false)).await.unwrap(),
        CacheState::MetadataPresent
    );
}

#[tokio::test]
async fn test_unknown_issue_fails() {
    let server = backend(false).await;
    let dir = TempDir::new().unwrap();
    let service = service(&server, dir.path()).await;

    let result = service
        .download_issue_publication_to_cache(publication(), DownloadPriority::Normal, false)
        .await;

    assert!(result.is_err());
    assert_eq!(server.hits("/files/issue/art01.html"), 0);
    assert_eq!(
        service.cache_state(&target(false)).await.unwrap(),
        CacheState::Absent
    );
}

#[tokio::test]
async fn test_single_file_download() {
    let server = backend(true).await;
    let dir = TempDir::new().unwrap();
    let service = service(&server, dir.path()).await;
    let file = FileEntry::new("style.css", StorageType::Global, "", "", 0);
    let base_url = format!("{}/files/resources", server.base_url);

    for _ in 0..2 {
        service
            .download_single_file_if_not_downloaded(file.clone(), &base_url, DownloadPriority::High)
            .await
            .unwrap();
    }

    assert!(stored(dir.path(), "global", "style.css").exists());
    assert_eq!(server.hits("/files/resources/style.css"), 1);
}

#[tokio::test]
async fn test_file_command() {
    let server = backend(true).await;
    let dir = TempDir::new().unwrap();
    let service = service(&server, dir.path()).await;
    let args = FileArgs {
        name: "style.css".to_string(),
        base_url: format!("{}/files/resources", server.base_url),
        folder: "fonts".to_string(),
        sha256: String::new(),
        priority: PriorityArg::High,
    };

    // Not quiet, so the stored entry is looked up for the report
    handle_file(&service, args.clone(), false).await.unwrap();
    handle_file(&service, args, false).await.unwrap();

    assert_eq!(
        tokio::fs::read_to_string(stored(dir.path(), "fonts", "style.css"))
            .await
            .unwrap(),
        "body {}"
    );
    assert_eq!(server.hits("/files/resources/style.css"), 1);
}
