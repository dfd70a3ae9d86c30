//! Command handlers for the issue cache CLI
//!
//! Each handler translates its arguments into a call on the
//! [`ContentService`] and reports the outcome on stdout.

use std::time::Instant;

use tracing::{debug, info};

use crate::app::cache::RetryPolicy;
use crate::app::models::{Collection, DownloadTarget, FileEntry, StorageType};
use crate::app::ContentService;
use crate::cli::{DownloadArgs, FileArgs, IssueArgs, MetadataArgs, ProgressDisplay, StatusArgs};
use crate::errors::{AppError, CacheError, Result};

/// Handle the download command
///
/// Downloads the issue with its resources, following the progress of every
/// operation involved until the download finished.
pub async fn handle_download(
    service: &ContentService,
    args: DownloadArgs,
    quiet: bool,
) -> Result<()> {
    let start_time = Instant::now();
    let publication = args.issue.publication();
    let target = DownloadTarget::IssuePublication {
        publication: publication.clone(),
        with_pages: args.pages,
    };
    info!("Downloading {} (pages: {})", publication.tag(), args.pages);

    let mut progress = ProgressDisplay::new(quiet);
    progress.follow(service.subscribe());

    let result = service
        .download_to_cache(target, args.priority.into(), args.automatic, !args.refresh)
        .await;

    match result {
        Ok(()) => {
            progress.finish("done");
            if !quiet {
                println!(
                    "Downloaded {} in {:.1}s",
                    publication.tag(),
                    start_time.elapsed().as_secs_f64()
                );
            }
            Ok(())
        }
        Err(e) => {
            progress.finish("failed");
            Err(AppError::from(e))
        }
    }
}

/// Handle the metadata command
pub async fn handle_metadata(service: &ContentService, args: MetadataArgs, quiet: bool) -> Result<()> {
    let settings = service.settings();
    let retry = args
        .retries
        .map_or(settings.metadata_retry, RetryPolicy::Limited);
    let min_status = args.min_status.unwrap_or(settings.min_issue_status);
    let target = DownloadTarget::IssuePublication {
        publication: args.issue.publication(),
        with_pages: false,
    };
    debug!("Metadata request with {:?}, minimum status {}", retry, min_status);

    let resolved = service
        .download_metadata(target, retry, args.force, min_status, !args.refresh)
        .await?;

    if quiet {
        return Ok(());
    }
    match &resolved {
        DownloadTarget::Collection(Collection::Issue { issue, .. }) => {
            println!("Issue {}", issue.key().tag());
            println!("  Sections: {}", issue.section_list.len());
            println!("  Articles: {}", issue.articles().count());
            println!("  Pages:    {}", issue.page_list.len());
            println!("  Files:    {}", resolved_files(&resolved));
        }
        other => println!("Metadata of {} present", other.download_tag()),
    }
    Ok(())
}

/// Handle the delete command
pub async fn handle_delete(service: &ContentService, args: IssueArgs, quiet: bool) -> Result<()> {
    let publication = args.publication();
    info!("Deleting {}", publication.tag());

    let mut progress = ProgressDisplay::new(quiet);
    progress.follow(service.subscribe());
    let result = service.delete_issue(publication.clone()).await;
    progress.finish(if result.is_ok() { "deleted" } else { "failed" });
    result?;

    if !quiet {
        println!("Deleted {}", publication.tag());
    }
    Ok(())
}

/// Handle the status command
pub async fn handle_status(service: &ContentService, args: StatusArgs) -> Result<()> {
    let target = DownloadTarget::IssuePublication {
        publication: args.issue.publication(),
        with_pages: args.pages,
    };
    let state = service.cache_state(&target).await?;
    println!("{}: {}", target.download_tag(), state);
    Ok(())
}

/// Handle the file command
pub async fn handle_file(service: &ContentService, args: FileArgs, quiet: bool) -> Result<()> {
    let file = FileEntry::new(
        args.name.clone(),
        StorageType::Global,
        args.folder,
        args.sha256,
        0,
    );

    service
        .download_single_file_if_not_downloaded(file, &args.base_url, args.priority.into())
        .await?;

    if !quiet {
        let ctx = service.context();
        let entry = ctx
            .store
            .get_file_entry(&args.name)
            .await
            .map_err(CacheError::from)?;
        match entry {
            Some(entry) => println!("{} -> {}", args.name, ctx.storage.absolute_path(&entry)?.display()),
            None => println!("{} downloaded", args.name),
        }
    }
    Ok(())
}

fn resolved_files(target: &DownloadTarget) -> usize {
    match target {
        DownloadTarget::Collection(collection) => collection.all_files().len(),
        _ => 0,
    }
}
