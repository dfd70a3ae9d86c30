//! Tests for the transfer queue

#[cfg(test)]
mod integration_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Semaphore;

    use super::super::*;
    use crate::app::cache::tests::support::ScriptedOperation;
    use crate::app::cache::{
        CacheItem, CacheOperation, CacheOperationItem, DownloadPriority, FileEntryOperation,
        OperationRegistry,
    };
    use crate::app::models::{FileEntry, StorageType};

    type Op = ScriptedOperation;

    fn file_item(name: &str) -> CacheItem {
        let entry = FileEntry::new(name, StorageType::Issue, "taz/2024-01-31", "", 1);
        CacheItem::file(FileEntryOperation::new(entry, None, None), DownloadPriority::Low)
    }

    /// Operation holding one file item per name, with its bound items
    async fn operation(
        tag: &str,
        priority: DownloadPriority,
        names: &[&str],
    ) -> (Arc<Op>, Vec<CacheOperationItem>) {
        let registry = Arc::new(OperationRegistry::default());
        let gate = Arc::new(Semaphore::new(0));
        let items = names.iter().map(|name| file_item(name)).collect();
        let operation = Op::with_items(&registry, tag, priority, &gate, Ok(0), items);
        let bound = operation.core().items().await;
        (operation, bound)
    }

    #[tokio::test]
    async fn test_duplicate_files_are_merged() {
        let queue: TransferQueue<Op> = TransferQueue::new();
        let (first, first_items) = operation("a", DownloadPriority::Normal, &["x.jpg"]).await;
        let (second, second_items) = operation("b", DownloadPriority::Normal, &["x.jpg"]).await;

        assert!(queue.offer(first_items[0].clone(), first.clone()).await);
        assert!(!queue.offer(second_items[0].clone(), second.clone()).await);
        assert_eq!(queue.len().await, 1);

        let transfer = queue.try_next().await.unwrap();
        assert_eq!(transfer.key(), "x.jpg");
        assert_eq!(transfer.operations.len(), 2);
        assert!(Arc::ptr_eq(&transfer.operations[0], &first));
        assert!(Arc::ptr_eq(&transfer.operations[1], &second));
        assert!(transfer.file().is_some());

        let stats = queue.stats().await;
        assert_eq!(stats.total_enqueued, 1);
        assert_eq!(stats.deduplicated_count, 1);
        assert_eq!(stats.dispatched_count, 1);
        assert_eq!(stats.pending_count, 0);
    }

    #[tokio::test]
    async fn test_file_can_be_queued_again_after_dispatch() {
        let queue: TransferQueue<Op> = TransferQueue::new();
        let (op, items) = operation("a", DownloadPriority::Normal, &["x.jpg"]).await;

        assert!(queue.offer(items[0].clone(), op.clone()).await);
        let transfer = queue.try_next().await.unwrap();
        assert_eq!(transfer.operations.len(), 1);

        // A later offer starts a fresh interest list
        assert!(queue.offer(items[0].clone(), op.clone()).await);
        assert_eq!(queue.try_next().await.unwrap().operations.len(), 1);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_highest_priority_first_then_fifo() {
        let queue: TransferQueue<Op> = TransferQueue::new();
        let (low, low_items) = operation("low", DownloadPriority::Low, &["l1", "l2"]).await;
        let (high, high_items) = operation("high", DownloadPriority::High, &["h1", "h2"]).await;

        for item in &low_items {
            queue.offer(item.clone(), low.clone()).await;
        }
        for item in &high_items {
            queue.offer(item.clone(), high.clone()).await;
        }

        let mut order = Vec::new();
        while let Some(transfer) = queue.try_next().await {
            order.push(transfer.key().to_string());
        }
        assert_eq!(order, vec!["h1", "h2", "l1", "l2"]);
    }

    #[tokio::test]
    async fn test_priority_is_read_when_taken() {
        let queue: TransferQueue<Op> = TransferQueue::new();
        let (first, first_items) = operation("first", DownloadPriority::Normal, &["f"]).await;
        let (later, later_items) = operation("later", DownloadPriority::Normal, &["l"]).await;

        queue.offer(first_items[0].clone(), first.clone()).await;
        queue.offer(later_items[0].clone(), later.clone()).await;

        // Raising the operation reorders its queued item
        later.core().set_priority(DownloadPriority::High);
        assert_eq!(queue.try_next().await.unwrap().key(), "l");
        assert_eq!(queue.try_next().await.unwrap().key(), "f");
    }

    #[tokio::test]
    async fn test_merged_offer_raises_queued_item() {
        let queue: TransferQueue<Op> = TransferQueue::new();
        let (low, low_items) = operation("low", DownloadPriority::Low, &["shared"]).await;
        let (normal, normal_items) = operation("normal", DownloadPriority::Normal, &["own"]).await;
        let (high, high_items) = operation("high", DownloadPriority::High, &["shared"]).await;

        queue.offer(low_items[0].clone(), low.clone()).await;
        queue.offer(normal_items[0].clone(), normal.clone()).await;
        assert!(!queue.offer(high_items[0].clone(), high.clone()).await);

        let transfer = queue.try_next().await.unwrap();
        assert_eq!(transfer.key(), "shared");
        assert_eq!(transfer.operations.len(), 2);
        assert_eq!(queue.try_next().await.unwrap().key(), "own");
    }

    #[tokio::test]
    async fn test_next_waits_for_an_offer() {
        let queue: Arc<TransferQueue<Op>> = Arc::new(TransferQueue::new());
        let receiver = tokio::spawn({
            let queue = queue.clone();
            async move { queue.next().await.key().to_string() }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!receiver.is_finished());

        let (op, items) = operation("a", DownloadPriority::Normal, &["late.pdf"]).await;
        queue.offer(items[0].clone(), op).await;

        let key = tokio::time::timeout(Duration::from_secs(1), receiver)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(key, "late.pdf");
    }
}
