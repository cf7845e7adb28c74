//! 影像任务处理器

use crate::builder::ImageIndexBuilder;
use crate::drainer::TaskBatchHandler;
use crate::models::ImageIndex;
use crate::sink::SearchIndexSink;
use async_trait::async_trait;
use imaging_core::utils::parse_entity_id;
use imaging_core::{IndexError, Result, Task};
use imaging_database::{DatabasePool, DatabaseQueries, DatabaseWrites};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// 解析批次中的影像ID，去重并保持顺序
///
/// 无法解析的键只记录警告，随批次一起从队列删除
fn image_ids(tasks: &[Task]) -> Vec<i64> {
    let mut seen = BTreeSet::new();
    let mut ids = Vec::with_capacity(tasks.len());

    for task in tasks {
        match parse_entity_id(&task.target) {
            Some(id) => {
                if seen.insert(id) {
                    ids.push(id);
                }
            }
            None => warn!("Task {} has invalid image key '{}', skipping", task.id, task.target),
        }
    }

    ids
}

/// 影像索引处理器：构建文档并批量推送
pub struct ImageIndexingHandler {
    builder: ImageIndexBuilder,
    sink: Arc<dyn SearchIndexSink>,
}

impl ImageIndexingHandler {
    pub fn new(pool: DatabasePool, sink: Arc<dyn SearchIndexSink>) -> Self {
        Self {
            builder: ImageIndexBuilder::new(pool),
            sink,
        }
    }

    /// 撤回推送期间已被删除的影像文档
    ///
    /// 删除循环先删关系数据再删文档，推送后复查即可保证不留下孤立文档
    async fn retract_removed(&self, documents: &[ImageIndex]) -> Result<()> {
        let submitted: Vec<i64> = documents.iter().map(|document| document.image_id).collect();
        let existing: BTreeSet<i64> = DatabaseQueries::new(self.builder.pool())
            .find_existing_image_ids(&submitted)
            .await?
            .into_iter()
            .collect();

        for document in documents.iter().filter(|d| !existing.contains(&d.image_id)) {
            warn!("Image {} was removed while indexing, retracting document", document.image_id);
            self.sink.delete(&document.id).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl TaskBatchHandler for ImageIndexingHandler {
    fn name(&self) -> &str {
        "images-indexing"
    }

    async fn prepare(&self) -> Result<()> {
        self.sink.prepare().await
    }

    async fn handle(&self, tasks: &[Task]) -> Result<()> {
        let mut documents = Vec::with_capacity(tasks.len());

        for image_id in image_ids(tasks) {
            match self.builder.build(image_id).await {
                Ok(Some(document)) => documents.push(document),
                Ok(None) => debug!("Image {} no longer exists, skipping", image_id),
                // 数据本身无效，重试也不会成功
                Err(IndexError::Validation(reason)) => {
                    warn!("Image {} cannot be indexed, skipping: {}", image_id, reason)
                }
                Err(e) => return Err(e),
            }
        }

        if documents.is_empty() {
            return Ok(());
        }

        self.sink.submit_many(&documents).await?;
        self.retract_removed(&documents).await?;

        debug!("Indexed {} images to {}", documents.len(), self.sink.name());
        Ok(())
    }
}

/// 影像删除处理器：删除关系数据和索引文档
pub struct ImageRemovalHandler {
    pool: DatabasePool,
    sink: Arc<dyn SearchIndexSink>,
}

impl ImageRemovalHandler {
    pub fn new(pool: DatabasePool, sink: Arc<dyn SearchIndexSink>) -> Self {
        Self { pool, sink }
    }
}

#[async_trait]
impl TaskBatchHandler for ImageRemovalHandler {
    fn name(&self) -> &str {
        "images-removal"
    }

    async fn handle(&self, tasks: &[Task]) -> Result<()> {
        let writes = DatabaseWrites::new(&self.pool);

        for image_id in image_ids(tasks) {
            if !writes.delete_image(image_id).await? {
                debug!("Image {} already deleted from database", image_id);
            }
            self.sink.delete(&image_id.to_string()).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drainer::TaskDrainer;
    use crate::sink::InMemoryIndexSink;
    use crate::test_support::*;
    use imaging_core::{ImageType, TaskTargetType, TaskType};
    use imaging_database::{NewTask, TaskQueue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 统计批量推送次数，可整体失败
    #[derive(Default)]
    struct CountingSink {
        inner: InMemoryIndexSink,
        bulk_calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SearchIndexSink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        async fn submit(&self, document: &ImageIndex) -> Result<()> {
            self.inner.submit(document).await
        }

        async fn submit_many(&self, documents: &[ImageIndex]) -> Result<()> {
            self.bulk_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(IndexError::Sink("connection refused".to_string()));
            }
            self.inner.submit_many(documents).await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key).await
        }
    }

    fn task(id: i64, target: &str) -> Task {
        Task {
            id,
            task_type: TaskType::Index,
            target_type: TaskTargetType::Image,
            target: target.to_string(),
            date: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_image_ids_dedup_and_skip_invalid() {
        let tasks = vec![task(1, "5"), task(2, "abc"), task(3, "5"), task(4, " 2 ")];
        assert_eq!(image_ids(&tasks), vec![5, 2]);
    }

    #[tokio::test]
    async fn test_indexing_drains_queue_into_sink() {
        let pool = setup_test_db().await;
        let donor_id = create_donor(&pool, "DO-1").await;
        let mri_id = create_image(&pool, donor_id, ImageType::Mri).await;
        let ct_id = create_image(&pool, donor_id, ImageType::Ct).await;

        // 键无法解析的任务被跳过
        TaskQueue::new(&pool)
            .enqueue(&NewTask::new(TaskType::Index, TaskTargetType::Image, "not-an-id"))
            .await
            .unwrap();

        let sink = Arc::new(CountingSink::default());
        let handler = ImageIndexingHandler::new(pool.clone(), sink.clone());
        let report = TaskDrainer::new(pool.clone())
            .drain(TaskType::Index, TaskTargetType::Image, 10, &handler)
            .await
            .unwrap();

        assert_eq!(report.batches, 1);
        assert_eq!(report.tasks, 3);
        assert_eq!(sink.bulk_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.inner.len().await, 2);
        assert!(sink.inner.get(&mri_id.to_string()).await.unwrap().data.has_mris);
        assert!(sink.inner.get(&ct_id.to_string()).await.unwrap().data.has_cts);
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_tasks() {
        let pool = setup_test_db().await;
        let donor_id = create_donor(&pool, "DO-1").await;
        create_image(&pool, donor_id, ImageType::Mri).await;

        let sink = Arc::new(CountingSink {
            fail: true,
            ..CountingSink::default()
        });
        let handler = ImageIndexingHandler::new(pool.clone(), sink.clone());
        let result = TaskDrainer::new(pool.clone())
            .drain(TaskType::Index, TaskTargetType::Image, 10, &handler)
            .await;

        assert!(matches!(result, Err(IndexError::Sink(_))));
        assert_eq!(
            TaskQueue::new(&pool)
                .count(TaskType::Index, TaskTargetType::Image)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_index_task_for_deleted_image_is_dropped() {
        let pool = setup_test_db().await;
        let donor_id = create_donor(&pool, "DO-1").await;
        let image_id = create_image(&pool, donor_id, ImageType::Mri).await;
        DatabaseWrites::new(&pool).delete_image(image_id).await.unwrap();

        let sink = Arc::new(InMemoryIndexSink::new());
        let handler = ImageIndexingHandler::new(pool.clone(), sink.clone());
        let report = TaskDrainer::new(pool.clone())
            .drain(TaskType::Index, TaskTargetType::Image, 10, &handler)
            .await
            .unwrap();

        assert_eq!(report.tasks, 1);
        assert!(sink.is_empty().await);
    }

    #[tokio::test]
    async fn test_removal_deletes_row_and_document() {
        let pool = setup_test_db().await;
        let donor_id = create_donor(&pool, "DO-1").await;
        let image_id = create_image(&pool, donor_id, ImageType::Mri).await;

        let sink = Arc::new(InMemoryIndexSink::new());
        let indexing = ImageIndexingHandler::new(pool.clone(), sink.clone());
        let drainer = TaskDrainer::new(pool.clone());
        drainer
            .drain(TaskType::Index, TaskTargetType::Image, 10, &indexing)
            .await
            .unwrap();
        assert_eq!(sink.len().await, 1);

        // 重复的删除请求同样成功
        let writes = DatabaseWrites::new(&pool);
        writes.request_image_removal(image_id).await.unwrap();
        writes.request_image_removal(image_id).await.unwrap();

        let removal = ImageRemovalHandler::new(pool.clone(), sink.clone());
        let report = drainer
            .drain(TaskType::Remove, TaskTargetType::Image, 1, &removal)
            .await
            .unwrap();

        assert_eq!(report.batches, 2);
        assert!(sink.is_empty().await);
        assert!(DatabaseQueries::new(&pool)
            .find_image_by_id(image_id)
            .await
            .unwrap()
            .is_none());
    }

    /// 推送前模拟删除循环已完成：影像行和文档都已删除
    struct RemovedDuringSubmitSink {
        inner: InMemoryIndexSink,
        pool: DatabasePool,
        image_id: i64,
    }

    #[async_trait]
    impl SearchIndexSink for RemovedDuringSubmitSink {
        fn name(&self) -> &str {
            "removed-during-submit"
        }

        async fn submit(&self, document: &ImageIndex) -> Result<()> {
            self.inner.submit(document).await
        }

        async fn submit_many(&self, documents: &[ImageIndex]) -> Result<()> {
            DatabaseWrites::new(&self.pool).delete_image(self.image_id).await?;
            self.inner.delete(&self.image_id.to_string()).await?;
            self.inner.submit_many(documents).await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_document_of_image_removed_mid_batch_is_retracted() {
        let pool = setup_test_db().await;
        let donor_id = create_donor(&pool, "DO-1").await;
        let removed_id = create_image(&pool, donor_id, ImageType::Mri).await;
        let kept_id = create_image(&pool, donor_id, ImageType::Ct).await;

        let sink = Arc::new(RemovedDuringSubmitSink {
            inner: InMemoryIndexSink::new(),
            pool: pool.clone(),
            image_id: removed_id,
        });
        let handler = ImageIndexingHandler::new(pool.clone(), sink.clone());
        TaskDrainer::new(pool.clone())
            .drain(TaskType::Index, TaskTargetType::Image, 10, &handler)
            .await
            .unwrap();

        assert!(sink.inner.get(&removed_id.to_string()).await.is_none());
        assert!(sink.inner.get(&kept_id.to_string()).await.is_some());
        assert_eq!(sink.inner.len().await, 1);
    }

    #[tokio::test]
    async fn test_image_with_unknown_type_is_skipped() {
        let pool = setup_test_db().await;
        let donor_id = create_donor(&pool, "DO-1").await;
        let image_id = create_image(&pool, donor_id, ImageType::Mri).await;

        // 上游写入了无法识别的影像类型
        execute_sql(
            &pool,
            &format!(
                "INSERT INTO images (id, reference_id, donor_id, image_type) VALUES (900, 'PET-1', {}, 'PET')",
                donor_id
            ),
        )
        .await;
        TaskQueue::new(&pool)
            .enqueue(&NewTask::new(TaskType::Index, TaskTargetType::Image, "900"))
            .await
            .unwrap();

        let sink = Arc::new(InMemoryIndexSink::new());
        let handler = ImageIndexingHandler::new(pool.clone(), sink.clone());
        let report = TaskDrainer::new(pool.clone())
            .drain(TaskType::Index, TaskTargetType::Image, 10, &handler)
            .await
            .unwrap();

        assert_eq!(report.tasks, 2);
        assert_eq!(sink.len().await, 1);
        assert!(sink.get(&image_id.to_string()).await.is_some());
        assert_eq!(
            TaskQueue::new(&pool)
                .count(TaskType::Index, TaskTargetType::Image)
                .await
                .unwrap(),
            0
        );
    }
}
