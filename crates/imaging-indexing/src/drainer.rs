//! 任务队列排空
//!
//! 按 (任务类型, 目标类型) 分批拉取任务交给处理器，处理成功后整批删除。
//! 处理器失败时当前批次保留在队列中，下一次调度会重新处理（至少一次语义）。

use async_trait::async_trait;
use imaging_core::{IndexError, Result, Task, TaskTargetType, TaskType};
use imaging_database::{DatabasePool, TaskQueue};
use tracing::debug;

/// 批量任务处理器
#[async_trait]
pub trait TaskBatchHandler: Send + Sync {
    /// 获取处理器名称
    fn name(&self) -> &str;

    /// 循环启动前的准备工作
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// 处理一批任务
    async fn handle(&self, tasks: &[Task]) -> Result<()>;
}

/// 排空结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub batches: usize,
    pub tasks: usize,
}

/// 任务队列排空器
#[derive(Debug, Clone)]
pub struct TaskDrainer {
    pool: DatabasePool,
}

impl TaskDrainer {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// 排空某类任务，直到队列中没有匹配的任务
    pub async fn drain<H>(
        &self,
        task_type: TaskType,
        target_type: TaskTargetType,
        bucket_size: usize,
        handler: &H,
    ) -> Result<DrainReport>
    where
        H: TaskBatchHandler + ?Sized,
    {
        if bucket_size == 0 {
            return Err(IndexError::Validation("批次大小必须大于0".to_string()));
        }

        let queue = TaskQueue::new(&self.pool);
        let mut report = DrainReport::default();

        loop {
            let batch = queue.pull_batch(task_type, target_type, bucket_size).await?;
            if batch.is_empty() {
                break;
            }

            debug!(
                "{}: handling batch of {} {}/{} tasks",
                handler.name(),
                batch.len(),
                task_type.code(),
                target_type.code()
            );

            handler.handle(&batch).await?;
            queue.remove(&batch).await?;

            report.batches += 1;
            report.tasks += batch.len();
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_test_db;
    use imaging_database::NewTask;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 记录每批任务，可在第N批失败
    #[derive(Default)]
    struct RecordingHandler {
        batches: Mutex<Vec<Vec<String>>>,
        calls: AtomicUsize,
        fail_on_call: Option<usize>,
    }

    #[async_trait]
    impl TaskBatchHandler for RecordingHandler {
        fn name(&self) -> &str {
            "recording"
        }

        async fn handle(&self, tasks: &[Task]) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call == Some(call) {
                return Err(IndexError::Sink("backend unavailable".to_string()));
            }

            let targets = tasks.iter().map(|task| task.target.clone()).collect();
            self.batches.lock().unwrap().push(targets);
            Ok(())
        }
    }

    async fn enqueue_images(pool: &DatabasePool, count: usize) {
        let queue = TaskQueue::new(pool);
        for i in 1..=count {
            queue
                .enqueue(&NewTask::new(TaskType::Index, TaskTargetType::Image, i.to_string()))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_drain_in_buckets_until_empty() {
        let pool = setup_test_db().await;
        enqueue_images(&pool, 7).await;

        let handler = RecordingHandler::default();
        let report = TaskDrainer::new(pool.clone())
            .drain(TaskType::Index, TaskTargetType::Image, 3, &handler)
            .await
            .unwrap();

        assert_eq!(report, DrainReport { batches: 3, tasks: 7 });

        let sizes: Vec<usize> = handler.batches.lock().unwrap().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);

        let remaining = TaskQueue::new(&pool)
            .count(TaskType::Index, TaskTargetType::Image)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_failed_batch_stays_queued() {
        let pool = setup_test_db().await;
        enqueue_images(&pool, 7).await;

        let handler = RecordingHandler {
            fail_on_call: Some(2),
            ..RecordingHandler::default()
        };
        let result = TaskDrainer::new(pool.clone())
            .drain(TaskType::Index, TaskTargetType::Image, 3, &handler)
            .await;

        assert!(matches!(result, Err(IndexError::Sink(_))));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);

        let remaining = TaskQueue::new(&pool)
            .count(TaskType::Index, TaskTargetType::Image)
            .await
            .unwrap();
        assert_eq!(remaining, 4);
    }

    #[tokio::test]
    async fn test_other_task_classes_untouched() {
        let pool = setup_test_db().await;
        enqueue_images(&pool, 2).await;
        TaskQueue::new(&pool)
            .enqueue(&NewTask::new(TaskType::Remove, TaskTargetType::Image, "9"))
            .await
            .unwrap();

        let handler = RecordingHandler::default();
        let report = TaskDrainer::new(pool.clone())
            .drain(TaskType::Remove, TaskTargetType::Image, 10, &handler)
            .await
            .unwrap();

        assert_eq!(report.tasks, 1);
        assert_eq!(handler.batches.lock().unwrap()[0], vec!["9".to_string()]);
        assert_eq!(
            TaskQueue::new(&pool)
                .count(TaskType::Index, TaskTargetType::Image)
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_zero_bucket_size_rejected() {
        let pool = setup_test_db().await;
        let handler = RecordingHandler::default();

        let result = TaskDrainer::new(pool)
            .drain(TaskType::Index, TaskTargetType::Image, 0, &handler)
            .await;

        assert!(matches!(result, Err(IndexError::Validation(_))));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }
}
