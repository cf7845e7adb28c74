//! 后台索引循环
//!
//! 进程生命周期内周期性排空某类任务。每个周期的错误只记录日志，
//! 不影响后续周期；下层逻辑一律向上传播错误，只在这里兜底。
//! 取消信号在周期之间及等待期间检查，不会打断正在执行的周期。

use crate::drainer::{DrainReport, TaskBatchHandler, TaskDrainer};
use imaging_core::{IndexError, Result, TaskTargetType, TaskType};
use imaging_database::DatabasePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 索引循环配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexingConfig {
    /// 每批拉取的任务数上限
    pub bucket_size: usize,
    /// 两个周期之间的等待时间
    pub interval: Duration,
}

impl IndexingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bucket_size == 0 {
            return Err(IndexError::Config("批次大小必须大于0".to_string()));
        }
        if self.interval.is_zero() {
            return Err(IndexError::Config("索引周期间隔必须大于0".to_string()));
        }
        Ok(())
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            bucket_size: 100,
            interval: Duration::from_secs(10),
        }
    }
}

/// 后台索引服务
pub struct IndexingService {
    task_type: TaskType,
    target_type: TaskTargetType,
    config: IndexingConfig,
    drainer: TaskDrainer,
    handler: Arc<dyn TaskBatchHandler>,
}

impl IndexingService {
    pub fn new(
        pool: DatabasePool,
        task_type: TaskType,
        target_type: TaskTargetType,
        config: IndexingConfig,
        handler: Arc<dyn TaskBatchHandler>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            task_type,
            target_type,
            config,
            drainer: TaskDrainer::new(pool),
            handler,
        })
    }

    pub fn name(&self) -> &str {
        self.handler.name()
    }

    /// 执行一个排空周期
    pub async fn run_cycle(&self) -> Result<DrainReport> {
        self.drainer
            .drain(
                self.task_type,
                self.target_type,
                self.config.bucket_size,
                self.handler.as_ref(),
            )
            .await
    }

    /// 运行循环直到取消
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Starting {} loop (bucket size {}, interval {:?})",
            self.name(),
            self.config.bucket_size,
            self.config.interval
        );

        if let Err(e) = self.handler.prepare().await {
            error!("Failed to prepare {}: {}", self.name(), e);
        }

        while !cancel.is_cancelled() {
            match self.run_cycle().await {
                Ok(report) if report.tasks > 0 => {
                    info!(
                        "{} processed {} tasks in {} batches",
                        self.name(),
                        report.tasks,
                        report.batches
                    );
                }
                Ok(_) => debug!("{}: no pending tasks", self.name()),
                Err(e) => error!("{} cycle failed: {}", self.name(), e),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        info!("Stopped {} loop", self.name());
    }

    /// 在后台任务中运行循环
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_test_db;
    use async_trait::async_trait;
    use imaging_core::Task;
    use imaging_database::{NewTask, TaskQueue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 前若干次调用失败的处理器
    struct FlakyHandler {
        calls: AtomicUsize,
        failures: usize,
        prepared: AtomicUsize,
    }

    impl FlakyHandler {
        fn new(failures: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures,
                prepared: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TaskBatchHandler for FlakyHandler {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn prepare(&self) -> Result<()> {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            Err(IndexError::Sink("index schema unavailable".to_string()))
        }

        async fn handle(&self, _tasks: &[Task]) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(IndexError::Database("database is locked".to_string()));
            }
            Ok(())
        }
    }

    fn fast_config() -> IndexingConfig {
        IndexingConfig {
            bucket_size: 2,
            interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(IndexingConfig::default().validate().is_ok());

        let config = IndexingConfig {
            bucket_size: 0,
            ..IndexingConfig::default()
        };
        assert!(matches!(config.validate(), Err(IndexError::Config(_))));

        let config = IndexingConfig {
            interval: Duration::ZERO,
            ..IndexingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_loop_survives_failed_cycles() {
        let pool = setup_test_db().await;
        let queue = TaskQueue::new(&pool);
        for target in ["1", "2", "3"] {
            queue
                .enqueue(&NewTask::new(TaskType::Index, TaskTargetType::Image, target))
                .await
                .unwrap();
        }

        let handler = Arc::new(FlakyHandler::new(2));
        let service = IndexingService::new(
            pool.clone(),
            TaskType::Index,
            TaskTargetType::Image,
            fast_config(),
            handler.clone(),
        )
        .unwrap();

        let cancel = CancellationToken::new();
        let handle = service.spawn(cancel.clone());

        // 失败两次后第三个周期排空队列
        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let remaining = TaskQueue::new(&pool)
                    .count(TaskType::Index, TaskTargetType::Image)
                    .await
                    .unwrap();
                if remaining == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(drained.is_ok());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(handler.prepared.load(Ordering::SeqCst), 1);
        assert!(handler.calls.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_no_cycle() {
        let pool = setup_test_db().await;
        let handler = Arc::new(FlakyHandler::new(0));
        let service = IndexingService::new(
            pool,
            TaskType::Index,
            TaskTargetType::Image,
            fast_config(),
            handler.clone(),
        )
        .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        service.run(cancel).await;

        assert_eq!(handler.prepared.load(Ordering::SeqCst), 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let pool = setup_test_db().await;
        let result = IndexingService::new(
            pool,
            TaskType::Index,
            TaskTargetType::Image,
            IndexingConfig {
                bucket_size: 0,
                interval: Duration::from_secs(1),
            },
            Arc::new(FlakyHandler::new(0)),
        );

        assert!(result.is_err());
    }

    /// 处理过程中发出取消信号的处理器
    struct CancellingHandler {
        cancel: CancellationToken,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TaskBatchHandler for CancellingHandler {
        fn name(&self) -> &str {
            "cancelling"
        }

        async fn handle(&self, _tasks: &[Task]) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.cancel.cancel();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_in_flight_cycle_completes_after_cancel() {
        let pool = setup_test_db().await;
        let queue = TaskQueue::new(&pool);
        for target in ["1", "2"] {
            queue
                .enqueue(&NewTask::new(TaskType::Index, TaskTargetType::Image, target))
                .await
                .unwrap();
        }

        let cancel = CancellationToken::new();
        let handler = Arc::new(CancellingHandler {
            cancel: cancel.clone(),
            calls: AtomicUsize::new(0),
        });
        let service = IndexingService::new(
            pool.clone(),
            TaskType::Index,
            TaskTargetType::Image,
            IndexingConfig {
                bucket_size: 2,
                interval: Duration::from_secs(60),
            },
            handler.clone(),
        )
        .unwrap();

        // 间隔为60秒，必须在等待期间响应取消
        tokio::time::timeout(Duration::from_secs(5), service.run(cancel.clone()))
            .await
            .unwrap();

        assert!(cancel.is_cancelled());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            TaskQueue::new(&pool)
                .count(TaskType::Index, TaskTargetType::Image)
                .await
                .unwrap(),
            0
        );
    }
}
