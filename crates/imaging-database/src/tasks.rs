//! 持久化任务队列
//!
//! 上游写入影像时登记任务，索引循环按 (任务类型, 目标类型) 分批拉取并在处理成功后删除。

use crate::connection::DatabasePool;
use crate::models::{DbTask, NewTask};
use crate::queries::push_id_list;
use imaging_core::{Result, Task, TaskTargetType, TaskType};
use sqlx::{Executor, QueryBuilder, Sqlite};

/// 任务队列操作接口
pub struct TaskQueue<'a> {
    pool: &'a DatabasePool,
}

impl<'a> TaskQueue<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 登记新任务
    pub async fn enqueue(&self, task: &NewTask) -> Result<i64> {
        insert_task(self.pool.pool(), task).await
    }

    /// 拉取一批待处理任务
    ///
    /// 按登记时间从新到旧排序，时间相同时按登记顺序
    pub async fn pull_batch(
        &self,
        task_type: TaskType,
        target_type: TaskTargetType,
        limit: usize,
    ) -> Result<Vec<Task>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query_as::<_, DbTask>(
            r#"
            SELECT id, target, date FROM tasks
            WHERE task_type = ? AND target_type = ?
            ORDER BY date DESC, id ASC
            LIMIT ?
            "#,
        )
        .bind(task_type.code())
        .bind(target_type.code())
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_task(task_type, target_type))
            .collect())
    }

    /// 删除已处理的任务
    ///
    /// 单条语句完成删除，要么全部删除要么全部保留
    pub async fn remove(&self, tasks: &[Task]) -> Result<u64> {
        if tasks.is_empty() {
            return Ok(0);
        }

        let ids: Vec<i64> = tasks.iter().map(|task| task.id).collect();

        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM tasks WHERE id IN ");
        push_id_list(&mut builder, &ids);

        let result = builder.build().execute(self.pool.pool()).await?;
        Ok(result.rows_affected())
    }

    /// 统计某类任务的数量
    pub async fn count(&self, task_type: TaskType, target_type: TaskTargetType) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tasks WHERE task_type = ? AND target_type = ?",
        )
        .bind(task_type.code())
        .bind(target_type.code())
        .fetch_one(self.pool.pool())
        .await?;

        Ok(count)
    }
}

/// 写入任务记录，可在事务中调用
pub(crate) async fn insert_task<'e, E>(executor: E, task: &NewTask) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO tasks (task_type, target_type, target, date) VALUES (?, ?, ?, ?)",
    )
    .bind(task.task_type.code())
    .bind(task.target_type.code())
    .bind(&task.target)
    .bind(task.date)
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::DatabaseQueries;
    use chrono::{TimeZone, Utc};

    async fn setup_queue() -> DatabasePool {
        let pool = DatabasePool::connect_in_memory().await.unwrap();
        DatabaseQueries::new(&pool).create_tables().await.unwrap();
        pool
    }

    fn index_task(target: &str, hour: u32) -> NewTask {
        NewTask::new(TaskType::Index, TaskTargetType::Image, target)
            .with_date(Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_pull_batch_newest_first_with_insertion_tie_break() {
        let pool = setup_queue().await;
        let queue = TaskQueue::new(&pool);

        queue.enqueue(&index_task("1", 8)).await.unwrap();
        queue.enqueue(&index_task("2", 10)).await.unwrap();
        queue.enqueue(&index_task("3", 10)).await.unwrap();
        queue.enqueue(&index_task("4", 9)).await.unwrap();

        let batch = queue
            .pull_batch(TaskType::Index, TaskTargetType::Image, 3)
            .await
            .unwrap();

        let targets: Vec<&str> = batch.iter().map(|task| task.target.as_str()).collect();
        assert_eq!(targets, vec!["2", "3", "4"]);
        assert!(batch.iter().all(|task| task.task_type == TaskType::Index));
    }

    #[tokio::test]
    async fn test_pull_batch_filters_by_task_class() {
        let pool = setup_queue().await;
        let queue = TaskQueue::new(&pool);

        queue.enqueue(&index_task("1", 8)).await.unwrap();
        queue
            .enqueue(&NewTask::new(TaskType::Remove, TaskTargetType::Image, "2"))
            .await
            .unwrap();
        queue
            .enqueue(&NewTask::new(TaskType::Index, TaskTargetType::Donor, "3"))
            .await
            .unwrap();

        let batch = queue
            .pull_batch(TaskType::Remove, TaskTargetType::Image, 10)
            .await
            .unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].target, "2");
    }

    #[tokio::test]
    async fn test_remove_only_pulled_tasks() {
        let pool = setup_queue().await;
        let queue = TaskQueue::new(&pool);

        for hour in 1..=5 {
            queue.enqueue(&index_task(&hour.to_string(), hour)).await.unwrap();
        }

        let batch = queue
            .pull_batch(TaskType::Index, TaskTargetType::Image, 2)
            .await
            .unwrap();
        let removed = queue.remove(&batch).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(queue.count(TaskType::Index, TaskTargetType::Image).await.unwrap(), 3);

        // 重复删除不影响其余任务
        assert_eq!(queue.remove(&batch).await.unwrap(), 0);
        assert_eq!(queue.remove(&[]).await.unwrap(), 0);
        assert_eq!(queue.count(TaskType::Index, TaskTargetType::Image).await.unwrap(), 3);
    }
}
