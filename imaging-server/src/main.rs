//! 影像索引服务主程序

mod config;

use crate::config::ServerConfig;
use anyhow::{Context, Result};
use clap::Parser;
use imaging_core::{TaskTargetType, TaskType};
use imaging_database::{DatabasePool, DatabaseQueries};
use imaging_indexing::{
    HttpIndexSink, ImageIndexingHandler, ImageRemovalHandler, InMemoryIndexSink, IndexingService,
    SearchIndexSink,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// 影像索引服务命令行参数
#[derive(Parser, Debug)]
#[command(name = "imaging-server")]
#[command(about = "影像索引服务：消费任务队列并维护影像搜索索引")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 数据库连接地址，覆盖配置文件
    #[arg(short, long)]
    database_url: Option<String>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// 使用内存索引代替搜索后端
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志，RUST_LOG 优先
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("启动影像索引服务...");

    let mut config = ServerConfig::load(args.config.as_deref())?;
    if let Some(url) = args.database_url {
        config.database.url = url;
    }
    config.validate()?;

    info!("影像索引服务配置:");
    info!("  数据库: {}", config.database.url);
    info!("  索引批次: {}", config.indexing.bucket_size);
    info!("  删除批次: {}", config.removal.bucket_size);

    let pool = DatabasePool::connect(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to database")?;
    DatabaseQueries::new(&pool)
        .create_tables()
        .await
        .context("Failed to initialize database schema")?;

    let sink = build_sink(&config, args.dry_run)?;
    info!("  搜索索引: {}", sink.name());

    let indexing = IndexingService::new(
        pool.clone(),
        TaskType::Index,
        TaskTargetType::Image,
        config.indexing.to_indexing_config(),
        Arc::new(ImageIndexingHandler::new(pool.clone(), sink.clone())),
    )?;
    let removal = IndexingService::new(
        pool.clone(),
        TaskType::Remove,
        TaskTargetType::Image,
        config.removal.to_indexing_config(),
        Arc::new(ImageRemovalHandler::new(pool.clone(), sink)),
    )?;

    let cancel = CancellationToken::new();
    let indexing = indexing.spawn(cancel.clone());
    let removal = removal.spawn(cancel.clone());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("收到停止信号，等待当前周期结束...");
    cancel.cancel();

    let (indexing, removal) = tokio::join!(indexing, removal);
    indexing.context("Indexing loop panicked")?;
    removal.context("Removal loop panicked")?;

    pool.close().await;
    info!("影像索引服务已停止");
    Ok(())
}

fn build_sink(config: &ServerConfig, dry_run: bool) -> Result<Arc<dyn SearchIndexSink>> {
    if dry_run {
        warn!("Dry run: documents are kept in memory only");
        return Ok(Arc::new(InMemoryIndexSink::new()));
    }

    let search = &config.search;
    let mut sink = HttpIndexSink::new(
        &search.endpoint,
        &search.index,
        Duration::from_secs(search.timeout_seconds),
    )?;
    if let (Some(username), Some(password)) = (&search.username, &search.password) {
        sink = sink.with_basic_auth(username, password);
    }

    Ok(Arc::new(sink))
}
