//! # 影像索引构建模块
//!
//! 后台消费任务队列，为每条影像记录构建去规范化的索引文档并推送到搜索后端：
//! - 索引文档模型：影像、供体、样本、分析及数据可用性摘要
//! - 基因组统计：按供体统计基因、SSM、CNV、SV数量
//! - 数据可用性探测：一组存在性检查
//! - 文档构建器：汇总上述数据生成完整文档
//! - 任务队列消费：分批拉取、处理并删除任务
//! - 后台循环：周期性调度消费，隔离单次失败

pub mod availability;
pub mod builder;
pub mod drainer;
pub mod handlers;
pub mod models;
pub mod service;
pub mod sink;
pub mod stats;

#[cfg(test)]
mod test_support;

// 重新导出主要类型
pub use availability::DataAvailabilityProber;
pub use builder::ImageIndexBuilder;
pub use drainer::{DrainReport, TaskBatchHandler, TaskDrainer};
pub use handlers::{ImageIndexingHandler, ImageRemovalHandler};
pub use models::{
    AnalysisIndex, ClinicalDataIndex, CtImageIndex, DataAvailability, DonorIndex, ImageIndex,
    MaterialIndex, MolecularDataIndex, MriImageIndex, SpecimenIndex, TreatmentIndex,
};
pub use service::{IndexingConfig, IndexingService};
pub use sink::{HttpIndexSink, InMemoryIndexSink, SearchIndexSink};
pub use stats::{GenomicStats, GenomicStatsAggregator};
