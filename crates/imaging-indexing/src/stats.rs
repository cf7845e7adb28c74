//! 基因组统计
//!
//! 供体 → 影像相关样本 → 各类变异 → 受影响基因，逐级通过仓储查询解析，
//! 统计值为去重后的实体数量而非出现记录数。

use imaging_core::Result;
use imaging_database::{Cnv, DatabasePool, DatabaseQueries, Ssm, Sv};
use std::collections::BTreeSet;

/// 供体的基因组统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenomicStats {
    pub genes: u64,
    pub ssms: u64,
    pub cnvs: u64,
    pub svs: u64,
}

/// 基因组统计器
#[derive(Debug, Clone)]
pub struct GenomicStatsAggregator {
    pool: DatabasePool,
}

impl GenomicStatsAggregator {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// 计算供体的基因组统计
    pub async fn compute(&self, donor_id: i64) -> Result<GenomicStats> {
        let queries = DatabaseQueries::new(&self.pool);

        let specimen_ids = queries.get_related_specimen_ids(&[donor_id]).await?;
        if specimen_ids.is_empty() {
            return Ok(GenomicStats::default());
        }

        let stats = GenomicStats {
            ssms: count_distinct(queries.get_related_variant_ids::<Ssm>(&specimen_ids).await?),
            cnvs: count_distinct(queries.get_related_variant_ids::<Cnv>(&specimen_ids).await?),
            svs: count_distinct(queries.get_related_variant_ids::<Sv>(&specimen_ids).await?),
            genes: count_distinct(queries.get_variant_related_gene_ids(&specimen_ids).await?),
        };

        tracing::debug!("Genomic stats for donor {}: {:?}", donor_id, stats);
        Ok(stats)
    }
}

fn count_distinct(ids: Vec<i64>) -> u64 {
    ids.into_iter().collect::<BTreeSet<_>>().len() as u64
}
