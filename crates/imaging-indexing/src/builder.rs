//! 影像索引文档构建器
//!
//! 以影像ID为入口，逐级加载供体、样本、分析数据，结合数据可用性摘要和
//! 基因组统计组装完整文档。各子查询独立获取连接，不使用跨查询的长事务。
//! 只有影像本身缺失时返回 `None`，其余关联数据缺失只会省略对应子文档。

use crate::availability::DataAvailabilityProber;
use crate::models::{non_empty, AnalysisIndex, DonorIndex, ImageIndex, SpecimenIndex};
use crate::stats::GenomicStatsAggregator;
use chrono::NaiveDate;
use imaging_core::Result;
use imaging_database::{DatabasePool, DatabaseQueries};

/// 影像索引文档构建器
#[derive(Debug, Clone)]
pub struct ImageIndexBuilder {
    pool: DatabasePool,
    stats: GenomicStatsAggregator,
    prober: DataAvailabilityProber,
}

impl ImageIndexBuilder {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            stats: GenomicStatsAggregator::new(pool.clone()),
            prober: DataAvailabilityProber::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// 构建影像索引文档
    pub async fn build(&self, image_id: i64) -> Result<Option<ImageIndex>> {
        let queries = DatabaseQueries::new(&self.pool);

        // 1. 加载影像，不存在时无需索引
        let Some(image) = queries.find_image_by_id(image_id).await? else {
            tracing::debug!("Image {} not found, nothing to index", image_id);
            return Ok(None);
        };

        // 2. 诊断日期是所有相对天数的基准
        let diagnosis_date = image
            .clinical_data
            .as_ref()
            .and_then(|clinical_data| clinical_data.diagnosis_date);

        // 3. 影像自身字段
        let mut index = ImageIndex::from_image(&image, diagnosis_date);

        // 4. 供体子文档
        index.donor = self.build_donor_index(image.donor_id, diagnosis_date).await?;

        // 5. 样本及分析子文档
        index.specimens = self.build_specimen_indices(image.donor_id, diagnosis_date).await?;

        // 6. 数据可用性，按当前影像类型
        index.data = self.prober.compute(image.donor_id, image.image_type).await?;

        // 7. 基因组统计
        let stats = self.stats.compute(image.donor_id).await?;
        index.number_of_genes = stats.genes;
        index.number_of_ssms = stats.ssms;
        index.number_of_cnvs = stats.cnvs;
        index.number_of_svs = stats.svs;

        tracing::debug!("Built index document for image {}", image_id);
        Ok(Some(index))
    }

    async fn build_donor_index(
        &self,
        donor_id: i64,
        diagnosis_date: Option<NaiveDate>,
    ) -> Result<Option<DonorIndex>> {
        let donor = DatabaseQueries::new(&self.pool).find_donor_by_id(donor_id).await?;

        if donor.is_none() {
            tracing::warn!("Donor {} not found, omitting donor from index document", donor_id);
        }

        Ok(donor.map(|donor| DonorIndex::from_donor(&donor, diagnosis_date)))
    }

    async fn build_specimen_indices(
        &self,
        donor_id: i64,
        diagnosis_date: Option<NaiveDate>,
    ) -> Result<Option<Vec<SpecimenIndex>>> {
        let queries = DatabaseQueries::new(&self.pool);
        let specimens = queries.list_imaging_relevant_specimens(donor_id).await?;

        let mut indices = Vec::with_capacity(specimens.len());
        for specimen in &specimens {
            let mut index = SpecimenIndex::from_specimen(specimen, diagnosis_date);
            index.analyses = self.build_analysis_indices(specimen.id, diagnosis_date).await?;
            indices.push(index);
        }

        Ok(non_empty(indices))
    }

    async fn build_analysis_indices(
        &self,
        specimen_id: i64,
        diagnosis_date: Option<NaiveDate>,
    ) -> Result<Option<Vec<AnalysisIndex>>> {
        let samples = DatabaseQueries::new(&self.pool)
            .list_analyses_for_specimen(specimen_id)
            .await?;

        Ok(non_empty(
            samples
                .iter()
                .map(|sample| AnalysisIndex::from_sample(sample, diagnosis_date))
                .collect(),
        ))
    }
}
