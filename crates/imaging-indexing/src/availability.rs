//! 数据可用性探测
//!
//! 每项检查都是独立的 `EXISTS` 查询，命中第一条记录即返回。

use crate::models::DataAvailability;
use imaging_core::{ImageType, Result};
use imaging_database::{Cnv, DatabasePool, DatabaseQueries, Ssm, Sv};

/// 数据可用性探测器
#[derive(Debug, Clone)]
pub struct DataAvailabilityProber {
    pool: DatabasePool,
}

impl DataAvailabilityProber {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// 计算供体的数据可用性摘要
    ///
    /// `has_mris` / `has_cts` 只反映当前正在索引的影像类型
    pub async fn compute(&self, donor_id: i64, image_type: ImageType) -> Result<DataAvailability> {
        let queries = DatabaseQueries::new(&self.pool);

        Ok(DataAvailability {
            has_donors: true,
            has_clinical: queries.has_clinical_data(donor_id).await?,
            has_treatments: queries.has_treatments(donor_id).await?,
            has_mris: image_type == ImageType::Mri,
            has_cts: image_type == ImageType::Ct,
            has_materials: queries.has_imaging_materials(donor_id).await?,
            has_materials_molecular: queries.has_imaging_materials_molecular(donor_id).await?,
            has_ssms: queries.check_variants::<Ssm>(donor_id).await?,
            has_cnvs: queries.check_variants::<Cnv>(donor_id).await?,
            has_svs: queries.check_variants::<Sv>(donor_id).await?,
            has_gene_exp: queries.has_bulk_expression(donor_id).await?,
            has_gene_exp_sc: false,
        })
    }
}
