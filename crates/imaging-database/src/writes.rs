//! 数据写入操作
//!
//! 数据录入侧使用的写入接口。写入影像时在同一事务中登记索引任务，
//! 保证每次写入恰好产生一个待索引任务。

use crate::connection::DatabasePool;
use crate::models::*;
use crate::tasks::insert_task;
use crate::variants::VariantKind;
use imaging_core::{ClinicalData, Result, TaskTargetType, TaskType};

/// 数据写入操作接口
pub struct DatabaseWrites<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseWrites<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    // ========== 供体相关操作 ==========

    /// 创建新供体
    pub async fn create_donor(&self, donor: &NewDonor) -> Result<i64> {
        let result = sqlx::query("INSERT INTO donors (reference_id, mta_protected) VALUES (?, ?)")
            .bind(&donor.reference_id)
            .bind(donor.mta_protected)
            .execute(self.pool.pool())
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// 写入供体临床数据（已存在时覆盖）
    pub async fn create_clinical_data(&self, donor_id: i64, data: &ClinicalData) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO clinical_data (
                donor_id, diagnosis_date, diagnosis, primary_site, localization, gender, age,
                vital_status, vital_status_change_date,
                progression_status, progression_status_change_date,
                kps_baseline, steroids_baseline
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(donor_id)
        .bind(data.diagnosis_date)
        .bind(&data.diagnosis)
        .bind(&data.primary_site)
        .bind(&data.localization)
        .bind(data.gender.map(|g| g.code()))
        .bind(data.age)
        .bind(data.vital_status.map(|s| s.code()))
        .bind(data.vital_status_change_date)
        .bind(data.progression_status.map(|s| s.code()))
        .bind(data.progression_status_change_date)
        .bind(data.kps_baseline)
        .bind(data.steroids_baseline)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    /// 创建治疗记录
    pub async fn create_treatment(&self, donor_id: i64, treatment: &NewTreatment) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO treatments (donor_id, therapy, details, start_date, end_date, results)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(donor_id)
        .bind(&treatment.therapy)
        .bind(&treatment.details)
        .bind(treatment.start_date)
        .bind(treatment.end_date)
        .bind(&treatment.results)
        .execute(self.pool.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// 将供体加入研究，研究不存在时自动创建
    pub async fn add_donor_to_study(&self, donor_id: i64, study: &str) -> Result<()> {
        let mut tx = self.pool.pool().begin().await?;

        sqlx::query("INSERT OR IGNORE INTO studies (name) VALUES (?)")
            .bind(study)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO study_donors (study_id, donor_id) \
             SELECT id, ? FROM studies WHERE name = ?",
        )
        .bind(donor_id)
        .bind(study)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// 将供体加入项目，项目不存在时自动创建
    pub async fn add_donor_to_project(&self, donor_id: i64, project: &str) -> Result<()> {
        let mut tx = self.pool.pool().begin().await?;

        sqlx::query("INSERT OR IGNORE INTO projects (name) VALUES (?)")
            .bind(project)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO project_donors (project_id, donor_id) \
             SELECT id, ? FROM projects WHERE name = ?",
        )
        .bind(donor_id)
        .bind(project)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    // ========== 样本相关操作 ==========

    /// 创建样本及其材料、分子数据子记录
    pub async fn create_specimen(&self, specimen: &NewSpecimen) -> Result<i64> {
        let mut tx = self.pool.pool().begin().await?;

        let specimen_id = sqlx::query(
            r#"
            INSERT INTO specimens (donor_id, reference_id, specimen_type, creation_date)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(specimen.donor_id)
        .bind(&specimen.reference_id)
        .bind(specimen.specimen_type.code())
        .bind(specimen.creation_date)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        if let Some(material) = &specimen.material {
            sqlx::query(
                r#"
                INSERT INTO materials (specimen_id, material_type, fixation_type, tumor_type, source)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(specimen_id)
            .bind(material.material_type.map(|t| t.code()))
            .bind(&material.fixation_type)
            .bind(&material.tumor_type)
            .bind(&material.source)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(molecular) = &specimen.molecular_data {
            sqlx::query(
                r#"
                INSERT INTO molecular_data (
                    specimen_id, mgmt_status, idh_status, idh_mutation,
                    gene_expression_subtype, methylation_subtype, gcimp_methylation
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(specimen_id)
            .bind(&molecular.mgmt_status)
            .bind(&molecular.idh_status)
            .bind(&molecular.idh_mutation)
            .bind(&molecular.gene_expression_subtype)
            .bind(&molecular.methylation_subtype)
            .bind(molecular.gcimp_methylation)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(specimen_id)
    }

    /// 创建已分析样本
    pub async fn create_analysed_sample(&self, sample: &NewAnalysedSample) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO analysed_samples (specimen_id, reference_id, analysis_type, analysis_date, purity, ploidy)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sample.specimen_id)
        .bind(&sample.reference_id)
        .bind(sample.analysis_type.code())
        .bind(sample.analysis_date)
        .bind(sample.purity)
        .bind(sample.ploidy)
        .execute(self.pool.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    // ========== 基因组数据 ==========

    /// 创建基因
    pub async fn create_gene(&self, symbol: &str, chromosome: Option<&str>) -> Result<i64> {
        let result = sqlx::query("INSERT INTO genes (symbol, chromosome) VALUES (?, ?)")
            .bind(symbol)
            .bind(chromosome)
            .execute(self.pool.pool())
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// 创建变异实体
    pub async fn create_variant<V: VariantKind>(&self, variant: &NewVariant) -> Result<i64> {
        let sql = format!(
            "INSERT INTO {} (chromosome, start_position, end_position, descriptor) VALUES (?, ?, ?, ?)",
            V::TABLES.entity
        );

        let result = sqlx::query(&sql)
            .bind(&variant.chromosome)
            .bind(variant.start_position)
            .bind(variant.end_position)
            .bind(&variant.descriptor)
            .execute(self.pool.pool())
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// 记录变异在已分析样本中的出现
    pub async fn create_variant_entry<V: VariantKind>(
        &self,
        variant_id: i64,
        analysed_sample_id: i64,
    ) -> Result<()> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} (entity_id, analysed_sample_id) VALUES (?, ?)",
            V::TABLES.entry
        );

        sqlx::query(&sql)
            .bind(variant_id)
            .bind(analysed_sample_id)
            .execute(self.pool.pool())
            .await?;

        Ok(())
    }

    /// 关联变异与受影响的基因
    pub async fn link_variant_gene<V: VariantKind>(&self, variant_id: i64, gene_id: i64) -> Result<()> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} (entity_id, gene_id) VALUES (?, ?)",
            V::TABLES.genes
        );

        sqlx::query(&sql)
            .bind(variant_id)
            .bind(gene_id)
            .execute(self.pool.pool())
            .await?;

        Ok(())
    }

    /// 写入批量基因表达数据
    pub async fn create_bulk_expression(
        &self,
        analysed_sample_id: i64,
        gene_id: i64,
        tpm: Option<f64>,
        fpkm: Option<f64>,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO bulk_expressions (analysed_sample_id, gene_id, tpm, fpkm) VALUES (?, ?, ?, ?)",
        )
        .bind(analysed_sample_id)
        .bind(gene_id)
        .bind(tpm)
        .bind(fpkm)
        .execute(self.pool.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    // ========== 影像相关操作 ==========

    /// 创建影像并登记索引任务
    pub async fn create_image(&self, image: &NewImage) -> Result<i64> {
        let mut tx = self.pool.pool().begin().await?;

        let image_id = sqlx::query(
            r#"
            INSERT INTO images (reference_id, donor_id, image_type, scanning_date)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&image.reference_id)
        .bind(image.donor_id)
        .bind(image.image_type.code())
        .bind(image.scanning_date)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        if let Some(mri) = &image.mri {
            sqlx::query(
                r#"
                INSERT INTO mri_images (
                    image_id, whole_tumor, contrast_enhancing, non_contrast_enhancing,
                    median_adc_tumor, median_cbf_tumor, median_cbv_tumor, median_mtt_tumor
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(image_id)
            .bind(mri.whole_tumor)
            .bind(mri.contrast_enhancing)
            .bind(mri.non_contrast_enhancing)
            .bind(mri.median_adc_tumor)
            .bind(mri.median_cbf_tumor)
            .bind(mri.median_cbv_tumor)
            .bind(mri.median_mtt_tumor)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(ct) = &image.ct {
            sqlx::query("INSERT INTO ct_images (image_id, whole_tumor, median_hu_tumor) VALUES (?, ?, ?)")
                .bind(image_id)
                .bind(ct.whole_tumor)
                .bind(ct.median_hu_tumor)
                .execute(&mut *tx)
                .await?;
        }

        let task = NewTask::new(TaskType::Index, TaskTargetType::Image, image_id.to_string());
        insert_task(&mut *tx, &task).await?;

        tx.commit().await?;

        tracing::debug!("Created image {} and queued it for indexing", image_id);
        Ok(image_id)
    }

    /// 登记影像删除任务
    pub async fn request_image_removal(&self, image_id: i64) -> Result<i64> {
        let task = NewTask::new(TaskType::Remove, TaskTargetType::Image, image_id.to_string());
        insert_task(self.pool.pool(), &task).await
    }

    /// 删除影像记录
    ///
    /// 影像已不存在时不报错，返回是否实际删除了记录
    pub async fn delete_image(&self, image_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(image_id)
            .execute(self.pool.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
