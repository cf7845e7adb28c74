//! 数据库查询操作
//!
//! 所有读取操作均无副作用，每次调用独立从连接池获取连接，
//! 不在多次调用之间共享会话或事务。

use crate::connection::DatabasePool;
use crate::models::*;
use crate::variants::{VariantKind, ALL_VARIANT_TABLES};
use imaging_core::{
    AnalysedSample, ClinicalData, CtImage, Donor, Image, ImageType, MriImage, Result, Specimen,
};
use sqlx::{QueryBuilder, Sqlite};

/// 影像相关样本的判定条件：肿瘤组织材料
///
/// 使用别名 `s` 引用 `specimens` 表
pub(crate) const IMAGING_SPECIMEN_FILTER: &str = "s.specimen_type = 'MATERIAL' \
     AND EXISTS (SELECT 1 FROM materials im WHERE im.specimen_id = s.id AND im.material_type = 'TUMOR')";

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        let tables = vec![
            r#"
            CREATE TABLE IF NOT EXISTS donors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                reference_id TEXT UNIQUE NOT NULL,
                mta_protected BOOLEAN NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS clinical_data (
                donor_id INTEGER PRIMARY KEY REFERENCES donors(id) ON DELETE CASCADE,
                diagnosis_date DATE,
                diagnosis TEXT,
                primary_site TEXT,
                localization TEXT,
                gender TEXT,
                age INTEGER,
                vital_status TEXT,
                vital_status_change_date DATE,
                progression_status TEXT,
                progression_status_change_date DATE,
                kps_baseline INTEGER,
                steroids_baseline BOOLEAN
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS treatments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                donor_id INTEGER NOT NULL REFERENCES donors(id) ON DELETE CASCADE,
                therapy TEXT NOT NULL,
                details TEXT,
                start_date DATE,
                end_date DATE,
                results TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS studies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS study_donors (
                study_id INTEGER NOT NULL REFERENCES studies(id) ON DELETE CASCADE,
                donor_id INTEGER NOT NULL REFERENCES donors(id) ON DELETE CASCADE,
                PRIMARY KEY (study_id, donor_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS project_donors (
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                donor_id INTEGER NOT NULL REFERENCES donors(id) ON DELETE CASCADE,
                PRIMARY KEY (project_id, donor_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                reference_id TEXT NOT NULL,
                donor_id INTEGER NOT NULL REFERENCES donors(id),
                image_type TEXT NOT NULL,
                scanning_date DATE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS mri_images (
                image_id INTEGER PRIMARY KEY REFERENCES images(id) ON DELETE CASCADE,
                whole_tumor REAL,
                contrast_enhancing REAL,
                non_contrast_enhancing REAL,
                median_adc_tumor REAL,
                median_cbf_tumor REAL,
                median_cbv_tumor REAL,
                median_mtt_tumor REAL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS ct_images (
                image_id INTEGER PRIMARY KEY REFERENCES images(id) ON DELETE CASCADE,
                whole_tumor REAL,
                median_hu_tumor REAL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS specimens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                donor_id INTEGER NOT NULL REFERENCES donors(id) ON DELETE CASCADE,
                reference_id TEXT NOT NULL,
                specimen_type TEXT NOT NULL,
                creation_date DATE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS materials (
                specimen_id INTEGER PRIMARY KEY REFERENCES specimens(id) ON DELETE CASCADE,
                material_type TEXT,
                fixation_type TEXT,
                tumor_type TEXT,
                source TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS molecular_data (
                specimen_id INTEGER PRIMARY KEY REFERENCES specimens(id) ON DELETE CASCADE,
                mgmt_status TEXT,
                idh_status TEXT,
                idh_mutation TEXT,
                gene_expression_subtype TEXT,
                methylation_subtype TEXT,
                gcimp_methylation BOOLEAN
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS analysed_samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                specimen_id INTEGER NOT NULL REFERENCES specimens(id) ON DELETE CASCADE,
                reference_id TEXT NOT NULL,
                analysis_type TEXT NOT NULL,
                analysis_date DATE,
                purity REAL,
                ploidy REAL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS genes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT UNIQUE NOT NULL,
                chromosome TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bulk_expressions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                analysed_sample_id INTEGER NOT NULL REFERENCES analysed_samples(id) ON DELETE CASCADE,
                gene_id INTEGER NOT NULL REFERENCES genes(id) ON DELETE CASCADE,
                tpm REAL,
                fpkm REAL,
                UNIQUE (analysed_sample_id, gene_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_type TEXT NOT NULL,
                target_type TEXT NOT NULL,
                target TEXT NOT NULL,
                date DATETIME NOT NULL
            )
            "#,
        ];

        for table_sql in tables {
            sqlx::query(table_sql).execute(pool).await?;
        }

        // 三类变异共享同一表结构
        for variant in ALL_VARIANT_TABLES {
            let statements = [
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        chromosome TEXT NOT NULL,
                        start_position INTEGER NOT NULL,
                        end_position INTEGER NOT NULL,
                        descriptor TEXT
                    )",
                    variant.entity
                ),
                format!(
                    "CREATE TABLE IF NOT EXISTS {entry} (
                        entity_id INTEGER NOT NULL REFERENCES {entity}(id) ON DELETE CASCADE,
                        analysed_sample_id INTEGER NOT NULL REFERENCES analysed_samples(id) ON DELETE CASCADE,
                        PRIMARY KEY (entity_id, analysed_sample_id)
                    )",
                    entry = variant.entry,
                    entity = variant.entity
                ),
                format!(
                    "CREATE TABLE IF NOT EXISTS {genes} (
                        entity_id INTEGER NOT NULL REFERENCES {entity}(id) ON DELETE CASCADE,
                        gene_id INTEGER NOT NULL REFERENCES genes(id) ON DELETE CASCADE,
                        PRIMARY KEY (entity_id, gene_id)
                    )",
                    genes = variant.genes,
                    entity = variant.entity
                ),
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{entry}_analysed_sample_id ON {entry}(analysed_sample_id)",
                    entry = variant.entry
                ),
            ];

            for statement in &statements {
                sqlx::query(statement).execute(pool).await?;
            }
        }

        // 创建索引以优化查询性能
        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_treatments_donor_id ON treatments(donor_id)",
            "CREATE INDEX IF NOT EXISTS idx_images_donor_id ON images(donor_id)",
            "CREATE INDEX IF NOT EXISTS idx_specimens_donor_id ON specimens(donor_id)",
            "CREATE INDEX IF NOT EXISTS idx_analysed_samples_specimen_id ON analysed_samples(specimen_id)",
            "CREATE INDEX IF NOT EXISTS idx_bulk_expressions_analysed_sample_id ON bulk_expressions(analysed_sample_id)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_type_target_date ON tasks(task_type, target_type, date)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql).execute(pool).await?;
        }

        tracing::info!("Database indexes created successfully");
        Ok(())
    }

    // ========== 影像与供体 ==========

    /// 根据ID查找影像，附带模态测量数据和供体临床数据
    pub async fn find_image_by_id(&self, id: i64) -> Result<Option<Image>> {
        let pool = self.pool.pool();

        let row = sqlx::query_as::<_, DbImage>(
            r#"
            SELECT i.id, i.reference_id, i.donor_id, i.image_type, i.scanning_date,
                   d.reference_id AS donor_reference_id
            FROM images i
            LEFT JOIN donors d ON d.id = i.donor_id
            WHERE i.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let (mri, ct) = match ImageType::from_code(&row.image_type) {
            Some(ImageType::Mri) => (self.find_mri_image(row.id).await?, None),
            Some(ImageType::Ct) => (None, self.find_ct_image(row.id).await?),
            None => (None, None),
        };

        let clinical_data = match row.donor_reference_id {
            Some(_) => self.find_clinical_data(row.donor_id).await?,
            None => None,
        };

        row.into_image(mri, ct, clinical_data).map(Some)
    }

    /// 筛选仍然存在的影像ID
    pub async fn find_existing_image_ids(&self, image_ids: &[i64]) -> Result<Vec<i64>> {
        if image_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT id FROM images WHERE id IN ");
        push_id_list(&mut builder, image_ids);
        builder.push(" ORDER BY id");

        let ids = builder
            .build_query_scalar::<i64>()
            .fetch_all(self.pool.pool())
            .await?;

        Ok(ids)
    }

    async fn find_mri_image(&self, image_id: i64) -> Result<Option<MriImage>> {
        let result = sqlx::query_as::<_, DbMriImage>(
            r#"
            SELECT whole_tumor, contrast_enhancing, non_contrast_enhancing,
                   median_adc_tumor, median_cbf_tumor, median_cbv_tumor, median_mtt_tumor
            FROM mri_images WHERE image_id = ?
            "#,
        )
        .bind(image_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(result.map(Into::into))
    }

    async fn find_ct_image(&self, image_id: i64) -> Result<Option<CtImage>> {
        let result = sqlx::query_as::<_, DbCtImage>(
            "SELECT whole_tumor, median_hu_tumor FROM ct_images WHERE image_id = ?",
        )
        .bind(image_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(result.map(Into::into))
    }

    /// 查找供体的临床数据
    pub async fn find_clinical_data(&self, donor_id: i64) -> Result<Option<ClinicalData>> {
        let result = sqlx::query_as::<_, DbClinicalData>(
            r#"
            SELECT diagnosis_date, diagnosis, primary_site, localization, gender, age,
                   vital_status, vital_status_change_date,
                   progression_status, progression_status_change_date,
                   kps_baseline, steroids_baseline
            FROM clinical_data WHERE donor_id = ?
            "#,
        )
        .bind(donor_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(result.map(ClinicalData::from))
    }

    /// 根据ID查找供体，附带临床数据、治疗、研究和项目
    pub async fn find_donor_by_id(&self, id: i64) -> Result<Option<Donor>> {
        let pool = self.pool.pool();

        let row = sqlx::query_as::<_, DbDonor>(
            "SELECT id, reference_id, mta_protected FROM donors WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let clinical_data = self.find_clinical_data(row.id).await?;

        let treatments = sqlx::query_as::<_, DbTreatment>(
            r#"
            SELECT id, donor_id, therapy, details, start_date, end_date, results
            FROM treatments WHERE donor_id = ?
            ORDER BY start_date, id
            "#,
        )
        .bind(row.id)
        .fetch_all(pool)
        .await?;

        let studies = sqlx::query_scalar::<_, String>(
            r#"
            SELECT st.name FROM studies st
            JOIN study_donors sd ON sd.study_id = st.id
            WHERE sd.donor_id = ?
            ORDER BY st.name
            "#,
        )
        .bind(row.id)
        .fetch_all(pool)
        .await?;

        let projects = sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.name FROM projects p
            JOIN project_donors pd ON pd.project_id = p.id
            WHERE pd.donor_id = ?
            ORDER BY p.name
            "#,
        )
        .bind(row.id)
        .fetch_all(pool)
        .await?;

        Ok(Some(Donor {
            id: row.id,
            reference_id: row.reference_id,
            mta_protected: row.mta_protected,
            clinical_data,
            treatments: treatments.into_iter().map(Into::into).collect(),
            studies,
            projects,
        }))
    }

    // ========== 样本与分析 ==========

    /// 获取供体的影像相关样本，附带材料和分子数据
    pub async fn list_imaging_relevant_specimens(&self, donor_id: i64) -> Result<Vec<Specimen>> {
        let sql = format!(
            r#"
            SELECT s.id, s.donor_id, s.reference_id, s.specimen_type, s.creation_date,
                   m.specimen_id IS NOT NULL AS has_material,
                   m.material_type, m.fixation_type, m.tumor_type, m.source,
                   md.specimen_id IS NOT NULL AS has_molecular_data,
                   md.mgmt_status, md.idh_status, md.idh_mutation,
                   md.gene_expression_subtype, md.methylation_subtype, md.gcimp_methylation
            FROM specimens s
            LEFT JOIN materials m ON m.specimen_id = s.id
            LEFT JOIN molecular_data md ON md.specimen_id = s.id
            WHERE s.donor_id = ? AND {IMAGING_SPECIMEN_FILTER}
            ORDER BY s.id
            "#
        );

        let results = sqlx::query_as::<_, DbSpecimen>(&sql)
            .bind(donor_id)
            .fetch_all(self.pool.pool())
            .await?;

        Ok(results.into_iter().map(Specimen::from).collect())
    }

    /// 获取样本的全部已分析样本
    pub async fn list_analyses_for_specimen(&self, specimen_id: i64) -> Result<Vec<AnalysedSample>> {
        let results = sqlx::query_as::<_, DbAnalysedSample>(
            r#"
            SELECT id, specimen_id, reference_id, analysis_type, analysis_date, purity, ploidy
            FROM analysed_samples WHERE specimen_id = ?
            ORDER BY id
            "#,
        )
        .bind(specimen_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(results.into_iter().map(AnalysedSample::from).collect())
    }

    // ========== 关联ID查询 ==========

    /// 获取供体的影像相关样本ID（去重）
    pub async fn get_related_specimen_ids(&self, donor_ids: &[i64]) -> Result<Vec<i64>> {
        if donor_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT DISTINCT s.id FROM specimens s WHERE {IMAGING_SPECIMEN_FILTER} AND s.donor_id IN "
        ));
        push_id_list(&mut builder, donor_ids);
        builder.push(" ORDER BY s.id");

        let ids = builder
            .build_query_scalar::<i64>()
            .fetch_all(self.pool.pool())
            .await?;

        Ok(ids)
    }

    /// 获取样本中出现的变异实体ID（去重）
    pub async fn get_related_variant_ids<V: VariantKind>(&self, specimen_ids: &[i64]) -> Result<Vec<i64>> {
        if specimen_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT DISTINCT e.entity_id FROM {} e \
             JOIN analysed_samples a ON a.id = e.analysed_sample_id \
             WHERE a.specimen_id IN ",
            V::TABLES.entry
        ));
        push_id_list(&mut builder, specimen_ids);
        builder.push(" ORDER BY e.entity_id");

        let ids = builder
            .build_query_scalar::<i64>()
            .fetch_all(self.pool.pool())
            .await?;

        tracing::debug!("Found {} {} ids for {} specimens", ids.len(), V::NAME, specimen_ids.len());
        Ok(ids)
    }

    /// 获取样本中变异所影响的基因ID（三类变异合并去重）
    pub async fn get_variant_related_gene_ids(&self, specimen_ids: &[i64]) -> Result<Vec<i64>> {
        if specimen_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT gene_id FROM (");
        for (index, variant) in ALL_VARIANT_TABLES.iter().enumerate() {
            if index > 0 {
                builder.push(" UNION ");
            }
            builder.push(format!(
                "SELECT g.gene_id FROM {genes} g \
                 JOIN {entry} e ON e.entity_id = g.entity_id \
                 JOIN analysed_samples a ON a.id = e.analysed_sample_id \
                 WHERE a.specimen_id IN ",
                genes = variant.genes,
                entry = variant.entry
            ));
            push_id_list(&mut builder, specimen_ids);
        }
        builder.push(") ORDER BY gene_id");

        let ids = builder
            .build_query_scalar::<i64>()
            .fetch_all(self.pool.pool())
            .await?;

        Ok(ids)
    }

    // ========== 存在性探测 ==========

    /// 供体是否有临床数据
    pub async fn has_clinical_data(&self, donor_id: i64) -> Result<bool> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM clinical_data WHERE donor_id = ?)",
            donor_id,
        )
        .await
    }

    /// 供体是否有治疗记录
    pub async fn has_treatments(&self, donor_id: i64) -> Result<bool> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM treatments WHERE donor_id = ?)",
            donor_id,
        )
        .await
    }

    /// 供体是否有影像相关样本
    pub async fn has_imaging_materials(&self, donor_id: i64) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM specimens s WHERE s.donor_id = ? AND {IMAGING_SPECIMEN_FILTER})"
        );
        self.exists(&sql, donor_id).await
    }

    /// 供体是否有带分子数据的影像相关样本
    pub async fn has_imaging_materials_molecular(&self, donor_id: i64) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM specimens s \
             JOIN molecular_data md ON md.specimen_id = s.id \
             WHERE s.donor_id = ? AND {IMAGING_SPECIMEN_FILTER})"
        );
        self.exists(&sql, donor_id).await
    }

    /// 供体的影像相关样本中是否存在某类变异
    pub async fn check_variants<V: VariantKind>(&self, donor_id: i64) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {entry} e \
             JOIN analysed_samples a ON a.id = e.analysed_sample_id \
             JOIN specimens s ON s.id = a.specimen_id \
             WHERE s.donor_id = ? AND {IMAGING_SPECIMEN_FILTER})",
            entry = V::TABLES.entry
        );
        self.exists(&sql, donor_id).await
    }

    /// 供体的影像相关样本中是否存在批量基因表达数据
    pub async fn has_bulk_expression(&self, donor_id: i64) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM bulk_expressions be \
             JOIN analysed_samples a ON a.id = be.analysed_sample_id \
             JOIN specimens s ON s.id = a.specimen_id \
             WHERE s.donor_id = ? AND {IMAGING_SPECIMEN_FILTER})"
        );
        self.exists(&sql, donor_id).await
    }

    async fn exists(&self, sql: &str, id: i64) -> Result<bool> {
        let found = sqlx::query_scalar::<_, bool>(sql)
            .bind(id)
            .fetch_one(self.pool.pool())
            .await?;

        Ok(found)
    }
}

/// 追加形如 `(?, ?, ?)` 的ID列表
pub(crate) fn push_id_list(builder: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    builder.push("(");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}
