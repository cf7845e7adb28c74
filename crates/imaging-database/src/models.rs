//! 数据库模型

use chrono::{DateTime, NaiveDate, Utc};
use imaging_core::models::*;
use imaging_core::{IndexError, Result};
use sqlx::FromRow;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库供体表
#[derive(Debug, FromRow)]
pub struct DbDonor {
    pub id: i64,
    pub reference_id: String,
    pub mta_protected: bool,
}

/// 数据库临床数据表
#[derive(Debug, FromRow)]
pub struct DbClinicalData {
    pub diagnosis_date: Option<NaiveDate>,
    pub diagnosis: Option<String>,
    pub primary_site: Option<String>,
    pub localization: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i32>,
    pub vital_status: Option<String>,
    pub vital_status_change_date: Option<NaiveDate>,
    pub progression_status: Option<String>,
    pub progression_status_change_date: Option<NaiveDate>,
    pub kps_baseline: Option<i32>,
    pub steroids_baseline: Option<bool>,
}

impl From<DbClinicalData> for ClinicalData {
    fn from(db: DbClinicalData) -> Self {
        ClinicalData {
            diagnosis_date: db.diagnosis_date,
            diagnosis: db.diagnosis,
            primary_site: db.primary_site,
            localization: db.localization,
            gender: db.gender.as_deref().and_then(Gender::from_code),
            age: db.age,
            vital_status: db.vital_status.as_deref().and_then(VitalStatus::from_code),
            vital_status_change_date: db.vital_status_change_date,
            progression_status: db
                .progression_status
                .as_deref()
                .and_then(ProgressionStatus::from_code),
            progression_status_change_date: db.progression_status_change_date,
            kps_baseline: db.kps_baseline,
            steroids_baseline: db.steroids_baseline,
        }
    }
}

/// 数据库治疗表
#[derive(Debug, FromRow)]
pub struct DbTreatment {
    pub id: i64,
    pub donor_id: i64,
    pub therapy: String,
    pub details: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub results: Option<String>,
}

impl From<DbTreatment> for Treatment {
    fn from(db: DbTreatment) -> Self {
        Treatment {
            id: db.id,
            donor_id: db.donor_id,
            therapy: db.therapy,
            details: db.details,
            start_date: db.start_date,
            end_date: db.end_date,
            results: db.results,
        }
    }
}

/// 数据库影像表（附带供体编号）
#[derive(Debug, FromRow)]
pub struct DbImage {
    pub id: i64,
    pub reference_id: String,
    pub donor_id: i64,
    pub image_type: String, // 存储为字符串，转换为ImageType枚举
    pub scanning_date: Option<NaiveDate>,
    pub donor_reference_id: Option<String>,
}

impl DbImage {
    /// 组装影像记录
    pub fn into_image(
        self,
        mri: Option<MriImage>,
        ct: Option<CtImage>,
        clinical_data: Option<ClinicalData>,
    ) -> Result<Image> {
        let image_type = ImageType::from_code(&self.image_type).ok_or_else(|| {
            IndexError::Validation(format!(
                "Unknown image type '{}' for image {}",
                self.image_type, self.id
            ))
        })?;

        Ok(Image {
            id: self.id,
            reference_id: self.reference_id,
            donor_id: self.donor_id,
            image_type,
            scanning_date: self.scanning_date,
            mri,
            ct,
            donor_reference_id: self.donor_reference_id,
            clinical_data,
        })
    }
}

/// 数据库MRI测量表
#[derive(Debug, FromRow)]
pub struct DbMriImage {
    pub whole_tumor: Option<f64>,
    pub contrast_enhancing: Option<f64>,
    pub non_contrast_enhancing: Option<f64>,
    pub median_adc_tumor: Option<f64>,
    pub median_cbf_tumor: Option<f64>,
    pub median_cbv_tumor: Option<f64>,
    pub median_mtt_tumor: Option<f64>,
}

impl From<DbMriImage> for MriImage {
    fn from(db: DbMriImage) -> Self {
        MriImage {
            whole_tumor: db.whole_tumor,
            contrast_enhancing: db.contrast_enhancing,
            non_contrast_enhancing: db.non_contrast_enhancing,
            median_adc_tumor: db.median_adc_tumor,
            median_cbf_tumor: db.median_cbf_tumor,
            median_cbv_tumor: db.median_cbv_tumor,
            median_mtt_tumor: db.median_mtt_tumor,
        }
    }
}

/// 数据库CT测量表
#[derive(Debug, FromRow)]
pub struct DbCtImage {
    pub whole_tumor: Option<f64>,
    pub median_hu_tumor: Option<f64>,
}

impl From<DbCtImage> for CtImage {
    fn from(db: DbCtImage) -> Self {
        CtImage {
            whole_tumor: db.whole_tumor,
            median_hu_tumor: db.median_hu_tumor,
        }
    }
}

/// 数据库样本表，连同材料和分子数据子表一起查询
#[derive(Debug, FromRow)]
pub struct DbSpecimen {
    pub id: i64,
    pub donor_id: i64,
    pub reference_id: String,
    pub specimen_type: String,
    pub creation_date: Option<NaiveDate>,
    pub has_material: bool,
    pub material_type: Option<String>,
    pub fixation_type: Option<String>,
    pub tumor_type: Option<String>,
    pub source: Option<String>,
    pub has_molecular_data: bool,
    pub mgmt_status: Option<String>,
    pub idh_status: Option<String>,
    pub idh_mutation: Option<String>,
    pub gene_expression_subtype: Option<String>,
    pub methylation_subtype: Option<String>,
    pub gcimp_methylation: Option<bool>,
}

impl From<DbSpecimen> for Specimen {
    fn from(db: DbSpecimen) -> Self {
        let material = db.has_material.then(|| Material {
            material_type: db.material_type.as_deref().and_then(MaterialType::from_code),
            fixation_type: db.fixation_type,
            tumor_type: db.tumor_type,
            source: db.source,
        });

        let molecular_data = db.has_molecular_data.then(|| MolecularData {
            mgmt_status: db.mgmt_status,
            idh_status: db.idh_status,
            idh_mutation: db.idh_mutation,
            gene_expression_subtype: db.gene_expression_subtype,
            methylation_subtype: db.methylation_subtype,
            gcimp_methylation: db.gcimp_methylation,
        });

        Specimen {
            id: db.id,
            donor_id: db.donor_id,
            reference_id: db.reference_id,
            specimen_type: SpecimenType::from_code(&db.specimen_type)
                .unwrap_or(SpecimenType::Material), // 默认类型
            creation_date: db.creation_date,
            material,
            molecular_data,
        }
    }
}

/// 数据库已分析样本表
#[derive(Debug, FromRow)]
pub struct DbAnalysedSample {
    pub id: i64,
    pub specimen_id: i64,
    pub reference_id: String,
    pub analysis_type: String,
    pub analysis_date: Option<NaiveDate>,
    pub purity: Option<f64>,
    pub ploidy: Option<f64>,
}

impl From<DbAnalysedSample> for AnalysedSample {
    fn from(db: DbAnalysedSample) -> Self {
        AnalysedSample {
            id: db.id,
            specimen_id: db.specimen_id,
            reference_id: db.reference_id,
            analysis_type: AnalysisType::from_code(&db.analysis_type)
                .unwrap_or(AnalysisType::Other),
            analysis_date: db.analysis_date,
            purity: db.purity,
            ploidy: db.ploidy,
        }
    }
}

/// 数据库任务表
#[derive(Debug, FromRow)]
pub struct DbTask {
    pub id: i64,
    pub target: String,
    pub date: DateTime<Utc>,
}

impl DbTask {
    pub fn into_task(self, task_type: TaskType, target_type: TaskTargetType) -> Task {
        Task {
            id: self.id,
            task_type,
            target_type,
            target: self.target,
            date: self.date,
        }
    }
}

// 插入模型 - 用于创建新记录

/// 新供体插入模型
#[derive(Debug, Clone)]
pub struct NewDonor {
    pub reference_id: String,
    pub mta_protected: bool,
}

/// 新治疗插入模型
#[derive(Debug, Clone)]
pub struct NewTreatment {
    pub therapy: String,
    pub details: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub results: Option<String>,
}

/// 新影像插入模型
#[derive(Debug, Clone)]
pub struct NewImage {
    pub reference_id: String,
    pub donor_id: i64,
    pub image_type: ImageType,
    pub scanning_date: Option<NaiveDate>,
    pub mri: Option<MriImage>,
    pub ct: Option<CtImage>,
}

/// 新样本插入模型
#[derive(Debug, Clone)]
pub struct NewSpecimen {
    pub donor_id: i64,
    pub reference_id: String,
    pub specimen_type: SpecimenType,
    pub creation_date: Option<NaiveDate>,
    pub material: Option<Material>,
    pub molecular_data: Option<MolecularData>,
}

/// 新已分析样本插入模型
#[derive(Debug, Clone)]
pub struct NewAnalysedSample {
    pub specimen_id: i64,
    pub reference_id: String,
    pub analysis_type: AnalysisType,
    pub analysis_date: Option<NaiveDate>,
    pub purity: Option<f64>,
    pub ploidy: Option<f64>,
}

/// 新变异插入模型
#[derive(Debug, Clone)]
pub struct NewVariant {
    pub chromosome: String,
    pub start_position: i64,
    pub end_position: i64,
    /// 变异描述，例如 "C>T"、"DEL"
    pub descriptor: Option<String>,
}

/// 新任务插入模型
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_type: TaskType,
    pub target_type: TaskTargetType,
    pub target: String,
    pub date: DateTime<Utc>,
}

impl NewTask {
    pub fn new(task_type: TaskType, target_type: TaskTargetType, target: impl Into<String>) -> Self {
        Self {
            task_type,
            target_type,
            target: target.into(),
            date: Utc::now(),
        }
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }
}
