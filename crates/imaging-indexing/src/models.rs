//! 索引文档模型
//!
//! 推送到搜索后端的去规范化文档。所有日期型临床事件都换算为相对诊断日期的天数，
//! 空集合序列化时省略（`None`），与"存在但为空"区分开。

use chrono::NaiveDate;
use imaging_core::utils::days_between;
use imaging_core::*;
use serde::{Deserialize, Serialize};

/// 影像索引文档
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ImageIndex {
    /// 文档键，即影像ID
    pub id: String,
    pub image_id: i64,
    pub reference_id: String,
    pub image_type: ImageType,
    pub scanning_date: Option<NaiveDate>,
    /// 扫描日期相对诊断日期的天数
    pub scanning_day: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mri: Option<MriImageIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ct: Option<CtImageIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donor: Option<DonorIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specimens: Option<Vec<SpecimenIndex>>,

    pub data: DataAvailability,

    pub number_of_genes: u64,
    pub number_of_ssms: u64,
    pub number_of_cnvs: u64,
    pub number_of_svs: u64,
}

impl ImageIndex {
    /// 映射影像自身字段，关联数据由构建器填充
    pub fn from_image(image: &Image, diagnosis_date: Option<NaiveDate>) -> Self {
        Self {
            id: image.id.to_string(),
            image_id: image.id,
            reference_id: image.reference_id.clone(),
            image_type: image.image_type,
            scanning_date: image.scanning_date,
            scanning_day: days_between(diagnosis_date, image.scanning_date),
            mri: image.mri.as_ref().map(MriImageIndex::from),
            ct: image.ct.as_ref().map(CtImageIndex::from),
            donor: None,
            specimens: None,
            data: DataAvailability::default(),
            number_of_genes: 0,
            number_of_ssms: 0,
            number_of_cnvs: 0,
            number_of_svs: 0,
        }
    }
}

/// MRI测量数据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct MriImageIndex {
    pub whole_tumor: Option<f64>,
    pub contrast_enhancing: Option<f64>,
    pub non_contrast_enhancing: Option<f64>,
    pub median_adc_tumor: Option<f64>,
    pub median_cbf_tumor: Option<f64>,
    pub median_cbv_tumor: Option<f64>,
    pub median_mtt_tumor: Option<f64>,
}

impl From<&MriImage> for MriImageIndex {
    fn from(mri: &MriImage) -> Self {
        Self {
            whole_tumor: mri.whole_tumor,
            contrast_enhancing: mri.contrast_enhancing,
            non_contrast_enhancing: mri.non_contrast_enhancing,
            median_adc_tumor: mri.median_adc_tumor,
            median_cbf_tumor: mri.median_cbf_tumor,
            median_cbv_tumor: mri.median_cbv_tumor,
            median_mtt_tumor: mri.median_mtt_tumor,
        }
    }
}

/// CT测量数据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CtImageIndex {
    pub whole_tumor: Option<f64>,
    pub median_hu_tumor: Option<f64>,
}

impl From<&CtImage> for CtImageIndex {
    fn from(ct: &CtImage) -> Self {
        Self {
            whole_tumor: ct.whole_tumor,
            median_hu_tumor: ct.median_hu_tumor,
        }
    }
}

/// 供体子文档
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct DonorIndex {
    pub id: i64,
    pub reference_id: String,
    pub mta_protected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinical_data: Option<ClinicalDataIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treatments: Option<Vec<TreatmentIndex>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub studies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<String>>,
}

impl DonorIndex {
    pub fn from_donor(donor: &Donor, diagnosis_date: Option<NaiveDate>) -> Self {
        Self {
            id: donor.id,
            reference_id: donor.reference_id.clone(),
            mta_protected: donor.mta_protected,
            clinical_data: donor
                .clinical_data
                .as_ref()
                .map(ClinicalDataIndex::from_clinical_data),
            treatments: non_empty(
                donor
                    .treatments
                    .iter()
                    .map(|treatment| TreatmentIndex::from_treatment(treatment, diagnosis_date))
                    .collect(),
            ),
            studies: non_empty(donor.studies.clone()),
            projects: non_empty(donor.projects.clone()),
        }
    }
}

/// 临床数据子文档
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ClinicalDataIndex {
    pub diagnosis_date: Option<NaiveDate>,
    pub diagnosis: Option<String>,
    pub primary_site: Option<String>,
    pub localization: Option<String>,
    pub gender: Option<Gender>,
    pub age: Option<i32>,
    pub vital_status: Option<VitalStatus>,
    pub vital_status_change_day: Option<i32>,
    pub progression_status: Option<ProgressionStatus>,
    pub progression_status_change_day: Option<i32>,
    pub kps_baseline: Option<i32>,
    pub steroids_baseline: Option<bool>,
}

impl ClinicalDataIndex {
    pub fn from_clinical_data(data: &ClinicalData) -> Self {
        Self {
            diagnosis_date: data.diagnosis_date,
            diagnosis: data.diagnosis.clone(),
            primary_site: data.primary_site.clone(),
            localization: data.localization.clone(),
            gender: data.gender,
            age: data.age,
            vital_status: data.vital_status,
            vital_status_change_day: days_between(data.diagnosis_date, data.vital_status_change_date),
            progression_status: data.progression_status,
            progression_status_change_day: days_between(
                data.diagnosis_date,
                data.progression_status_change_date,
            ),
            kps_baseline: data.kps_baseline,
            steroids_baseline: data.steroids_baseline,
        }
    }
}

/// 治疗子文档
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TreatmentIndex {
    pub therapy: String,
    pub details: Option<String>,
    pub start_day: Option<i32>,
    pub duration_days: Option<i32>,
    pub results: Option<String>,
}

impl TreatmentIndex {
    pub fn from_treatment(treatment: &Treatment, diagnosis_date: Option<NaiveDate>) -> Self {
        Self {
            therapy: treatment.therapy.clone(),
            details: treatment.details.clone(),
            start_day: days_between(diagnosis_date, treatment.start_date),
            duration_days: days_between(treatment.start_date, treatment.end_date),
            results: treatment.results.clone(),
        }
    }
}

/// 样本子文档
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct SpecimenIndex {
    pub id: i64,
    pub reference_id: String,
    pub specimen_type: SpecimenType,
    pub creation_day: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<MaterialIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub molecular_data: Option<MolecularDataIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyses: Option<Vec<AnalysisIndex>>,
}

impl SpecimenIndex {
    /// 映射样本字段，分析列表由构建器填充
    pub fn from_specimen(specimen: &Specimen, diagnosis_date: Option<NaiveDate>) -> Self {
        Self {
            id: specimen.id,
            reference_id: specimen.reference_id.clone(),
            specimen_type: specimen.specimen_type,
            creation_day: days_between(diagnosis_date, specimen.creation_date),
            material: specimen.material.as_ref().map(MaterialIndex::from),
            molecular_data: specimen.molecular_data.as_ref().map(MolecularDataIndex::from),
            analyses: None,
        }
    }
}

/// 组织材料子文档
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct MaterialIndex {
    pub material_type: Option<MaterialType>,
    pub fixation_type: Option<String>,
    pub tumor_type: Option<String>,
    pub source: Option<String>,
}

impl From<&Material> for MaterialIndex {
    fn from(material: &Material) -> Self {
        Self {
            material_type: material.material_type,
            fixation_type: material.fixation_type.clone(),
            tumor_type: material.tumor_type.clone(),
            source: material.source.clone(),
        }
    }
}

/// 分子数据子文档
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct MolecularDataIndex {
    pub mgmt_status: Option<String>,
    pub idh_status: Option<String>,
    pub idh_mutation: Option<String>,
    pub gene_expression_subtype: Option<String>,
    pub methylation_subtype: Option<String>,
    pub gcimp_methylation: Option<bool>,
}

impl From<&MolecularData> for MolecularDataIndex {
    fn from(data: &MolecularData) -> Self {
        Self {
            mgmt_status: data.mgmt_status.clone(),
            idh_status: data.idh_status.clone(),
            idh_mutation: data.idh_mutation.clone(),
            gene_expression_subtype: data.gene_expression_subtype.clone(),
            methylation_subtype: data.methylation_subtype.clone(),
            gcimp_methylation: data.gcimp_methylation,
        }
    }
}

/// 分析子文档
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AnalysisIndex {
    pub id: i64,
    pub reference_id: String,
    pub analysis_type: AnalysisType,
    pub analysis_day: Option<i32>,
    pub purity: Option<f64>,
    pub ploidy: Option<f64>,
}

impl AnalysisIndex {
    pub fn from_sample(sample: &AnalysedSample, diagnosis_date: Option<NaiveDate>) -> Self {
        Self {
            id: sample.id,
            reference_id: sample.reference_id.clone(),
            analysis_type: sample.analysis_type,
            analysis_day: days_between(diagnosis_date, sample.analysis_date),
            purity: sample.purity,
            ploidy: sample.ploidy,
        }
    }
}

/// 数据可用性摘要
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct DataAvailability {
    pub has_donors: bool,
    pub has_clinical: bool,
    pub has_treatments: bool,
    pub has_mris: bool,
    pub has_cts: bool,
    pub has_materials: bool,
    pub has_materials_molecular: bool,
    pub has_ssms: bool,
    pub has_cnvs: bool,
    pub has_svs: bool,
    pub has_gene_exp: bool,
    /// 单细胞表达数据，影像文档暂不支持
    pub has_gene_exp_sc: bool,
}

/// 空集合映射为 `None`
pub(crate) fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
