//! 核心数据模型定义

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 影像类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ImageType {
    Mri,
    Ct,
}

impl ImageType {
    /// 数据库存储编码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Mri => "MRI",
            Self::Ct => "CT",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "MRI" => Some(Self::Mri),
            "CT" => Some(Self::Ct),
            _ => None,
        }
    }
}

/// 性别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
            Self::Other => "O",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "M" => Some(Self::Male),
            "F" => Some(Self::Female),
            "O" => Some(Self::Other),
            _ => None,
        }
    }
}

/// 生存状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VitalStatus {
    Living,
    Deceased,
}

impl VitalStatus {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Living => "LIVING",
            Self::Deceased => "DECEASED",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "LIVING" => Some(Self::Living),
            "DECEASED" => Some(Self::Deceased),
            _ => None,
        }
    }
}

/// 疾病进展状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProgressionStatus {
    Progressive,
    Stable,
    Remission,
}

impl ProgressionStatus {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Progressive => "PROGRESSIVE",
            Self::Stable => "STABLE",
            Self::Remission => "REMISSION",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "PROGRESSIVE" => Some(Self::Progressive),
            "STABLE" => Some(Self::Stable),
            "REMISSION" => Some(Self::Remission),
            _ => None,
        }
    }
}

/// 样本类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SpecimenType {
    Material,
    Line,
    Organoid,
    Xenograft,
}

impl SpecimenType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Material => "MATERIAL",
            Self::Line => "LINE",
            Self::Organoid => "ORGANOID",
            Self::Xenograft => "XENOGRAFT",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "MATERIAL" => Some(Self::Material),
            "LINE" => Some(Self::Line),
            "ORGANOID" => Some(Self::Organoid),
            "XENOGRAFT" => Some(Self::Xenograft),
            _ => None,
        }
    }
}

/// 组织材料类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MaterialType {
    Normal,
    Tumor,
}

impl MaterialType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Tumor => "TUMOR",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "NORMAL" => Some(Self::Normal),
            "TUMOR" => Some(Self::Tumor),
            _ => None,
        }
    }
}

/// 分子分析类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnalysisType {
    Wgs,
    Wes,
    RnaSeq,
    Other,
}

impl AnalysisType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Wgs => "WGS",
            Self::Wes => "WES",
            Self::RnaSeq => "RNASEQ",
            Self::Other => "OTHER",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "WGS" => Some(Self::Wgs),
            "WES" => Some(Self::Wes),
            "RNASEQ" => Some(Self::RnaSeq),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }
}

/// 临床数据
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClinicalData {
    pub diagnosis_date: Option<NaiveDate>,
    pub diagnosis: Option<String>,
    pub primary_site: Option<String>,
    pub localization: Option<String>,
    pub gender: Option<Gender>,
    pub age: Option<i32>, // 诊断时年龄
    pub vital_status: Option<VitalStatus>,
    pub vital_status_change_date: Option<NaiveDate>,
    pub progression_status: Option<ProgressionStatus>,
    pub progression_status_change_date: Option<NaiveDate>,
    pub kps_baseline: Option<i32>,
    pub steroids_baseline: Option<bool>,
}

/// 治疗记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Treatment {
    pub id: i64,
    pub donor_id: i64,
    pub therapy: String,
    pub details: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub results: Option<String>,
}

/// 供体（患者）信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donor {
    pub id: i64,
    pub reference_id: String,
    pub mta_protected: bool,
    pub clinical_data: Option<ClinicalData>,
    pub treatments: Vec<Treatment>,
    pub studies: Vec<String>,
    pub projects: Vec<String>,
}

/// MRI影像测量数据
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MriImage {
    pub whole_tumor: Option<f64>,
    pub contrast_enhancing: Option<f64>,
    pub non_contrast_enhancing: Option<f64>,
    pub median_adc_tumor: Option<f64>,
    pub median_cbf_tumor: Option<f64>,
    pub median_cbv_tumor: Option<f64>,
    pub median_mtt_tumor: Option<f64>,
}

/// CT影像测量数据
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CtImage {
    pub whole_tumor: Option<f64>,
    pub median_hu_tumor: Option<f64>,
}

/// 影像记录
///
/// 从数据库加载时附带供体编号和临床数据，其余供体信息需单独加载
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub reference_id: String,
    pub donor_id: i64,
    pub image_type: ImageType,
    pub scanning_date: Option<NaiveDate>,
    pub mri: Option<MriImage>,
    pub ct: Option<CtImage>,
    pub donor_reference_id: Option<String>,
    pub clinical_data: Option<ClinicalData>,
}

/// 组织材料
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Material {
    pub material_type: Option<MaterialType>,
    pub fixation_type: Option<String>,
    pub tumor_type: Option<String>,
    pub source: Option<String>,
}

/// 样本分子数据
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MolecularData {
    pub mgmt_status: Option<String>,
    pub idh_status: Option<String>,
    pub idh_mutation: Option<String>,
    pub gene_expression_subtype: Option<String>,
    pub methylation_subtype: Option<String>,
    pub gcimp_methylation: Option<bool>,
}

/// 样本信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Specimen {
    pub id: i64,
    pub donor_id: i64,
    pub reference_id: String,
    pub specimen_type: SpecimenType,
    pub creation_date: Option<NaiveDate>,
    pub material: Option<Material>,
    pub molecular_data: Option<MolecularData>,
}

/// 已分析样本
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysedSample {
    pub id: i64,
    pub specimen_id: i64,
    pub reference_id: String,
    pub analysis_type: AnalysisType,
    pub analysis_date: Option<NaiveDate>,
    pub purity: Option<f64>,
    pub ploidy: Option<f64>,
}

/// 任务类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskType {
    Index,
    Remove,
}

impl TaskType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Index => "INDEX",
            Self::Remove => "REMOVE",
        }
    }
}

/// 任务目标类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskTargetType {
    Image,
    Donor,
    Specimen,
}

impl TaskTargetType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Donor => "DONOR",
            Self::Specimen => "SPECIMEN",
        }
    }
}

/// 延迟处理任务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub task_type: TaskType,
    pub target_type: TaskTargetType,
    /// 目标键，例如影像ID
    pub target: String,
    pub date: DateTime<Utc>,
}
