//! 变异类型描述
//!
//! SSM、CNV、SV三类变异共享相同的表结构：
//! - 实体表：变异本身（染色体、起止位置、描述）
//! - 条目表：变异在某个已分析样本中的出现记录
//! - 基因表：变异影响的基因
//!
//! 查询和探测函数对 [`VariantKind`] 泛型化，避免为每类变异重复实现。

/// 某类变异对应的数据表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantTables {
    pub entity: &'static str,
    pub entry: &'static str,
    pub genes: &'static str,
}

/// 变异类型接口
pub trait VariantKind: Send + Sync + 'static {
    /// 变异类型名称，用于日志
    const NAME: &'static str;
    const TABLES: VariantTables;
}

/// 简单体细胞突变 (Simple Somatic Mutation)
#[derive(Debug, Clone, Copy)]
pub struct Ssm;

/// 拷贝数变异 (Copy Number Variant)
#[derive(Debug, Clone, Copy)]
pub struct Cnv;

/// 结构变异 (Structural Variant)
#[derive(Debug, Clone, Copy)]
pub struct Sv;

impl VariantKind for Ssm {
    const NAME: &'static str = "SSM";
    const TABLES: VariantTables = VariantTables {
        entity: "ssms",
        entry: "ssm_entries",
        genes: "ssm_affected_genes",
    };
}

impl VariantKind for Cnv {
    const NAME: &'static str = "CNV";
    const TABLES: VariantTables = VariantTables {
        entity: "cnvs",
        entry: "cnv_entries",
        genes: "cnv_affected_genes",
    };
}

impl VariantKind for Sv {
    const NAME: &'static str = "SV";
    const TABLES: VariantTables = VariantTables {
        entity: "svs",
        entry: "sv_entries",
        genes: "sv_affected_genes",
    };
}

/// 全部变异类型的数据表
pub(crate) const ALL_VARIANT_TABLES: [VariantTables; 3] = [Ssm::TABLES, Cnv::TABLES, Sv::TABLES];
