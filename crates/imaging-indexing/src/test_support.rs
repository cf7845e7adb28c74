//! 测试用数据准备

use chrono::NaiveDate;
use imaging_core::{
    AnalysisType, ImageType, Material, MaterialType, MolecularData, MriImage, SpecimenType,
};
use imaging_database::{
    DatabasePool, DatabaseQueries, DatabaseWrites, NewAnalysedSample, NewDonor, NewImage,
    NewSpecimen, NewVariant,
};

pub async fn setup_test_db() -> DatabasePool {
    let pool = DatabasePool::connect_in_memory().await.unwrap();
    DatabaseQueries::new(&pool).create_tables().await.unwrap();
    pool
}

pub async fn create_donor(pool: &DatabasePool, reference_id: &str) -> i64 {
    DatabaseWrites::new(pool)
        .create_donor(&NewDonor {
            reference_id: reference_id.to_string(),
            mta_protected: false,
        })
        .await
        .unwrap()
}

pub async fn create_tumor_specimen(
    pool: &DatabasePool,
    donor_id: i64,
    reference_id: &str,
    with_molecular_data: bool,
) -> i64 {
    DatabaseWrites::new(pool)
        .create_specimen(&NewSpecimen {
            donor_id,
            reference_id: reference_id.to_string(),
            specimen_type: SpecimenType::Material,
            creation_date: NaiveDate::from_ymd_opt(2020, 1, 20),
            material: Some(Material {
                material_type: Some(MaterialType::Tumor),
                fixation_type: Some("FFPE".to_string()),
                ..Material::default()
            }),
            molecular_data: with_molecular_data.then(|| MolecularData {
                mgmt_status: Some("Methylated".to_string()),
                ..MolecularData::default()
            }),
        })
        .await
        .unwrap()
}

pub async fn create_sample(pool: &DatabasePool, specimen_id: i64, reference_id: &str) -> i64 {
    DatabaseWrites::new(pool)
        .create_analysed_sample(&NewAnalysedSample {
            specimen_id,
            reference_id: reference_id.to_string(),
            analysis_type: AnalysisType::Wes,
            analysis_date: NaiveDate::from_ymd_opt(2020, 2, 1),
            purity: Some(0.8),
            ploidy: None,
        })
        .await
        .unwrap()
}

pub async fn create_image(pool: &DatabasePool, donor_id: i64, image_type: ImageType) -> i64 {
    DatabaseWrites::new(pool)
        .create_image(&NewImage {
            reference_id: format!("{}-{}", image_type.code(), donor_id),
            donor_id,
            image_type,
            scanning_date: NaiveDate::from_ymd_opt(2020, 1, 11),
            mri: (image_type == ImageType::Mri).then(|| MriImage {
                whole_tumor: Some(42.0),
                ..MriImage::default()
            }),
            ct: None,
        })
        .await
        .unwrap()
}

pub fn new_variant(start_position: i64) -> NewVariant {
    NewVariant {
        chromosome: "1".to_string(),
        start_position,
        end_position: start_position + 10,
        descriptor: None,
    }
}

/// 直接执行SQL，用于构造异常数据
pub async fn execute_sql(pool: &DatabasePool, sql: &str) {
    sqlx::query(sql).execute(pool.pool()).await.unwrap();
}
