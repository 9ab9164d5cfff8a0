use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::error::StoreError;
use crate::model::Identifier;

/// One row of the combined parcel table, keyed by AIN.
///
/// Every column is read as text; the source table mixes numeric and text
/// affinities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct ParcelRecord {
    #[serde(rename = "AIN")]
    #[sqlx(rename = "AIN")]
    pub ain: String,
    #[serde(rename = "SitusFullA")]
    #[sqlx(rename = "SitusFullA")]
    pub situs_address: Option<String>,
    #[serde(rename = "TaxRateAre")]
    #[sqlx(rename = "TaxRateAre")]
    pub tax_rate_area: Option<String>,
    #[serde(rename = "SQFTmain1")]
    #[sqlx(rename = "SQFTmain1")]
    pub main_sqft: Option<String>,
    #[serde(rename = "LegalDescr")]
    #[sqlx(rename = "LegalDescr")]
    pub legal_description: Option<String>,
    #[serde(rename = "FLD_ZONE")]
    #[sqlx(rename = "FLD_ZONE")]
    pub flood_zone: Option<String>,
    #[serde(rename = "ZONE_SUBTY")]
    #[sqlx(rename = "ZONE_SUBTY")]
    pub zone_subtype: Option<String>,
    #[serde(rename = "NAME")]
    #[sqlx(rename = "NAME")]
    pub name: Option<String>,
    #[serde(rename = "PLNG_AREA")]
    #[sqlx(rename = "PLNG_AREA")]
    pub planning_area: Option<String>,
    #[serde(rename = "TITLE_22")]
    #[sqlx(rename = "TITLE_22")]
    pub title_22: Option<String>,
    #[serde(rename = "Zone_Type_1")]
    #[sqlx(rename = "Zone_Type_1")]
    pub zone_type_1: Option<String>,
    #[serde(rename = "Zone_Type_2")]
    #[sqlx(rename = "Zone_Type_2")]
    pub zone_type_2: Option<String>,
    #[serde(rename = "Zone_Type_3")]
    #[sqlx(rename = "Zone_Type_3")]
    pub zone_type_3: Option<String>,
    #[serde(rename = "Zone_Type_4")]
    #[sqlx(rename = "Zone_Type_4")]
    pub zone_type_4: Option<String>,
    #[serde(rename = "Zone_Type_5")]
    #[sqlx(rename = "Zone_Type_5")]
    pub zone_type_5: Option<String>,
    #[serde(rename = "Seismic_Quadrangle")]
    #[sqlx(rename = "Seismic_Quadrangle")]
    pub seismic_quadrangle: Option<String>,
}

#[async_trait]
pub trait ParcelStore: Send + Sync {
    /// `Ok(None)` is a miss; `Err` is a failed lookup and must not be read as a miss.
    async fn find_parcel(&self, identifier: &Identifier) -> Result<Option<ParcelRecord>, StoreError>;
}

const FIND_PARCEL: &str = r#"
    SELECT CAST(AIN AS TEXT) AS AIN,
           CAST(SitusFullA AS TEXT) AS SitusFullA,
           CAST(TaxRateAre AS TEXT) AS TaxRateAre,
           CAST(SQFTmain1 AS TEXT) AS SQFTmain1,
           CAST(LegalDescr AS TEXT) AS LegalDescr,
           CAST(FLD_ZONE AS TEXT) AS FLD_ZONE,
           CAST(ZONE_SUBTY AS TEXT) AS ZONE_SUBTY,
           CAST(NAME AS TEXT) AS NAME,
           CAST(PLNG_AREA AS TEXT) AS PLNG_AREA,
           CAST(TITLE_22 AS TEXT) AS TITLE_22,
           CAST(Zone_Type_1 AS TEXT) AS Zone_Type_1,
           CAST(Zone_Type_2 AS TEXT) AS Zone_Type_2,
           CAST(Zone_Type_3 AS TEXT) AS Zone_Type_3,
           CAST(Zone_Type_4 AS TEXT) AS Zone_Type_4,
           CAST(Zone_Type_5 AS TEXT) AS Zone_Type_5,
           CAST(Seismic_Quadrangle AS TEXT) AS Seismic_Quadrangle
    FROM final_combined
    WHERE AIN = ?
"#;

pub struct SqliteParcelStore {
    pool: SqlitePool,
}

impl SqliteParcelStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ParcelStore for SqliteParcelStore {
    async fn find_parcel(&self, identifier: &Identifier) -> Result<Option<ParcelRecord>, StoreError> {
        let record = sqlx::query_as::<_, ParcelRecord>(FIND_PARCEL)
            .bind(identifier.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            r#"
            CREATE TABLE final_combined (
                AIN TEXT, SitusFullA TEXT, TaxRateAre INTEGER, SQFTmain1 REAL,
                LegalDescr TEXT, FLD_ZONE TEXT, ZONE_SUBTY TEXT, NAME TEXT,
                PLNG_AREA TEXT, TITLE_22 TEXT, Zone_Type_1 TEXT, Zone_Type_2 TEXT,
                Zone_Type_3 TEXT, Zone_Type_4 TEXT, Zone_Type_5 TEXT,
                Seismic_Quadrangle TEXT
            );
            INSERT INTO final_combined (AIN, SitusFullA, TaxRateAre, FLD_ZONE, Zone_Type_1)
            VALUES ('5555-010-020', '100 N SPRING ST', 13, 'X', 'C2');
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn finds_parcel_with_numeric_columns_as_text() {
        let store = SqliteParcelStore::from_pool(pool().await);
        let id = Identifier::parse("5555-010-020").unwrap();
        let parcel = store.find_parcel(&id).await.unwrap().unwrap();
        assert_eq!(parcel.situs_address.as_deref(), Some("100 N SPRING ST"));
        assert_eq!(parcel.tax_rate_area.as_deref(), Some("13"));
        assert_eq!(parcel.zone_type_1.as_deref(), Some("C2"));
        assert_eq!(parcel.main_sqft, None);
    }

    #[tokio::test]
    async fn unknown_parcel_is_a_miss() {
        let store = SqliteParcelStore::from_pool(pool().await);
        let id = Identifier::parse("0000-000-000").unwrap();
        assert!(store.find_parcel(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_table_is_an_error_not_a_miss() {
        let empty = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteParcelStore::from_pool(empty);
        let id = Identifier::parse("5555-010-020").unwrap();
        assert!(store.find_parcel(&id).await.is_err());
    }
}
