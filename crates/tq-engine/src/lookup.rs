//! Equality lookups through the auxiliary id sets, bypassing the index.
//!
//! The sets are append-only and are not pruned when records expire, so
//! ids returned here may no longer resolve to a record.

use crate::drivers::{lookup_key, StoreDriver};
use std::sync::Arc;
use tq_core::{fields, Result};

pub struct LookupIndex {
    driver: Arc<dyn StoreDriver>,
    prefix: String,
}

impl LookupIndex {
    pub fn new(driver: Arc<dyn StoreDriver>, prefix: &str) -> Self {
        Self {
            driver,
            prefix: prefix.to_string(),
        }
    }

    /// Ids recorded under this exact latitude string.
    pub async fn ids_by_latitude(&self, value: &str) -> Result<Vec<String>> {
        self.driver
            .set_members(&lookup_key(&self.prefix, fields::LATITUDE, value.trim()))
            .await
    }

    pub async fn ids_by_longitude(&self, value: &str) -> Result<Vec<String>> {
        self.driver
            .set_members(&lookup_key(&self.prefix, fields::LONGITUDE, value.trim()))
            .await
    }

    pub async fn all_ids(&self) -> Result<Vec<String>> {
        self.driver.set_members(&self.prefix).await
    }

    pub async fn count(&self) -> Result<u64> {
        self.driver.set_cardinality(&self.prefix).await
    }
}
