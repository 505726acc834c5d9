//! # Index Schema Manager
//!
//! Declares the secondary index over record hashes. Declaring is
//! drop-then-create: the store re-enumerates existing documents under the
//! prefix on its own, so nothing is re-written here.

use crate::drivers::StoreDriver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tq_core::{fields, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Tag,
    Text,
    Numeric,
    Geo,
}

impl FieldType {
    /// Keyword used in the store's schema declaration.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Tag => "TAG",
            FieldType::Text => "TEXT",
            FieldType::Numeric => "NUMERIC",
            FieldType::Geo => "GEO",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "TAG" => Some(FieldType::Tag),
            "TEXT" => Some(FieldType::Text),
            "NUMERIC" => Some(FieldType::Numeric),
            "GEO" => Some(FieldType::Geo),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexField {
    pub name: String,
    pub field_type: FieldType,
}

impl IndexField {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
        }
    }
}

/// A named index over hashes whose keys start with `<prefix>:`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub prefix: String,
    pub fields: Vec<IndexField>,
    /// Empty stop-word list: common words stay searchable.
    pub stopwords_disabled: bool,
}

impl IndexSchema {
    /// Key prefix as registered with the store (with trailing separator).
    pub fn key_prefix(&self) -> String {
        format!("{}:", self.prefix)
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.field_type)
    }
}

/// The traffic observation index.
pub fn traffic_schema(name: &str, prefix: &str) -> IndexSchema {
    IndexSchema {
        name: name.to_string(),
        prefix: prefix.to_string(),
        fields: vec![
            IndexField::new(fields::ID, FieldType::Tag),
            IndexField::new(fields::LATITUDE, FieldType::Numeric),
            IndexField::new(fields::LONGITUDE, FieldType::Numeric),
            IndexField::new(fields::LOCATION, FieldType::Geo),
            IndexField::new(fields::GEOHASH, FieldType::Text),
            IndexField::new(fields::MIN_SPEED, FieldType::Numeric),
            IndexField::new(fields::MAX_SPEED, FieldType::Numeric),
            IndexField::new(fields::AVG_SPEED, FieldType::Numeric),
            IndexField::new(fields::VEHICLE_COUNT, FieldType::Numeric),
        ],
        stopwords_disabled: true,
    }
}

pub struct IndexSchemaManager {
    driver: Arc<dyn StoreDriver>,
}

impl IndexSchemaManager {
    pub fn new(driver: Arc<dyn StoreDriver>) -> Self {
        Self { driver }
    }

    /// Drop any index called `name`, then create the traffic schema over
    /// `prefix`. A failed drop (usually: no such index) is logged only.
    pub async fn declare_index(&self, name: &str, prefix: &str) -> Result<IndexSchema> {
        if let Err(e) = self.driver.drop_index(name).await {
            tracing::warn!("Dropping index '{}' failed, continuing: {}", name, e);
        }

        let schema = traffic_schema(name, prefix);
        self.driver.create_index(&schema).await?;
        tracing::info!(
            "Index '{}' declared over '{}' with {} fields via {} driver",
            name,
            schema.key_prefix(),
            schema.fields.len(),
            self.driver.kind()
        );
        Ok(schema)
    }

    /// Field set currently registered for `name`.
    pub async fn describe(&self, name: &str) -> Result<Vec<IndexField>> {
        self.driver.describe_index(name).await
    }
}
