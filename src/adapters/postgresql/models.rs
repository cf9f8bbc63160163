//! PostgreSQL row models

use crate::core::encoding::{ByteOrder, Charset, EncodingRecord};
use crate::domain::errors::{ArborError, StoreError};
use crate::domain::ids::TableName;
use crate::domain::Result;
use chrono::{DateTime, Utc};

/// Row of `arbor_encoding_metadata`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgreSQLEncodingMetadata {
    pub table_name: String,
    pub variant: String,
    pub charset: String,
    pub byte_order: String,
    pub has_bom: bool,
    pub confidence: i16,
    pub updated_at: DateTime<Utc>,
}

impl PostgreSQLEncodingMetadata {
    /// Convert from a domain record
    pub fn from_domain(record: &EncodingRecord) -> Self {
        Self {
            table_name: record.table.to_string(),
            variant: record.variant.clone(),
            charset: record.charset.name().to_string(),
            byte_order: record.byte_order.as_str().to_string(),
            has_bom: record.has_bom,
            confidence: i16::from(record.confidence),
            updated_at: record.updated_at,
        }
    }

    /// Convert to a domain record
    pub fn to_domain(&self) -> Result<EncodingRecord> {
        let corrupt = |what: String| -> ArborError {
            StoreError::QueryFailed(format!(
                "arbor_encoding_metadata row ({}, {}): {what}",
                self.table_name, self.variant
            ))
            .into()
        };

        let table = TableName::new(&self.table_name).map_err(&corrupt)?;
        let charset = Charset::from_label(&self.charset)
            .ok_or_else(|| corrupt(format!("unknown charset '{}'", self.charset)))?;
        let byte_order = match self.byte_order.as_str() {
            "le" => ByteOrder::Le,
            "be" => ByteOrder::Be,
            "none" => ByteOrder::None,
            other => return Err(corrupt(format!("unknown byte order '{other}'"))),
        };

        Ok(EncodingRecord {
            table,
            variant: self.variant.clone(),
            charset,
            byte_order,
            has_bom: self.has_bom,
            confidence: self.confidence.clamp(0, 100) as u8,
            updated_at: self.updated_at,
        })
    }
}
