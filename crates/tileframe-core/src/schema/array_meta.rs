//! The persisted array configuration record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::codec::FillValues;

use super::{
    ArrayMode, Domain, FillMismatchSnafu, InvalidTileCapacitySnafu, Schema, SchemaError,
    UnsupportedFormatVersionSnafu,
};

/// Current array metadata / tile format version.
///
/// Bumped only when we make a breaking change to the on-disk format.
pub const ARRAY_FORMAT_VERSION: u32 = 1;

/// Rows per tile when the caller does not choose one.
pub const DEFAULT_TILE_CAPACITY: u64 = 4096;

/// Largest accepted tile capacity. Row offsets inside a tile are `u32`.
pub const MAX_TILE_CAPACITY: u64 = 1 << 20;

/// What a dense-mode write does when it targets an already-written row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateRowPolicy {
    /// Fail the whole batch with a domain violation.
    #[default]
    Reject,
    /// Replace the stored row.
    Overwrite,
}

/// Array-level metadata, written once at creation to `_tileframe/array.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArrayMeta {
    /// Format version for future evolution of the on-disk format.
    pub(crate) format_version: u32,

    /// Creation timestamp, stored as RFC3339 UTC.
    pub(crate) created_at: DateTime<Utc>,

    /// Dense or sparse layout.
    pub(crate) mode: ArrayMode,

    /// Declared row domain.
    pub(crate) domain: Domain,

    /// Rows per tile.
    pub(crate) tile_capacity: u64,

    /// Dense-mode handling of rows written twice.
    #[serde(default)]
    pub(crate) duplicate_rows: DuplicateRowPolicy,

    /// Null sentinels used by the column codec.
    pub(crate) fill: FillValues,

    /// Column definitions.
    pub(crate) schema: Schema,
}

impl ArrayMeta {
    /// New metadata with default tile capacity and duplicate policy.
    ///
    /// Fills `created_at` with `Utc::now()` and `format_version` with
    /// [`ARRAY_FORMAT_VERSION`].
    pub fn new(schema: Schema, domain: Domain, mode: ArrayMode) -> Self {
        ArrayMeta {
            format_version: ARRAY_FORMAT_VERSION,
            created_at: Utc::now(),
            mode,
            domain,
            tile_capacity: DEFAULT_TILE_CAPACITY,
            duplicate_rows: DuplicateRowPolicy::default(),
            fill: FillValues::CURRENT,
            schema,
        }
    }

    /// Override the number of rows per tile.
    pub fn with_tile_capacity(mut self, tile_capacity: u64) -> Self {
        self.tile_capacity = tile_capacity;
        self
    }

    /// Override the dense duplicate-row policy.
    pub fn with_duplicate_rows(mut self, policy: DuplicateRowPolicy) -> Self {
        self.duplicate_rows = policy;
        self
    }

    /// Check internal consistency. Run before persisting and after loading.
    pub fn validate(&self) -> Result<(), SchemaError> {
        ensure!(
            self.format_version == ARRAY_FORMAT_VERSION,
            UnsupportedFormatVersionSnafu {
                found: self.format_version,
                expected: ARRAY_FORMAT_VERSION,
            }
        );
        ensure!(
            (1..=MAX_TILE_CAPACITY).contains(&self.tile_capacity),
            InvalidTileCapacitySnafu {
                capacity: self.tile_capacity,
                max: MAX_TILE_CAPACITY,
            }
        );
        self.schema.validate()?;
        if let Some(details) = self.fill.mismatch(&FillValues::CURRENT) {
            return FillMismatchSnafu { details }.fail();
        }
        Ok(())
    }

    /// Returns the on-disk format version.
    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    /// Returns the UTC timestamp when the array was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the layout mode.
    pub fn mode(&self) -> ArrayMode {
        self.mode
    }

    /// Returns the declared domain.
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Returns the number of rows per tile.
    pub fn tile_capacity(&self) -> u64 {
        self.tile_capacity
    }

    /// Returns the dense duplicate-row policy.
    pub fn duplicate_rows(&self) -> DuplicateRowPolicy {
        self.duplicate_rows
    }

    /// Returns the persisted fill sentinels.
    pub fn fill(&self) -> &FillValues {
        &self.fill
    }

    /// Returns the schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}
