// ============================================================
// IMPORT DOMAIN LAYER
// ============================================================
// Core types and value objects for schema inference and bulk loading
// No I/O, no async

mod batch;
mod column_profile;
mod error_kind;
mod field_type;
mod import_config;
mod load_state;
mod schema_plan;
mod statistics;

pub use batch::{compute_batch_size, Batch, BulkOutcome, Record};
pub use column_profile::{
    label_from_api_name, normalize_column_name, ColumnProfile, HeaderSet, SourceRow,
    MAX_API_NAME_LEN,
};
pub use error_kind::{ErrorKind, TypeMismatch};
pub use field_type::{FieldType, REFERENCE_LOGICAL_TYPE, REFERENCE_PHYSICAL_TYPE};
pub use import_config::{ImportConfig, SamplingMode};
pub use load_state::{LoadReport, LoadState};
pub use schema_plan::{FieldDefinition, FieldOutcome, FieldStatus, ObjectDefinition, SchemaPlan};
pub use statistics::{ImportSummary, RunStatistics, StatsSnapshot};

/// Normalized column name to the type the backend holds for it.
pub type TypeMap = std::collections::HashMap<String, FieldType>;
