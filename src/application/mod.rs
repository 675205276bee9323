pub mod use_cases;

pub use use_cases::batch_loader::BatchLoader;
pub use use_cases::import_runner::{ImportJob, ImportRunner};
pub use use_cases::schema_reconciler::SchemaReconciler;
pub use use_cases::type_inference::TypeInferencer;
