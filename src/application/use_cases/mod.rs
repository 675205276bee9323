pub mod batch_loader;
pub mod import_runner;
pub mod record_mapper;
pub mod schema_reconciler;
pub mod type_inference;
pub mod worker_pool;

#[cfg(test)]
pub(crate) mod test_support;
