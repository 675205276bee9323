pub mod error;

// Schema inference and bulk loading
pub mod import;
