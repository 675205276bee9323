pub mod config;
pub mod csv;
pub mod parquet;
pub mod remote;
pub mod source;
pub mod storage;
