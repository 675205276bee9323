// In-process stand-in for the object store
pub mod mock_backend;
