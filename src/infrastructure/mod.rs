pub mod config;
pub mod error;
pub mod run_repository;
pub mod storage;
pub mod template_repository;
