pub mod config;
pub mod coordinator;
pub mod db;
pub mod demo;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod geo;
pub mod ingest;
pub mod normalize;
pub mod repo;
pub mod report;
pub mod scoring;
pub mod validate;
pub mod workspace;
