pub mod config;
pub mod db;
pub mod endpoints;
pub mod error;
pub mod models;
pub mod normalize;
pub mod params;
pub mod pipelines;
pub mod rest_store;
