pub mod api;
pub mod applications;
pub mod config;
pub mod db;
pub mod error;
pub mod mentorship;
pub mod models;
