pub mod broadcast;
pub mod config;
pub mod db;
pub mod detection;
pub mod models;
pub mod tracker;

pub use broadcast::Broadcaster;
pub use config::DetectionConfig;
pub use db::Database;
pub use tracker::TrackerController;
