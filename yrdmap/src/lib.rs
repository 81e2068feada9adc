pub mod collect;
pub mod commons;
pub mod config;
pub mod error;
pub mod geo_core;
pub mod geometric;
pub mod render;
pub mod yrd_map;

pub use config::MapConfig;
pub use error::MapError;
pub use yrd_map::YrdAccuracyMap;
