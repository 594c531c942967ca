pub mod files;
pub mod provider;
pub mod sector_etfs;
pub mod types;
