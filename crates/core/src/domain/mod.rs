pub mod contract;
pub mod instrument;
pub mod metric;
pub mod recommendation;
pub mod sector;
