pub mod tables;
pub mod write;
