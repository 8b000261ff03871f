pub mod chunks;
pub mod config;
pub mod container;
pub mod cost;
pub mod dataset;
pub mod datatype;
pub mod exec;
pub mod file;
pub mod gather;
pub mod mem;
pub mod pattern;
pub mod plan;
pub mod selection;
pub mod store;
