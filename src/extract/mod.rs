pub mod exporter;
pub mod transform;
