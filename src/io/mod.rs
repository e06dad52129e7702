//! Raster and metadata I/O

pub mod metadata;
pub mod reader;
pub mod writer;

// Re-export main types
pub use metadata::{parse_product_metadata, CoefficientTable, ProductMetadata};
pub use reader::RadianceReader;
pub use writer::ReflectanceWriter;
