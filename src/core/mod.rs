//! Core reflectance conversion

pub mod reflectance;

// Re-export main types
pub use reflectance::{
    saturating_quantize, BandStats, Clamped, ConversionSummary, ReflectanceConverter,
};
