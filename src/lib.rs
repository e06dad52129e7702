//! toaref: A Fast Radiance-to-TOA-Reflectance Converter
//!
//! This library converts multi-band optical satellite radiance imagery
//! (4-band Blue/Green/Red/NIR analytic products) into top-of-atmosphere
//! reflectance, using the per-band linear coefficients shipped in the
//! vendor's product metadata, and writes the result as a quantized
//! multi-band GeoTIFF that preserves the source's spatial referencing.

use std::path::Path;

pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use crate::core::{
    saturating_quantize, BandStats, Clamped, ConversionSummary, ReflectanceConverter,
};
pub use crate::io::{
    parse_product_metadata, CoefficientTable, ProductMetadata, RadianceReader, ReflectanceWriter,
};
pub use crate::types::{
    Band, BandArray, ClampPolicy, ConversionConfig, GeoTransform, OutputDtype, PixelType,
    QuantizedBands, RasterMetadata, ToaError, ToaResult,
};

/// One-call pipeline: radiance raster + metadata XML -> TOA reflectance
/// GeoTIFF.
///
/// The coefficient table is validated complete before the output is created,
/// so a missing coefficient never leaves a partial file behind.
pub fn convert_to_toa<P: AsRef<Path>, Q: AsRef<Path>, R: AsRef<Path>>(
    input_raster: P,
    metadata_xml: Q,
    output_raster: R,
    config: ConversionConfig,
) -> ToaResult<ConversionSummary> {
    let xml = std::fs::read_to_string(metadata_xml.as_ref())?;
    let product = parse_product_metadata(&xml)?;
    product.coefficients.validate_complete()?;

    let reader = RadianceReader::open(input_raster.as_ref())?;
    let bands = reader.read_all_bands()?;

    let converter = ReflectanceConverter::new(product.coefficients.clone(), config);
    let (quantized, summary) = converter.convert(&bands)?;

    let output_metadata = RasterMetadata {
        acquired: product.acquired,
        ..reader
            .metadata()
            .derive(quantized.band_count(), config.output_dtype.pixel_type())
    };
    ReflectanceWriter::write(output_raster.as_ref(), &output_metadata, &quantized)?;

    Ok(summary)
}
