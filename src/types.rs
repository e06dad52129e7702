use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// One band's pixel grid (rows x columns), held as f64 so that anomalous
/// negative digital numbers from sensor calibration artifacts stay
/// representable until quantization.
pub type BandArray = Array2<f64>;

/// Spectral bands of the 4-band analytic product, in sensor order.
///
/// The ordering is a fixed contract of the source sensor (band 1 = Blue,
/// 2 = Green, 3 = Red, 4 = Near-infrared) and is never inferred from data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    Blue,
    Green,
    Red,
    Nir,
}

impl Band {
    /// All bands in sensor order.
    pub const ALL: [Band; 4] = [Band::Blue, Band::Green, Band::Red, Band::Nir];

    /// 1-based band number, matching the raster's band numbering convention.
    pub fn number(self) -> usize {
        match self {
            Band::Blue => 1,
            Band::Green => 2,
            Band::Red => 3,
            Band::Nir => 4,
        }
    }

    /// Band for a 1-based band number, if it is one of the sensor's bands.
    pub fn from_number(number: usize) -> Option<Band> {
        match number {
            1 => Some(Band::Blue),
            2 => Some(Band::Green),
            3 => Some(Band::Red),
            4 => Some(Band::Nir),
            _ => None,
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Band::Blue => write!(f, "Blue"),
            Band::Green => write!(f, "Green"),
            Band::Red => write!(f, "Red"),
            Band::Nir => write!(f, "NIR"),
        }
    }
}

/// Six-parameter affine geotransform mapping pixel coordinates to map
/// coordinates, in GDAL parameter order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }
}

/// Pixel storage type of a raster band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelType {
    U8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl std::fmt::Display for PixelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelType::U8 => write!(f, "uint8"),
            PixelType::U16 => write!(f, "uint16"),
            PixelType::I16 => write!(f, "int16"),
            PixelType::U32 => write!(f, "uint32"),
            PixelType::I32 => write!(f, "int32"),
            PixelType::F32 => write!(f, "float32"),
            PixelType::F64 => write!(f, "float64"),
        }
    }
}

/// Spatial referencing description of a raster.
///
/// Created by the reader from the source dataset, consumed read-only by the
/// converter, and re-derived (never mutated) by the writer for the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    /// EPSG authority code of the CRS, when the source declares one.
    pub epsg: Option<u32>,
    /// Full WKT of the CRS, carried so non-EPSG sources round-trip.
    pub projection_wkt: String,
    pub geo_transform: GeoTransform,
    pub band_count: usize,
    pub pixel_type: PixelType,
    /// Nodata marker of the source bands, carried into the output when set.
    pub no_data: Option<f64>,
    /// Acquisition timestamp from the product metadata, when available.
    pub acquired: Option<DateTime<Utc>>,
}

impl RasterMetadata {
    /// Derive the output metadata: same spatial fields, new band count and
    /// pixel type.
    pub fn derive(&self, band_count: usize, pixel_type: PixelType) -> RasterMetadata {
        RasterMetadata {
            band_count,
            pixel_type,
            ..self.clone()
        }
    }
}

/// Target integer width for the quantized reflectance output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputDtype {
    U8,
    U16,
}

impl OutputDtype {
    pub fn pixel_type(self) -> PixelType {
        match self {
            OutputDtype::U8 => PixelType::U8,
            OutputDtype::U16 => PixelType::U16,
        }
    }

    /// Largest value representable in the output type.
    pub fn type_max(self) -> f64 {
        match self {
            OutputDtype::U8 => u8::MAX as f64,
            OutputDtype::U16 => u16::MAX as f64,
        }
    }
}

impl std::fmt::Display for OutputDtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputDtype::U8 => write!(f, "uint8"),
            OutputDtype::U16 => write!(f, "uint16"),
        }
    }
}

/// How to treat scaled reflectance values outside the output type's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClampPolicy {
    /// Clamp out-of-range values to the nearest representable value.
    Saturate,
    /// Fail the conversion on the first out-of-range value.
    ErrorOnOverflow,
}

/// Options for the radiance-to-reflectance conversion.
#[derive(Debug, Clone, Copy)]
pub struct ConversionConfig {
    /// Multiplier applied to unit-interval reflectance before quantization.
    pub scale_factor: f64,
    pub output_dtype: OutputDtype,
    pub clamp_policy: ClampPolicy,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            scale_factor: 10_000.0,
            output_dtype: OutputDtype::U16,
            clamp_policy: ClampPolicy::Saturate,
        }
    }
}

/// Quantized reflectance bands, in sensor order, tagged with their storage
/// width so the writer persists the configured dtype.
#[derive(Debug, Clone)]
pub enum QuantizedBands {
    U8(Vec<Array2<u8>>),
    U16(Vec<Array2<u16>>),
}

impl QuantizedBands {
    pub fn band_count(&self) -> usize {
        match self {
            QuantizedBands::U8(bands) => bands.len(),
            QuantizedBands::U16(bands) => bands.len(),
        }
    }

    pub fn pixel_type(&self) -> PixelType {
        match self {
            QuantizedBands::U8(_) => PixelType::U8,
            QuantizedBands::U16(_) => PixelType::U16,
        }
    }
}

/// Error types for the reflectance pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ToaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("metadata parse error: {0}")]
    MetadataParse(String),

    #[error("no reflectance coefficient for band {band} ({band_name})")]
    MissingCoefficient { band: usize, band_name: Band },

    #[error("cannot open raster {path}: {reason}")]
    RasterOpen { path: String, reason: String },

    #[error("cannot read band {band}: {reason}")]
    BandRead { band: usize, reason: String },

    #[error("cannot write raster {path}: {reason}")]
    RasterWrite { path: String, reason: String },

    #[error("scaled reflectance {value} in band {band} exceeds the {dtype} range")]
    QuantizationOverflow {
        band: usize,
        value: f64,
        dtype: OutputDtype,
    },
}

/// Result type for reflectance operations.
pub type ToaResult<T> = Result<T, ToaError>;
