use crate::types::{
    Band, BandArray, GeoTransform, PixelType, RasterMetadata, ToaError, ToaResult,
};
use gdal::raster::GdalDataType;
use gdal::Dataset;
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Reader for the multi-band radiance raster.
///
/// Opens the source read-only and exposes its spatial metadata plus one
/// [`BandArray`] per band. Reading is idempotent: re-reading an unmodified
/// source yields bit-identical arrays.
#[derive(Debug)]
pub struct RadianceReader {
    dataset: Dataset,
    metadata: RasterMetadata,
    path: PathBuf,
}

impl RadianceReader {
    /// Open a radiance raster and validate it against the sensor contract.
    pub fn open<P: AsRef<Path>>(path: P) -> ToaResult<Self> {
        let path = path.as_ref().to_path_buf();
        log::info!("Opening radiance raster: {}", path.display());

        let dataset = Dataset::open(&path).map_err(|e| ToaError::RasterOpen {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let band_count = dataset.raster_count() as usize;
        if band_count != Band::ALL.len() {
            return Err(ToaError::RasterOpen {
                path: path.display().to_string(),
                reason: format!(
                    "expected {} bands, raster has {}",
                    Band::ALL.len(),
                    band_count
                ),
            });
        }

        let metadata = Self::read_metadata(&dataset, &path)?;
        log::debug!(
            "Raster {}x{}, {} bands, {} pixels, CRS {}",
            metadata.width,
            metadata.height,
            metadata.band_count,
            metadata.pixel_type,
            metadata
                .epsg
                .map(|code| format!("EPSG:{}", code))
                .unwrap_or_else(|| "unknown".to_string()),
        );

        Ok(Self {
            dataset,
            metadata,
            path,
        })
    }

    fn read_metadata(dataset: &Dataset, path: &Path) -> ToaResult<RasterMetadata> {
        let (width, height) = dataset.raster_size();
        let geo_transform = dataset.geo_transform().map_err(|e| ToaError::RasterOpen {
            path: path.display().to_string(),
            reason: format!("no geotransform: {}", e),
        })?;

        let projection_wkt = dataset.projection();
        let epsg = dataset
            .spatial_ref()
            .ok()
            .and_then(|srs| srs.auth_code().ok())
            .map(|code| code as u32);

        let first_band = dataset.rasterband(1)?;
        let pixel_type = pixel_type_of(first_band.band_type()).ok_or_else(|| {
            ToaError::RasterOpen {
                path: path.display().to_string(),
                reason: format!("unsupported band data type {:?}", first_band.band_type()),
            }
        })?;
        let no_data = first_band.no_data_value();

        Ok(RasterMetadata {
            width,
            height,
            epsg,
            projection_wkt,
            geo_transform: GeoTransform::from_gdal(geo_transform),
            band_count: dataset.raster_count() as usize,
            pixel_type,
            no_data,
            acquired: None,
        })
    }

    /// Spatial metadata of the source raster.
    pub fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read one band into an f64 grid, preserving the source values exactly
    /// (every supported source integer type is representable in f64).
    pub fn read_band(&self, band: Band) -> ToaResult<BandArray> {
        let number = band.number();
        log::debug!("Reading band {} ({})", number, band);

        let (width, height) = (self.metadata.width, self.metadata.height);
        let rasterband = self
            .dataset
            .rasterband(number as isize)
            .map_err(|e| ToaError::BandRead {
                band: number,
                reason: e.to_string(),
            })?;

        let buffer = rasterband
            .read_as::<f64>((0, 0), (width, height), (width, height), None)
            .map_err(|e| ToaError::BandRead {
                band: number,
                reason: e.to_string(),
            })?;

        Array2::from_shape_vec((height, width), buffer.data).map_err(|e| ToaError::BandRead {
            band: number,
            reason: format!("failed to reshape band data: {}", e),
        })
    }

    /// Read all bands in sensor order.
    pub fn read_all_bands(&self) -> ToaResult<[BandArray; Band::ALL.len()]> {
        Ok([
            self.read_band(Band::Blue)?,
            self.read_band(Band::Green)?,
            self.read_band(Band::Red)?,
            self.read_band(Band::Nir)?,
        ])
    }
}

fn pixel_type_of(gdal_type: GdalDataType) -> Option<PixelType> {
    match gdal_type {
        GdalDataType::UInt8 => Some(PixelType::U8),
        GdalDataType::UInt16 => Some(PixelType::U16),
        GdalDataType::Int16 => Some(PixelType::I16),
        GdalDataType::UInt32 => Some(PixelType::U32),
        GdalDataType::Int32 => Some(PixelType::I32),
        GdalDataType::Float32 => Some(PixelType::F32),
        GdalDataType::Float64 => Some(PixelType::F64),
        _ => None,
    }
}
