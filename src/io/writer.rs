use crate::types::{QuantizedBands, RasterMetadata, ToaError, ToaResult};
use gdal::raster::{Buffer, GdalType};
use gdal::spatial_ref::SpatialRef;
use gdal::{DriverManager, Metadata};
use ndarray::Array2;
use std::path::Path;

/// Writer for the quantized reflectance raster.
///
/// Writes all bands or none: if any step fails, the partially written
/// destination file is removed before the error is returned.
pub struct ReflectanceWriter;

impl ReflectanceWriter {
    /// Persist quantized bands as a GeoTIFF with the given (derived) spatial
    /// metadata. Band i of the output corresponds to band i of the input.
    pub fn write<P: AsRef<Path>>(
        path: P,
        metadata: &RasterMetadata,
        bands: &QuantizedBands,
    ) -> ToaResult<()> {
        let path = path.as_ref();
        log::info!(
            "Writing {} reflectance raster: {}",
            bands.pixel_type(),
            path.display()
        );

        if bands.band_count() != metadata.band_count {
            return Err(ToaError::RasterWrite {
                path: path.display().to_string(),
                reason: format!(
                    "metadata declares {} bands, got {}",
                    metadata.band_count,
                    bands.band_count()
                ),
            });
        }

        match bands {
            QuantizedBands::U8(arrays) => Self::write_typed(path, metadata, arrays),
            QuantizedBands::U16(arrays) => Self::write_typed(path, metadata, arrays),
        }
    }

    fn write_typed<T: GdalType + Copy>(
        path: &Path,
        metadata: &RasterMetadata,
        bands: &[Array2<T>],
    ) -> ToaResult<()> {
        let (width, height) = (metadata.width, metadata.height);
        for (index, band) in bands.iter().enumerate() {
            if band.dim() != (height, width) {
                return Err(ToaError::RasterWrite {
                    path: path.display().to_string(),
                    reason: format!(
                        "band {} has shape {:?}, raster is {}x{}",
                        index + 1,
                        band.dim(),
                        width,
                        height
                    ),
                });
            }
        }

        // Removes the destination on drop unless the write completed.
        let mut guard = PartialOutputGuard::new(path);
        {
            let driver = DriverManager::get_driver_by_name("GTiff")?;
            let mut dataset = driver
                .create_with_band_type::<T, _>(
                    path,
                    width as isize,
                    height as isize,
                    bands.len() as isize,
                )
                .map_err(|e| ToaError::RasterWrite {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;

            dataset.set_geo_transform(&metadata.geo_transform.to_gdal())?;
            Self::set_crs(&mut dataset, metadata)?;

            if let Some(acquired) = metadata.acquired {
                let stamp = acquired.format("%Y:%m:%d %H:%M:%S").to_string();
                dataset.set_metadata_item("TIFFTAG_DATETIME", &stamp, "")?;
            }

            for (index, band) in bands.iter().enumerate() {
                let mut rasterband = dataset.rasterband((index + 1) as isize)?;
                let data: Vec<T> = band.iter().copied().collect();
                let buffer = Buffer::new((width, height), data);
                rasterband
                    .write((0, 0), (width, height), &buffer)
                    .map_err(|e| ToaError::RasterWrite {
                        path: path.display().to_string(),
                        reason: format!("band {} write failed: {}", index + 1, e),
                    })?;

                if let Some(no_data) = metadata.no_data {
                    rasterband.set_no_data_value(Some(no_data))?;
                }
            }
            // Dataset drops here, flushing and closing the file before the
            // guard is disarmed.
        }
        guard.disarm();

        log::info!("Wrote {} bands to {}", bands.len(), path.display());
        Ok(())
    }

    fn set_crs(dataset: &mut gdal::Dataset, metadata: &RasterMetadata) -> ToaResult<()> {
        if let Some(epsg) = metadata.epsg {
            dataset.set_spatial_ref(&SpatialRef::from_epsg(epsg)?)?;
        } else if !metadata.projection_wkt.is_empty() {
            dataset.set_spatial_ref(&SpatialRef::from_wkt(&metadata.projection_wkt)?)?;
        } else {
            log::warn!("Source raster has no CRS, writing without one");
        }
        Ok(())
    }
}

/// Deletes a partially written output file unless disarmed.
struct PartialOutputGuard<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> PartialOutputGuard<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialOutputGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.path.exists() {
            log::warn!(
                "Removing partially written output: {}",
                self.path.display()
            );
            if let Err(e) = std::fs::remove_file(self.path) {
                log::error!("Failed to remove partial output: {}", e);
            }
        }
    }
}
