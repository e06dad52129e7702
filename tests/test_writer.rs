use chrono::{TimeZone, Utc};
use gdal::raster::GdalDataType;
use gdal::Dataset;
use ndarray::Array2;
use tempfile::TempDir;
use toaref::{GeoTransform, PixelType, QuantizedBands, RasterMetadata, ReflectanceWriter};

fn metadata(width: usize, height: usize, band_count: usize, pixel_type: PixelType) -> RasterMetadata {
    RasterMetadata {
        width,
        height,
        epsg: Some(32611),
        projection_wkt: String::new(),
        geo_transform: GeoTransform::from_gdal([500_000.0, 3.0, 0.0, 4_100_000.0, 0.0, -3.0]),
        band_count,
        pixel_type,
        no_data: Some(0.0),
        acquired: Utc.with_ymd_and_hms(2017, 9, 15, 18, 21, 3).single(),
    }
}

#[test]
fn test_u16_write_roundtrip() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("out.tif");

    // Row-major gradient so band ordering and array layout are both checked.
    let band = Array2::from_shape_fn((8, 16), |(row, col)| (row * 16 + col) as u16);
    let bands = QuantizedBands::U16(vec![
        band.clone(),
        band.mapv(|v| v + 1000),
        band.mapv(|v| v + 2000),
        band.mapv(|v| v + 3000),
    ]);
    let meta = metadata(16, 8, 4, PixelType::U16);

    ReflectanceWriter::write(&path, &meta, &bands).expect("write failed");

    let dataset = Dataset::open(&path).expect("open");
    assert_eq!(dataset.raster_size(), (16, 8));
    assert_eq!(dataset.raster_count(), 4);

    for index in 0..4 {
        let rasterband = dataset.rasterband((index + 1) as isize).expect("band");
        assert_eq!(rasterband.band_type(), GdalDataType::UInt16);
        assert_eq!(rasterband.no_data_value(), Some(0.0));

        let buffer = rasterband
            .read_as::<u16>((0, 0), (16, 8), (16, 8), None)
            .expect("read");
        let offset = (index * 1000) as u16;
        for (i, &value) in buffer.data.iter().enumerate() {
            assert_eq!(value, i as u16 + offset);
        }
    }

    let gt = dataset.geo_transform().expect("geotransform");
    assert_eq!(gt, [500_000.0, 3.0, 0.0, 4_100_000.0, 0.0, -3.0]);
}

#[test]
fn test_u8_output_band_type() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("out_u8.tif");

    let bands = QuantizedBands::U8(vec![Array2::from_elem((4, 4), 42u8); 4]);
    let meta = metadata(4, 4, 4, PixelType::U8);

    ReflectanceWriter::write(&path, &meta, &bands).expect("write failed");

    let dataset = Dataset::open(&path).expect("open");
    let rasterband = dataset.rasterband(1).expect("band");
    assert_eq!(rasterband.band_type(), GdalDataType::UInt8);
    let buffer = rasterband
        .read_as::<u8>((0, 0), (4, 4), (4, 4), None)
        .expect("read");
    assert!(buffer.data.iter().all(|&v| v == 42));
}

#[test]
fn test_failed_write_removes_partial_output() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("partial.tif");

    // Band 3 has the wrong shape; validation fails before GDAL is touched
    // and nothing may be left on disk.
    let mut arrays = vec![Array2::from_elem((4, 4), 1u16); 4];
    arrays[2] = Array2::from_elem((2, 2), 1u16);
    let bands = QuantizedBands::U16(arrays);
    let meta = metadata(4, 4, 4, PixelType::U16);

    ReflectanceWriter::write(&path, &meta, &bands).expect_err("write must fail");
    assert!(!path.exists());
}
