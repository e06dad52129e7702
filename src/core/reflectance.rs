use crate::io::metadata::CoefficientTable;
use crate::types::{
    Band, BandArray, ClampPolicy, ConversionConfig, OutputDtype, QuantizedBands, ToaError,
    ToaResult,
};
use ndarray::Array2;
use num_traits::{Bounded, NumCast, ToPrimitive};

/// Which side of the output range a value was clamped to, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clamped {
    None,
    Low,
    High,
}

/// Saturating float-to-integer quantization.
///
/// Rounds to the nearest integer (`f64::round`, half away from zero) and
/// clamps to the target type's range instead of wrapping: negative values
/// become `T::min_value`, values above `T::max_value` become `T::max_value`.
/// NaN quantizes to `T::min_value` and reports a low clamp.
pub fn saturating_quantize<T: Bounded + NumCast>(value: f64) -> (T, Clamped) {
    let type_max = T::max_value().to_f64().unwrap_or(f64::MAX);
    let rounded = value.round();

    if rounded.is_nan() || rounded < 0.0 {
        (T::min_value(), Clamped::Low)
    } else if rounded > type_max {
        (T::max_value(), Clamped::High)
    } else {
        // In range after clamping, so the cast cannot fail.
        (NumCast::from(rounded).unwrap_or_else(T::max_value), Clamped::None)
    }
}

/// Per-band conversion statistics.
#[derive(Debug, Clone)]
pub struct BandStats {
    pub band: Band,
    pub coefficient: f64,
    /// Reflectance range before scaling and quantization.
    pub reflectance_min: f64,
    pub reflectance_max: f64,
    /// Pixels clamped to zero (negative radiance artifacts).
    pub clamped_low: usize,
    /// Pixels clamped to the output type's maximum.
    pub clamped_high: usize,
}

/// Summary of one conversion run, returned alongside the quantized bands.
#[derive(Debug, Clone)]
pub struct ConversionSummary {
    pub bands: Vec<BandStats>,
    pub scale_factor: f64,
    pub output_dtype: OutputDtype,
}

impl ConversionSummary {
    pub fn total_clamped(&self) -> usize {
        self.bands
            .iter()
            .map(|stats| stats.clamped_low + stats.clamped_high)
            .sum()
    }
}

/// Radiance-to-TOA-reflectance converter.
///
/// Applies the per-band linear model `reflectance = radiance * coefficient`,
/// scales by the configured factor, and quantizes into the configured
/// unsigned integer width with explicit saturation semantics.
pub struct ReflectanceConverter {
    table: CoefficientTable,
    config: ConversionConfig,
}

impl ReflectanceConverter {
    pub fn new(table: CoefficientTable, config: ConversionConfig) -> Self {
        Self { table, config }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Convert radiance bands (sensor order) to quantized TOA reflectance.
    ///
    /// The coefficient table is validated complete before any band is
    /// touched, so a missing coefficient fails the run without partial work.
    pub fn convert(
        &self,
        bands: &[BandArray; Band::ALL.len()],
    ) -> ToaResult<(QuantizedBands, ConversionSummary)> {
        self.table.validate_complete()?;

        log::info!(
            "Converting {} bands to TOA reflectance (scale {}, {} output)",
            bands.len(),
            self.config.scale_factor,
            self.config.output_dtype
        );

        let (quantized, stats) = match self.config.output_dtype {
            OutputDtype::U8 => {
                let (arrays, stats) = self.convert_typed::<u8>(bands)?;
                (QuantizedBands::U8(arrays), stats)
            }
            OutputDtype::U16 => {
                let (arrays, stats) = self.convert_typed::<u16>(bands)?;
                (QuantizedBands::U16(arrays), stats)
            }
        };

        let summary = ConversionSummary {
            bands: stats,
            scale_factor: self.config.scale_factor,
            output_dtype: self.config.output_dtype,
        };
        if summary.total_clamped() > 0 {
            log::warn!(
                "{} pixels clamped during quantization",
                summary.total_clamped()
            );
        }

        Ok((quantized, summary))
    }

    fn convert_typed<T>(
        &self,
        bands: &[BandArray; Band::ALL.len()],
    ) -> ToaResult<(Vec<Array2<T>>, Vec<BandStats>)>
    where
        T: Bounded + NumCast + Copy + Send,
    {
        // Resolve every coefficient up front; each band then converts
        // independently (no cross-band dependency).
        let jobs: Vec<(Band, &BandArray, f64)> = Band::ALL
            .iter()
            .zip(bands.iter())
            .map(|(&band, radiance)| Ok((band, radiance, self.table.get(band)?)))
            .collect::<ToaResult<_>>()?;

        #[cfg(feature = "parallel")]
        let results: ToaResult<Vec<(Array2<T>, BandStats)>> = {
            use rayon::prelude::*;
            jobs.par_iter()
                .map(|&(band, radiance, coefficient)| {
                    self.convert_band::<T>(band, radiance, coefficient)
                })
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let results: ToaResult<Vec<(Array2<T>, BandStats)>> = jobs
            .iter()
            .map(|&(band, radiance, coefficient)| {
                self.convert_band::<T>(band, radiance, coefficient)
            })
            .collect();

        Ok(results?.into_iter().unzip())
    }

    fn convert_band<T>(
        &self,
        band: Band,
        radiance: &BandArray,
        coefficient: f64,
    ) -> ToaResult<(Array2<T>, BandStats)>
    where
        T: Bounded + NumCast + Copy,
    {
        let mut reflectance_min = f64::INFINITY;
        let mut reflectance_max = f64::NEG_INFINITY;
        let mut clamped_low = 0usize;
        let mut clamped_high = 0usize;

        let mut quantized = Vec::with_capacity(radiance.len());
        for &dn in radiance.iter() {
            // No clamp here: reflectance above 1.0 is legitimate for
            // saturated or specular pixels.
            let reflectance = dn * coefficient;
            reflectance_min = reflectance_min.min(reflectance);
            reflectance_max = reflectance_max.max(reflectance);

            let scaled = reflectance * self.config.scale_factor;
            let (value, clamp) = saturating_quantize::<T>(scaled);
            match clamp {
                Clamped::None => {}
                Clamped::Low => clamped_low += 1,
                Clamped::High => {
                    if self.config.clamp_policy == ClampPolicy::ErrorOnOverflow {
                        return Err(ToaError::QuantizationOverflow {
                            band: band.number(),
                            value: scaled,
                            dtype: self.config.output_dtype,
                        });
                    }
                    clamped_high += 1;
                }
            }
            quantized.push(value);
        }

        let array = Array2::from_shape_vec(radiance.raw_dim(), quantized).map_err(|e| {
            ToaError::BandRead {
                band: band.number(),
                reason: format!("shape error: {}", e),
            }
        })?;

        log::debug!(
            "Band {} ({}): coefficient {:.6e}, reflectance {:.4}..{:.4}, clamped {} low / {} high",
            band.number(),
            band,
            coefficient,
            reflectance_min,
            reflectance_max,
            clamped_low,
            clamped_high
        );

        Ok((
            array,
            BandStats {
                band,
                coefficient,
                reflectance_min,
                reflectance_max,
                clamped_low,
                clamped_high,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn full_table() -> CoefficientTable {
        CoefficientTable::from_entries(&[(1, 0.01), (2, 0.02), (3, 0.015), (4, 0.033)])
    }

    fn uniform_bands(value: f64) -> [BandArray; 4] {
        [
            Array2::from_elem((2, 2), value),
            Array2::from_elem((2, 2), value),
            Array2::from_elem((2, 2), value),
            Array2::from_elem((2, 2), value),
        ]
    }

    #[test]
    fn test_saturating_quantize_boundaries() {
        assert_eq!(saturating_quantize::<u16>(0.0), (0u16, Clamped::None));
        assert_eq!(saturating_quantize::<u16>(65535.0), (65535u16, Clamped::None));
        assert_eq!(saturating_quantize::<u16>(65536.0), (65535u16, Clamped::High));
        assert_eq!(saturating_quantize::<u16>(-1.0), (0u16, Clamped::Low));
        assert_eq!(saturating_quantize::<u8>(255.0), (255u8, Clamped::None));
        assert_eq!(saturating_quantize::<u8>(256.0), (255u8, Clamped::High));
    }

    #[test]
    fn test_saturating_quantize_rounds_to_nearest() {
        assert_eq!(saturating_quantize::<u16>(100.4), (100u16, Clamped::None));
        assert_eq!(saturating_quantize::<u16>(100.5), (101u16, Clamped::None));
        // 65535.4 rounds down into range; 65535.5 rounds out of it.
        assert_eq!(saturating_quantize::<u16>(65535.4), (65535u16, Clamped::None));
        assert_eq!(saturating_quantize::<u16>(65535.5), (65535u16, Clamped::High));
    }

    #[test]
    fn test_linearity() {
        let table = full_table();
        let converter = ReflectanceConverter::new(table, ConversionConfig::default());

        let mut bands = uniform_bands(0.0);
        bands[0] = arr2(&[[0.0, 100.0], [5000.0, 9999.0]]);

        let (quantized, _) = converter.convert(&bands).expect("conversion failed");
        let blue = match quantized {
            QuantizedBands::U16(arrays) => arrays[0].clone(),
            _ => panic!("expected u16 output"),
        };

        // q = round(dn * 0.01 * 10000), within range, no clamping.
        assert_eq!(blue[[0, 0]], 0);
        assert_eq!(blue[[0, 1]], (100.0f64 * 0.01 * 10_000.0).round() as u16);
        assert_eq!(blue[[1, 0]], 50_000);
        assert_eq!(blue[[1, 1]], (9999.0f64 * 0.01 * 10_000.0).round() as u16);
    }

    #[test]
    fn test_saturation_clamps_instead_of_wrapping() {
        let table = CoefficientTable::from_entries(&[(1, 1.0), (2, 1.0), (3, 1.0), (4, 1.0)]);
        let converter = ReflectanceConverter::new(table, ConversionConfig::default());

        // 1_000_000 * 1.0 * 10_000 = 1e10; a wrapping cast would give 16959.
        let bands = uniform_bands(1_000_000.0);
        let (quantized, summary) = converter.convert(&bands).expect("conversion failed");
        match quantized {
            QuantizedBands::U16(arrays) => {
                for array in &arrays {
                    assert!(array.iter().all(|&v| v == u16::MAX));
                }
            }
            _ => panic!("expected u16 output"),
        }
        assert_eq!(summary.total_clamped(), 16);
    }

    #[test]
    fn test_negative_radiance_clamps_to_zero() {
        let converter = ReflectanceConverter::new(full_table(), ConversionConfig::default());
        let bands = uniform_bands(-5.0);

        let (quantized, summary) = converter.convert(&bands).expect("conversion failed");
        match quantized {
            QuantizedBands::U16(arrays) => {
                for array in &arrays {
                    assert!(array.iter().all(|&v| v == 0));
                }
            }
            _ => panic!("expected u16 output"),
        }
        assert_eq!(summary.bands[0].clamped_low, 4);
    }

    #[test]
    fn test_missing_coefficient_fails() {
        let table = CoefficientTable::from_entries(&[(1, 0.01), (2, 0.02), (4, 0.033)]);
        let converter = ReflectanceConverter::new(table, ConversionConfig::default());

        let err = converter.convert(&uniform_bands(1.0)).unwrap_err();
        match err {
            ToaError::MissingCoefficient { band, .. } => assert_eq!(band, 3),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_error_on_overflow_policy() {
        let table = CoefficientTable::from_entries(&[(1, 1.0), (2, 1.0), (3, 1.0), (4, 1.0)]);
        let config = ConversionConfig {
            clamp_policy: ClampPolicy::ErrorOnOverflow,
            ..ConversionConfig::default()
        };
        let converter = ReflectanceConverter::new(table, config);

        let err = converter.convert(&uniform_bands(1_000_000.0)).unwrap_err();
        match err {
            ToaError::QuantizationOverflow { value, dtype, .. } => {
                assert_eq!(dtype, OutputDtype::U16);
                assert!(value > u16::MAX as f64);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_u8_output_dtype() {
        let table = CoefficientTable::from_entries(&[(1, 0.01), (2, 0.01), (3, 0.01), (4, 0.01)]);
        let config = ConversionConfig {
            scale_factor: 100.0,
            output_dtype: OutputDtype::U8,
            ..ConversionConfig::default()
        };
        let converter = ReflectanceConverter::new(table, config);

        let (quantized, _) = converter.convert(&uniform_bands(100.0)).expect("conversion");
        match quantized {
            QuantizedBands::U8(arrays) => {
                // 100 * 0.01 * 100 = 100
                assert!(arrays.iter().all(|a| a.iter().all(|&v| v == 100)));
            }
            _ => panic!("expected u8 output"),
        }
    }

    #[test]
    fn test_reflectance_above_one_not_clamped() {
        let table = CoefficientTable::from_entries(&[(1, 0.01), (2, 0.01), (3, 0.01), (4, 0.01)]);
        let converter = ReflectanceConverter::new(table, ConversionConfig::default());

        // dn = 500 -> reflectance 5.0, scaled 50_000: above unit reflectance
        // but still inside the u16 range, so it must pass through unclamped.
        let (quantized, summary) = converter.convert(&uniform_bands(500.0)).expect("conversion");
        match quantized {
            QuantizedBands::U16(arrays) => {
                assert!(arrays.iter().all(|a| a.iter().all(|&v| v == 50_000)));
            }
            _ => panic!("expected u16 output"),
        }
        assert_eq!(summary.total_clamped(), 0);
        assert!(summary.bands.iter().all(|s| s.reflectance_max > 1.0));
    }
}
