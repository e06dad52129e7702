use crate::types::{Band, ToaError, ToaResult};
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Per-band TOA reflectance coefficients, indexed by band number.
///
/// Fixed-size slot table: slot `i` holds the coefficient for band number
/// `i + 1`. Completeness is validated once at load time rather than on each
/// access.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoefficientTable {
    slots: [Option<f64>; Band::ALL.len()],
}

impl CoefficientTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from (band number, coefficient) pairs. Entries with a
    /// band number outside the sensor's band set are ignored.
    pub fn from_entries(entries: &[(usize, f64)]) -> Self {
        let mut table = Self::new();
        for &(number, coefficient) in entries {
            if let Some(band) = Band::from_number(number) {
                table.insert(band, coefficient);
            }
        }
        table
    }

    pub fn insert(&mut self, band: Band, coefficient: f64) {
        self.slots[band.number() - 1] = Some(coefficient);
    }

    /// Coefficient for a band, or `MissingCoefficient` if the metadata
    /// document had no entry for it.
    pub fn get(&self, band: Band) -> ToaResult<f64> {
        self.slots[band.number() - 1]
            .ok_or(ToaError::MissingCoefficient {
                band: band.number(),
                band_name: band,
            })
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that every sensor band has a coefficient. Done once before any
    /// conversion so an incomplete table never produces a partial output.
    pub fn validate_complete(&self) -> ToaResult<()> {
        for band in Band::ALL {
            self.get(band)?;
        }
        Ok(())
    }
}

/// Product metadata extracted from the vendor XML document.
#[derive(Debug, Clone)]
pub struct ProductMetadata {
    pub coefficients: CoefficientTable,
    pub acquired: Option<DateTime<Utc>>,
}

// Local element names in the vendor metadata document. Matched on the local
// part so namespace prefixes (ps:, opt:, ...) don't matter.
const BAND_SECTION: &[u8] = b"bandSpecificMetadata";
const BAND_NUMBER: &[u8] = b"bandNumber";
const COEFFICIENT: &[u8] = b"reflectanceCoefficient";
const ACQUIRED: &[u8] = b"acquisitionDateTime";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    BandNumber,
    Coefficient,
    Acquired,
}

/// Parse the vendor metadata XML into a [`ProductMetadata`].
///
/// The document contains one `bandSpecificMetadata` section per band, each
/// carrying a `bandNumber` and a `reflectanceCoefficient` (decimal or
/// scientific notation). Sections whose band number falls outside the
/// sensor's band set are skipped, so documents describing extra bands still
/// parse. A section missing either field, or carrying a non-numeric
/// coefficient, is a [`ToaError::MetadataParse`].
pub fn parse_product_metadata(xml: &str) -> ToaResult<ProductMetadata> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut table = CoefficientTable::new();
    let mut acquired: Option<DateTime<Utc>> = None;

    let mut in_section = false;
    let mut field: Option<Field> = None;
    let mut band_number_text: Option<String> = None;
    let mut coefficient_text: Option<String> = None;
    let mut sections = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                let name = name.as_ref();
                if name == BAND_SECTION {
                    in_section = true;
                    band_number_text = None;
                    coefficient_text = None;
                } else if in_section && name == BAND_NUMBER {
                    field = Some(Field::BandNumber);
                } else if in_section && name == COEFFICIENT {
                    field = Some(Field::Coefficient);
                } else if !in_section && name == ACQUIRED {
                    field = Some(Field::Acquired);
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(current) = field {
                    let text = t
                        .unescape()
                        .map_err(|e| ToaError::MetadataParse(format!("bad text node: {}", e)))?
                        .trim()
                        .to_string();
                    match current {
                        Field::BandNumber => band_number_text = Some(text),
                        Field::Coefficient => coefficient_text = Some(text),
                        Field::Acquired => {
                            acquired = parse_acquisition_time(&text);
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                let name = name.as_ref();
                if name == BAND_SECTION {
                    in_section = false;
                    sections += 1;
                    finish_band_section(
                        &mut table,
                        band_number_text.take(),
                        coefficient_text.take(),
                    )?;
                } else if name == BAND_NUMBER || name == COEFFICIENT || name == ACQUIRED {
                    field = None;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ToaError::MetadataParse(format!(
                    "malformed XML at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
    }

    log::debug!(
        "parsed {} band sections, {} usable coefficients",
        sections,
        table.len()
    );

    Ok(ProductMetadata {
        coefficients: table,
        acquired,
    })
}

fn finish_band_section(
    table: &mut CoefficientTable,
    band_number_text: Option<String>,
    coefficient_text: Option<String>,
) -> ToaResult<()> {
    let number_text = band_number_text
        .ok_or_else(|| ToaError::MetadataParse("band section without bandNumber".to_string()))?;
    let number: usize = number_text.parse().map_err(|_| {
        ToaError::MetadataParse(format!("invalid band number '{}'", number_text))
    })?;

    let band = match Band::from_number(number) {
        Some(band) => band,
        None => {
            // Not one of the sensor's bands; documents may describe extra
            // bands this converter does not handle.
            log::debug!("ignoring band section for band {}", number);
            return Ok(());
        }
    };

    let coeff_text = coefficient_text.ok_or_else(|| {
        ToaError::MetadataParse(format!(
            "band {} section without reflectanceCoefficient",
            number
        ))
    })?;
    let coefficient: f64 = coeff_text.parse().map_err(|_| {
        ToaError::MetadataParse(format!(
            "invalid reflectance coefficient '{}' for band {}",
            coeff_text, number
        ))
    })?;
    if !coefficient.is_finite() {
        return Err(ToaError::MetadataParse(format!(
            "non-finite reflectance coefficient for band {}",
            number
        )));
    }

    if table.get(band).is_ok() {
        log::warn!("duplicate coefficient for band {}, keeping the last one", number);
    }
    table.insert(band, coefficient);
    Ok(())
}

fn parse_acquisition_time(text: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(text) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            log::warn!("unparseable acquisition time '{}': {}", text, e);
            None
        }
    }
}
