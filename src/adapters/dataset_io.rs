//! JSON-lines dataset files.
//!
//! One labeled row per line:
//!
//! ```text
//! {"features": {"Age": 40, "Hemoglobin": 11.2, ...}, "diseases": ["Anemia"]}
//! ```
//!
//! Feature order inside each object is significant and preserved in both
//! directions; it becomes the model schema at training time.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::{Dataset, FeatureVector, LabeledRow};
use crate::{Result, VitalError};

/// Feature object that keeps document order.
struct OrderedFeatures(Vec<(String, f64)>);

impl<'de> Deserialize<'de> for OrderedFeatures {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = OrderedFeatures;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of feature name to number")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, value)) = map.next_entry::<String, f64>()? {
                    pairs.push((name, value));
                }
                Ok(OrderedFeatures(pairs))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

struct FeaturesRef<'a>(&'a FeatureVector);

impl Serialize for FeaturesRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0.names().iter().zip(self.0.values()) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
struct RowRecord {
    features: OrderedFeatures,
    #[serde(default)]
    diseases: BTreeSet<String>,
}

#[derive(Serialize)]
struct RowRecordRef<'a> {
    features: FeaturesRef<'a>,
    diseases: &'a BTreeSet<String>,
}

/// Parse JSON lines from any reader. Blank lines are skipped.
///
/// # Errors
/// Returns `DataError` naming the offending line for malformed JSON,
/// duplicate feature names, or rows that disagree on schema.
pub fn parse_jsonl<R: BufRead>(reader: R) -> Result<Dataset> {
    let mut rows = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let record: RowRecord = serde_json::from_str(&line)
            .map_err(|e| VitalError::Data(format!("Line {line_no}: {e}")))?;
        let features = FeatureVector::from_pairs(record.features.0)
            .map_err(|e| VitalError::Data(format!("Line {line_no}: {e}")))?;
        rows.push(LabeledRow::new(features, record.diseases));
    }
    Dataset::new(rows)
}

/// Read a JSON-lines dataset file.
///
/// # Errors
/// Returns `IoError` if the file cannot be opened, otherwise as
/// [`parse_jsonl`].
pub fn read_jsonl(path: &Path) -> Result<Dataset> {
    let file = File::open(path)?;
    let dataset = parse_jsonl(BufReader::new(file))?;
    tracing::info!("Read {} rows from {}", dataset.len(), path.display());
    Ok(dataset)
}

/// Write one JSON object per row.
///
/// # Errors
/// Returns `IoError` or `SerializationError` on write failure.
pub fn write_jsonl_to<W: Write>(mut writer: W, dataset: &Dataset) -> Result<()> {
    for row in dataset.rows() {
        let record = RowRecordRef {
            features: FeaturesRef(&row.features),
            diseases: &row.diseases,
        };
        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a dataset to `path`, replacing any existing file.
///
/// # Errors
/// As [`write_jsonl_to`].
pub fn write_jsonl(path: &Path, dataset: &Dataset) -> Result<()> {
    let file = File::create(path)?;
    write_jsonl_to(BufWriter::new(file), dataset)?;
    tracing::info!("Wrote {} rows to {}", dataset.len(), path.display());
    Ok(())
}
