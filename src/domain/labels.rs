//! Multi-label encoding of disease sets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Result, VitalError};

/// Fixed, lexically ordered vocabulary of disease names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpace {
    names: Vec<String>,
}

impl LabelSpace {
    /// Collect every observed disease name, in lexical order.
    pub fn fit<'a, I>(label_sets: I) -> Self
    where
        I: IntoIterator<Item = &'a BTreeSet<String>>,
    {
        let names: BTreeSet<String> = label_sets.into_iter().flatten().cloned().collect();
        Self {
            names: names.into_iter().collect(),
        }
    }

    /// Rebuild a space from an explicit name list.
    ///
    /// # Errors
    /// Returns `CorruptionError` unless names are strictly increasing.
    pub fn from_names(names: Vec<String>) -> Result<Self> {
        if names.windows(2).any(|w| w[0] >= w[1]) {
            return Err(VitalError::Corruption(
                "Label names must be unique and lexically ordered".into(),
            ));
        }
        Ok(Self { names })
    }

    /// Indicator vector with bit `i` set iff name `i` is in `labels`.
    ///
    /// # Errors
    /// Returns `UnknownLabelError` for a name outside this space.
    pub fn encode(&self, labels: &BTreeSet<String>) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.names.len()];
        for label in labels {
            let i = self
                .index_of(label)
                .ok_or_else(|| VitalError::UnknownLabel(label.clone()))?;
            out[i] = 1;
        }
        Ok(out)
    }

    /// Inverse of [`encode`](Self::encode).
    ///
    /// # Errors
    /// Returns `SchemaError` if the vector width differs from the space.
    pub fn decode(&self, vector: &[u8]) -> Result<BTreeSet<String>> {
        if vector.len() != self.names.len() {
            return Err(VitalError::Schema(format!(
                "Indicator width {} does not match label space of {}",
                vector.len(),
                self.names.len()
            )));
        }
        Ok(vector
            .iter()
            .zip(&self.names)
            .filter(|(bit, _)| **bit == 1)
            .map(|(_, name)| name.clone())
            .collect())
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.binary_search_by(|n| n.as_str().cmp(name)).ok()
    }

    #[must_use]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn space() -> LabelSpace {
        let sets = vec![
            set(&["Hypertension", "Anemia"]),
            set(&[]),
            set(&["Diabetes"]),
        ];
        LabelSpace::fit(&sets)
    }

    #[test]
    fn test_fit_is_lexical_union() {
        assert_eq!(space().names(), &["Anemia", "Diabetes", "Hypertension"]);
    }

    #[test]
    fn test_encode() {
        let encoded = space().encode(&set(&["Hypertension", "Anemia"])).unwrap();
        assert_eq!(encoded, vec![1, 0, 1]);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let space = space();
        for labels in [
            set(&[]),
            set(&["Anemia"]),
            set(&["Diabetes", "Hypertension"]),
            set(&["Anemia", "Diabetes", "Hypertension"]),
        ] {
            let encoded = space.encode(&labels).unwrap();
            assert_eq!(space.decode(&encoded).unwrap(), labels);
        }
    }

    #[test]
    fn test_unknown_label() {
        let err = space().encode(&set(&["Gout"])).unwrap_err();
        assert!(matches!(err, VitalError::UnknownLabel(name) if name == "Gout"));
    }

    #[test]
    fn test_decode_wrong_width() {
        assert!(matches!(
            space().decode(&[1, 0]),
            Err(VitalError::Schema(_))
        ));
    }

    #[test]
    fn test_index_lookup() {
        let space = space();
        assert_eq!(space.index_of("Diabetes"), Some(1));
        assert_eq!(space.name(2), Some("Hypertension"));
        assert_eq!(space.index_of("Gout"), None);
    }

    #[test]
    fn test_from_names_requires_order() {
        assert!(LabelSpace::from_names(vec!["B".into(), "A".into()]).is_err());
        assert!(LabelSpace::from_names(vec!["A".into(), "B".into()]).is_ok());
    }
}
