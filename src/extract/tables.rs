//! Wide per-trace output tables keyed by `(order, trace_nb)`.

use nalgebra::DVector;

use crate::error::{ExtractError, Result};

/// Key of one trace column in an output table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceKey {
    pub order: i32,
    pub trace_nb: i32,
}

/// Wide table collecting one vector per extracted trace.
///
/// Column names follow the `"{order:02}_{trace:02}_{KIND}"` convention of
/// the downstream product tables. Spectra share the detector width, so a
/// uniform-length table enforces equal column lengths; slit functions may
/// differ per trace when heights are auto-computed, so their table is
/// ragged.
#[derive(Clone, Debug)]
pub struct ExtractionTable {
    kind: &'static str,
    uniform_len: Option<usize>,
    columns: Vec<(TraceKey, DVector<f64>)>,
}

impl ExtractionTable {
    /// Table whose columns must all have length `len`.
    pub(crate) fn uniform(kind: &'static str, len: usize) -> Self {
        Self {
            kind,
            uniform_len: Some(len),
            columns: Vec::new(),
        }
    }

    /// Table with per-column lengths (slit functions).
    pub(crate) fn ragged(kind: &'static str) -> Self {
        Self {
            kind,
            uniform_len: None,
            columns: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, key: TraceKey, values: DVector<f64>) -> Result<()> {
        if let Some(len) = self.uniform_len {
            if values.len() != len {
                return Err(ExtractError::InconsistentInput(format!(
                    "{} column for trace ({}, {}) has {} rows, table expects {}",
                    self.kind,
                    key.order,
                    key.trace_nb,
                    values.len(),
                    len
                )));
            }
        }
        if self.columns.iter().any(|(k, _)| *k == key) {
            return Err(ExtractError::InconsistentInput(format!(
                "duplicate {} column for trace ({}, {})",
                self.kind, key.order, key.trace_nb
            )));
        }
        self.columns.push((key, values));
        Ok(())
    }

    /// Column name of a trace in this table.
    pub fn column_name(&self, order: i32, trace_nb: i32) -> String {
        format!("{:02}_{:02}_{}", order, trace_nb, self.kind)
    }

    /// Vector stored for one trace, if it was extracted.
    pub fn get(&self, order: i32, trace_nb: i32) -> Option<&DVector<f64>> {
        self.columns
            .iter()
            .find(|(k, _)| k.order == order && k.trace_nb == trace_nb)
            .map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = TraceKey> + '_ {
        self.columns.iter().map(|(k, _)| *k)
    }

    pub fn names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|(k, _)| self.column_name(k.order, k.trace_nb))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_table_enforces_length() {
        let mut t = ExtractionTable::uniform("SPEC", 4);
        let key = TraceKey {
            order: 7,
            trace_nb: 1,
        };
        assert!(t.insert(key, DVector::from_element(3, 0.0)).is_err());
        t.insert(key, DVector::from_element(4, 1.5)).unwrap();
        assert!(t
            .insert(key, DVector::from_element(4, 2.0))
            .is_err(), "duplicate keys must be rejected");
        assert_eq!(t.get(7, 1).unwrap()[0], 1.5);
        assert!(t.get(7, 2).is_none());
    }

    #[test]
    fn column_names_follow_the_product_convention() {
        let t = ExtractionTable::uniform("SPEC", 8);
        assert_eq!(t.column_name(3, 1), "03_01_SPEC");
        let s = ExtractionTable::ragged("SLIT_FUNC");
        assert_eq!(s.column_name(12, 2), "12_02_SLIT_FUNC");
    }
}
