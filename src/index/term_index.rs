//! Ephemeral term index used by aggregations.
//!
//! Terms are counted under two key spaces of one private [`TempKv`]:
//! `t` + JSON encoding of the term, and `n` + an order-preserving encoding of
//! numeric terms, so numeric values can be streamed back in ascending order.
use std::sync::Arc;

use tracing::debug;

use crate::engine::manager::TempKv;
use crate::error::{GraphError, Result};
use crate::model::Value;

const TERM_PREFIX: u8 = b't';
const NUMERIC_PREFIX: u8 = b'n';

/// Counts occurrences of field values.
#[derive(Debug)]
pub struct TermIndex {
    kv: Arc<dyn TempKv>,
    total: u64,
}

impl TermIndex {
    /// Index over a private store.
    pub fn new(kv: Arc<dyn TempKv>) -> Self {
        Self { kv, total: 0 }
    }

    /// Records one value. Lists contribute each of their items; nulls and
    /// non-finite floats are ignored.
    pub fn add(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => Ok(()),
            Value::Float(f) if !f.is_finite() => {
                debug!(value = %f, "index.term.non_finite_skipped");
                Ok(())
            }
            Value::List(items) => {
                for item in items {
                    self.add(item)?;
                }
                Ok(())
            }
            other => {
                let mut key = vec![TERM_PREFIX];
                key.extend(serde_json::to_vec(other)?);
                self.kv.add_counter(&key, 1)?;
                if let Some(num) = other.as_f64() {
                    let mut key = vec![NUMERIC_PREFIX];
                    key.extend_from_slice(&encode_f64(num));
                    self.kv.add_counter(&key, 1)?;
                }
                self.total += 1;
                Ok(())
            }
        }
    }

    /// Number of values recorded.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Term counts ordered by descending count, then ascending term.
    pub fn term_counts(&self) -> Result<Vec<(Value, u64)>> {
        let mut out = Vec::new();
        for (key, raw) in self.kv.scan_prefix(&[TERM_PREFIX])? {
            let term: Value = serde_json::from_slice(&key[1..])?;
            out.push((term, decode_counter(&raw)?));
        }
        out.sort_by(|(ka, ca), (kb, cb)| cb.cmp(ca).then_with(|| ka.total_cmp(kb)));
        Ok(out)
    }

    /// Numeric values with their counts, ascending.
    pub fn numeric_counts(&self) -> Result<Vec<(f64, u64)>> {
        let mut out = Vec::new();
        for (key, raw) in self.kv.scan_prefix(&[NUMERIC_PREFIX])? {
            let bytes: [u8; 8] = key[1..]
                .try_into()
                .map_err(|_| GraphError::Serialization("numeric term key".into()))?;
            out.push((decode_f64(bytes), decode_counter(&raw)?));
        }
        Ok(out)
    }
}

fn decode_counter(raw: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| GraphError::Serialization("term counter".into()))?;
    Ok(u64::from_be_bytes(bytes))
}

fn encode_f64(value: f64) -> [u8; 8] {
    let bits = value.to_bits();
    let ordered = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
    ordered.to_be_bytes()
}

fn decode_f64(bytes: [u8; 8]) -> f64 {
    let ordered = u64::from_be_bytes(bytes);
    let bits = if ordered >> 63 == 1 {
        ordered ^ (1 << 63)
    } else {
        !ordered
    };
    f64::from_bits(bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::manager::MemoryKv;

    #[test]
    fn counts_terms_with_deterministic_ties() -> Result<()> {
        let mut index = TermIndex::new(Arc::new(MemoryKv::new()));
        for (term, n) in [("a", 5), ("b", 3), ("c", 5)] {
            for _ in 0..n {
                index.add(&Value::from(term))?;
            }
        }
        let counts = index.term_counts()?;
        assert_eq!(
            counts,
            vec![
                (Value::from("a"), 5),
                (Value::from("c"), 5),
                (Value::from("b"), 3)
            ]
        );
        assert_eq!(index.total(), 13);
        Ok(())
    }

    #[test]
    fn numeric_terms_stream_in_order() -> Result<()> {
        let mut index = TermIndex::new(Arc::new(MemoryKv::new()));
        for v in [3.5, -2.0, 10.0, -2.0, 0.0] {
            index.add(&Value::Float(v))?;
        }
        index.add(&Value::from(vec![7, 7]))?;
        index.add(&Value::from("x"))?;
        index.add(&Value::Float(f64::INFINITY))?;
        index.add(&Value::Float(f64::NAN))?;
        let nums = index.numeric_counts()?;
        assert_eq!(
            nums,
            vec![(-2.0, 2), (0.0, 1), (3.5, 1), (7.0, 2), (10.0, 1)]
        );
        Ok(())
    }
}
