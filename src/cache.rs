//! Per-Layer Cache and Gradient Bookkeeping
//!
//! The forward engine records one cache entry per layer and the backward
//! engine one gradient entry per layer. Recurrent and feed-forward layers save
//! very different things, so both entries are sum types and every access site
//! matches on the variant.
//!
//! ## In-Place Replacement
//!
//! Both sequences are indexed by zero-based layer position and may be
//! recorded in any order: the forward engine fills them head-first from layer
//! 0, the backward engine from layer L-1 down. Recording past the end grows
//! the sequence with empty slots. After the first full pass both sequences
//! have length L and every later pass overwrites them in place.

use crate::error::{Error, Result};
use crate::layers::{DenseCache, DenseGradients, LstmCache, LstmGradients};
use crate::tensor::Matrix;

/// Cache bundle recorded by one layer's forward pass
#[derive(Clone, Debug)]
pub enum LayerCache {
    Recurrent(LstmCache),
    Dense(DenseCache),
}

/// Gradient bundle produced by one layer's backward pass
#[derive(Clone, Debug)]
pub enum LayerGradients {
    Recurrent(LstmGradients),
    Dense(DenseGradients),
}

impl LayerGradients {
    /// Parameter gradients in the layer's `parameters()` order
    pub fn parameter_grads(&self) -> Vec<&Matrix> {
        match self {
            LayerGradients::Recurrent(g) => g.parameter_grads(),
            LayerGradients::Dense(g) => g.parameter_grads(),
        }
    }

    pub fn parameter_grads_mut(&mut self) -> Vec<&mut Matrix> {
        match self {
            LayerGradients::Recurrent(g) => g.parameter_grads_mut(),
            LayerGradients::Dense(g) => g.parameter_grads_mut(),
        }
    }
}

/// Write `entry` at `index`, growing with empty slots as needed
fn record<T>(entries: &mut Vec<Option<T>>, index: usize, entry: T) {
    if index >= entries.len() {
        entries.resize_with(index + 1, || None);
    }
    entries[index] = Some(entry);
}

/// Ordered per-layer cache entries
#[derive(Clone, Debug, Default)]
pub struct UnifiedCache {
    entries: Vec<Option<LayerCache>>,
}

impl UnifiedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, index: usize, entry: LayerCache) {
        record(&mut self.entries, index, entry);
    }

    /// Cache entry for layer `index`
    ///
    /// Returns `MissingCache` if no forward pass has reached that layer.
    pub fn get(&self, index: usize) -> Result<&LayerCache> {
        self.entries
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(Error::MissingCache { layer: index })
    }

    /// Number of layer slots, including any not yet recorded
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerCache> {
        self.entries.iter().flatten()
    }
}

/// Ordered per-layer gradient entries
#[derive(Clone, Debug, Default)]
pub struct UnifiedGradients {
    entries: Vec<Option<LayerGradients>>,
}

impl UnifiedGradients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, index: usize, entry: LayerGradients) {
        record(&mut self.entries, index, entry);
    }

    /// Gradient entry for layer `index`
    ///
    /// Returns `MissingGradients` if no backward pass has produced it.
    pub fn get(&self, index: usize) -> Result<&LayerGradients> {
        self.entries
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(Error::MissingGradients { layer: index })
    }

    /// Number of layer slots, including any not yet recorded
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerGradients> {
        self.entries.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LayerGradients> {
        self.entries.iter_mut().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_grads(value: f64) -> LayerGradients {
        LayerGradients::Dense(DenseGradients {
            dw: Matrix::filled(1, 2, value),
            db: Matrix::filled(1, 1, value),
            dx: Matrix::zeros(3, 2),
        })
    }

    #[test]
    fn test_record_appends_then_replaces() {
        let mut grads = UnifiedGradients::new();
        grads.record(0, dense_grads(1.0));
        grads.record(1, dense_grads(2.0));
        assert_eq!(grads.len(), 2);

        grads.record(0, dense_grads(5.0));
        assert_eq!(grads.len(), 2);
        let first = grads.get(0).unwrap().parameter_grads();
        assert_eq!(first[0].data, vec![5.0, 5.0]);
    }

    #[test]
    fn test_record_from_the_head_down() {
        let mut grads = UnifiedGradients::new();
        grads.record(2, dense_grads(3.0));
        assert_eq!(grads.len(), 3);
        assert!(matches!(grads.get(0), Err(Error::MissingGradients { layer: 0 })));
        assert_eq!(grads.iter().count(), 1);

        grads.record(1, dense_grads(2.0));
        grads.record(0, dense_grads(1.0));
        assert_eq!(grads.len(), 3);
        for k in 0..3 {
            let g = grads.get(k).unwrap().parameter_grads();
            assert_eq!(g[0].data, vec![k as f64 + 1.0; 2]);
        }
    }

    #[test]
    fn test_missing_entries_are_errors() {
        let cache = UnifiedCache::new();
        assert!(matches!(cache.get(0), Err(Error::MissingCache { layer: 0 })));

        let grads = UnifiedGradients::new();
        assert!(matches!(grads.get(3), Err(Error::MissingGradients { layer: 3 })));
    }

    #[test]
    fn test_cache_replacement_keeps_length() {
        let entry = |v: f64| {
            LayerCache::Dense(DenseCache {
                x: Matrix::filled(1, 1, v),
                z: Matrix::filled(1, 1, v),
                a: Matrix::filled(1, 1, v),
            })
        };
        let mut cache = UnifiedCache::new();
        cache.record(0, entry(1.0));
        cache.record(0, entry(2.0));
        assert_eq!(cache.len(), 1);
        match cache.get(0).unwrap() {
            LayerCache::Dense(c) => assert_eq!(c.a.data, vec![2.0]),
            LayerCache::Recurrent(_) => panic!("expected a dense entry"),
        }
    }
}
