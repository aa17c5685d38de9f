//! AggregateResult - output of a successful run

use std::collections::BTreeMap;

use bytes::Bytes;

/// Sink name -> final byte sequence.
///
/// Only built once every sink completed with a non-empty result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateResult {
    outputs: BTreeMap<String, Bytes>,
}

impl AggregateResult {
    pub(crate) fn new(outputs: BTreeMap<String, Bytes>) -> Self {
        Self { outputs }
    }

    /// Output of one sink
    pub fn get(&self, sink_name: &str) -> Option<&Bytes> {
        self.outputs.get(sink_name)
    }

    /// Number of sinks in the result
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Iterate in sink-name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.outputs.iter().map(|(name, bytes)| (name.as_str(), bytes))
    }

    pub fn into_inner(self) -> BTreeMap<String, Bytes> {
        self.outputs
    }
}

impl FromIterator<(String, Bytes)> for AggregateResult {
    fn from_iter<I: IntoIterator<Item = (String, Bytes)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
