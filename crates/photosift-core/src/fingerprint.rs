//! Numeric content fingerprints.

/// A numeric fingerprint computed once per item at classification time.
///
/// Finite values in `[0, 1)` map to a group; anything else routes to the
/// unclassified bucket. Fingerprints are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Fingerprint(f64);

impl Fingerprint {
    /// Wrap a raw value. Non-finite values are allowed and classify as
    /// unclassified.
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    /// Derive a fingerprint from the leading bytes of a content hash.
    ///
    /// Uses the top 53 bits so the division is exact in f64; the result
    /// is uniform in `[0, 1)`.
    pub fn from_hash_prefix(bytes: [u8; 8]) -> Self {
        let bits = u64::from_le_bytes(bytes) >> 11;
        Self(bits as f64 / (1u64 << 53) as f64)
    }

    /// The raw value.
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Whether this fingerprint falls in the classifiable range `[0, 1)`.
    pub fn is_classifiable(&self) -> bool {
        self.0.is_finite() && (0.0..1.0).contains(&self.0)
    }
}

impl From<f64> for Fingerprint {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}
