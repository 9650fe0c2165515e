use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PointsError {
    #[error("Point vectors have different dimensions. Expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Dimension {0} does not exist")]
    NoSuchDimension(usize),
    #[error("Point arithmetic overflowed")]
    Overflow,
    #[error("Point arithmetic underflowed")]
    Underflow,
}

/// An ordered vector of point balances, one entry per promotion dimension.
///
/// The meaning of each dimension is defined by the promotion (e.g. "points", "streak length", "last visit day").
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointVector(Vec<u64>);

impl PointVector {
    pub fn new(values: Vec<u64>) -> Self {
        PointVector(values)
    }

    pub fn zeros(dimensions: usize) -> Self {
        PointVector(vec![0; dimensions])
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, dimension: usize) -> Option<u64> {
        self.0.get(dimension).copied()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    /// True if every dimension is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0)
    }

    /// True if at least one dimension is strictly positive.
    pub fn is_positive(&self) -> bool {
        !self.is_zero()
    }

    pub fn checked_add(&self, other: &PointVector) -> Result<PointVector, PointsError> {
        self.check_dimensions(other)?;
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a.checked_add(*b).ok_or(PointsError::Overflow))
            .collect::<Result<Vec<_>, _>>()
            .map(PointVector)
    }

    pub fn checked_sub(&self, other: &PointVector) -> Result<PointVector, PointsError> {
        self.check_dimensions(other)?;
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a.checked_sub(*b).ok_or(PointsError::Underflow))
            .collect::<Result<Vec<_>, _>>()
            .map(PointVector)
    }

    /// Returns a copy of this vector with `dimension` set to `value`.
    pub fn with(&self, dimension: usize, value: u64) -> Result<PointVector, PointsError> {
        let mut result = self.clone();
        let slot = result.0.get_mut(dimension).ok_or(PointsError::NoSuchDimension(dimension))?;
        *slot = value;
        Ok(result)
    }

    /// Adds `amount` to a single dimension.
    pub fn add_to(&mut self, dimension: usize, amount: u64) -> Result<(), PointsError> {
        let slot = self.0.get_mut(dimension).ok_or(PointsError::NoSuchDimension(dimension))?;
        *slot = slot.checked_add(amount).ok_or(PointsError::Overflow)?;
        Ok(())
    }

    /// A canonical byte encoding, used when points are bound into commitments and signatures.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + 8 * self.0.len());
        bytes.extend_from_slice(&(self.0.len() as u64).to_le_bytes());
        self.0.iter().for_each(|v| bytes.extend_from_slice(&v.to_le_bytes()));
        bytes
    }

    fn check_dimensions(&self, other: &PointVector) -> Result<(), PointsError> {
        if self.0.len() != other.0.len() {
            return Err(PointsError::DimensionMismatch { expected: self.0.len(), actual: other.0.len() });
        }
        Ok(())
    }
}

impl From<Vec<u64>> for PointVector {
    fn from(values: Vec<u64>) -> Self {
        PointVector(values)
    }
}

impl Display for PointVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values = self.0.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
        write!(f, "[{values}]")
    }
}
