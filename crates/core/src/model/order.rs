use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OrderError {
    #[error("order is not a permutation of 0..{len}")]
    NotPermutation { len: usize },

    #[error("order covers {order} questions but {expected} were expected")]
    LengthMismatch { order: usize, expected: usize },
}

/// Per-attempt question ordering.
///
/// Stores the presented → canonical mapping together with its inverse so both
/// directions are O(1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionOrder {
    presented_to_canonical: Vec<usize>,
    canonical_to_presented: Vec<usize>,
}

impl QuestionOrder {
    /// Questions presented in authored order.
    #[must_use]
    pub fn identity(len: usize) -> Self {
        let order: Vec<usize> = (0..len).collect();
        Self {
            canonical_to_presented: order.clone(),
            presented_to_canonical: order,
        }
    }

    /// Uniformly shuffled order (Fisher–Yates via `SliceRandom::shuffle`).
    pub fn shuffled<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        let mut order: Vec<usize> = (0..len).collect();
        order.as_mut_slice().shuffle(rng);
        let canonical_to_presented = invert(&order);
        Self {
            presented_to_canonical: order,
            canonical_to_presented,
        }
    }

    /// Rebuild an order from a presented → canonical mapping.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotPermutation` if any index is repeated or out of range.
    pub fn from_presented(order: Vec<usize>) -> Result<Self, OrderError> {
        let len = order.len();
        let mut seen = vec![false; len];
        for &idx in &order {
            match seen.get_mut(idx) {
                Some(slot) if !*slot => *slot = true,
                _ => return Err(OrderError::NotPermutation { len }),
            }
        }
        let canonical_to_presented = invert(&order);
        Ok(Self {
            presented_to_canonical: order,
            canonical_to_presented,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.presented_to_canonical.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.presented_to_canonical.is_empty()
    }

    /// Canonical question index shown at `presented` position.
    #[must_use]
    pub fn canonical_index(&self, presented: usize) -> Option<usize> {
        self.presented_to_canonical.get(presented).copied()
    }

    /// Position at which canonical question `canonical` is shown.
    #[must_use]
    pub fn presented_index(&self, canonical: usize) -> Option<usize> {
        self.canonical_to_presented.get(canonical).copied()
    }

    #[must_use]
    pub fn presented_to_canonical(&self) -> &[usize] {
        &self.presented_to_canonical
    }
}

fn invert(order: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0; order.len()];
    for (presented, &canonical) in order.iter().enumerate() {
        inverse[canonical] = presented;
    }
    inverse
}
