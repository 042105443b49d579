use thiserror::Error;

use crate::model::order::{OrderError, QuestionOrder};
use crate::model::question::OPTION_COUNT;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("question {index} does not exist (attempt has {len} questions)")]
    QuestionOutOfRange { index: usize, len: usize },

    #[error("option {0} is out of range")]
    OptionOutOfRange(u8),
}

/// Fixed-length sheet of selected option indexes, in presented order.
///
/// The length is set at creation and never changes; `None` means unanswered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSheet {
    slots: Vec<Option<u8>>,
}

impl AnswerSheet {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    /// Record `option` for the question shown at `presented`.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` if either index is out of range.
    pub fn select(&mut self, presented: usize, option: u8) -> Result<(), AnswerError> {
        if usize::from(option) >= OPTION_COUNT {
            return Err(AnswerError::OptionOutOfRange(option));
        }
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(presented)
            .ok_or(AnswerError::QuestionOutOfRange {
                index: presented,
                len,
            })?;
        *slot = Some(option);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, presented: usize) -> Option<u8> {
        self.slots.get(presented).copied().flatten()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Presented index of the first unanswered question, if any.
    #[must_use]
    pub fn first_unanswered(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.first_unanswered().is_none()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Option<u8>] {
        &self.slots
    }

    /// Remap the sheet from presented order to canonical (authored) order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::LengthMismatch` if `order` was built for a
    /// different number of questions.
    pub fn to_canonical(&self, order: &QuestionOrder) -> Result<Vec<Option<u8>>, OrderError> {
        if order.len() != self.slots.len() {
            return Err(OrderError::LengthMismatch {
                order: order.len(),
                expected: self.slots.len(),
            });
        }
        let mut canonical = vec![None; self.slots.len()];
        for (presented, answer) in self.slots.iter().enumerate() {
            if let Some(target) = order.canonical_index(presented) {
                canonical[target] = *answer;
            }
        }
        Ok(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn select_validates_ranges() {
        let mut sheet = AnswerSheet::new(2);
        assert_eq!(
            sheet.select(2, 0),
            Err(AnswerError::QuestionOutOfRange { index: 2, len: 2 })
        );
        assert_eq!(sheet.select(0, 4), Err(AnswerError::OptionOutOfRange(4)));
        sheet.select(1, 3).unwrap();
        assert_eq!(sheet.get(1), Some(3));
        assert_eq!(sheet.first_unanswered(), Some(0));
    }

    #[test]
    fn canonical_remap_restores_authored_positions() {
        // presented [2, 0, 1]: slot 0 shows canonical question 2, etc.
        let order = QuestionOrder::from_presented(vec![2, 0, 1]).unwrap();
        let mut sheet = AnswerSheet::new(3);
        sheet.select(0, 3).unwrap();
        sheet.select(2, 1).unwrap();

        let canonical = sheet.to_canonical(&order).unwrap();
        assert_eq!(canonical, vec![None, Some(1), Some(3)]);
    }

    #[test]
    fn canonical_remap_matches_per_question_choice_for_random_orders() {
        let mut rng = StdRng::seed_from_u64(99);
        for len in 1..12_usize {
            let order = QuestionOrder::shuffled(len, &mut rng);
            let mut sheet = AnswerSheet::new(len);
            for presented in 0..len {
                let canonical = order.canonical_index(presented).unwrap();
                sheet.select(presented, (canonical % 4) as u8).unwrap();
            }
            let canonical = sheet.to_canonical(&order).unwrap();
            for (idx, answer) in canonical.iter().enumerate() {
                assert_eq!(*answer, Some((idx % 4) as u8));
            }
        }
    }

    #[test]
    fn mismatched_order_is_rejected() {
        let sheet = AnswerSheet::new(3);
        let err = sheet.to_canonical(&QuestionOrder::identity(2)).unwrap_err();
        assert_eq!(err, OrderError::LengthMismatch { order: 2, expected: 3 });
    }
}
