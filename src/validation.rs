//! Small validation helpers shared across the client sub-modules.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExactlyOneError {
    #[error("expected exactly one element, got none")]
    None,

    #[error("expected exactly one element, got {0}")]
    Many(usize),
}

/// Turns a response's `Vec<T>` into a single `T`, for APIs that always
/// target exactly one resource (e.g. a `CreateTopics` request carrying one
/// topic) but whose wire format is an array like any other.
pub trait ExactlyOne<T> {
    fn exactly_one(self) -> Result<T, ExactlyOneError>;
}

impl<T> ExactlyOne<T> for Vec<T> {
    fn exactly_one(mut self) -> Result<T, ExactlyOneError> {
        match self.len() {
            1 => Ok(self.remove(0)),
            0 => Err(ExactlyOneError::None),
            n => Err(ExactlyOneError::Many(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_element() {
        assert_eq!(vec![1].exactly_one().unwrap(), 1);
    }

    #[test]
    fn zero_elements() {
        assert!(matches!(
            Vec::<i32>::new().exactly_one(),
            Err(ExactlyOneError::None)
        ));
    }

    #[test]
    fn many_elements() {
        assert!(matches!(
            vec![1, 2].exactly_one(),
            Err(ExactlyOneError::Many(2))
        ));
    }
}
