//! Copy-on-write slice edits.
//!
//! Pure helpers that build a fresh `Vec` around a single edit point,
//! never mutating their input. The HAMT child tables are spliced with
//! these; sharing of the surrounding elements is preserved by cloning
//! cheap handles (the tables hold `Rc`s).

use crate::contract::ContractResult;
use crate::contract_expect;

/// Returns a new vector with `value` inserted at `position`.
///
/// # Errors
///
/// Precondition failure when `position > source.len()`.
pub fn inserted_at<T: Clone>(source: &[T], position: usize, value: T) -> ContractResult<Vec<T>> {
    contract_expect!(position <= source.len());

    let mut destination = Vec::with_capacity(source.len() + 1);
    destination.extend_from_slice(&source[..position]);
    destination.push(value);
    destination.extend_from_slice(&source[position..]);
    Ok(destination)
}

/// Returns a new vector with the element at `position` replaced by `value`.
///
/// # Errors
///
/// Precondition failure when `position >= source.len()`.
pub fn replaced_at<T: Clone>(source: &[T], position: usize, value: T) -> ContractResult<Vec<T>> {
    contract_expect!(position < source.len());

    let mut destination = Vec::with_capacity(source.len());
    destination.extend_from_slice(&source[..position]);
    destination.push(value);
    destination.extend_from_slice(&source[position + 1..]);
    Ok(destination)
}

/// Returns a new vector with the element at `position` removed.
///
/// # Errors
///
/// Precondition failure when `position >= source.len()`.
pub fn erased_at<T: Clone>(source: &[T], position: usize) -> ContractResult<Vec<T>> {
    contract_expect!(position < source.len());

    let mut destination = Vec::with_capacity(source.len() - 1);
    destination.extend_from_slice(&source[..position]);
    destination.extend_from_slice(&source[position + 1..]);
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ContractKind;
    use rstest::rstest;

    #[rstest]
    #[case(0, vec![9, 1, 2, 3])]
    #[case(1, vec![1, 9, 2, 3])]
    #[case(3, vec![1, 2, 3, 9])]
    fn test_inserted_at(#[case] position: usize, #[case] expected: Vec<i32>) {
        let source = vec![1, 2, 3];
        assert_eq!(inserted_at(&source, position, 9), Ok(expected));
        assert_eq!(source, vec![1, 2, 3]);
    }

    #[rstest]
    fn test_inserted_at_out_of_bounds() {
        let violation = inserted_at(&[1, 2, 3], 4, 9).unwrap_err();
        assert_eq!(violation.kind(), ContractKind::Precondition);
    }

    #[rstest]
    #[case(0, vec![9, 2, 3])]
    #[case(2, vec![1, 2, 9])]
    fn test_replaced_at(#[case] position: usize, #[case] expected: Vec<i32>) {
        let source = vec![1, 2, 3];
        assert_eq!(replaced_at(&source, position, 9), Ok(expected));
        assert_eq!(source, vec![1, 2, 3]);
    }

    #[rstest]
    fn test_replaced_at_out_of_bounds() {
        let violation = replaced_at(&[1, 2, 3], 3, 9).unwrap_err();
        assert_eq!(violation.kind(), ContractKind::Precondition);
    }

    #[rstest]
    #[case(0, vec![2, 3])]
    #[case(1, vec![1, 3])]
    #[case(2, vec![1, 2])]
    fn test_erased_at(#[case] position: usize, #[case] expected: Vec<i32>) {
        let source = vec![1, 2, 3];
        assert_eq!(erased_at(&source, position), Ok(expected));
        assert_eq!(source, vec![1, 2, 3]);
    }

    #[rstest]
    fn test_erased_at_out_of_bounds() {
        let violation = erased_at(&[1, 2, 3], 3).unwrap_err();
        assert_eq!(violation.kind(), ContractKind::Precondition);
    }

    #[rstest]
    fn test_erased_at_empty() {
        let violation = erased_at::<i32>(&[], 0).unwrap_err();
        assert_eq!(violation.kind(), ContractKind::Precondition);
    }
}
