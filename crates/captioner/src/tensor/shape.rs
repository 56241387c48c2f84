use crate::error::{CaptionError, Result};

/// Checks a tensor's dimensions against an expected layout.
///
/// `None` entries in `expected` accept any size on that axis; the rank must
/// match exactly.
pub(crate) fn expect_dims(
    op: &'static str,
    actual: &[usize],
    expected: &[Option<usize>],
) -> Result<()> {
    let matches = actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .all(|(size, want)| want.is_none_or(|want| want == *size));

    if matches {
        return Ok(());
    }

    Err(CaptionError::ShapeMismatch {
        op,
        expected: describe(expected),
        actual: actual.to_vec(),
    })
}

/// Rejects any id outside `0..vocab_size`.
pub(crate) fn check_token_ids<I>(ids: I, vocab_size: usize) -> Result<()>
where
    I: IntoIterator<Item = i64>,
{
    for id in ids {
        if id < 0 || id as u64 >= vocab_size as u64 {
            return Err(CaptionError::InvalidTokenId { id, vocab_size });
        }
    }
    Ok(())
}

fn describe(expected: &[Option<usize>]) -> String {
    let axes: Vec<String> = expected
        .iter()
        .map(|axis| match axis {
            Some(size) => size.to_string(),
            None => "_".to_string(),
        })
        .collect();
    format!("({})", axes.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expect_dims_accepts_wildcards() {
        assert!(expect_dims("op", &[4, 7, 10], &[None, None, Some(10)]).is_ok());
    }

    #[test]
    fn test_expect_dims_rejects_rank_change() {
        let err = expect_dims("encode", &[4, 10], &[None, None, Some(10)]).unwrap_err();
        match err {
            CaptionError::ShapeMismatch { op, expected, actual } => {
                assert_eq!(op, "encode");
                assert_eq!(expected, "(_, _, 10)");
                assert_eq!(actual, vec![4, 10]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_check_token_ids_bounds() {
        assert!(check_token_ids([0, 3, 4], 5).is_ok());
        assert!(matches!(
            check_token_ids([0, 5], 5),
            Err(CaptionError::InvalidTokenId { id: 5, vocab_size: 5 })
        ));
        assert!(matches!(
            check_token_ids([-1], 5),
            Err(CaptionError::InvalidTokenId { id: -1, .. })
        ));
    }
}
