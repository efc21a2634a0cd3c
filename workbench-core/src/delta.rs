//! Applying editor deltas to buffer content.
//!
//! Deltas are relayed verbatim between peers and applied in receipt order;
//! nothing here merges or transforms them. Offsets are UTF-16 code units, the
//! unit the editor reports, so they are mapped to byte indices before slicing.

use crate::error::CoreError;
use crate::types::Delta;

/// Apply one delta, returning the new content.
pub fn apply(content: &str, delta: &Delta) -> Result<String, CoreError> {
    let out_of_bounds = || CoreError::DeltaOutOfBounds {
        offset: delta.range_offset,
        length: delta.range_length,
        available: utf16_len(content),
    };

    let start = byte_index(content, delta.range_offset).ok_or_else(out_of_bounds)?;
    let end_units = delta
        .range_offset
        .checked_add(delta.range_length)
        .ok_or_else(out_of_bounds)?;
    let end = byte_index(content, end_units).ok_or_else(out_of_bounds)?;

    let mut next = String::with_capacity(content.len() - (end - start) + delta.text.len());
    next.push_str(&content[..start]);
    next.push_str(&delta.text);
    next.push_str(&content[end..]);
    Ok(next)
}

/// Apply a batch in order. Either every delta applies or `content` is left
/// as it was and the first failure is returned.
pub fn apply_all(content: &str, deltas: &[Delta]) -> Result<String, CoreError> {
    let mut next = content.to_owned();
    for delta in deltas {
        next = apply(&next, delta)?;
    }
    Ok(next)
}

/// Length of `content` in UTF-16 code units.
pub fn utf16_len(content: &str) -> usize {
    content.chars().map(char::len_utf16).sum()
}

/// Byte index of the UTF-16 offset `units`, or `None` when it is past the end
/// or falls inside a surrogate pair.
fn byte_index(content: &str, units: usize) -> Option<usize> {
    let mut seen = 0usize;
    for (idx, ch) in content.char_indices() {
        if seen == units {
            return Some(idx);
        }
        seen += ch.len_utf16();
        if seen > units {
            return None;
        }
    }
    (seen == units).then_some(content.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_inserts_build_content() {
        let deltas = [Delta::insert(0, "a"), Delta::insert(1, "b")];
        assert_eq!(apply_all("", &deltas).expect("apply"), "ab");
    }

    #[test]
    fn replace_removes_range() {
        let next = apply("hello world", &Delta::replace(6, 5, "there")).expect("apply");
        assert_eq!(next, "hello there");
    }

    #[test]
    fn delete_at_end() {
        let next = apply("abc", &Delta::replace(2, 1, "")).expect("apply");
        assert_eq!(next, "ab");
    }

    #[test]
    fn offsets_count_utf16_units() {
        // "é" is one UTF-16 unit but two bytes; the emoji is two units.
        let content = "é😀x";
        assert_eq!(utf16_len(content), 4);
        let next = apply(content, &Delta::replace(3, 1, "y")).expect("apply");
        assert_eq!(next, "é😀y");
    }

    #[test]
    fn splitting_a_surrogate_pair_is_rejected() {
        let err = apply("😀", &Delta::insert(1, "x")).unwrap_err();
        assert!(matches!(err, CoreError::DeltaOutOfBounds { .. }), "got: {err}");
    }

    #[test]
    fn out_of_range_batch_leaves_content_untouched() {
        let content = "abc";
        let deltas = [Delta::insert(3, "d"), Delta::replace(10, 1, "")];
        let err = apply_all(content, &deltas).unwrap_err();
        match err {
            CoreError::DeltaOutOfBounds {
                offset, available, ..
            } => {
                assert_eq!(offset, 10);
                assert_eq!(available, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(content, "abc");
    }

    #[test]
    fn overflowing_range_is_rejected() {
        let err = apply_all("abc", &[Delta::replace(1, usize::MAX, "x")]).unwrap_err();
        assert!(matches!(err, CoreError::DeltaOutOfBounds { .. }), "got: {err}");
    }
}
