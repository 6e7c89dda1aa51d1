//! Symbol name normalization.

use crate::core::string_literal::decode_lenient;

const STRIPPED: &[char] = &['(', ')', '[', ']', '{', '}', ' ', '"'];
const REPLACED: &[char] = &['.', '*', '-', ',', ';', ':', '/', '\u{b7}'];

/// Turn a raw runtime name into an identifier the host accepts.
///
/// Invalid UTF-8 is dropped, brackets, quotes and spaces are removed,
/// separators (including the middle dot used in runtime-internal names)
/// become `_`, and whatever is left that is not printable ASCII is dropped.
/// An empty result means there is no usable name.
pub fn sanitize_name(raw: &[u8]) -> String {
    decode_lenient(raw)
        .chars()
        .filter(|c| !STRIPPED.contains(c))
        .map(|c| if REPLACED.contains(&c) { '_' } else { c })
        .filter(|c| c.is_ascii_graphic())
        .collect()
}
