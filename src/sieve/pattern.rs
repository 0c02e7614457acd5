use memchr::memchr;

/// Offset of the first occurrence of `needle` in `haystack`.
pub fn find_pattern(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    find_pattern_from(haystack, needle, 0)
}

/// Offset of the first occurrence of `needle` at or after `from`.
pub fn find_pattern_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    let first = needle[0];
    let mut pos = from;
    while pos + needle.len() <= haystack.len() {
        let idx = pos + memchr(first, &haystack[pos..])?;
        if idx + needle.len() > haystack.len() {
            return None;
        }
        if haystack[idx..idx + needle.len()] == needle[..] {
            return Some(idx);
        }
        pos = idx + 1;
    }
    None
}

/// Offsets of every non-overlapping occurrence of `needle`.
pub fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut hits = Vec::new();
    let mut pos = 0usize;
    while let Some(idx) = find_pattern_from(haystack, needle, pos) {
        hits.push(idx);
        pos = idx + needle.len();
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_first_and_all_occurrences() {
        let data = b"xxABCyyABCzzAB";
        assert_eq!(find_pattern(data, b"ABC"), Some(2));
        assert_eq!(find_pattern_from(data, b"ABC", 3), Some(7));
        assert_eq!(find_all(data, b"ABC"), vec![2, 7]);
        assert_eq!(find_pattern(data, b"ABD"), None);
        assert_eq!(find_pattern(b"AB", b"ABC"), None);
    }
}
