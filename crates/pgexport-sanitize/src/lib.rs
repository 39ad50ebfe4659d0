//! Strips byte sequences PostgreSQL's `jsonb` type rejects from a TSV chunk
//! before it reaches `COPY FROM STDIN` (spec §4.1).
//!
//! Two independent defects are removed:
//! - a literal ` ` escape not itself escaped by a preceding backslash
//!   (jsonb rejects the NUL code point);
//! - an unpaired UTF-16 surrogate escape (`\uD800`-`\uDFFF`), while valid
//!   high/low surrogate *pairs* are left untouched.
//!
//! The sanitizer is stateless per chunk: callers must pass whole `\uXXXX`
//! escape units, never split across a chunk boundary.

const ESCAPE_LEN: usize = 6; // `\uXXXX`

/// Parses a `\uXXXX` escape at byte offset `i`, returning the code point.
fn parse_escape(input: &[u8], i: usize) -> Option<u16> {
    if i + ESCAPE_LEN > input.len() {
        return None;
    }
    if input[i] != b'\\' || input[i + 1] != b'u' {
        return None;
    }
    let hex = std::str::from_utf8(&input[i + 2..i + 6]).ok()?;
    u16::from_str_radix(hex, 16).ok()
}

fn is_high_surrogate(code: u16) -> bool {
    (0xD800..=0xDBFF).contains(&code)
}

fn is_low_surrogate(code: u16) -> bool {
    (0xDC00..=0xDFFF).contains(&code)
}

/// Removes every ` ` escape not preceded by a backslash (which would
/// make it an escaped backslash followed by literal text, not a NUL
/// escape).
fn strip_unescaped_nul(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i..].starts_with(b"\\u0000") && !(i > 0 && input[i - 1] == b'\\') {
            i += ESCAPE_LEN;
            continue;
        }
        out.push(input[i]);
        i += 1;
    }
    out
}

/// Pass 1: drop any high surrogate escape not immediately followed by a
/// valid low surrogate escape; valid pairs are copied through untouched.
fn drop_unpaired_high_surrogates(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if let Some(code) = parse_escape(input, i) {
            if is_high_surrogate(code) {
                if let Some(low) = parse_escape(input, i + ESCAPE_LEN) {
                    if is_low_surrogate(low) {
                        out.extend_from_slice(&input[i..i + 2 * ESCAPE_LEN]);
                        i += 2 * ESCAPE_LEN;
                        continue;
                    }
                }
                i += ESCAPE_LEN;
                continue;
            }
        }
        out.push(input[i]);
        i += 1;
    }
    out
}

/// Pass 2: drop any low surrogate escape that survived pass 1 - these were
/// never preceded by a high surrogate that claimed them as a pair.
fn drop_unpaired_low_surrogates(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if let Some(code) = parse_escape(input, i) {
            if is_low_surrogate(code) {
                i += ESCAPE_LEN;
                continue;
            }
        }
        out.push(input[i]);
        i += 1;
    }
    out
}

/// Sanitizes one chunk of TSV/JSON text bytes for COPY.
pub fn sanitize(input: &[u8]) -> Vec<u8> {
    let without_nul = strip_unescaped_nul(input);
    let without_unpaired_high = drop_unpaired_high_surrogates(&without_nul);
    drop_unpaired_low_surrogates(&without_unpaired_high)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_unescaped_nul() {
        let input = br#"{"k":" x"}"#;
        let out = sanitize(input);
        assert_eq!(out, br#"{"k":"x"}"#);
    }

    #[test]
    fn preserves_already_escaped_nul() {
        let input = br#"{"k":"\\u0000"}"#;
        let out = sanitize(input);
        assert_eq!(out, input);
    }

    #[test]
    fn preserves_valid_surrogate_pair() {
        let input = br#"😀"#;
        assert_eq!(sanitize(input), input);
    }

    #[test]
    fn drops_trailing_unpaired_low_surrogate() {
        let input = br#"😀\uDEAD"#;
        assert_eq!(sanitize(input), br#"😀"#);
    }

    #[test]
    fn drops_lone_high_surrogate() {
        let input = br#"\uD800x"#;
        assert_eq!(sanitize(input), b"x");
    }

    #[test]
    fn scenario_s3() {
        let input = "{\"k\":\"\\u0000\\uD83D\\uDE00\\uDEAD\"}".as_bytes().to_vec();
        let out = sanitize(&input);
        assert_eq!(out, b"{\"k\":\"\\uD83D\\uDE00\"}");
    }

    #[test]
    fn empty_input_is_noop() {
        assert_eq!(sanitize(b""), Vec::<u8>::new());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Builds input out of tokens drawn from a small, escape-heavy alphabet
    /// so generated cases actually exercise the escape-parsing boundaries,
    /// rather than almost-never containing a `\uXXXX` sequence at all.
    fn token() -> impl Strategy<Value = &'static str> {
        prop_oneof![
            Just("\\u0000"),
            Just("\\\\u0000"),
            Just("\\uD800"),
            Just("\\uDBFF"),
            Just("\\uDC00"),
            Just("\\uDFFF"),
            Just("\\uD83D\\uDE00"),
            Just("a"),
            Just("\\"),
            Just("\""),
        ]
    }

    fn has_unescaped_nul(input: &[u8]) -> bool {
        let mut i = 0;
        while i < input.len() {
            if input[i..].starts_with(b"\\u0000") && !(i > 0 && input[i - 1] == b'\\') {
                return true;
            }
            i += 1;
        }
        false
    }

    fn has_unpaired_surrogate(input: &[u8]) -> bool {
        let mut i = 0;
        while i < input.len() {
            if let Some(code) = parse_escape(input, i) {
                if is_high_surrogate(code) {
                    let paired = parse_escape(input, i + ESCAPE_LEN)
                        .map(is_low_surrogate)
                        .unwrap_or(false);
                    if !paired {
                        return true;
                    }
                    i += 2 * ESCAPE_LEN;
                    continue;
                }
                if is_low_surrogate(code) {
                    return true;
                }
            }
            i += 1;
        }
        false
    }

    proptest! {
        #[test]
        fn output_never_contains_unescaped_nul(tokens in proptest::collection::vec(token(), 0..12)) {
            let input = tokens.concat();
            let out = sanitize(input.as_bytes());
            prop_assert!(!has_unescaped_nul(&out));
        }

        #[test]
        fn output_never_contains_unpaired_surrogate(tokens in proptest::collection::vec(token(), 0..12)) {
            let input = tokens.concat();
            let out = sanitize(input.as_bytes());
            prop_assert!(!has_unpaired_surrogate(&out));
        }

        #[test]
        fn already_escaped_nul_is_never_touched(tokens in proptest::collection::vec(token(), 0..12)) {
            let input = tokens.concat();
            let out = sanitize(input.as_bytes());
            let expected_escaped_count = input.matches("\\\\u0000").count();
            let actual_escaped_count = String::from_utf8_lossy(&out).matches("\\\\u0000").count();
            prop_assert_eq!(expected_escaped_count, actual_escaped_count);
        }

        #[test]
        fn sanitizing_twice_is_idempotent(tokens in proptest::collection::vec(token(), 0..12)) {
            let input = tokens.concat();
            let once = sanitize(input.as_bytes());
            let twice = sanitize(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
