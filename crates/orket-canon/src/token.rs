// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic token encodings for path segments and JSON pointers.

/// Filesystem-safe token for IDs and stems used as path segments.
///
/// Percent-encodes every byte outside `[A-Za-z0-9._~-]` with uppercase hex,
/// producing identical bytes on any OS. Windows forbids `:` in filenames;
/// the encoding sidesteps that.
///
/// # Examples
///
/// ```
/// assert_eq!(orket_canon::fs_token("skill:alpha"), "skill%3Aalpha");
/// assert_eq!(orket_canon::fs_token("run-0001"), "run-0001");
/// ```
#[must_use]
pub fn fs_token(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'~' | b'-' => {
                out.push(byte as char);
            }
            other => {
                out.push('%');
                out.push_str(&format!("{other:02X}"));
            }
        }
    }
    out
}

/// RFC-6901 reference-token escaping: `~` becomes `~0`, `/` becomes `~1`.
#[must_use]
pub fn pointer_token(value: &str) -> String {
    value.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_token_keeps_safe_characters() {
        assert_eq!(fs_token("a-b_c.d~e"), "a-b_c.d~e");
    }

    #[test]
    fn fs_token_encodes_separators_and_percent() {
        assert_eq!(fs_token("a/b"), "a%2Fb");
        assert_eq!(fs_token("a\\b"), "a%5Cb");
        assert_eq!(fs_token("50%"), "50%25");
    }

    #[test]
    fn fs_token_encodes_multibyte_utf8_per_byte() {
        assert_eq!(fs_token("é"), "%C3%A9");
    }

    #[test]
    fn pointer_token_escapes_in_rfc6901_order() {
        assert_eq!(pointer_token("a/b~c"), "a~1b~0c");
        assert_eq!(pointer_token("~1"), "~01");
    }
}
