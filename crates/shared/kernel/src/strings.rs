//! String helpers for identifiers, query strings and simple text substitution.

use std::borrow::Cow;

#[lithium_derive::lithium_error]
#[derive(PartialEq, Eq)]
pub enum StringError {
    /// A `%` escape was truncated or not followed by two hex digits.
    #[error("Invalid percent escape{}: {message}", format_context(.context))]
    InvalidEscape { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The decoded bytes are not UTF-8.
    #[error("Invalid UTF-8{}: {message}", format_context(.context))]
    InvalidUtf8 { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

/// Splits an identifier into lower-case words.
///
/// Boundaries: any non-alphanumeric character, a lower-case letter or digit followed
/// by an upper-case one (`camelCase`), and the last capital of an acronym followed
/// by a lower-case letter (`HTTPServer` -> `http`, `server`).
fn words(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &ch) in chars.iter().enumerate() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if ch.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| first.to_uppercase().chain(chars).collect())
}

/// `FilterWheel` / `filter-wheel` / `filter wheel` -> `filter_wheel`.
#[must_use]
pub fn to_snake_case(input: &str) -> String {
    words(input).join("_")
}

/// `filter_wheel` -> `filterWheel`.
#[must_use]
pub fn to_camel_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for (i, word) in words(input).iter().enumerate() {
        if i == 0 {
            out.push_str(word);
        } else {
            out.push_str(&capitalize(word));
        }
    }
    out
}

/// `filter_wheel` -> `FilterWheel`.
#[must_use]
pub fn to_pascal_case(input: &str) -> String {
    words(input).iter().map(|w| capitalize(w)).collect()
}

#[must_use]
pub fn has_uppercase(input: &str) -> bool {
    input.chars().any(char::is_uppercase)
}

/// Percent-encodes everything except the unreserved set `A-Z a-z 0-9 - _ . ~`.
#[must_use]
pub fn url_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Decodes `%XX` escapes and `+` as a space.
///
/// # Errors
/// [`StringError::InvalidEscape`] for malformed escapes, [`StringError::InvalidUtf8`]
/// if the decoded bytes are not valid UTF-8.
pub fn url_decode(input: &str) -> Result<String, StringError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3).ok_or_else(|| StringError::InvalidEscape {
                    message: format!("truncated escape at byte {i}").into(),
                    context: None,
                })?;
                let decoded = std::str::from_utf8(hex)
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| StringError::InvalidEscape {
                        message: format!("'%{}' at byte {i}", String::from_utf8_lossy(hex)).into(),
                        context: None,
                    })?;
                out.push(decoded);
                i += 3;
            },
            b'+' => {
                out.push(b' ');
                i += 1;
            },
            other => {
                out.push(other);
                i += 1;
            },
        }
    }

    String::from_utf8(out).map_err(|e| StringError::InvalidUtf8 {
        message: e.to_string().into(),
        context: None,
    })
}

/// Splits on `separator`, trims each piece and drops empty ones.
#[must_use]
pub fn split_trimmed<'a>(input: &'a str, separator: &str) -> Vec<&'a str> {
    input.split(separator).map(str::trim).filter(|s| !s.is_empty()).collect()
}

/// Applies each `(from, to)` replacement in order; empty patterns are skipped.
#[must_use]
pub fn replace_all(input: &str, replacements: &[(&str, &str)]) -> String {
    replacements
        .iter()
        .filter(|(from, _)| !from.is_empty())
        .fold(input.to_owned(), |acc, (from, to)| acc.replace(from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_conversions() {
        assert_eq!(to_snake_case("FilterWheel"), "filter_wheel");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("exposure-time 2"), "exposure_time_2");
        assert_eq!(to_snake_case("ccdTemp2Value"), "ccd_temp2_value");
        assert_eq!(to_camel_case("filter_wheel"), "filterWheel");
        assert_eq!(to_camel_case("Target RA"), "targetRa");
        assert_eq!(to_pascal_case("plate-solver"), "PlateSolver");
        assert_eq!(to_pascal_case(""), "");
    }

    #[test]
    fn uppercase_detection() {
        assert!(has_uppercase("mainCamera"));
        assert!(!has_uppercase("main_camera"));
    }

    #[test]
    fn url_round_trip() {
        let raw = "M 31/Andromeda ~ α";
        let encoded = url_encode(raw);
        assert_eq!(encoded, "M%2031%2FAndromeda%20~%20%CE%B1");
        assert_eq!(url_decode(&encoded).unwrap(), raw);
        assert_eq!(url_decode("a+b").unwrap(), "a b");
    }

    #[test]
    fn url_decode_errors() {
        assert!(matches!(url_decode("100%"), Err(StringError::InvalidEscape { .. })));
        assert!(matches!(url_decode("%zz"), Err(StringError::InvalidEscape { .. })));
        assert!(matches!(url_decode("%FF"), Err(StringError::InvalidUtf8 { .. })));
    }

    #[test]
    fn splitting_and_replacing() {
        assert_eq!(split_trimmed(" a, b ,,c ", ","), vec!["a", "b", "c"]);
        assert!(split_trimmed("  ", ",").is_empty());
        assert_eq!(replace_all("RA {ra} DEC {dec}", &[("{ra}", "10h"), ("{dec}", "41d"), ("", "x")]), "RA 10h DEC 41d");
    }
}
