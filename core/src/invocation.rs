//! The ingestion record flowing from a socket line to a procedure call
//!
//! One [`Invocation`] is built per received line and consumed immediately by
//! the adapter call; nothing retains it afterwards. The raw line is kept as
//! [`Bytes`] so cloning an invocation (for callbacks or logging) never copies
//! the payload.
//!
//! # Record format
//!
//! Lines are comma-delimited text. A field may be wrapped in double quotes,
//! in which case it can contain commas and newlines are already excluded by
//! the line framing; an embedded quote is written as `""`. Whitespace around
//! unquoted fields is trimmed, quoted fields are taken verbatim.

use bytes::Bytes;
use smallvec::SmallVec;
use thiserror::Error;

/// Parsed field storage - inline up to 8 fields, the common row width
pub type Fields = SmallVec<[String; 8]>;

/// Error raised for a record that cannot be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    /// A quoted field was opened but never closed before end of line
    #[error("unterminated quoted field starting at byte {0}")]
    UnterminatedQuote(usize),
}

/// One ingestion record bound for a stored procedure
///
/// # Example
///
/// ```
/// use virta_core::Invocation;
///
/// let inv = Invocation::parse("INSERT_KV", "abc,123".to_string()).unwrap();
/// assert_eq!(inv.procedure(), "INSERT_KV");
/// assert_eq!(inv.fields(), &["abc", "123"]);
/// ```
#[derive(Debug, Clone)]
pub struct Invocation {
    procedure: String,
    raw: Bytes,
    fields: Fields,
}

impl Invocation {
    /// Parse a raw line into an invocation for the given procedure
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError`] when the line is not a valid delimited
    /// record (currently only an unterminated quoted field).
    pub fn parse(procedure: impl Into<String>, line: String) -> Result<Self, InvocationError> {
        let fields = parse_fields(&line)?;
        Ok(Self {
            procedure: procedure.into(),
            raw: Bytes::from(line),
            fields,
        })
    }

    /// Target procedure name
    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    /// The raw line as received, without the trailing newline
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Parsed fields, in the order they appeared on the line
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// Split a delimited line into its fields
///
/// Comma delimiter, double-quote quoting with `""` escape, whitespace around
/// unquoted fields trimmed. An empty line yields a single empty field, same
/// as a lone comma yields two.
fn parse_fields(line: &str) -> Result<Fields, InvocationError> {
    let mut fields = Fields::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut was_quoted = false;
    let mut quote_start = 0;
    let mut chars = line.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '"' if !in_quotes && !was_quoted && current.trim().is_empty() => {
                // opening quote: discard any leading whitespace
                current.clear();
                in_quotes = true;
                was_quoted = true;
                quote_start = pos;
            }
            '"' if in_quotes => {
                if matches!(chars.peek(), Some((_, '"'))) {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            ',' if !in_quotes => {
                fields.push(finish_field(current, was_quoted));
                current = String::new();
                was_quoted = false;
            }
            _ => current.push(ch),
        }
    }

    if in_quotes {
        return Err(InvocationError::UnterminatedQuote(quote_start));
    }
    fields.push(finish_field(current, was_quoted));
    Ok(fields)
}

fn finish_field(value: String, was_quoted: bool) -> String {
    if was_quoted {
        value
    } else {
        value.trim().to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_fields_in_order() {
        let inv = Invocation::parse("INSERT_KV", "abc,123".to_string()).unwrap();
        assert_eq!(inv.procedure(), "INSERT_KV");
        assert_eq!(inv.fields(), &["abc", "123"]);
        assert_eq!(inv.raw().as_ref(), b"abc,123");
    }

    #[test]
    fn trims_whitespace_around_unquoted_fields() {
        let inv = Invocation::parse("P", "  abc , 123  ,x".to_string()).unwrap();
        assert_eq!(inv.fields(), &["abc", "123", "x"]);
    }

    #[test]
    fn quoted_field_keeps_commas_and_spaces() {
        let inv = Invocation::parse("P", r#""a, b ",c"#.to_string()).unwrap();
        assert_eq!(inv.fields(), &["a, b ", "c"]);
    }

    #[test]
    fn doubled_quote_is_an_escape() {
        let inv = Invocation::parse("P", r#""say ""hi""",x"#.to_string()).unwrap();
        assert_eq!(inv.fields(), &[r#"say "hi""#, "x"]);
    }

    #[test]
    fn empty_fields_are_preserved() {
        let inv = Invocation::parse("P", "a,,".to_string()).unwrap();
        assert_eq!(inv.fields(), &["a", "", ""]);
    }

    #[test]
    fn single_field_line() {
        let inv = Invocation::parse("P", "only".to_string()).unwrap();
        assert_eq!(inv.fields(), &["only"]);
    }

    #[test]
    fn unterminated_quote_is_rejected() {
        let err = Invocation::parse("P", r#"a,"oops"#.to_string()).unwrap_err();
        assert_eq!(err, InvocationError::UnterminatedQuote(2));
    }

    #[test]
    fn clone_shares_raw_bytes() {
        let inv = Invocation::parse("P", "abc,123".to_string()).unwrap();
        let cloned = inv.clone();
        assert_eq!(inv.raw().as_ptr(), cloned.raw().as_ptr());
    }
}
