//! `key=value` properties file parsing.
//!
//! Lines starting with `#` or `!` are comments. The first `=` or `:`
//! separates key from value; surrounding whitespace is trimmed.

use std::path::PathBuf;

use thiserror::Error;

/// Errors while loading a mapping properties file.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to read mapping file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: expected `key=value`")]
    Syntax { line: usize },

    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
}

/// Parse properties text into ordered `(key, value)` pairs.
pub fn parse(text: &str) -> Result<Vec<(String, String)>, MappingError> {
    let mut entries = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let split = line
            .find(|c: char| c == '=' || c == ':')
            .ok_or(MappingError::Syntax { line: index + 1 })?;
        let key = line[..split].trim();
        if key.is_empty() {
            return Err(MappingError::Syntax { line: index + 1 });
        }
        let value = line[split + 1..].trim();
        entries.push((key.to_string(), value.to_string()));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_trims() {
        let text = "# comment\n! other comment\n\n  http.request.method.get = 1\ncoap.message.media.0:text/plain\n";
        let entries = parse(text).unwrap();
        assert_eq!(
            entries,
            vec![
                ("http.request.method.get".to_string(), "1".to_string()),
                ("coap.message.media.0".to_string(), "text/plain".to_string()),
            ]
        );
    }

    #[test]
    fn value_may_contain_separators() {
        let entries = parse("coap.message.media.50=application/json; charset=UTF-8").unwrap();
        assert_eq!(entries[0].1, "application/json; charset=UTF-8");
    }

    #[test]
    fn line_without_separator_is_an_error() {
        let err = parse("ok=1\nbroken line\n").unwrap_err();
        assert!(matches!(err, MappingError::Syntax { line: 2 }));
    }
}
