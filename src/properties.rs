//! Java `.properties` reading and writing.
//!
//! Implements the line syntax of `java.util.Properties`: `#`/`!` comments,
//! `=`, `:` or whitespace separators, backslash line continuations and
//! `\uXXXX` escapes. Output uses the same escaping as `Properties.store`,
//! without the timestamp comment so that results are reproducible.

/// An insertion-ordered property set.
///
/// # Example
///
/// ```
/// use jarcloak::properties::Properties;
///
/// let props = Properties::parse(b"a.b = one,\\\n    two\n# comment\nc:three\n");
/// assert_eq!(props.get("a.b"), Some("one,two"));
/// assert_eq!(props.get("c"), Some("three"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: Vec<(String, String)>,
}

impl Properties {
    /// Creates an empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses property file bytes.
    ///
    /// Bytes are decoded as UTF-8 when valid and as ISO-8859-1 otherwise.
    /// A key repeated within one file keeps its first position and its last
    /// value.
    pub fn parse(bytes: &[u8]) -> Self {
        let text = match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
        };
        let mut props = Self::new();
        for line in logical_lines(&text) {
            let (key, value) = split_key_value(&line);
            props.insert(unescape(key), unescape(value));
        }
        props
    }

    /// Returns the value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Inserts or replaces a value, keeping the key's original position.
    ///
    /// Returns the previous value.
    pub fn insert(&mut self, key: String, value: String) -> Option<String> {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the entries with `Properties.store` escaping.
    ///
    /// An optional comment is written as the first line.
    pub fn to_bytes(&self, comment: Option<&str>) -> Vec<u8> {
        let mut out = String::new();
        if let Some(comment) = comment {
            out.push('#');
            out.push_str(&escape(comment, EscapeMode::Comment));
            out.push('\n');
        }
        for (key, value) in &self.entries {
            out.push_str(&escape(key, EscapeMode::Key));
            out.push('=');
            out.push_str(&escape(value, EscapeMode::Value));
            out.push('\n');
        }
        out.into_bytes()
    }
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\x0c')
}

/// Joins continuation lines and drops comments and blank lines.
fn logical_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current: Option<String> = None;

    let text = text.replace("\r\n", "\n");
    for natural in text.split(['\n', '\r']) {
        let trimmed = natural.trim_start_matches(is_whitespace);
        let continues = ends_with_odd_backslashes(trimmed);
        let body = if continues {
            &trimmed[..trimmed.len() - 1]
        } else {
            trimmed
        };

        match current.as_mut() {
            Some(line) => line.push_str(body),
            None => {
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                    continue;
                }
                current = Some(body.to_string());
            }
        }
        if !continues {
            if let Some(line) = current.take() {
                lines.push(line);
            }
        }
    }
    if let Some(line) = current {
        lines.push(line);
    }
    lines
}

fn ends_with_odd_backslashes(s: &str) -> bool {
    s.bytes().rev().take_while(|&b| b == b'\\').count() % 2 == 1
}

/// Splits a logical line at the first unescaped separator.
fn split_key_value(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = i;
                break;
            }
            c if is_whitespace(c) => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..key_end];
    let mut rest = line[key_end..].trim_start_matches(is_whitespace);
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start_matches(is_whitespace);
    }
    (key, rest)
}

/// Resolves backslash escapes.
fn unescape(s: &str) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u16; 2];
            units.extend_from_slice(c.encode_utf16(&mut buf));
            continue;
        }
        let Some(escaped) = chars.next() else {
            break;
        };
        let unit = match escaped {
            't' => u16::from(b'\t'),
            'n' => u16::from(b'\n'),
            'r' => u16::from(b'\r'),
            'f' => 0x0c,
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                match u16::from_str_radix(&hex, 16) {
                    Ok(unit) if hex.len() == 4 => unit,
                    _ => {
                        log::warn!("malformed \\u escape in properties: \\u{hex}");
                        units.extend(hex.encode_utf16());
                        continue;
                    }
                }
            }
            other => {
                let mut buf = [0u16; 2];
                units.extend_from_slice(other.encode_utf16(&mut buf));
                continue;
            }
        };
        units.push(unit);
    }
    String::from_utf16_lossy(&units)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EscapeMode {
    Key,
    Value,
    Comment,
}

fn escape(s: &str, mode: EscapeMode) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.chars().enumerate() {
        if mode == EscapeMode::Comment {
            match c {
                '\n' | '\r' => out.push_str("\n#"),
                c if is_printable_ascii(c) => out.push(c),
                c => push_unicode_escape(&mut out, c),
            }
            continue;
        }
        match c {
            ' ' if mode == EscapeMode::Key || i == 0 => out.push_str("\\ "),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            '=' | ':' | '#' | '!' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c if is_printable_ascii(c) => out.push(c),
            c => push_unicode_escape(&mut out, c),
        }
    }
    out
}

fn is_printable_ascii(c: char) -> bool {
    (' '..='~').contains(&c)
}

fn push_unicode_escape(out: &mut String, c: char) {
    let mut buf = [0u16; 2];
    for unit in c.encode_utf16(&mut buf) {
        out.push_str(&format!("\\u{unit:04X}"));
    }
}
