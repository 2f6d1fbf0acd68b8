//! Text form cursor and export helpers
//!
//! Values nested inside containers and structs are written "delimited":
//! strings are quoted so that `,` `(` `)` and `=` inside them do not end the
//! value. Top-level values are written bare, unless surrounding whitespace,
//! a leading quote or a line break would not survive the trip back.

use bitflags::bitflags;
use propsys_engine::EngineServices;

use crate::error::ImportError;

/// Characters that end an unquoted token
const DELIMITERS: &[char] = &[',', '(', ')', '=', '"'];

bitflags! {
    /// Options for text import and export
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PortFlags: u32 {
        /// Value is nested inside a container or struct
        const DELIMITED = 1 << 0;
    }
}

/// Everything a property needs to convert values to and from text or bytes
#[derive(Clone, Copy)]
pub struct PortContext<'a> {
    pub services: &'a EngineServices,
    pub flags: PortFlags,
}

impl<'a> PortContext<'a> {
    pub fn new(services: &'a EngineServices) -> Self {
        Self {
            services,
            flags: PortFlags::empty(),
        }
    }

    /// Same context, for values nested inside a container or struct
    pub fn delimited(self) -> Self {
        Self {
            flags: self.flags | PortFlags::DELIMITED,
            ..self
        }
    }

    #[inline]
    pub fn is_delimited(&self) -> bool {
        self.flags.contains(PortFlags::DELIMITED)
    }
}

/// Check if a string must be quoted to survive as a delimited token
pub fn needs_quotes(text: &str) -> bool {
    text.is_empty()
        || text
            .chars()
            .any(|c| c.is_whitespace() || DELIMITERS.contains(&c) || c == '\\')
}

/// Check if a top-level string must be quoted to read back unchanged
///
/// Bare import skips leading whitespace, trims the end and takes a leading
/// `"` as the start of a quoted string. Line breaks would end an ini value.
pub fn needs_quotes_bare(text: &str) -> bool {
    text.starts_with('"') || text.trim() != text || text.contains(['\n', '\r'])
}

/// Append a string value, quoting it only when its text form requires it
pub fn write_string(text: &str, out: &mut String, cx: &PortContext<'_>) {
    let quote = if cx.is_delimited() {
        needs_quotes(text)
    } else {
        needs_quotes_bare(text)
    };
    if quote {
        write_quoted(text, out);
    } else {
        out.push_str(text);
    }
}

/// Append `text` as a quoted string with `\` escapes
pub fn write_quoted(text: &str, out: &mut String) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Position-tracking reader over import text
#[derive(Debug, Clone)]
pub struct TextCursor<'t> {
    text: &'t str,
    pos: usize,
}

impl<'t> TextCursor<'t> {
    pub fn new(text: &'t str) -> Self {
        Self { text, pos: 0 }
    }

    /// Byte position reached
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Unconsumed text
    #[inline]
    pub fn rest(&self) -> &'t str {
        &self.text[self.pos..]
    }

    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Consume `c` if it is the next non-whitespace character
    pub fn eat(&mut self, c: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    /// Consume `c` or fail
    pub fn expect(&mut self, c: char) -> Result<(), ImportError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", c)))
        }
    }

    /// Read an unquoted token, stopping at whitespace or a delimiter
    pub fn read_token(&mut self) -> Result<&'t str, ImportError> {
        self.skip_whitespace();
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_whitespace() || DELIMITERS.contains(&c))
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(self.error("expected a value"));
        }
        self.pos += end;
        Ok(&rest[..end])
    }

    /// Read a `"quoted"` string, resolving escapes
    pub fn read_quoted(&mut self) -> Result<String, ImportError> {
        self.expect('"')?;
        let mut value = String::new();
        let mut chars = self.rest().char_indices();

        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(value);
                }
                '\\' => {
                    let escaped = match chars.next() {
                        Some((_, 'n')) => '\n',
                        Some((_, 'r')) => '\r',
                        Some((_, 't')) => '\t',
                        Some((_, other)) => other,
                        None => break,
                    };
                    value.push(escaped);
                }
                c => value.push(c),
            }
        }

        self.pos = self.text.len();
        Err(self.error("unterminated string"))
    }

    /// Read a string value
    ///
    /// Quoted text is always accepted. Otherwise a delimited value is a single
    /// token, and a bare value is the rest of the input.
    pub fn read_string_value(&mut self, delimited: bool) -> Result<String, ImportError> {
        self.skip_whitespace();
        if self.peek() == Some('"') {
            return self.read_quoted();
        }
        if delimited {
            return self.read_token().map(str::to_string);
        }
        let rest = self.rest();
        self.pos = self.text.len();
        Ok(rest.trim_end().to_string())
    }

    /// Fail unless only whitespace remains
    pub fn finish(&mut self) -> Result<(), ImportError> {
        self.skip_whitespace();
        if self.is_at_end() {
            Ok(())
        } else {
            Err(self.error(format!("unexpected trailing text '{}'", self.rest())))
        }
    }

    /// Build an error at the current position
    pub fn error(&self, message: impl Into<String>) -> ImportError {
        ImportError::new(self.pos, message)
    }
}
