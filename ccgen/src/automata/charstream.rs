//! Character input for the reference scanner.
//!
//! Input text is read as UTF-16 code units, the unit the generated token
//! managers work in. Each unit is tagged with the line and column a
//! generated `SimpleCharStream` would report for it: columns count from 1,
//! `\r`, `\n` and `\r\n` each end a line, and a tab advances the column to
//! the next multiple of the tab size.
//!
//! With `java_unicode_escape` set, [`JavaEscapeReader`] additionally
//! decodes `\uXXXX` sequences the way `JavaCharStream` does.

use super::literal::utf16;
use crate::error::GenerateError;

const BACKSLASH: u32 = '\\' as u32;
const LOWER_U: u32 = 'u' as u32;

/// One input unit with its source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceChar {
    pub c: u32,
    pub line: u32,
    pub column: u32,
}

/// Line and column bookkeeping shared by both readers.
#[derive(Debug, Clone)]
struct Position {
    line: u32,
    column: u32,
    prev_cr: bool,
    prev_lf: bool,
    tab_size: u32,
}

impl Position {
    fn new(tab_size: u32) -> Self {
        Position {
            line: 1,
            column: 0,
            prev_cr: false,
            prev_lf: false,
            tab_size: tab_size.max(1),
        }
    }

    fn update(&mut self, c: u32) {
        self.column += 1;
        if self.prev_lf {
            self.prev_lf = false;
            self.line += 1;
            self.column = 1;
        } else if self.prev_cr {
            self.prev_cr = false;
            if c == '\n' as u32 {
                self.prev_lf = true;
            } else {
                self.line += 1;
                self.column = 1;
            }
        }
        match char::from_u32(c) {
            Some('\r') => self.prev_cr = true,
            Some('\n') => self.prev_lf = true,
            Some('\t') => {
                self.column -= 1;
                self.column += self.tab_size - (self.column % self.tab_size);
            }
            _ => {}
        }
    }

    fn tag(&self, c: u32) -> SourceChar {
        SourceChar { c, line: self.line, column: self.column }
    }
}

/// Decodes `\uXXXX` escapes while tracking positions.
///
/// A backslash starts an escape only when it ends an odd-length run of
/// backslashes and is followed by one or more `u`s; every other backslash
/// is an ordinary character. The decoded unit takes the position of its
/// backslash.
pub struct JavaEscapeReader {
    input: Vec<u32>,
    next: usize,
    pos: Position,
    pending: Vec<SourceChar>,
}

impl JavaEscapeReader {
    pub fn new(text: &str, tab_size: u32) -> Self {
        JavaEscapeReader {
            input: utf16(text),
            next: 0,
            pos: Position::new(tab_size),
            pending: Vec::new(),
        }
    }

    fn raw(&mut self) -> Option<u32> {
        let c = self.input.get(self.next).copied()?;
        self.next += 1;
        Some(c)
    }

    fn invalid(&self) -> GenerateError {
        GenerateError::InvalidEscape { line: self.pos.line, column: self.pos.column }
    }

    fn hex_value(&self, c: Option<u32>) -> Result<u32, GenerateError> {
        c.and_then(char::from_u32)
            .and_then(|ch| ch.to_digit(16))
            .ok_or_else(|| self.invalid())
    }

    /// Next decoded unit, `None` at end of input.
    pub fn read_char(&mut self) -> Result<Option<SourceChar>, GenerateError> {
        if !self.pending.is_empty() {
            return Ok(Some(self.pending.remove(0)));
        }
        let Some(c) = self.raw() else { return Ok(None) };
        self.pos.update(c);
        if c != BACKSLASH {
            return Ok(Some(self.pos.tag(c)));
        }

        let mut run = vec![self.pos.tag(c)];
        loop {
            match self.input.get(self.next).copied() {
                Some(BACKSLASH) => {
                    self.next += 1;
                    self.pos.update(BACKSLASH);
                    run.push(self.pos.tag(BACKSLASH));
                }
                Some(LOWER_U) if run.len() % 2 == 1 => break,
                _ => {
                    let first = run.remove(0);
                    self.pending = run;
                    return Ok(Some(first));
                }
            }
        }

        // An odd run followed by 'u': the last backslash opens an escape.
        let escape_at = run.pop().unwrap_or_else(|| self.pos.tag(BACKSLASH));
        self.next += 1;
        self.pos.update(LOWER_U);
        let mut c = self.raw();
        while c == Some(LOWER_U) {
            self.pos.column += 1;
            c = self.raw();
        }
        let mut value = self.hex_value(c)? << 12;
        for shift in [8, 4, 0] {
            let digit = self.raw();
            value |= self.hex_value(digit)? << shift;
        }
        self.pos.column += 4;

        let decoded = SourceChar { c: value, ..escape_at };
        if run.is_empty() {
            return Ok(Some(decoded));
        }
        let first = run.remove(0);
        run.push(decoded);
        self.pending = run;
        Ok(Some(first))
    }
}

/// Read all of `text` into positioned units.
pub fn decode(text: &str, tab_size: u32, java_unicode_escape: bool) -> Result<Vec<SourceChar>, GenerateError> {
    if java_unicode_escape {
        let mut reader = JavaEscapeReader::new(text, tab_size);
        let mut out = Vec::new();
        while let Some(c) = reader.read_char()? {
            out.push(c);
        }
        return Ok(out);
    }
    let mut pos = Position::new(tab_size);
    Ok(utf16(text)
        .into_iter()
        .map(|c| {
            pos.update(c);
            pos.tag(c)
        })
        .collect())
}

/// Buffered input with token-start marking and backup.
#[derive(Debug, Clone)]
pub struct CharStream {
    chars: Vec<SourceChar>,
    next: usize,
    token_begin: usize,
}

impl CharStream {
    pub fn new(text: &str, tab_size: u32, java_unicode_escape: bool) -> Result<Self, GenerateError> {
        Ok(CharStream {
            chars: decode(text, tab_size, java_unicode_escape)?,
            next: 0,
            token_begin: 0,
        })
    }

    /// Mark the start of a token and read its first unit.
    pub fn begin_token(&mut self) -> Option<u32> {
        self.token_begin = self.next;
        self.read_char()
    }

    pub fn read_char(&mut self) -> Option<u32> {
        let c = self.chars.get(self.next)?.c;
        self.next += 1;
        Some(c)
    }

    /// Push back the last `amount` units read.
    pub fn backup(&mut self, amount: usize) {
        self.next = self.next.saturating_sub(amount).max(self.token_begin);
    }

    /// Index of the next unit to be read.
    pub fn offset(&self) -> usize {
        self.next
    }

    pub fn at_end(&self) -> bool {
        self.next >= self.chars.len()
    }

    /// Units of the current token.
    pub fn image(&self) -> Vec<u32> {
        self.chars[self.token_begin..self.next].iter().map(|c| c.c).collect()
    }

    /// Position of the first unit of the current token (or of end of input).
    pub fn begin(&self) -> (u32, u32) {
        self.position_of(self.token_begin)
    }

    /// Position of the last unit of the current token.
    pub fn end(&self) -> (u32, u32) {
        if self.next > self.token_begin {
            self.position_of(self.next - 1)
        } else {
            self.begin()
        }
    }

    fn position_of(&self, index: usize) -> (u32, u32) {
        match self.chars.get(index).or_else(|| self.chars.last()) {
            Some(c) => (c.line, c.column),
            None => (1, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn positions(chars: &[SourceChar]) -> Vec<(u32, u32)> {
        chars.iter().map(|c| (c.line, c.column)).collect()
    }

    #[test]
    fn test_line_endings() {
        let chars = decode("a\nb\r\nc\rd", 1, false).expect("plain input");
        assert_eq!(
            positions(&chars),
            vec![(1, 1), (1, 2), (2, 1), (2, 2), (2, 3), (3, 1), (3, 2), (4, 1)]
        );
    }

    #[test]
    fn test_tab_expansion() {
        let chars = decode("\tx", 4, false).expect("plain input");
        assert_eq!(positions(&chars), vec![(1, 4), (1, 5)]);
        let chars = decode("ab\tx", 8, false).expect("plain input");
        assert_eq!(chars[3].column, 9);
    }

    #[test]
    fn test_unicode_escape_decoded() {
        let chars = decode("x\\u0041y", 1, true).expect("valid escape");
        let units: Vec<u32> = chars.iter().map(|c| c.c).collect();
        assert_eq!(units, vec!['x' as u32, 'A' as u32, 'y' as u32]);
        assert_eq!(positions(&chars), vec![(1, 1), (1, 2), (1, 8)]);
    }

    #[test]
    fn test_extra_u_and_even_backslashes() {
        let chars = decode("\\uuu00e9", 1, true).expect("valid escape");
        assert_eq!(chars.len(), 1);
        assert_eq!(chars[0].c, 0xe9);

        let chars = decode("\\\\u0041", 1, true).expect("escaped backslash");
        let units: Vec<u32> = chars.iter().map(|c| c.c).collect();
        assert_eq!(units, utf16("\\\\u0041"));

        let chars = decode("\\\\\\u0041", 1, true).expect("odd run");
        let units: Vec<u32> = chars.iter().map(|c| c.c).collect();
        assert_eq!(units, vec![BACKSLASH, BACKSLASH, 'A' as u32]);
    }

    #[test]
    fn test_invalid_escape() {
        let err = decode("ab\\u00g1", 1, true).unwrap_err();
        assert!(matches!(err, GenerateError::InvalidEscape { line: 1, .. }));
        assert!(err.to_string().starts_with("Invalid escape character at line 1 column"));
        assert!(decode("\\u12", 1, true).is_err());
        // Without escape decoding the text is taken as is.
        assert_eq!(decode("\\u00g1", 1, false).map(|c| c.len()).ok(), Some(6));
    }

    #[test]
    fn test_backup_and_image() {
        let mut stream = CharStream::new("abc", 1, false).expect("plain input");
        assert_eq!(stream.begin_token(), Some('a' as u32));
        assert_eq!(stream.read_char(), Some('b' as u32));
        assert_eq!(stream.read_char(), Some('c' as u32));
        stream.backup(1);
        assert_eq!(stream.image(), utf16("ab"));
        assert_eq!(stream.begin(), (1, 1));
        assert_eq!(stream.end(), (1, 2));
        assert_eq!(stream.begin_token(), Some('c' as u32));
        assert_eq!(stream.read_char(), None);
        assert!(stream.at_end());
    }
}
