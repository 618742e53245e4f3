//! Category palettes and their textual parameter format.
//!
//! Grammar (whitespace allowed between tokens):
//!
//! ```text
//! count:<N>,colors:[{r,g,b,a},{r,g,b,a},...]
//! ```
//!
//! Channels are integers in 0-255 and `N` must equal the number of color tuples.

use std::fmt;

use crate::error::ParseError;

/// Ordered list of RGBA colors, one per category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 4]>,
}

impl Palette {
    /// Build a palette from colors. Returns `EmptyPalette` for an empty list.
    pub fn new(colors: Vec<[u8; 4]>) -> Result<Self, ParseError> {
        if colors.is_empty() {
            return Err(ParseError::EmptyPalette);
        }
        Ok(Self { colors })
    }

    /// Palette from a fixed color table; `N` must be non-zero.
    pub(crate) fn from_table<const N: usize>(table: [[u8; 4]; N]) -> Self {
        debug_assert!(N > 0);
        Self {
            colors: table.to_vec(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, ParseError> {
        Parser::new(input).palette()
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[[u8; 4]] {
        &self.colors
    }

    /// Color of a category; out-of-range ids clamp to the last entry.
    pub fn color(&self, category: usize) -> [u8; 4] {
        self.colors[category.min(self.colors.len() - 1)]
    }
}

impl fmt::Display for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "count:{},colors:[", self.colors.len())?;
        for (i, [r, g, b, a]) in self.colors.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{{{},{},{},{}}}", r, g, b, a)?;
        }
        write!(f, "]")
    }
}

impl std::str::FromStr for Palette {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Palette::parse(s)
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn palette(mut self) -> Result<Palette, ParseError> {
        self.keyword("count")?;
        self.symbol(':')?;
        let count = self.integer()? as usize;
        self.symbol(',')?;
        self.keyword("colors")?;
        self.symbol(':')?;
        self.symbol('[')?;

        let mut colors = Vec::new();
        self.skip_ws();
        if !self.rest().starts_with(']') {
            loop {
                colors.push(self.color()?);
                self.skip_ws();
                if self.rest().starts_with(',') {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.symbol(']')?;

        self.skip_ws();
        if !self.rest().is_empty() {
            return Err(ParseError::TrailingInput {
                rest: self.rest().to_string(),
                position: self.pos,
            });
        }
        if count != colors.len() {
            return Err(ParseError::CountMismatch {
                count,
                colors: colors.len(),
            });
        }
        Palette::new(colors)
    }

    fn color(&mut self) -> Result<[u8; 4], ParseError> {
        self.symbol('{')?;
        let mut out = [0u8; 4];
        for (i, channel) in out.iter_mut().enumerate() {
            if i > 0 {
                self.symbol(',')?;
            }
            self.skip_ws();
            let position = self.pos;
            let value = self.integer()?;
            *channel = u8::try_from(value)
                .map_err(|_| ParseError::ChannelOutOfRange { value, position })?;
        }
        self.symbol('}')?;
        Ok(out)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn found(&self) -> String {
        self.rest()
            .chars()
            .next()
            .map_or_else(|| "end of input".to_string(), |c| format!("`{}`", c))
    }

    fn symbol(&mut self, c: char) -> Result<(), ParseError> {
        self.skip_ws();
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(ParseError::Expected {
                expected: symbol_name(c),
                found: self.found(),
                position: self.pos,
            })
        }
    }

    fn keyword(&mut self, word: &'static str) -> Result<(), ParseError> {
        self.skip_ws();
        if self.rest().starts_with(word) {
            self.pos += word.len();
            Ok(())
        } else {
            Err(ParseError::Expected {
                expected: word,
                found: self.found(),
                position: self.pos,
            })
        }
    }

    fn integer(&mut self) -> Result<u64, ParseError> {
        self.skip_ws();
        let start = self.pos;
        let digits = self.rest().bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            // Consume a sign or stray token so the error names the offending text.
            let text: String = self
                .rest()
                .chars()
                .take_while(|c| !matches!(c, ',' | '}' | ']'))
                .collect();
            if text.is_empty() {
                return Err(ParseError::Expected {
                    expected: "integer",
                    found: self.found(),
                    position: start,
                });
            }
            return Err(ParseError::InvalidNumber { text, position: start });
        }
        self.pos += digits;
        let text = &self.src[start..self.pos];
        text.parse::<u64>().map_err(|_| ParseError::InvalidNumber {
            text: text.to_string(),
            position: start,
        })
    }
}

fn symbol_name(c: char) -> &'static str {
    match c {
        ':' => "`:`",
        ',' => "`,`",
        '[' => "`[`",
        ']' => "`]`",
        '{' => "`{`",
        '}' => "`}`",
        _ => "symbol",
    }
}
