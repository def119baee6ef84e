use std::str::FromStr;

use crate::error::{InputError, InputResult};

/// Whitespace-separated token stream over a benchmark input file.
///
/// All input formats of the suite are plain numbers separated by spaces and
/// newlines, read in a fixed order. Line numbers are kept for diagnostics.
#[derive(Debug, Clone)]
pub struct Tokens {
    tokens: Vec<(usize, String)>,
    pos: usize,
}

impl Tokens {
    pub fn new(text: &str) -> Self {
        let tokens = text
            .lines()
            .enumerate()
            .flat_map(|(idx, line)| {
                line.split_whitespace()
                    .map(move |tok| (idx + 1, tok.to_string()))
            })
            .collect();
        Self { tokens, pos: 0 }
    }

    /// Parse the next token as `T`, naming the expected field on failure.
    pub fn next<T: FromStr>(&mut self, what: &str) -> InputResult<T> {
        let (line, tok) = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| InputError::Missing(what.to_string()))?;
        let value = tok.parse::<T>().map_err(|_| InputError::Parse {
            line: *line,
            message: format!("expected {} but found '{}'", what, tok),
        })?;
        self.pos += 1;
        Ok(value)
    }

    /// Like [`Tokens::next`], but `None` once the stream is exhausted.
    pub fn next_opt<T: FromStr>(&mut self, what: &str) -> InputResult<Option<T>> {
        if self.is_exhausted() {
            return Ok(None);
        }
        self.next(what).map(Some)
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}
