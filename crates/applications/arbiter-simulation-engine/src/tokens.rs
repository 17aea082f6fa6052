//! Whitespace-token reader shared by the test loader and the line protocol

use std::collections::VecDeque;
use std::io::BufRead;

use arbiter_core::{ArbiterError, Result};

/// Reads whitespace-separated tokens a line at a time
///
/// Lines are pulled from the underlying reader only when the buffered
/// tokens run out, so an interactive peer is never read ahead of the
/// current line.
pub struct TokenReader<R> {
    reader: R,
    pending: VecDeque<String>,
}

impl<R: BufRead> TokenReader<R> {
    pub fn new(reader: R) -> Self {
        TokenReader {
            reader,
            pending: VecDeque::new(),
        }
    }

    /// Next token, or `None` at end of stream
    pub fn next_token(&mut self) -> Result<Option<String>> {
        while self.pending.is_empty() {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.pending
                .extend(line.split_whitespace().map(str::to_string));
        }
        Ok(self.pending.pop_front())
    }

    /// Next token parsed as an integer, or `None` at end of stream
    ///
    /// A token that is not an integer is returned as `Err(token)` so the
    /// caller decides how fatal it is.
    pub fn next_int(&mut self) -> Result<Option<std::result::Result<i64, String>>> {
        Ok(self
            .next_token()?
            .map(|token| token.parse::<i64>().map_err(|_| token)))
    }

    /// Next integer where end of stream or garbage is a load error
    pub fn expect_int(&mut self, what: &str) -> Result<i64> {
        match self.next_int()? {
            Some(Ok(value)) => Ok(value),
            Some(Err(token)) => Err(ArbiterError::load(format!(
                "expected integer {what}, found {token:?}"
            ))),
            None => Err(ArbiterError::load(format!(
                "unexpected end of input, expected {what}"
            ))),
        }
    }

    /// Next token where end of stream is a load error
    pub fn expect_token(&mut self, what: &str) -> Result<String> {
        self.next_token()?.ok_or_else(|| {
            ArbiterError::load(format!("unexpected end of input, expected {what}"))
        })
    }

    /// True once no further token can be read
    pub fn at_end(&mut self) -> Result<bool> {
        if !self.pending.is_empty() {
            return Ok(false);
        }
        match self.next_token()? {
            Some(token) => {
                self.pending.push_front(token);
                Ok(false)
            }
            None => Ok(true),
        }
    }
}
