// ── Token cursor for positional snapshot lines ──

/// Walks a single snapshot line token by token.
///
/// Tokens are either whitespace-delimited words or parenthesized
/// blocks. Every accessor skips leading whitespace first.
pub(crate) struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(line: &'a str) -> Self {
        Self { rest: line.trim() }
    }

    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    pub(crate) fn at_paren(&mut self) -> bool {
        self.skip_ws();
        self.rest.starts_with('(')
    }

    /// Next whitespace-delimited word, or `None` at end of line.
    pub(crate) fn word(&mut self) -> Option<&'a str> {
        self.skip_ws();
        if self.rest.is_empty() {
            return None;
        }
        let end = self
            .rest
            .find(char::is_whitespace)
            .unwrap_or(self.rest.len());
        let (word, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(word)
    }

    /// Consume the given words in order. Returns `false` (leaving the
    /// cursor partially advanced) on the first mismatch.
    pub(crate) fn expect_words(&mut self, words: &[&str]) -> bool {
        words.iter().all(|expected| self.word() == Some(*expected))
    }

    /// Content of the next parenthesized block, honouring nesting.
    pub(crate) fn paren(&mut self) -> Option<&'a str> {
        self.skip_ws();
        let body = self.rest.strip_prefix('(')?;
        let mut depth = 1usize;
        for (idx, ch) in body.char_indices() {
            match ch {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let content = &body[..idx];
                        self.rest = &body[idx + 1..];
                        return Some(content);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Everything up to (not including) the next `(` or end of line.
    pub(crate) fn until_paren(&mut self) -> &'a str {
        self.skip_ws();
        let end = self.rest.find('(').unwrap_or(self.rest.len());
        let (head, rest) = self.rest.split_at(end);
        self.rest = rest;
        head.trim_end()
    }

    /// Remaining text, trimmed. Consumes the cursor.
    pub(crate) fn remainder(self) -> &'a str {
        self.rest.trim()
    }
}
