use std::mem;

use crate::ast::{TemplatePart, Token, TokenKind};
use crate::error::Error;
use crate::grammar::{Grammar, GrammarElement, Punctuation};
use crate::value::Value;

/// Splits source text into classified tokens.
///
/// The scan is context-sensitive in two places: a `-` directly before
/// digits is absorbed into the number only where the previous token could
/// not have been a left operand, and an identifier whose spelling matches
/// a grammar lexeme (like `in`) is re-classified as that element. Operator
/// lexemes are matched longest-first against the grammar table, so `<=`
/// wins over `<` and user-registered multi-character operators tokenize
/// without lexer changes.
pub struct Lexer<'g> {
    grammar: &'g Grammar,
    chars: Vec<char>,
    position: usize,
    max_lexeme_len: usize,
}

impl<'g> Lexer<'g> {
    pub fn new(grammar: &'g Grammar, input: &str) -> Self {
        Lexer {
            grammar,
            chars: input.chars().collect(),
            position: 0,
            max_lexeme_len: grammar.max_lexeme_len(),
        }
    }

    /// Consume the whole input, producing the token stream.
    pub fn tokenize(mut self) -> Result<Vec<Token>, Error> {
        let mut tokens: Vec<Token> = Vec::new();
        loop {
            let ws_start = self.position;
            self.skip_whitespace();
            let Some(ch) = self.current_char() else { break };
            let kind = match ch {
                '"' | '\'' => self.read_string(ch)?,
                '`' => self.read_template()?,
                c if c.is_ascii_digit() => self.read_number()?,
                '-' if self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
                    && starts_operand(tokens.last()) =>
                {
                    self.read_number()?
                }
                c => {
                    if let Some(kind) = self.try_operator() {
                        kind
                    } else if is_identifier_start(c) {
                        self.read_word()
                    } else {
                        return Err(Error::InvalidToken(c.to_string()));
                    }
                }
            };
            // raw keeps the leading whitespace and original spelling
            let raw: String = self.chars[ws_start..self.position].iter().collect();
            tokens.push(Token::new(kind, raw));
        }
        Ok(tokens)
    }

    fn current_char(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.current_char().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn read_string(&mut self, quote: char) -> Result<TokenKind, Error> {
        self.advance();
        let mut out = String::new();
        loop {
            match self.current_char() {
                None => return Err(Error::UnclosedLiteral("string literal")),
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(TokenKind::Literal(Value::String(out)));
                }
                Some('\\') => {
                    // backslash escapes the next character, whatever it is
                    self.advance();
                    match self.current_char() {
                        Some(c) => {
                            out.push(c);
                            self.advance();
                        }
                        None => return Err(Error::UnclosedLiteral("string literal")),
                    }
                }
                Some(c) => {
                    out.push(c);
                    self.advance();
                }
            }
        }
    }

    fn read_number(&mut self) -> Result<TokenKind, Error> {
        let start = self.position;
        if self.current_char() == Some('-') {
            self.advance();
        }
        while self.current_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.current_char() == Some('.')
            && self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
        {
            self.advance();
            while self.current_char().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text: String = self.chars[start..self.position].iter().collect();
        let n = text
            .parse::<f64>()
            .map_err(|_| Error::InvalidToken(text.clone()))?;
        Ok(TokenKind::Literal(Value::Number(n)))
    }

    fn read_word(&mut self) -> TokenKind {
        let mut word = String::new();
        while let Some(ch) = self.current_char() {
            if is_identifier_char(ch) {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        match word.as_str() {
            "true" => TokenKind::Literal(Value::Bool(true)),
            "false" => TokenKind::Literal(Value::Bool(false)),
            "null" => TokenKind::Literal(Value::Null),
            _ => TokenKind::Identifier(word),
        }
    }

    /// Longest-match scan against the grammar's lexeme table. A lexeme
    /// spelled entirely in identifier characters (like `in`) only matches
    /// at a word boundary, so it never splits a longer identifier.
    fn try_operator(&mut self) -> Option<TokenKind> {
        let remaining = self.chars.len() - self.position;
        let longest = self.max_lexeme_len.min(remaining);
        for len in (1..=longest).rev() {
            let candidate: String = self.chars[self.position..self.position + len]
                .iter()
                .collect();
            if let Some(element) = self.grammar.element(&candidate) {
                let word_shaped = candidate.chars().all(is_identifier_char);
                if word_shaped
                    && self
                        .chars
                        .get(self.position + len)
                        .copied()
                        .is_some_and(is_identifier_char)
                {
                    continue;
                }
                self.position += len;
                return Some(element_kind(&candidate, element));
            }
        }
        None
    }

    fn read_template(&mut self) -> Result<TokenKind, Error> {
        self.advance();
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.current_char() {
                None => return Err(Error::UnclosedLiteral("template literal")),
                Some('`') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    // escapes pass through to the static text verbatim
                    text.push('\\');
                    self.advance();
                    match self.current_char() {
                        Some(c) => {
                            text.push(c);
                            self.advance();
                        }
                        None => return Err(Error::UnclosedLiteral("template literal")),
                    }
                }
                Some('$') if self.peek_char(1) == Some('{') => {
                    if !text.is_empty() {
                        parts.push(TemplatePart::Static(mem::take(&mut text)));
                    }
                    self.advance();
                    self.advance();
                    parts.push(TemplatePart::Interpolation(self.read_interpolation()?));
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }
        if !text.is_empty() {
            parts.push(TemplatePart::Static(text));
        }
        Ok(TokenKind::TemplateString(parts))
    }

    /// Consume interpolation source up to the `}` that balances the
    /// opening `${`. Braces inside quoted strings and nested backtick
    /// spans do not count toward the depth.
    fn read_interpolation(&mut self) -> Result<String, Error> {
        let mut depth = 1usize;
        let mut src = String::new();
        while let Some(ch) = self.current_char() {
            match ch {
                '{' => {
                    depth += 1;
                    src.push(ch);
                    self.advance();
                }
                '}' => {
                    depth -= 1;
                    self.advance();
                    if depth == 0 {
                        return Ok(src);
                    }
                    src.push('}');
                }
                '"' | '\'' | '`' => {
                    self.read_opaque_span(ch, &mut src)?;
                }
                _ => {
                    src.push(ch);
                    self.advance();
                }
            }
        }
        Err(Error::UnclosedLiteral("interpolation"))
    }

    fn read_opaque_span(&mut self, quote: char, src: &mut String) -> Result<(), Error> {
        src.push(quote);
        self.advance();
        loop {
            match self.current_char() {
                None => return Err(Error::UnclosedLiteral("interpolation")),
                Some('\\') => {
                    src.push('\\');
                    self.advance();
                    if let Some(c) = self.current_char() {
                        src.push(c);
                        self.advance();
                    }
                }
                Some(c) if c == quote => {
                    src.push(c);
                    self.advance();
                    return Ok(());
                }
                Some(c) => {
                    src.push(c);
                    self.advance();
                }
            }
        }
    }
}

/// True when a `-` after this token begins a new operand, so a following
/// digit run lexes as a negative number rather than a subtraction.
fn starts_operand(prev: Option<&Token>) -> bool {
    match prev {
        None => true,
        Some(t) => matches!(
            t.kind,
            TokenKind::BinaryOp(_)
                | TokenKind::UnaryOp(_)
                | TokenKind::OpenParen
                | TokenKind::OpenBracket
                | TokenKind::OpenCurl
                | TokenKind::Comma
                | TokenKind::Colon
                | TokenKind::Question
                | TokenKind::Semicolon
        ),
    }
}

fn element_kind(lexeme: &str, element: &GrammarElement) -> TokenKind {
    match element {
        GrammarElement::Punctuation(p) => punctuation_kind(*p),
        GrammarElement::UnaryOp { .. } => TokenKind::UnaryOp(lexeme.to_string()),
        GrammarElement::BinaryOp { .. } => TokenKind::BinaryOp(lexeme.to_string()),
    }
}

fn punctuation_kind(p: Punctuation) -> TokenKind {
    match p {
        Punctuation::Dot => TokenKind::Dot,
        Punctuation::OpenBracket => TokenKind::OpenBracket,
        Punctuation::CloseBracket => TokenKind::CloseBracket,
        Punctuation::Pipe => TokenKind::Pipe,
        Punctuation::OpenCurl => TokenKind::OpenCurl,
        Punctuation::CloseCurl => TokenKind::CloseCurl,
        Punctuation::Colon => TokenKind::Colon,
        Punctuation::Comma => TokenKind::Comma,
        Punctuation::OpenParen => TokenKind::OpenParen,
        Punctuation::CloseParen => TokenKind::CloseParen,
        Punctuation::Question => TokenKind::Question,
        Punctuation::Semicolon => TokenKind::Semicolon,
    }
}

/// Identifiers start with `$`, `_`, an ASCII letter, or a letter from the
/// Latin-1 Supplement or Cyrillic ranges; digits may follow.
fn is_identifier_start(ch: char) -> bool {
    ch == '$'
        || ch == '_'
        || ch.is_ascii_alphabetic()
        || ('\u{00C0}'..='\u{00FF}').contains(&ch)
        || ('\u{0400}'..='\u{04FF}').contains(&ch)
}

fn is_identifier_char(ch: char) -> bool {
    is_identifier_start(ch) || ch.is_ascii_digit()
}

#[test]
fn test_keyword_reclassification() {
    let grammar = Grammar::default();
    let tokens = Lexer::new(&grammar, "foo in bar").tokenize().unwrap();
    assert_eq!(tokens[0].kind, TokenKind::Identifier("foo".to_string()));
    assert_eq!(tokens[1].kind, TokenKind::BinaryOp("in".to_string()));
    assert_eq!(tokens[2].kind, TokenKind::Identifier("bar".to_string()));
}

#[test]
fn test_minus_context() {
    let grammar = Grammar::default();
    let tokens = Lexer::new(&grammar, "5 - 3").tokenize().unwrap();
    assert_eq!(tokens[1].kind, TokenKind::BinaryOp("-".to_string()));
    let tokens = Lexer::new(&grammar, "-3").tokenize().unwrap();
    assert_eq!(tokens[0].kind, TokenKind::Literal(Value::Number(-3.0)));
}
