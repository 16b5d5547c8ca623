//! Delimiter tokenizer
//!
//! Splits template text into static segments and `[name]` / `[/name]` /
//! `[!name]` directive tokens. Delimiters that do not form a valid token stay
//! in the static text untouched.

use crate::config::TemplateSettings;
use crate::error::Result;
use regex::Regex;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Static,
    Directive,
}

/// Leading flag character of a directive token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    /// Opening or self-contained token
    None,
    /// `[!name]`, reserved
    Raw,
    /// `[/name]`
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Static text, or the token name for directives
    pub text: String,
    pub flag: Flag,
    /// Byte range of the token in the template text it came from
    pub span: Range<usize>,
}

impl Token {
    fn text(text: &str, span: Range<usize>) -> Self {
        Self {
            kind: TokenKind::Static,
            text: text.to_string(),
            flag: Flag::None,
            span,
        }
    }

    pub fn is_open(&self) -> bool {
        self.kind == TokenKind::Directive && self.flag != Flag::Close
    }

    pub fn is_close_of(&self, name: &str) -> bool {
        self.kind == TokenKind::Directive && self.flag == Flag::Close && self.text == name
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}({:?}) at {}..{}",
            self.kind, self.text, self.span.start, self.span.end
        )
    }
}

/// Lexer for delimiter templates
pub struct Lexer {
    pattern: Regex,
    close_marker: char,
    raw_flag: char,
}

impl Lexer {
    pub fn new(settings: &TemplateSettings) -> Result<Self> {
        let pattern = format!(
            "{}({}|{})?({}){}",
            regex::escape(&settings.open),
            regex::escape(&settings.raw_flag.to_string()),
            regex::escape(&settings.close_marker.to_string()),
            settings.name_pattern,
            regex::escape(&settings.close),
        );

        Ok(Self {
            pattern: Regex::new(&pattern)?,
            close_marker: settings.close_marker,
            raw_flag: settings.raw_flag,
        })
    }

    /// Scan `input` left to right into tokens
    pub fn tokenize(&self, input: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut position = 0;

        for caps in self.pattern.captures_iter(input) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let Some(name) = caps.get(2) else {
                continue;
            };

            if whole.start() > position {
                tokens.push(Token::text(
                    &input[position..whole.start()],
                    position..whole.start(),
                ));
            }

            let flag = match caps.get(1).and_then(|m| m.as_str().chars().next()) {
                Some(c) if c == self.close_marker => Flag::Close,
                Some(c) if c == self.raw_flag => Flag::Raw,
                _ => Flag::None,
            };

            tokens.push(Token {
                kind: TokenKind::Directive,
                text: name.as_str().to_string(),
                flag,
                span: whole.range(),
            });
            position = whole.end();
        }

        if position < input.len() || tokens.is_empty() {
            tokens.push(Token::text(&input[position..], position..input.len()));
        }

        tokens
    }
}

/// Tokens memoized by exact template text
pub struct TokenCache {
    lexer: Lexer,
    entries: RefCell<HashMap<String, Rc<[Token]>>>,
    scans: Cell<usize>,
}

impl TokenCache {
    pub fn new(lexer: Lexer) -> Self {
        Self {
            lexer,
            entries: RefCell::new(HashMap::new()),
            scans: Cell::new(0),
        }
    }

    /// Cached tokens for `text`, scanning it on first use
    pub fn tokens(&self, text: &str) -> Rc<[Token]> {
        if let Some(tokens) = self.entries.borrow().get(text) {
            return Rc::clone(tokens);
        }

        let tokens: Rc<[Token]> = self.lexer.tokenize(text).into();
        self.scans.set(self.scans.get() + 1);
        log::debug!(
            "Tokenized template ({} bytes) into {} tokens",
            text.len(),
            tokens.len()
        );

        self.entries
            .borrow_mut()
            .insert(text.to_string(), Rc::clone(&tokens));
        tokens
    }

    /// Number of times the scanner actually ran
    pub fn scans(&self) -> usize {
        self.scans.get()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexer() -> Lexer {
        Lexer::new(&TemplateSettings::default()).unwrap()
    }

    #[test]
    fn test_static_and_directive_segments() {
        let tokens = lexer().tokenize("<b>[user.name]</b>");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "<b>");
        assert_eq!(tokens[1].kind, TokenKind::Directive);
        assert_eq!(tokens[1].text, "user.name");
        assert_eq!(tokens[1].flag, Flag::None);
        assert_eq!(tokens[1].span, 3..14);
        assert_eq!(tokens[2].text, "</b>");
    }

    #[test]
    fn test_flags() {
        let tokens = lexer().tokenize("[items][!raw][/items]");
        let flags: Vec<Flag> = tokens.iter().map(|t| t.flag).collect();
        assert_eq!(flags, vec![Flag::None, Flag::Raw, Flag::Close]);
        assert!(tokens[2].is_close_of("items"));
    }

    #[test]
    fn test_unmatched_delimiters_stay_literal() {
        let tokens = lexer().tokenize("a[b c] [Upper] [x");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Static);
        assert_eq!(tokens[0].text, "a[b c] [Upper] [x");
    }

    #[test]
    fn test_empty_template_is_one_static_segment() {
        let tokens = lexer().tokenize("");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "");
    }

    #[test]
    fn test_custom_delimiters() {
        let settings = TemplateSettings {
            open: "{{".to_string(),
            close: "}}".to_string(),
            ..TemplateSettings::default()
        };
        let tokens = Lexer::new(&settings).unwrap().tokenize("Hi {{name}} [name]");
        assert_eq!(tokens[1].text, "name");
        assert_eq!(tokens[2].text, " [name]");
    }

    #[test]
    fn test_cache_returns_same_sequence() {
        let cache = TokenCache::new(lexer());
        let first = cache.tokens("[a][b]");
        let second = cache.tokens("[a][b]");
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cache.scans(), 1);

        let other = cache.tokens("[a] [b]");
        assert!(!Rc::ptr_eq(&first, &other));
        assert_eq!(cache.scans(), 2);
        assert_eq!(cache.len(), 2);
    }
}
