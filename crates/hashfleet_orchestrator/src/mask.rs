//! Mask pattern parsing and keyspace math.
//!
//! A mask is literal characters interleaved with two-character class tokens
//! (`?u ?l ?d ?s ?a ?b ?h ?H`). `??` escapes a literal question mark. A lone
//! `?` at end-of-string is invalid.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MaskError {
    #[error("mask is empty")]
    Empty,
    #[error("unknown character class '?{0}'")]
    UnknownClass(char),
    #[error("dangling '?' at end of mask")]
    DanglingQuestionMark,
}

/// Character class of a `?x` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskClass {
    Upper,
    Lower,
    Digit,
    Special,
    All,
    Byte,
    HexLower,
    HexUpper,
}

impl MaskClass {
    fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'u' => Some(MaskClass::Upper),
            'l' => Some(MaskClass::Lower),
            'd' => Some(MaskClass::Digit),
            's' => Some(MaskClass::Special),
            'a' => Some(MaskClass::All),
            'b' => Some(MaskClass::Byte),
            'h' => Some(MaskClass::HexLower),
            'H' => Some(MaskClass::HexUpper),
            _ => None,
        }
    }

    fn tag(&self) -> char {
        match self {
            MaskClass::Upper => 'u',
            MaskClass::Lower => 'l',
            MaskClass::Digit => 'd',
            MaskClass::Special => 's',
            MaskClass::All => 'a',
            MaskClass::Byte => 'b',
            MaskClass::HexLower => 'h',
            MaskClass::HexUpper => 'H',
        }
    }

    /// Number of candidates this class contributes per position.
    pub fn size(&self) -> i64 {
        match self {
            MaskClass::Upper | MaskClass::Lower => 26,
            MaskClass::Digit => 10,
            MaskClass::Special => 32,
            MaskClass::All => 95,
            MaskClass::Byte => 256,
            MaskClass::HexLower | MaskClass::HexUpper => 16,
        }
    }

    /// Whether the class matches a concrete character.
    pub fn accepts(&self, ch: char) -> bool {
        match self {
            MaskClass::Upper => ch.is_ascii_uppercase(),
            MaskClass::Lower => ch.is_ascii_lowercase(),
            MaskClass::Digit => ch.is_ascii_digit(),
            MaskClass::Special => {
                ch.is_ascii() && !ch.is_ascii_alphanumeric() && !ch.is_ascii_control()
            }
            MaskClass::All => ch.is_ascii_graphic() || ch == ' ',
            MaskClass::Byte => (ch as u32) < 256,
            MaskClass::HexLower => ch.is_ascii_digit() || ('a'..='f').contains(&ch),
            MaskClass::HexUpper => ch.is_ascii_digit() || ('A'..='F').contains(&ch),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskToken {
    Literal(char),
    Class(MaskClass),
}

impl MaskToken {
    pub fn size(&self) -> i64 {
        match self {
            MaskToken::Literal(_) => 1,
            MaskToken::Class(class) => class.size(),
        }
    }
}

impl fmt::Display for MaskToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskToken::Literal('?') => write!(f, "??"),
            MaskToken::Literal(ch) => write!(f, "{}", ch),
            MaskToken::Class(class) => write!(f, "?{}", class.tag()),
        }
    }
}

/// Parsed mask; length is the token count, not the character count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    tokens: Vec<MaskToken>,
}

impl Mask {
    pub fn parse(pattern: &str) -> Result<Self, MaskError> {
        if pattern.is_empty() {
            return Err(MaskError::Empty);
        }

        let mut tokens = Vec::new();
        let mut chars = pattern.chars();
        while let Some(ch) = chars.next() {
            if ch != '?' {
                tokens.push(MaskToken::Literal(ch));
                continue;
            }
            match chars.next() {
                None => return Err(MaskError::DanglingQuestionMark),
                Some('?') => tokens.push(MaskToken::Literal('?')),
                Some(tag) => match MaskClass::from_tag(tag) {
                    Some(class) => tokens.push(MaskToken::Class(class)),
                    None => return Err(MaskError::UnknownClass(tag)),
                },
            }
        }
        Ok(Self { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[MaskToken] {
        &self.tokens
    }

    /// Product of per-position class sizes, saturating on overflow.
    pub fn keyspace(&self) -> i64 {
        self.tokens
            .iter()
            .fold(1i64, |acc, token| acc.saturating_mul(token.size()))
    }

    /// First `count` tokens as a new mask (increment forward mode).
    pub fn prefix(&self, count: usize) -> Self {
        Self {
            tokens: self.tokens[..count.min(self.tokens.len())].to_vec(),
        }
    }

    /// Last `count` tokens as a new mask (increment inverse mode).
    pub fn suffix(&self, count: usize) -> Self {
        let count = count.min(self.tokens.len());
        Self {
            tokens: self.tokens[self.tokens.len() - count..].to_vec(),
        }
    }

    /// Whether a concrete password matches this mask position by position.
    pub fn accepts(&self, password: &str) -> bool {
        let chars: Vec<char> = password.chars().collect();
        if chars.len() != self.tokens.len() {
            return false;
        }
        self.tokens.iter().zip(chars).all(|(token, ch)| match token {
            MaskToken::Literal(lit) => *lit == ch,
            MaskToken::Class(class) => class.accepts(ch),
        })
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "{}", token)?;
        }
        Ok(())
    }
}

/// Derive the narrowest mask that matches a concrete password.
pub fn password_to_mask(password: &str) -> String {
    let mut mask = String::with_capacity(password.len() * 2);
    for ch in password.chars() {
        if ch.is_ascii_lowercase() {
            mask.push_str("?l");
        } else if ch.is_ascii_uppercase() {
            mask.push_str("?u");
        } else if ch.is_ascii_digit() {
            mask.push_str("?d");
        } else if ch.is_ascii() && !ch.is_ascii_control() {
            mask.push_str("?s");
        } else {
            mask.push_str("?b");
        }
    }
    mask
}
