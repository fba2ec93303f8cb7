//! Host address patterns: dotted quads whose octets may be ranges.
//!
//! `10.0.0-2.1-5` stands for every address `10.0.c.d` with `c` in `0..2`
//! and `d` in `1..5`. Ranges are half-open, like Rust's `a..b`, so
//! `10.0.0.0-256` covers the whole `/24`.

use ibrsim_core::Address;
use logos::{Lexer, Logos};
use std::{fmt, ops::Range, str::FromStr};
use thiserror::Error;

/// A parsed host pattern.
///
/// ```
/// use ibrsim::HostPattern;
/// use ibrsim_core::Address;
///
/// let pattern: HostPattern = "10.0.0-2.1-3".parse().unwrap();
/// let addresses: Vec<Address> = pattern.addresses().collect();
///
/// assert_eq!(pattern.len(), 4);
/// assert_eq!(addresses[0], Address::v4(10, 0, 0, 1));
/// assert_eq!(addresses[3], Address::v4(10, 0, 1, 2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPattern {
    octets: [Range<u16>; 4],
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostPatternError {
    #[error("`{pattern}': expected 4 octets, found {found}")]
    Octets { pattern: String, found: usize },
    #[error("`{pattern}': unexpected `{token}'")]
    Unexpected { pattern: String, token: String },
    #[error("`{pattern}': {value} is out of range")]
    OutOfRange { pattern: String, value: String },
    #[error("`{pattern}': range {start}-{end} is empty")]
    EmptyRange { pattern: String, start: u16, end: u16 },
}

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t]+")]
enum Token {
    #[token(".")]
    Dot,
    #[token("-")]
    Dash,
    #[regex("[0-9]+")]
    Number,
}

/// Recursive descent over the lexed pattern.
struct Parser<'a> {
    pattern: &'a str,
    lex: Lexer<'a, Token>,
}

impl<'a> Parser<'a> {
    fn new(pattern: &'a str) -> Self {
        Self {
            pattern,
            lex: Token::lexer(pattern),
        }
    }

    fn unexpected(&self) -> HostPatternError {
        HostPatternError::Unexpected {
            pattern: self.pattern.to_owned(),
            token: self.lex.slice().to_owned(),
        }
    }

    /// a number, `max` included
    fn number(&mut self, max: u16) -> Result<u16, HostPatternError> {
        match self.lex.next() {
            Some(Ok(Token::Number)) => (),
            Some(_) => return Err(self.unexpected()),
            None => {
                return Err(HostPatternError::Unexpected {
                    pattern: self.pattern.to_owned(),
                    token: String::new(),
                });
            }
        }

        let slice = self.lex.slice();
        match slice.parse::<u16>() {
            Ok(value) if value <= max => Ok(value),
            _ => Err(HostPatternError::OutOfRange {
                pattern: self.pattern.to_owned(),
                value: slice.to_owned(),
            }),
        }
    }

    /// `N` or `A-B`; returns the token that ended the octet, if any
    fn octet(&mut self) -> Result<(Range<u16>, Option<Token>), HostPatternError> {
        let start = self.number(255)?;

        match self.lex.next() {
            Some(Ok(Token::Dash)) => {
                let end = self.number(256)?;
                if end <= start {
                    return Err(HostPatternError::EmptyRange {
                        pattern: self.pattern.to_owned(),
                        start,
                        end,
                    });
                }
                match self.lex.next() {
                    None => Ok((start..end, None)),
                    Some(Ok(Token::Dot)) => Ok((start..end, Some(Token::Dot))),
                    Some(_) => Err(self.unexpected()),
                }
            }
            None => Ok((start..start + 1, None)),
            Some(Ok(Token::Dot)) => Ok((start..start + 1, Some(Token::Dot))),
            Some(_) => Err(self.unexpected()),
        }
    }

    fn parse(mut self) -> Result<HostPattern, HostPatternError> {
        let mut octets = Vec::with_capacity(4);

        loop {
            let (range, next) = self.octet()?;
            octets.push(range);
            if next.is_none() {
                break;
            }
        }

        let found = octets.len();
        octets
            .try_into()
            .map(|octets| HostPattern { octets })
            .map_err(|_| HostPatternError::Octets {
                pattern: self.pattern.to_owned(),
                found,
            })
    }
}

impl HostPattern {
    /// number of addresses the pattern expands to
    pub fn len(&self) -> usize {
        self.octets.iter().map(|range| range.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// every address of the pattern, in ascending order
    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        let [a, b, c, d] = &self.octets;
        let octet = |value: u16| value as u8;

        a.clone().flat_map(move |a| {
            b.clone().flat_map(move |b| {
                c.clone().flat_map(move |c| {
                    d.clone()
                        .map(move |d| Address::v4(octet(a), octet(b), octet(c), octet(d)))
                })
            })
        })
    }
}

/// Expand a comma separated list of patterns, keeping the first occurrence
/// of each address.
pub fn expand(patterns: &str) -> Result<Vec<Address>, HostPatternError> {
    let mut addresses = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for pattern in patterns.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let pattern: HostPattern = pattern.parse()?;
        addresses.extend(pattern.addresses().filter(|address| seen.insert(*address)));
    }

    Ok(addresses)
}

impl FromStr for HostPattern {
    type Err = HostPatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parser::new(s.trim()).parse()
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, range) in self.octets.iter().enumerate() {
            if index > 0 {
                f.write_str(".")?;
            }
            if range.len() == 1 {
                write!(f, "{}", range.start)?;
            } else {
                write!(f, "{}-{}", range.start, range.end)?;
            }
        }
        Ok(())
    }
}
