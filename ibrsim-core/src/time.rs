//! Human readable durations: `500ms`, `2m 30s`, `1h`.

use logos::{Lexer, Logos};
use std::{fmt, str::FromStr, time};
use thiserror::Error;

/// A [`std::time::Duration`] parsed from a sequence of `<number><unit>`
/// terms, summed up.
///
/// Units are `ns`, `us` (or `μs`), `ms`, `s`, `m` and `h`.
///
/// ```
/// use ibrsim_core::time::SimDuration;
/// use std::time::Duration;
///
/// let duration: SimDuration = "1m 30s".parse().unwrap();
/// assert_eq!(duration.into_duration(), Duration::from_secs(90));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimDuration(time::Duration);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseDurationError {
    #[error("empty duration")]
    Empty,
    #[error("unexpected `{token}' in duration `{input}'")]
    Unexpected { input: String, token: String },
    #[error("missing unit after `{value}' in duration `{input}'")]
    MissingUnit { input: String, value: u64 },
    #[error("number too large in duration `{input}'")]
    Overflow { input: String },
}

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\n\f]+")]
enum Token {
    #[token("ns")]
    NanoSeconds,
    #[regex("us|μs")]
    MicroSeconds,
    #[token("ms")]
    MilliSeconds,
    #[token("s")]
    Seconds,
    #[token("m")]
    Minutes,
    #[token("h")]
    Hours,

    #[regex("[0-9]+")]
    Value,
}

impl SimDuration {
    pub const fn new(duration: time::Duration) -> Self {
        Self(duration)
    }

    #[inline]
    pub const fn into_duration(self) -> time::Duration {
        self.0
    }
}

fn term(value: u64, unit: Token) -> Option<time::Duration> {
    Some(match unit {
        Token::NanoSeconds => time::Duration::from_nanos(value),
        Token::MicroSeconds => time::Duration::from_micros(value),
        Token::MilliSeconds => time::Duration::from_millis(value),
        Token::Seconds => time::Duration::from_secs(value),
        Token::Minutes => time::Duration::from_secs(value.checked_mul(60)?),
        Token::Hours => time::Duration::from_secs(value.checked_mul(3_600)?),
        Token::Value => return None,
    })
}

impl FromStr for SimDuration {
    type Err = ParseDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex = Lexer::<Token>::new(s);
        let unexpected = |lex: &Lexer<Token>| ParseDurationError::Unexpected {
            input: s.to_owned(),
            token: lex.slice().to_owned(),
        };
        let overflow = || ParseDurationError::Overflow {
            input: s.to_owned(),
        };

        let mut total = time::Duration::ZERO;
        let mut terms = 0;

        while let Some(next) = lex.next() {
            if next != Ok(Token::Value) {
                return Err(unexpected(&lex));
            }
            let value: u64 = lex.slice().parse().map_err(|_| overflow())?;

            let unit = match lex.next() {
                Some(Ok(Token::Value)) | None => {
                    return Err(ParseDurationError::MissingUnit {
                        input: s.to_owned(),
                        value,
                    });
                }
                Some(Err(())) => return Err(unexpected(&lex)),
                Some(Ok(unit)) => unit,
            };

            let duration = term(value, unit).ok_or_else(overflow)?;
            total = total.checked_add(duration).ok_or_else(overflow)?;
            terms += 1;
        }

        if terms == 0 {
            return Err(ParseDurationError::Empty);
        }

        Ok(Self(total))
    }
}

impl fmt::Display for SimDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl From<time::Duration> for SimDuration {
    fn from(value: time::Duration) -> Self {
        Self(value)
    }
}

impl From<SimDuration> for time::Duration {
    fn from(value: SimDuration) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexer() {
        let mut lex = Token::lexer("10ms");

        assert_eq!(lex.next(), Some(Ok(Token::Value)));
        assert_eq!(lex.slice(), "10");

        assert_eq!(lex.next(), Some(Ok(Token::MilliSeconds)));
        assert_eq!(lex.span(), 2..4);
    }

    #[test]
    fn parse() {
        let SimDuration(duration) = "250ms".parse().unwrap();
        assert_eq!(duration.as_millis(), 250);

        let SimDuration(duration) = "1h 2m 3s".parse().unwrap();
        assert_eq!(duration.as_secs(), 3_723);

        let SimDuration(duration) = "1s 500000us 500μs".parse().unwrap();
        assert_eq!(duration.as_micros(), 1_500_500);
    }

    #[test]
    fn parse_errors() {
        assert_eq!("".parse::<SimDuration>(), Err(ParseDurationError::Empty));
        assert_eq!(
            "10".parse::<SimDuration>(),
            Err(ParseDurationError::MissingUnit {
                input: "10".to_owned(),
                value: 10
            })
        );
        assert!(matches!(
            "ms".parse::<SimDuration>(),
            Err(ParseDurationError::Unexpected { .. })
        ));
        assert!(matches!(
            "5 days".parse::<SimDuration>(),
            Err(ParseDurationError::Unexpected { .. })
        ));
        assert!(matches!(
            "99999999999999999999h".parse::<SimDuration>(),
            Err(ParseDurationError::Overflow { .. })
        ));
    }

    #[test]
    fn display() {
        let duration = SimDuration::new(time::Duration::from_millis(1_500));
        assert_eq!(duration.to_string(), "1.5s");
    }
}
