//! Minimal CQL DDL parser: just enough of the grammar to understand
//! `CREATE TABLE` and `CREATE TYPE` fragments handed to the schema builder.

use std::fmt::Write as _;

mod statements;
pub use statements::*;

#[derive(Clone)]
pub struct StatementStream<'a> {
    cursor: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> StatementStream<'a> {
    pub fn new(statement: &'a str) -> Self {
        Self {
            cursor: statement.chars().peekable(),
        }
    }

    pub fn peek(&mut self) -> Option<char> {
        self.cursor.peek().copied()
    }

    pub fn next(&mut self) -> Option<char> {
        self.cursor.next()
    }

    fn ignore_empty(&mut self) {
        while let Some(c) = self.cursor.peek() {
            if c.is_whitespace() {
                self.cursor.next();
            } else {
                break;
            }
        }
    }

    /// Parse a self-describing token.
    pub fn parse<P: Parse<Output = P>>(&mut self) -> anyhow::Result<P> {
        self.parse_from::<P>()
    }

    /// Parse a token with a distinct output type.
    pub fn parse_from<P: Parse>(&mut self) -> anyhow::Result<P::Output> {
        self.ignore_empty();
        P::parse(self)
    }

    /// Try to parse; on failure the stream is left untouched.
    pub fn parse_if<P: Parse>(&mut self) -> Option<P::Output> {
        let mut fork = self.clone();
        match fork.parse_from::<P>() {
            Ok(res) => {
                *self = fork;
                Some(res)
            }
            Err(_) => None,
        }
    }

    /// Whether the token parses here, without consuming anything.
    pub fn check<P: Parse>(&self) -> bool {
        self.clone().parse_from::<P>().is_ok()
    }

    /// Whether only whitespace remains.
    pub fn at_end(&mut self) -> bool {
        self.ignore_empty();
        self.cursor.peek().is_none()
    }

    /// A short sample of the remaining input, for diagnostics.
    pub fn info(&mut self) -> String {
        self.ignore_empty();
        let mut sample = String::new();
        for c in self.cursor.clone().take(24) {
            let _ = write!(sample, "{}", c);
        }
        if sample.is_empty() {
            "end of statement".to_string()
        } else {
            format!("\"{}\"", sample)
        }
    }
}

pub trait Parse {
    type Output;
    fn parse(s: &mut StatementStream<'_>) -> anyhow::Result<Self::Output>;
}

impl Parse for char {
    type Output = char;
    fn parse(s: &mut StatementStream<'_>) -> anyhow::Result<Self::Output> {
        s.next().ok_or_else(|| anyhow::anyhow!("End of statement!"))
    }
}

impl<T: Parse> Parse for Option<T> {
    type Output = Option<T::Output>;
    fn parse(s: &mut StatementStream<'_>) -> anyhow::Result<Self::Output> {
        Ok(s.parse_if::<T>())
    }
}

impl<T: Parse> Parse for Vec<T> {
    type Output = Vec<T::Output>;
    fn parse(s: &mut StatementStream<'_>) -> anyhow::Result<Self::Output> {
        let mut res = vec![s.parse_from::<T>()?];
        while s.parse_if::<Comma>().is_some() {
            res.push(s.parse_from::<T>()?);
        }
        Ok(res)
    }
}

macro_rules! peek_parse_tuple {
    ($($t:ident),+) => {
        impl<$($t: Parse),+> Parse for ($($t),+,) {
            type Output = ($($t::Output),+,);
            fn parse(s: &mut StatementStream<'_>) -> anyhow::Result<Self::Output> {
                Ok(($(
                    s.parse_from::<$t>()?,
                )+))
            }
        }
    };
}

peek_parse_tuple!(T0);
peek_parse_tuple!(T0, T1);
peek_parse_tuple!(T0, T1, T2);
peek_parse_tuple!(T0, T1, T2, T3);

/// An unquoted identifier word, case preserved.
pub struct Identifier;

impl Parse for Identifier {
    type Output = String;
    fn parse(s: &mut StatementStream<'_>) -> anyhow::Result<Self::Output> {
        let mut res = String::new();
        while let Some(c) = s.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                res.push(c);
                s.next();
            } else {
                break;
            }
        }
        if res.is_empty() || res.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(true) {
            anyhow::bail!("Expected identifier, found {}", s.info())
        }
        Ok(res)
    }
}

/// A quoted or unquoted name. Unquoted names fold to lowercase, quoted names
/// keep their exact spelling.
pub struct Name;

impl Parse for Name {
    type Output = String;
    fn parse(s: &mut StatementStream<'_>) -> anyhow::Result<Self::Output> {
        if s.peek() == Some('"') {
            s.next();
            let mut res = String::new();
            loop {
                match s.next() {
                    Some('"') => break,
                    Some(c) => res.push(c),
                    None => anyhow::bail!("Unterminated quoted name"),
                }
            }
            if res.is_empty() {
                anyhow::bail!("Empty quoted name");
            }
            Ok(res)
        } else {
            Ok(s.parse_from::<Identifier>()?.to_lowercase())
        }
    }
}

macro_rules! keyword {
    ($t:ident) => {
        #[derive(Copy, Clone, Debug)]
        pub struct $t;
        impl Parse for $t {
            type Output = Self;
            fn parse(s: &mut StatementStream<'_>) -> anyhow::Result<Self> {
                let token = s.parse_from::<Identifier>()?;
                if token.eq_ignore_ascii_case(stringify!($t)) {
                    Ok($t)
                } else {
                    anyhow::bail!("Expected {}, found {}", stringify!($t), token)
                }
            }
        }
    };
}

keyword!(CREATE);
keyword!(TABLE);
keyword!(TYPE);
keyword!(IF);
keyword!(NOT);
keyword!(EXISTS);
keyword!(WITH);
keyword!(PRIMARY);
keyword!(KEY);
keyword!(STATIC);
keyword!(FROZEN);
keyword!(LIST);
keyword!(SET);
keyword!(MAP);
keyword!(TUPLE);

macro_rules! punctuation {
    ($t:ident, $c:literal) => {
        #[derive(Copy, Clone, Debug)]
        pub struct $t;
        impl Parse for $t {
            type Output = Self;
            fn parse(s: &mut StatementStream<'_>) -> anyhow::Result<Self> {
                match s.next() {
                    Some($c) => Ok($t),
                    _ => anyhow::bail!("Expected '{}', found {}", $c, s.info()),
                }
            }
        }
    };
}

punctuation!(Comma, ',');
punctuation!(Dot, '.');
punctuation!(Semicolon, ';');
punctuation!(LeftParen, '(');
punctuation!(RightParen, ')');
punctuation!(LeftAngle, '<');
punctuation!(RightAngle, '>');

macro_rules! parse_group {
    ($g:ident, $l:ident, $r:ident) => {
        pub struct $g<T>(T);
        impl<T: Parse> Parse for $g<T> {
            type Output = T::Output;
            fn parse(s: &mut StatementStream<'_>) -> anyhow::Result<Self::Output> {
                s.parse_from::<$l>()?;
                let res = s.parse_from::<T>()?;
                s.parse_from::<$r>()?;
                Ok(res)
            }
        }
    };
}

parse_group!(Parens, LeftParen, RightParen);
parse_group!(Angles, LeftAngle, RightAngle);
