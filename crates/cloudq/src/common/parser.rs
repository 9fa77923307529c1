use std::fmt::{Debug, Formatter};

use nom::IResult;
use nom::error::{ErrorKind, ParseError};

pub struct ParserError<I> {
    input: I,
    kind: ErrorKind,
}

impl<I: Debug> Debug for ParserError<I> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "Parser error at '{:?}': expecting {:?}",
            self.input, self.kind
        ))
    }
}

impl<I> ParseError<I> for ParserError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        ParserError { input, kind }
    }

    fn append(_: I, _: ErrorKind, other: Self) -> Self {
        other
    }
}

pub type NomResult<'a, Ret> = IResult<&'a str, Ret, ParserError<&'a str>>;
