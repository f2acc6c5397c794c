use super::token::Token;
use combine::error::ParseError;
use combine::parser::char::{digit, spaces};
use combine::parser::Parser;
use combine::stream::Stream;
use combine::{any, choice, eof, many, many1, parser, satisfy, skip_many, token};

/// Parses the longest prefix of `s` that forms a float, like `strtod` does.
/// `1.2.3` reads as `1.2`; a lone `.` reads as `0`.
fn parse_number(s: &str) -> f64 {
    (1..=s.len())
        .rev()
        .find_map(|end| s[..end].parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn number<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1(choice((digit(), token('.')))).map(|ns: String| Token::Number(parse_number(&ns)))
}

fn ident<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (
        satisfy(|c: char| c.is_ascii_alphabetic()),
        many::<String, _, _>(satisfy(|c: char| c.is_ascii_alphanumeric())),
    )
        .map(|(first, rest)| {
            let mut id = String::with_capacity(rest.len() + 1);
            id.push(first);
            id.push_str(&rest);
            Token::keyword(&id).unwrap_or(Token::Ident(id))
        })
}

fn comment<Input>() -> impl Parser<Input, Output = ()>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (
        token('#'),
        skip_many(satisfy(|c: char| c != '\n' && c != '\r')),
    )
        .map(|_| ())
}

fn lex_<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    spaces().with(choice((
        number(),
        ident(),
        comment().with(lex()),
        eof().map(|_| Token::Eof),
        any().map(Token::Kwd),
    )))
}

parser! {
    pub(crate) fn lex[Input]()(Input) -> Token
        where [Input: Stream<Token = char>]
    {
        lex_()
    }
}

/// Pulls tokens one at a time out of a source buffer.
///
/// Never fails: characters that start no other token come back as
/// `Token::Kwd`, and once the input is exhausted every call yields `Token::Eof`.
pub struct Lexer<'a> {
    input: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input }
    }

    pub fn next_token(&mut self) -> Token {
        match lex().parse(self.input) {
            Ok((token, rest)) => {
                self.input = rest;
                token
            }
            Err(_) => {
                self.input = "";
                Token::Eof
            }
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        match self.next_token() {
            Token::Eof => None,
            t => Some(t),
        }
    }
}
