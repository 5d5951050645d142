// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tokenizer for the built-in PowerShell parser
//!
//! Individual token shapes are nom combinators; the driver loop picks one
//! by the first character and by whether the previous token ended a value
//! (which decides between member access and a new bareword, or between an
//! index and a type literal).

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, tag_no_case, take_until, take_while, take_while1},
    character::complete::{anychar, char, digit1, hex_digit1, one_of, space0},
    combinator::{map, opt, recognize},
    multi::{many0, separated_list1},
    sequence::{delimited, preceded},
    IResult, Parser,
};

use crate::structure::ParseError;

/// Bracket flavour of an opening token
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Group {
    /// `(`
    Paren,
    /// `{`
    Brace,
    /// `[` following a value
    Index,
    /// `$(`
    SubExpression,
    /// `@(`
    ArrayExpression,
    /// `@{`
    Hashtable,
}

impl Group {
    pub(crate) fn closer(self) -> char {
        match self {
            Group::Paren | Group::SubExpression | Group::ArrayExpression => ')',
            Group::Brace | Group::Hashtable => '}',
            Group::Index => ']',
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum TokenKind<'a> {
    SingleQuoted(&'a str),
    DoubleQuoted(&'a str),
    HereString { expandable: bool, body: &'a str },
    /// Variable name without the sigil (`$x`, `${x}`, `@splat`)
    Variable(&'a str),
    /// Type name without the brackets
    TypeLiteral(&'a str),
    Number(&'a str),
    /// `-Name` or `-Name:` (the colon binds the next argument)
    Parameter { name: &'a str, colon: bool },
    Word(&'a str),
    /// `.Name` directly after a value
    Member(&'a str),
    /// `::Name` directly after a value
    StaticMember(&'a str),
    Open(Group),
    Close(char),
    Pipe,
    /// `;`, newline, `&&`, `||`
    Separator,
    /// Call (`&`) or dot-source (`.`) operator
    Invoke(&'a str),
    Comma,
    Operator(&'a str),
    Redirection(&'a str),
}

impl TokenKind<'_> {
    /// True if a `.`, `::` or `[` right after this token applies to it
    fn ends_value(&self) -> bool {
        matches!(
            self,
            TokenKind::SingleQuoted(_)
                | TokenKind::DoubleQuoted(_)
                | TokenKind::HereString { .. }
                | TokenKind::Variable(_)
                | TokenKind::TypeLiteral(_)
                | TokenKind::Member(_)
                | TokenKind::StaticMember(_)
                | TokenKind::Close(_)
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Token<'a> {
    pub kind: TokenKind<'a>,
    /// Whitespace or a comment came right before this token
    pub spaced: bool,
    /// Byte offset into the source
    pub offset: usize,
}

/// Splits `source` into tokens
///
/// # Errors
///
/// `ParseError::Syntax` for unterminated strings, here-strings, block
/// comments and braced variable names.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Token<'_>>, ParseError> {
    let mut tokens: Vec<Token<'_>> = Vec::new();
    let mut rest = source;

    loop {
        let offset = source.len() - rest.len();
        let (after_trivia, spaced) =
            skip_trivia(rest).map_err(|message| syntax(offset, message))?;
        rest = after_trivia;
        if rest.is_empty() {
            break;
        }

        let offset = source.len() - rest.len();
        let after_value = !spaced && tokens.last().is_some_and(|t| t.kind.ends_value());
        let (remaining, kind) =
            next_token(rest, after_value).map_err(|message| syntax(offset, message))?;

        tokens.push(Token {
            kind,
            spaced,
            offset,
        });
        rest = remaining;
    }

    Ok(tokens)
}

fn syntax(offset: usize, message: &str) -> ParseError {
    ParseError::Syntax {
        offset,
        message: message.to_string(),
    }
}

// ============================================================================
// Trivia
// ============================================================================

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\u{feff}' | '\u{a0}')
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    delimited(tag("<#"), take_until("#>"), tag("#>")).parse(input)
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize((char('#'), take_while(|c: char| c != '\n'))).parse(input)
}

fn line_continuation(input: &str) -> IResult<&str, &str> {
    recognize((char('`'), opt(char('\r')), char('\n'))).parse(input)
}

/// Skips blanks, comments and line continuations
fn skip_trivia(input: &str) -> Result<(&str, bool), &'static str> {
    let mut rest = input;

    loop {
        let trimmed = rest.trim_start_matches(is_blank);

        if trimmed.starts_with("<#") {
            let (after, _) = block_comment(trimmed).map_err(|_| "unterminated block comment")?;
            rest = after;
        } else if let Ok((after, _)) = line_continuation(trimmed) {
            rest = after;
        } else if let Ok((after, _)) = line_comment(trimmed) {
            rest = after;
        } else {
            let spaced = trimmed.len() != input.len();
            return Ok((trimmed, spaced));
        }
    }
}

// ============================================================================
// Token shapes
// ============================================================================

fn single_quoted(input: &str) -> IResult<&str, &str> {
    delimited(
        char('\''),
        recognize(many0(alt((is_not("'"), tag("''"))))),
        char('\''),
    )
    .parse(input)
}

fn double_quoted(input: &str) -> IResult<&str, &str> {
    delimited(
        char('"'),
        recognize(many0(alt((
            is_not("`\""),
            recognize(preceded(char('`'), anychar)),
            tag("\"\""),
        )))),
        char('"'),
    )
    .parse(input)
}

fn here_string(input: &str) -> IResult<&str, (bool, &str)> {
    alt((
        map(delimited(tag("@'"), take_until("'@"), tag("'@")), |body| {
            (false, body)
        }),
        map(delimited(tag("@\""), take_until("\"@"), tag("\"@")), |body| {
            (true, body)
        }),
    ))
    .parse(input)
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize((
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(is_identifier_char),
    ))
    .parse(input)
}

fn variable(input: &str) -> IResult<&str, &str> {
    preceded(
        char('$'),
        alt((
            delimited(char('{'), is_not("}"), char('}')),
            take_while1(|c: char| is_identifier_char(c) || c == ':'),
            tag("$"),
            tag("?"),
            tag("^"),
        )),
    )
    .parse(input)
}

fn splat(input: &str) -> IResult<&str, &str> {
    preceded(char('@'), take_while1(is_identifier_char)).parse(input)
}

fn type_name(input: &str) -> IResult<&str, &str> {
    recognize((
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| is_identifier_char(c) || c == '.' || c == '`'),
        opt(delimited(
            char('['),
            separated_list1(char(','), preceded(space0, type_argument)),
            char(']'),
        )),
        opt(tag("[]")),
    ))
    .parse(input)
}

fn type_argument(input: &str) -> IResult<&str, &str> {
    alt((delimited(char('['), type_name, char(']')), type_name)).parse(input)
}

fn type_literal(input: &str) -> IResult<&str, &str> {
    delimited(char('['), type_name, char(']')).parse(input)
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize((
        opt(char('-')),
        alt((
            recognize((tag_no_case("0x"), hex_digit1)),
            recognize((
                digit1,
                opt((char('.'), digit1)),
                opt((one_of("eE"), opt(one_of("+-")), digit1)),
            )),
        )),
        opt(alt((
            tag_no_case("kb"),
            tag_no_case("mb"),
            tag_no_case("gb"),
            tag_no_case("tb"),
            tag_no_case("pb"),
            tag_no_case("l"),
            tag_no_case("d"),
        ))),
    ))
    .parse(input)
}

fn parameter(input: &str) -> IResult<&str, (&str, bool)> {
    (
        preceded(char('-'), identifier),
        map(opt(char(':')), |colon| colon.is_some()),
    )
        .parse(input)
}

fn redirection(input: &str) -> IResult<&str, &str> {
    alt((
        recognize((
            opt(one_of("123456*")),
            alt((tag(">>"), tag(">"))),
            opt((char('&'), one_of("12"))),
        )),
        tag("<"),
    ))
    .parse(input)
}

/// Characters that end a bareword
fn is_word_terminator(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '(' | ')' | '{' | '}' | '[' | ']' | ';' | ',' | '|' | '&' | '\'' | '"' | '<' | '>'
                | '=' | '$'
        )
}

fn word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !is_word_terminator(c)).parse(input)
}

// ============================================================================
// Driver
// ============================================================================

type Lexed<'a> = Result<(&'a str, TokenKind<'a>), &'static str>;

fn ok<'a, O>(result: IResult<&'a str, O>) -> Option<(&'a str, O)> {
    result.ok()
}

fn bareword(input: &str) -> Lexed<'_> {
    match ok(word(input)) {
        Some((rest, text)) => Ok((rest, TokenKind::Word(text))),
        None => Err("unexpected character"),
    }
}

/// Operator character starts an operator (not a bareword like `*.txt`)
fn operator_follows(rest: &str) -> bool {
    match rest.chars().next() {
        None => true,
        Some(c) => {
            c.is_whitespace() || c.is_ascii_digit() || matches!(c, '(' | '$' | '@' | '[' | '\'' | '"' | '-')
        }
    }
}

/// Input past an ASCII prefix of `n` bytes
fn advance(input: &str, n: usize) -> &str {
    &input[n..]
}

fn next_token(input: &str, after_value: bool) -> Lexed<'_> {
    let mut chars = input.chars();
    let first = chars.next().ok_or("unexpected end of input")?;
    let second = chars.next();

    match first {
        '\n' | ';' => Ok((advance(input, 1), TokenKind::Separator)),
        '|' if second == Some('|') => Ok((advance(input, 2), TokenKind::Separator)),
        '|' => Ok((advance(input, 1), TokenKind::Pipe)),
        '&' if second == Some('&') => Ok((advance(input, 2), TokenKind::Separator)),
        '&' => Ok((advance(input, 1), TokenKind::Invoke("&"))),
        ',' => Ok((advance(input, 1), TokenKind::Comma)),
        '(' => Ok((advance(input, 1), TokenKind::Open(Group::Paren))),
        '{' => Ok((advance(input, 1), TokenKind::Open(Group::Brace))),
        ')' | '}' | ']' => Ok((advance(input, 1), TokenKind::Close(first))),

        '\'' => ok(single_quoted(input))
            .map(|(rest, body)| (rest, TokenKind::SingleQuoted(body)))
            .ok_or("unterminated string literal"),
        '"' => ok(double_quoted(input))
            .map(|(rest, body)| (rest, TokenKind::DoubleQuoted(body)))
            .ok_or("unterminated string literal"),

        '@' => match second {
            Some('\'') | Some('"') => ok(here_string(input))
                .map(|(rest, (expandable, body))| (rest, TokenKind::HereString { expandable, body }))
                .ok_or("unterminated here-string"),
            Some('(') => Ok((advance(input, 2), TokenKind::Open(Group::ArrayExpression))),
            Some('{') => Ok((advance(input, 2), TokenKind::Open(Group::Hashtable))),
            _ => match ok(splat(input)) {
                Some((rest, name)) => Ok((rest, TokenKind::Variable(name))),
                None => bareword(input),
            },
        },

        '$' => {
            if second == Some('(') {
                return Ok((advance(input, 2), TokenKind::Open(Group::SubExpression)));
            }
            if second == Some('{') && !input.contains('}') {
                return Err("unterminated variable name");
            }
            match ok(variable(input)) {
                Some((rest, name)) => Ok((rest, TokenKind::Variable(name))),
                None => Ok((advance(input, 1), TokenKind::Word("$"))),
            }
        }

        '[' if after_value => Ok((advance(input, 1), TokenKind::Open(Group::Index))),
        '[' => match ok(type_literal(input)) {
            Some((rest, name)) => Ok((rest, TokenKind::TypeLiteral(name))),
            None => Ok((advance(input, 1), TokenKind::Open(Group::Index))),
        },

        '.' if second == Some('.') => Ok((advance(input, 2), TokenKind::Operator(".."))),
        '.' if after_value => match ok(identifier(advance(input, 1))) {
            Some((rest, name)) => Ok((rest, TokenKind::Member(name))),
            None => Err("missing member name after '.'"),
        },
        '.' if second.is_none_or(|c| c.is_whitespace() || c == '{' || c == '(' || c == '$') => {
            Ok((advance(input, 1), TokenKind::Invoke(".")))
        }

        ':' if after_value && second == Some(':') => match ok(identifier(advance(input, 2))) {
            Some((rest, name)) => Ok((rest, TokenKind::StaticMember(name))),
            None => Err("missing member name after '::'"),
        },

        '-' => {
            if let Some((rest, (name, colon))) = ok(parameter(input)) {
                return Ok((rest, TokenKind::Parameter { name, colon }));
            }
            if !after_value && second.is_some_and(|c| c.is_ascii_digit()) {
                if let Some(lexed) = number_or_word(input) {
                    return Ok(lexed);
                }
            }
            for op in ["--", "-="] {
                if input.starts_with(op) {
                    return Ok((advance(input, 2), TokenKind::Operator(op)));
                }
            }
            Ok((advance(input, 1), TokenKind::Operator("-")))
        }

        '<' | '>' => ok(redirection(input))
            .map(|(rest, text)| (rest, TokenKind::Redirection(text)))
            .ok_or("unexpected redirection"),

        c if c.is_ascii_digit() || c == '*' => {
            if let Some((rest, text)) = ok(redirection(input)) {
                return Ok((rest, TokenKind::Redirection(text)));
            }
            if c == '*' {
                return operator_or_word(input);
            }
            match number_or_word(input) {
                Some(lexed) => Ok(lexed),
                None => bareword(input),
            }
        }

        '+' | '/' | '%' | '!' | '=' => operator_or_word(input),

        _ => bareword(input),
    }
}

/// A number, unless word characters follow it (`7zip`, `1st`)
fn number_or_word(input: &str) -> Option<(&str, TokenKind<'_>)> {
    let (rest, text) = ok(number(input))?;
    let continues = rest.chars().next().is_some_and(|c| !is_word_terminator(c))
        && !rest.starts_with("..");
    if continues {
        ok(word(input)).map(|(rest, text)| (rest, TokenKind::Word(text)))
    } else {
        Some((rest, TokenKind::Number(text)))
    }
}

fn operator_or_word(input: &str) -> Lexed<'_> {
    const OPERATORS: [&str; 10] = ["++", "+=", "*=", "/=", "%=", "+", "*", "/", "%", "!"];

    if let Some(rest) = input.strip_prefix('=') {
        return Ok((rest, TokenKind::Operator("=")));
    }
    for op in OPERATORS {
        if let Some(rest) = input.strip_prefix(op) {
            if op.ends_with('=') || operator_follows(rest) {
                return Ok((rest, TokenKind::Operator(op)));
            }
        }
    }
    bareword(input)
}
