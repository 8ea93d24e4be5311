//! Tokenizer for the command language.
//!
//! Keywords are case-insensitive; names follow the DNS-ish
//! `[a-zA-Z0-9]([-a-zA-Z0-9_]*[a-zA-Z0-9])?` shape; string literals are
//! double-quoted with the usual backslash escapes. Every token carries
//! its byte offset into the original text so errors can render a caret.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{map, value},
    error::{ErrorKind, ParseError as NomParseError},
    multi::many0,
    sequence::delimited,
    IResult,
};

use crate::error::SyntaxError;

/// Case-insensitive keywords of the base grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kw {
    // Verbs
    Create,
    Delete,
    Update,
    Get,
    List,
    Execute,
    Use,
    Drop,
    // Resource kinds
    Secret,
    ConfigMap,
    Parameter,
    Script,
    Project,
    Environment,
    // Clause keywords
    With,
    Args,
    ParamsFromConfigMap,
    Key,
    KeyPrefix,
    As,
    Type,
    Engine,
    Set,
    For,
    From,
    This,
    To,
    Depends,
    On,
}

impl Kw {
    fn classify(word: &str) -> Option<Kw> {
        let upper = word.to_ascii_uppercase();
        // LIST accepts plural resource kinds; plural spellings map to the
        // same keyword.
        let singular = match upper.as_str() {
            "SECRETS" => "SECRET",
            "CONFIGMAPS" => "CONFIGMAP",
            "PARAMETERS" => "PARAMETER",
            "SCRIPTS" => "SCRIPT",
            "PROJECTS" => "PROJECT",
            "ENVIRONMENTS" | "ENVS" => "ENV",
            other => other,
        };
        Some(match singular {
            "CREATE" => Kw::Create,
            "DELETE" => Kw::Delete,
            "UPDATE" => Kw::Update,
            "GET" => Kw::Get,
            "LIST" => Kw::List,
            "EXECUTE" => Kw::Execute,
            "USE" => Kw::Use,
            "DROP" => Kw::Drop,
            "SECRET" => Kw::Secret,
            "CONFIGMAP" => Kw::ConfigMap,
            "PARAMETER" => Kw::Parameter,
            "SCRIPT" => Kw::Script,
            "PROJECT" => Kw::Project,
            "ENV" | "ENVIRONMENT" => Kw::Environment,
            "WITH" => Kw::With,
            "ARGS" => Kw::Args,
            "PARAMS_FROM_CONFIGMAP" => Kw::ParamsFromConfigMap,
            "KEY" => Kw::Key,
            "KEY_PREFIX" => Kw::KeyPrefix,
            "AS" => Kw::As,
            "TYPE" => Kw::Type,
            "ENGINE" => Kw::Engine,
            "SET" => Kw::Set,
            "FOR" => Kw::For,
            "FROM" => Kw::From,
            "THIS" => Kw::This,
            "TO" => Kw::To,
            "DEPENDS" => Kw::Depends,
            "ON" => Kw::On,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Kw),
    Name(String),
    Str(String),
    Eq,
    Comma,
    LParen,
    RParen,
    Semi,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Original spelling (empty for Eof).
    pub text: String,
    /// Byte offset into the original input.
    pub offset: usize,
}

impl Token {
    /// Human-readable description used in "found ..." diagnostics.
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Str(_) => format!("string {:?}", self.text),
            _ => format!("'{}'", self.text),
        }
    }
}

type LexResult<'a, T> = IResult<&'a str, T, nom::error::Error<&'a str>>;

/// Double-quoted string with escapes, in the same style as the rest of
/// the engine's nom parsing.
fn string_literal(input: &str) -> LexResult<'_, String> {
    delimited(
        char('"'),
        map(
            many0(alt((
                value('\n', tag("\\n")),
                value('\r', tag("\\r")),
                value('\t', tag("\\t")),
                value('\\', tag("\\\\")),
                value('"', tag("\\\"")),
                none_of_chars("\"\\"),
            ))),
            |chars| chars.into_iter().collect(),
        ),
        char('"'),
    )(input)
}

fn none_of_chars(excluded: &'static str) -> impl Fn(&str) -> LexResult<'_, char> {
    move |input| match input.chars().next() {
        Some(c) if !excluded.contains(c) => Ok((&input[c.len_utf8()..], c)),
        _ => Err(nom::Err::Error(nom::error::Error::from_error_kind(
            input,
            ErrorKind::OneOf,
        ))),
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Tokenize `text` completely. The only lexical failures are an unclosed
/// string literal and a character outside the language's alphabet.
pub fn lex(text: &str) -> Result<Vec<Token>, SyntaxError> {
    let total = text.len();
    let mut rest = text;
    let mut tokens = Vec::new();

    loop {
        rest = rest.trim_start();
        let offset = total - rest.len();
        let Some(c) = rest.chars().next() else {
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                offset,
            });
            return Ok(tokens);
        };

        let (kind, consumed) = match c {
            '"' => match string_literal(rest) {
                Ok((remaining, unescaped)) => {
                    let consumed = rest.len() - remaining.len();
                    (TokenKind::Str(unescaped), consumed)
                }
                Err(_) => {
                    return Err(SyntaxError::new(
                        offset,
                        "closing '\"'",
                        "unterminated string literal",
                    ))
                }
            },
            '=' => (TokenKind::Eq, 1),
            ',' => (TokenKind::Comma, 1),
            '(' => (TokenKind::LParen, 1),
            ')' => (TokenKind::RParen, 1),
            ';' => (TokenKind::Semi, 1),
            c if is_word_char(c) => {
                let end = rest.find(|ch| !is_word_char(ch)).unwrap_or(rest.len());
                let word = &rest[..end];
                let kind = match Kw::classify(word) {
                    Some(kw) => TokenKind::Keyword(kw),
                    None => TokenKind::Name(word.to_string()),
                };
                (kind, end)
            }
            other => {
                return Err(SyntaxError::new(
                    offset,
                    "a keyword, name, string, or punctuation",
                    format!("'{other}'"),
                ))
            }
        };

        tokens.push(Token {
            kind,
            text: rest[..consumed].to_string(),
            offset,
        });
        rest = &rest[consumed..];
    }
}
