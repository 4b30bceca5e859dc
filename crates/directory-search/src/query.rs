//! User query parsing.
//!
//! Grammar (bare terms are joined with AND):
//!
//! ```text
//! query   := or EOF
//! or      := and ("OR" and)*
//! and     := unary (["AND"] unary)*
//! unary   := ("NOT" | "-") unary | primary
//! primary := "(" or ")" | [field ":"] (word | "phrase") ["*"]
//! ```
//!
//! Malformed input is rejected with a [`QuerySyntaxError`] rather than being
//! reinterpreted as a looser query.

use std::fmt;

use thiserror::Error;

/// Which documents a search considers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryMode {
    /// Tombstoned documents are invisible
    #[default]
    ExcludeDeleted,
    /// Tombstoned documents are returned too
    IncludeDeleted,
}

/// Field a term is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryField {
    /// Combined text of all descriptive fields
    All,
    Participant,
    Name,
    Country,
    GeoInfo,
    Identifier,
    IdentifierScheme,
    DocType,
    Website,
    Contact,
    AdditionalInfo,
    RegistrationDate,
    Owner,
}

impl QueryField {
    /// Names accepted before `:` in a query.
    pub const NAMED: [(&'static str, QueryField); 12] = [
        ("participant", QueryField::Participant),
        ("name", QueryField::Name),
        ("country", QueryField::Country),
        ("geo", QueryField::GeoInfo),
        ("identifier", QueryField::Identifier),
        ("identifierscheme", QueryField::IdentifierScheme),
        ("doctype", QueryField::DocType),
        ("website", QueryField::Website),
        ("contact", QueryField::Contact),
        ("info", QueryField::AdditionalInfo),
        ("regdate", QueryField::RegistrationDate),
        ("owner", QueryField::Owner),
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::NAMED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, field)| *field)
    }
}

/// How a term's text is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    Word,
    Phrase,
    Prefix,
}

/// Parsed, engine-independent query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredQuery {
    /// Matches every document
    All,
    Term {
        field: QueryField,
        text: String,
        kind: TermKind,
    },
    And(Vec<StructuredQuery>),
    Or(Vec<StructuredQuery>),
    Not(Box<StructuredQuery>),
}

impl StructuredQuery {
    pub fn word(field: QueryField, text: impl Into<String>) -> Self {
        StructuredQuery::Term {
            field,
            text: text.into(),
            kind: TermKind::Word,
        }
    }

    pub fn phrase(field: QueryField, text: impl Into<String>) -> Self {
        StructuredQuery::Term {
            field,
            text: text.into(),
            kind: TermKind::Phrase,
        }
    }

    pub fn prefix(field: QueryField, text: impl Into<String>) -> Self {
        StructuredQuery::Term {
            field,
            text: text.into(),
            kind: TermKind::Prefix,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuerySyntaxError {
    #[error("Query is empty")]
    Empty,

    #[error("Unterminated quote starting at position {0}")]
    UnterminatedQuote(usize),

    #[error("Unbalanced parenthesis at position {0}")]
    UnbalancedParenthesis(usize),

    #[error("Empty group at position {0}")]
    EmptyGroup(usize),

    #[error("Empty phrase at position {0}")]
    EmptyPhrase(usize),

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Field '{0}' has no value")]
    MissingFieldValue(String),

    #[error("Wildcard is only allowed at the end of a term (position {0})")]
    MisplacedWildcard(usize),

    #[error("Unexpected {found} at position {position}")]
    UnexpectedToken { position: usize, found: String },

    #[error("Query ends after an operator")]
    UnexpectedEnd,
}

/// Parses user query strings into [`StructuredQuery`] values.
pub struct QueryManager;

impl QueryManager {
    pub fn parse_query(input: &str) -> Result<StructuredQuery, QuerySyntaxError> {
        let tokens = Lexer::new(input).tokenize()?;
        if tokens.is_empty() {
            return Err(QuerySyntaxError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let query = parser.parse_or()?;
        match parser.peek() {
            None => Ok(query),
            Some(Spanned {
                token: Token::RParen,
                position,
            }) => Err(QuerySyntaxError::UnbalancedParenthesis(*position)),
            Some(other) => Err(other.unexpected()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Field(QueryField, String),
    Word(String, bool),
    Phrase(String, bool),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::And => f.write_str("AND"),
            Token::Or => f.write_str("OR"),
            Token::Not => f.write_str("NOT"),
            Token::Field(_, name) => write!(f, "field '{}:'", name),
            Token::Word(w, _) => write!(f, "'{}'", w),
            Token::Phrase(p, _) => write!(f, "\"{}\"", p),
        }
    }
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    position: usize,
}

impl Spanned {
    fn unexpected(&self) -> QuerySyntaxError {
        QuerySyntaxError::UnexpectedToken {
            position: self.position,
            found: self.token.to_string(),
        }
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<Spanned>,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn push(&mut self, token: Token, position: usize) {
        self.tokens.push(Spanned { token, position });
    }

    fn tokenize(mut self) -> Result<Vec<Spanned>, QuerySyntaxError> {
        while let Some(&c) = self.chars.get(self.pos) {
            let start = self.pos;
            match c {
                c if c.is_whitespace() => self.pos += 1,
                '(' => {
                    self.pos += 1;
                    self.push(Token::LParen, start);
                }
                ')' => {
                    self.pos += 1;
                    self.push(Token::RParen, start);
                }
                '"' => self.lex_phrase()?,
                '-' => {
                    self.pos += 1;
                    self.push(Token::Not, start);
                }
                _ => self.lex_word()?,
            }
        }
        Ok(self.tokens)
    }

    fn lex_phrase(&mut self) -> Result<(), QuerySyntaxError> {
        let start = self.pos;
        self.pos += 1;
        let mut text = String::new();
        loop {
            match self.chars.get(self.pos) {
                None => return Err(QuerySyntaxError::UnterminatedQuote(start)),
                Some('"') => {
                    self.pos += 1;
                    break;
                }
                Some(&c) => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
        if text.trim().is_empty() {
            return Err(QuerySyntaxError::EmptyPhrase(start));
        }
        let prefix = self.chars.get(self.pos) == Some(&'*');
        if prefix {
            self.pos += 1;
        }
        self.push(Token::Phrase(text, prefix), start);
        Ok(())
    }

    fn lex_word(&mut self) -> Result<(), QuerySyntaxError> {
        let start = self.pos;
        let mut word = String::new();
        while let Some(&c) = self.chars.get(self.pos) {
            if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                break;
            }
            word.push(c);
            self.pos += 1;
        }

        let keyword = match word.as_str() {
            "AND" => Some(Token::And),
            "OR" => Some(Token::Or),
            "NOT" => Some(Token::Not),
            _ => None,
        };
        if let Some(token) = keyword {
            self.push(token, start);
            return Ok(());
        }

        let mut value_start = start;
        let mut value = word.as_str();
        if let Some((name, rest)) = word.split_once(':') {
            let is_field_name =
                !name.is_empty() && name.chars().all(|c| c.is_ascii_alphabetic() || c == '_');
            if is_field_name {
                let field = QueryField::from_name(name)
                    .ok_or_else(|| QuerySyntaxError::UnknownField(name.to_string()))?;
                self.push(Token::Field(field, name.to_string()), start);
                if rest.is_empty() {
                    // Only a directly following phrase can be the value, e.g. name:"Acme Corp"
                    if self.chars.get(self.pos) == Some(&'"') {
                        return Ok(());
                    }
                    return Err(QuerySyntaxError::MissingFieldValue(name.to_string()));
                }
                value_start = start + name.chars().count() + 1;
                value = rest;
            }
        }

        let (text, prefix) = match value.strip_suffix('*') {
            Some(stem) => (stem, true),
            None => (value, false),
        };
        if let Some(offset) = text.find('*') {
            return Err(QuerySyntaxError::MisplacedWildcard(
                value_start + text[..offset].chars().count(),
            ));
        }
        if text.is_empty() {
            return Err(QuerySyntaxError::MisplacedWildcard(value_start));
        }
        let token = Token::Word(text.to_string(), prefix);
        self.push(token, value_start);
        Ok(())
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<StructuredQuery, QuerySyntaxError> {
        let mut branches = vec![self.parse_and()?];
        while matches!(self.peek(), Some(s) if s.token == Token::Or) {
            self.pos += 1;
            branches.push(self.parse_and()?);
        }
        Ok(if branches.len() == 1 {
            branches.remove(0)
        } else {
            StructuredQuery::Or(branches)
        })
    }

    fn parse_and(&mut self) -> Result<StructuredQuery, QuerySyntaxError> {
        let mut clauses = vec![self.parse_unary()?];
        loop {
            match self.peek().map(|s| &s.token) {
                Some(Token::And) => {
                    self.pos += 1;
                    clauses.push(self.parse_unary()?);
                }
                Some(
                    Token::Not
                    | Token::LParen
                    | Token::Field(..)
                    | Token::Word(..)
                    | Token::Phrase(..),
                ) => clauses.push(self.parse_unary()?),
                _ => break,
            }
        }
        Ok(if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            StructuredQuery::And(clauses)
        })
    }

    fn parse_unary(&mut self) -> Result<StructuredQuery, QuerySyntaxError> {
        if matches!(self.peek(), Some(s) if s.token == Token::Not) {
            self.pos += 1;
            return Ok(StructuredQuery::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<StructuredQuery, QuerySyntaxError> {
        let spanned = self.next().ok_or(QuerySyntaxError::UnexpectedEnd)?;
        match spanned.token {
            Token::LParen => {
                if matches!(self.peek(), Some(s) if s.token == Token::RParen) {
                    return Err(QuerySyntaxError::EmptyGroup(spanned.position));
                }
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Spanned {
                        token: Token::RParen,
                        ..
                    }) => Ok(inner),
                    _ => Err(QuerySyntaxError::UnbalancedParenthesis(spanned.position)),
                }
            }
            Token::Field(field, name) => match self.next() {
                Some(Spanned {
                    token: Token::Word(text, prefix),
                    ..
                }) => Ok(term(field, text, prefix, TermKind::Word)),
                Some(Spanned {
                    token: Token::Phrase(text, prefix),
                    ..
                }) => Ok(term(field, text, prefix, TermKind::Phrase)),
                _ => Err(QuerySyntaxError::MissingFieldValue(name)),
            },
            Token::Word(text, prefix) => Ok(term(QueryField::All, text, prefix, TermKind::Word)),
            Token::Phrase(text, prefix) => {
                Ok(term(QueryField::All, text, prefix, TermKind::Phrase))
            }
            Token::RParen => Err(QuerySyntaxError::UnbalancedParenthesis(spanned.position)),
            Token::And | Token::Or | Token::Not => Err(spanned.unexpected()),
        }
    }
}

fn term(field: QueryField, text: String, prefix: bool, kind: TermKind) -> StructuredQuery {
    StructuredQuery::Term {
        field,
        text,
        kind: if prefix { TermKind::Prefix } else { kind },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> StructuredQuery {
        QueryManager::parse_query(input).unwrap()
    }

    #[test]
    fn test_bare_terms_are_conjunctive() {
        assert_eq!(
            parse("acme vienna"),
            StructuredQuery::And(vec![
                StructuredQuery::word(QueryField::All, "acme"),
                StructuredQuery::word(QueryField::All, "vienna"),
            ])
        );
    }

    #[test]
    fn test_or_binds_looser_than_and() {
        assert_eq!(
            parse("a b OR c"),
            StructuredQuery::Or(vec![
                StructuredQuery::And(vec![
                    StructuredQuery::word(QueryField::All, "a"),
                    StructuredQuery::word(QueryField::All, "b"),
                ]),
                StructuredQuery::word(QueryField::All, "c"),
            ])
        );
    }

    #[test]
    fn test_fields_phrases_and_prefixes() {
        assert_eq!(
            parse(r#"country:AT name:"Test Company" acm*"#),
            StructuredQuery::And(vec![
                StructuredQuery::word(QueryField::Country, "AT"),
                StructuredQuery::phrase(QueryField::Name, "Test Company"),
                StructuredQuery::prefix(QueryField::All, "acm"),
            ])
        );
    }

    #[test]
    fn test_participant_value_keeps_colons() {
        assert_eq!(
            parse("participant:iso6523-actorid-upis::9915:test"),
            StructuredQuery::word(QueryField::Participant, "iso6523-actorid-upis::9915:test")
        );
        // Non-alphabetic prefix is not a field
        assert_eq!(parse("9915:test"), StructuredQuery::word(QueryField::All, "9915:test"));
    }

    #[test]
    fn test_negation_and_groups() {
        assert_eq!(
            parse("acme -(country:NO OR country:SE)"),
            StructuredQuery::And(vec![
                StructuredQuery::word(QueryField::All, "acme"),
                StructuredQuery::Not(Box::new(StructuredQuery::Or(vec![
                    StructuredQuery::word(QueryField::Country, "NO"),
                    StructuredQuery::word(QueryField::Country, "SE"),
                ]))),
            ])
        );
        assert_eq!(
            parse("NOT acme"),
            StructuredQuery::Not(Box::new(StructuredQuery::word(QueryField::All, "acme")))
        );
    }

    #[test]
    fn test_explicit_and() {
        assert_eq!(parse("a AND b"), parse("a b"));
    }

    #[test]
    fn test_syntax_errors() {
        let err = |input: &str| QueryManager::parse_query(input).unwrap_err();
        assert_eq!(err("   "), QuerySyntaxError::Empty);
        assert_eq!(err("(acme"), QuerySyntaxError::UnbalancedParenthesis(0));
        assert_eq!(err("acme)"), QuerySyntaxError::UnbalancedParenthesis(4));
        assert_eq!(err("\"acme"), QuerySyntaxError::UnterminatedQuote(0));
        assert_eq!(err("()"), QuerySyntaxError::EmptyGroup(0));
        assert_eq!(err("\"  \""), QuerySyntaxError::EmptyPhrase(0));
        assert_eq!(err("color:red"), QuerySyntaxError::UnknownField("color".to_string()));
        assert_eq!(err("name: acme"), QuerySyntaxError::MissingFieldValue("name".to_string()));
        assert_eq!(err("ac*me"), QuerySyntaxError::MisplacedWildcard(2));
        assert_eq!(err("*"), QuerySyntaxError::MisplacedWildcard(0));
        assert_eq!(err("acme AND"), QuerySyntaxError::UnexpectedEnd);
        assert!(matches!(
            err("OR acme"),
            QuerySyntaxError::UnexpectedToken { position: 0, .. }
        ));
        assert!(matches!(
            err("a OR OR b"),
            QuerySyntaxError::UnexpectedToken { position: 5, .. }
        ));
    }

    #[test]
    fn test_field_names_case_insensitive() {
        assert_eq!(
            parse("Country:at"),
            StructuredQuery::word(QueryField::Country, "at")
        );
    }
}
