//! Translation of [`StructuredQuery`] trees into Tantivy queries.

use directory_types::identifier::DEFAULT_PARTICIPANT_SCHEME;
use directory_types::ParticipantIdentifier;
use tantivy::query::{
    AllQuery, BooleanQuery, EmptyQuery, Occur, PhrasePrefixQuery, PhraseQuery, Query, RegexQuery,
    TermQuery,
};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::tokenizer::TokenStream;
use tantivy::{Index, Term};

use crate::error::SearchError;
use crate::query::{QueryField, QueryMode, StructuredQuery, TermKind};
use crate::schema::DirectorySchema;

pub(crate) struct QueryCompiler<'a> {
    index: &'a Index,
    schema: &'a DirectorySchema,
}

impl<'a> QueryCompiler<'a> {
    pub(crate) fn new(index: &'a Index, schema: &'a DirectorySchema) -> Self {
        Self { index, schema }
    }

    pub(crate) fn compile(
        &self,
        query: &StructuredQuery,
        mode: QueryMode,
    ) -> Result<Box<dyn Query>, SearchError> {
        let compiled = self.compile_node(query)?;
        Ok(match mode {
            QueryMode::IncludeDeleted => compiled,
            QueryMode::ExcludeDeleted => Box::new(BooleanQuery::new(vec![
                (Occur::Must, compiled),
                (Occur::Must, self.live_only()),
            ])),
        })
    }

    /// Matches documents that are not tombstoned.
    pub(crate) fn live_only(&self) -> Box<dyn Query> {
        Box::new(TermQuery::new(
            Term::from_field_bool(self.schema.deleted, false),
            IndexRecordOption::Basic,
        ))
    }

    /// Exact match on the participant key.
    pub(crate) fn participant(&self, participant: &ParticipantIdentifier) -> Box<dyn Query> {
        Box::new(TermQuery::new(
            Term::from_field_text(self.schema.participant_id, &participant.canonical_string()),
            IndexRecordOption::Basic,
        ))
    }

    fn compile_node(&self, query: &StructuredQuery) -> Result<Box<dyn Query>, SearchError> {
        match query {
            StructuredQuery::All => Ok(Box::new(AllQuery)),
            StructuredQuery::Term { field, text, kind } => self.compile_term(*field, text, *kind),
            StructuredQuery::And(children) => {
                let mut clauses = Vec::with_capacity(children.len() + 1);
                for child in children {
                    match child {
                        StructuredQuery::Not(inner) => {
                            clauses.push((Occur::MustNot, self.compile_node(inner)?))
                        }
                        other => clauses.push((Occur::Must, self.compile_node(other)?)),
                    }
                }
                if !clauses.iter().any(|(occur, _)| *occur == Occur::Must) {
                    clauses.push((Occur::Must, Box::new(AllQuery)));
                }
                Ok(Box::new(BooleanQuery::new(clauses)))
            }
            StructuredQuery::Or(children) => {
                let clauses = children
                    .iter()
                    .map(|child| Ok((Occur::Should, self.compile_node(child)?)))
                    .collect::<Result<Vec<_>, SearchError>>()?;
                Ok(Box::new(BooleanQuery::new(clauses)))
            }
            // Negation needs a positive clause to subtract from
            StructuredQuery::Not(inner) => Ok(Box::new(BooleanQuery::new(vec![
                (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
                (Occur::MustNot, self.compile_node(inner)?),
            ]))),
        }
    }

    fn compile_term(
        &self,
        field: QueryField,
        text: &str,
        kind: TermKind,
    ) -> Result<Box<dyn Query>, SearchError> {
        let index_field = self.index_field(field);
        if is_tokenized(field) {
            let tokens = self.tokenize(index_field, text)?;
            let terms: Vec<Term> = tokens
                .iter()
                .map(|token| Term::from_field_text(index_field, token))
                .collect();
            return Ok(match (terms.len(), kind) {
                (0, _) => Box::new(EmptyQuery),
                (1, TermKind::Prefix) => Box::new(RegexQuery::from_pattern(
                    &format!("{}.*", escape_regex(&tokens[0])),
                    index_field,
                )?),
                (1, _) => Box::new(TermQuery::new(
                    terms[0].clone(),
                    IndexRecordOption::WithFreqs,
                )),
                (_, TermKind::Prefix) => Box::new(PhrasePrefixQuery::new(terms)),
                _ => Box::new(PhraseQuery::new(terms)),
            });
        }

        let value = normalize_raw(field, text, kind);
        Ok(match kind {
            TermKind::Prefix => Box::new(RegexQuery::from_pattern(
                &format!("{}.*", escape_regex(&value)),
                index_field,
            )?),
            TermKind::Word | TermKind::Phrase => Box::new(TermQuery::new(
                Term::from_field_text(index_field, &value),
                IndexRecordOption::Basic,
            )),
        })
    }

    fn tokenize(&self, field: Field, text: &str) -> Result<Vec<String>, SearchError> {
        let mut analyzer = self.index.tokenizer_for_field(field)?;
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }
        Ok(tokens)
    }

    fn index_field(&self, field: QueryField) -> Field {
        let s = self.schema;
        match field {
            QueryField::All => s.fulltext,
            QueryField::Participant => s.participant_id,
            QueryField::Name => s.name,
            QueryField::Country => s.country_code,
            QueryField::GeoInfo => s.geo_info,
            QueryField::Identifier => s.identifier_value,
            QueryField::IdentifierScheme => s.identifier_scheme,
            QueryField::DocType => s.doc_type_id,
            QueryField::Website => s.website,
            QueryField::Contact => s.contact,
            QueryField::AdditionalInfo => s.additional_info,
            QueryField::RegistrationDate => s.registration_date,
            QueryField::Owner => s.owner_id,
        }
    }
}

fn is_tokenized(field: QueryField) -> bool {
    matches!(
        field,
        QueryField::All
            | QueryField::Name
            | QueryField::GeoInfo
            | QueryField::Contact
            | QueryField::AdditionalInfo
    )
}

/// Bring a raw-field value into its indexed form.
fn normalize_raw(field: QueryField, text: &str, kind: TermKind) -> String {
    match field {
        QueryField::Country => text.trim().to_uppercase(),
        QueryField::Participant => {
            let qualified = if text.contains("::") {
                text.to_string()
            } else {
                format!("{}::{}", DEFAULT_PARTICIPANT_SCHEME, text)
            };
            if kind == TermKind::Prefix {
                let default_prefix = format!("{}::", DEFAULT_PARTICIPANT_SCHEME);
                if qualified.to_lowercase().starts_with(&default_prefix) {
                    return qualified.to_lowercase();
                }
                return qualified;
            }
            ParticipantIdentifier::parse(&qualified)
                .map(|pid| pid.canonical_string())
                .unwrap_or(qualified)
        }
        _ => text.to_string(),
    }
}

/// Escape characters with a meaning in the regex syntax.
fn escape_regex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '\\' | '.'
                | '+'
                | '*'
                | '?'
                | '('
                | ')'
                | '|'
                | '['
                | ']'
                | '{'
                | '}'
                | '^'
                | '$'
                | '#'
                | '&'
                | '-'
                | '~'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
