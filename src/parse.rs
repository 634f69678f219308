use std::{collections::BTreeMap, fmt::Display, io::BufRead};

use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;
use tracing::debug;

use crate::{
    Lexer,
    config::Config,
    env::{Basis, Environment, EvalRequest, LinearTerm, TransformRule, Vector},
    lex::{Ident, RawTerm, SourceLine, Token, TokenKind, VecRef},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Vector,
    Basis,
    Transform,
}

impl Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolKind::Vector => write!(f, "vector"),
            SymbolKind::Basis => write!(f, "basis"),
            SymbolKind::Transform => write!(f, "transform"),
        }
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("undefined {kind} `{name}`{context}")]
#[diagnostic(
    code(coord_eval::undefined_symbol),
    help("symbols must be defined on an earlier line than their first use")
)]
pub struct UndefinedSymbolError {
    #[source_code]
    src: NamedSource<String>,

    #[label("referenced here")]
    bad_bit: SourceSpan,

    pub kind: SymbolKind,
    pub name: String,
    context: String,
}

impl UndefinedSymbolError {
    pub(crate) fn build(
        line: &SourceLine,
        span: SourceSpan,
        kind: SymbolKind,
        name: impl Into<String>,
    ) -> Self {
        UndefinedSymbolError {
            src: line.named_source(),
            bad_bit: span,
            kind,
            name: name.into(),
            context: String::new(),
        }
    }

    /// Narrows the lookup that failed, as in "not found in basis `c`".
    pub(crate) fn within(mut self, basis: &str) -> Self {
        self.context = format!(" in basis `{basis}`");
        self
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(coord_eval::semantic))]
pub struct SemanticError {
    #[source_code]
    src: NamedSource<String>,

    #[label("here")]
    bad_bit: SourceSpan,

    pub message: String,
}

impl SemanticError {
    fn build(line: &SourceLine, span: SourceSpan, message: impl Into<String>) -> Self {
        SemanticError {
            src: line.named_source(),
            bad_bit: span,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("transform `{transform}` mixes basis `{expected}` with basis `{found}`")]
#[diagnostic(
    code(coord_eval::inconsistent_basis),
    help("every term of a transform must map between the same pair of bases")
)]
pub struct InconsistentBasisError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this term")]
    bad_bit: SourceSpan,

    pub transform: String,
    pub expected: String,
    pub found: String,
}

/// Folds tokens into an [`Environment`] in source order. The first error
/// ends the parse.
pub struct Parser<R> {
    lexer: Lexer<R>,
    env: Environment,
}

impl<R: BufRead> Parser<R> {
    pub fn new(filename: Option<&str>, reader: R) -> Self {
        Self::with_config(filename, reader, Config::default())
    }

    pub fn with_config(filename: Option<&str>, reader: R, config: Config) -> Self {
        Parser {
            lexer: Lexer::with_config(filename, reader, config),
            env: Environment::default(),
        }
    }

    pub fn parse(mut self) -> Result<Environment, Error> {
        while let Some(token) = self.lexer.next() {
            self.apply(token?)?;
        }
        Ok(self.env)
    }

    fn apply(&mut self, token: Token) -> Result<(), Error> {
        debug!(line = token.line.number, "{token}");
        let Token { kind, line } = token;
        match kind {
            TokenKind::VecAssign { vector, components } => {
                self.define_vector(&line, vector, components)
            }
            TokenKind::BasisAssign { basis, members } => self.define_basis(&line, basis, members),
            TokenKind::TransformAssign {
                transform,
                domain,
                terms,
            } => self.define_rule(&line, transform, domain, terms),
            TokenKind::EvalChangeBasis { vector, basis } => {
                let vector = self.lookup_vector(&line, &vector)?;
                if self.env.basis(&basis.name).is_none() {
                    return Err(UndefinedSymbolError::build(
                        &line,
                        basis.span,
                        SymbolKind::Basis,
                        basis.name,
                    )
                    .into());
                }
                self.request(EvalRequest::ChangeBasis {
                    vector,
                    basis: basis.name,
                    origin: line,
                });
                Ok(())
            }
            TokenKind::EvalTransform { transform, vector } => {
                let vector = self.lookup_vector(&line, &vector)?;
                if self.env.transform(&transform.name).is_none() {
                    return Err(UndefinedSymbolError::build(
                        &line,
                        transform.span,
                        SymbolKind::Transform,
                        transform.name,
                    )
                    .into());
                }
                self.request(EvalRequest::ApplyTransform {
                    transform: transform.name,
                    vector,
                    origin: line,
                });
                Ok(())
            }
        }
    }

    fn lookup_vector(&self, line: &SourceLine, vector: &VecRef) -> Result<String, Error> {
        let name = vector.name();
        if self.env.vector(&name).is_none() {
            return Err(
                UndefinedSymbolError::build(line, vector.span, SymbolKind::Vector, name).into(),
            );
        }
        Ok(name)
    }

    fn request(&mut self, request: EvalRequest) {
        if let Some(previous) = self.env.set_eval_request(request) {
            debug!(
                line = previous.origin().number,
                "eval request {previous} replaced by a later one"
            );
        }
    }

    fn define_vector(
        &mut self,
        line: &SourceLine,
        vector: VecRef,
        components: Vec<f64>,
    ) -> Result<(), Error> {
        let name = vector.name();
        if self.env.vector(&name).is_some() {
            return Err(SemanticError::build(
                line,
                vector.span,
                format!("vector `{name}` is already defined"),
            )
            .into());
        }
        self.env.insert_vector(Vector {
            name,
            components,
            basis: None,
        });
        Ok(())
    }

    fn define_basis(
        &mut self,
        line: &SourceLine,
        basis: Ident,
        members: Vec<VecRef>,
    ) -> Result<(), Error> {
        let mut chars = basis.name.chars();
        let single_lowercase =
            matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_lowercase());
        if !single_lowercase {
            return Err(SemanticError::build(
                line,
                basis.span,
                format!(
                    "invalid basis name `{}`: a basis name is a single lowercase letter",
                    basis.name
                ),
            )
            .into());
        }
        if self.env.basis(&basis.name).is_some() {
            return Err(SemanticError::build(
                line,
                basis.span,
                format!("basis `{}` is already defined", basis.name),
            )
            .into());
        }

        let mut names: Vec<String> = Vec::with_capacity(members.len());
        for member in &members {
            let name = member.name();
            let well_named = name
                .strip_prefix(basis.name.as_str())
                .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()));
            if !well_named {
                return Err(SemanticError::build(
                    line,
                    member.span,
                    format!(
                        "invalid vector name `{name}` in basis `{b}`: expected `{b}` followed by digits",
                        b = basis.name
                    ),
                )
                .into());
            }
            if self.env.vector(&name).is_none() {
                return Err(UndefinedSymbolError::build(
                    line,
                    member.span,
                    SymbolKind::Vector,
                    name,
                )
                .into());
            }
            if names.contains(&name) {
                return Err(SemanticError::build(
                    line,
                    member.span,
                    format!("vector `{name}` appears twice in basis `{}`", basis.name),
                )
                .into());
            }
            names.push(name);
        }

        self.env.insert_basis(Basis {
            name: basis.name,
            members: names,
        });
        Ok(())
    }

    fn define_rule(
        &mut self,
        line: &SourceLine,
        transform: Ident,
        domain: VecRef,
        terms: Vec<RawTerm>,
    ) -> Result<(), Error> {
        let from = domain.letters.clone();
        let Some(from_basis) = self.env.basis(&from) else {
            return Err(
                UndefinedSymbolError::build(line, domain.span, SymbolKind::Basis, from).into(),
            );
        };

        // the lexer guarantees at least one term
        let to = terms[0].vector.letters.clone();
        for term in &terms {
            if term.vector.letters != to {
                return Err(InconsistentBasisError {
                    src: line.named_source(),
                    bad_bit: term.vector.span,
                    transform: transform.name.clone(),
                    expected: to,
                    found: term.vector.letters.clone(),
                }
                .into());
            }
        }
        if self.env.basis(&to).is_none() {
            return Err(UndefinedSymbolError::build(
                line,
                terms[0].vector.span,
                SymbolKind::Basis,
                to,
            )
            .into());
        }

        let domain_name = domain.name();
        if from_basis.index_of(&domain_name).is_none() {
            return Err(UndefinedSymbolError::build(
                line,
                domain.span,
                SymbolKind::Vector,
                domain_name,
            )
            .within(&from)
            .into());
        }

        let linear_terms: Vec<LinearTerm> = terms
            .iter()
            .map(|term| LinearTerm {
                coefficient: term.coefficient,
                vector: term.vector.name(),
            })
            .collect();

        let Some(rule) = self.env.transform_mut(&transform.name) else {
            debug!(transform = %transform.name, %from, %to, "new transform rule");
            self.env.insert_transform(TransformRule {
                name: transform.name,
                from_basis: from,
                to_basis: to,
                map: BTreeMap::from([(domain_name, linear_terms)]),
            });
            return Ok(());
        };

        for (expected, found, span) in [
            (&rule.from_basis, &from, domain.span),
            (&rule.to_basis, &to, terms[0].vector.span),
        ] {
            if expected != found {
                return Err(InconsistentBasisError {
                    src: line.named_source(),
                    bad_bit: span,
                    transform: transform.name.clone(),
                    expected: expected.clone(),
                    found: found.clone(),
                }
                .into());
            }
        }
        if rule.map.contains_key(&domain_name) {
            return Err(SemanticError::build(
                line,
                domain.span,
                format!(
                    r"{}(\vec{{{domain_name}}}) is already defined",
                    transform.name
                ),
            )
            .into());
        }
        rule.map.insert(domain_name, linear_terms);
        Ok(())
    }
}
