use std::fmt::Display;

use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    env::{Basis, Environment, EvalRequest, TransformRule, Vector},
    lex::{SourceLine, write_numbers},
    parse::{SymbolKind, UndefinedSymbolError},
    solve::{Matrix, SolveError, solve},
};

#[derive(Error, Debug, Diagnostic)]
#[error("basis `{basis}` has no members")]
#[diagnostic(code(coord_eval::empty_basis))]
pub struct EmptyBasisError {
    #[source_code]
    src: NamedSource<String>,

    #[label("requested here")]
    bad_bit: SourceSpan,

    pub basis: String,
}

#[derive(Error, Debug, Diagnostic)]
#[error("basis `{basis}` is linearly dependent: {reason}")]
#[diagnostic(
    code(coord_eval::singular_matrix),
    help("no unique coordinates exist; pick basis vectors that are not multiples of each other")
)]
pub struct SingularMatrixError {
    #[source_code]
    src: NamedSource<String>,

    #[label("requested here")]
    bad_bit: SourceSpan,

    pub basis: String,
    #[source]
    reason: SolveError,
}

#[derive(Error, Debug, Diagnostic)]
#[error("transform `{transform}` has no rule for `{member}`")]
#[diagnostic(
    code(coord_eval::missing_mapping),
    help("add a line of the form {transform}(\\vec{{...}}) = ... for every member of the source basis")
)]
pub struct MissingMappingError {
    #[source_code]
    src: NamedSource<String>,

    #[label("requested here")]
    bad_bit: SourceSpan,

    pub transform: String,
    pub member: String,
}

#[derive(Error, Debug, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(coord_eval::dimension_mismatch))]
pub struct DimensionMismatchError {
    #[source_code]
    src: NamedSource<String>,

    #[label("requested here")]
    bad_bit: SourceSpan,

    pub message: String,
}

impl DimensionMismatchError {
    fn build(origin: &SourceLine, message: impl Into<String>) -> Self {
        DimensionMismatchError {
            src: origin.named_source(),
            bad_bit: origin.whole(),
            message: message.into(),
        }
    }
}

/// A request together with its numeric answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub request: EvalRequest,
    pub result: Vec<f64>,
}

impl Display for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = (", self.request)?;
        write_numbers(f, &self.result)?;
        write!(f, ")")
    }
}

pub struct Evaluator<'a> {
    env: &'a Environment,
}

impl<'a> Evaluator<'a> {
    pub fn new(env: &'a Environment) -> Self {
        Evaluator { env }
    }

    /// Evaluates the environment's pending request, if there is one.
    pub fn run(&self) -> Result<Option<Evaluation>, Error> {
        let Some(request) = self.env.eval_request() else {
            return Ok(None);
        };
        let result = self.evaluate(request)?;
        Ok(Some(Evaluation {
            request: request.clone(),
            result,
        }))
    }

    pub fn evaluate(&self, request: &EvalRequest) -> Result<Vec<f64>, Error> {
        match request {
            EvalRequest::ChangeBasis {
                vector,
                basis,
                origin,
            } => {
                let vector = self.vector(origin, vector)?;
                let basis = self.basis(origin, basis)?;
                self.change_basis(origin, vector, basis)
            }
            EvalRequest::ApplyTransform {
                transform,
                vector,
                origin,
            } => {
                let vector = self.vector(origin, vector)?;
                let Some(rule) = self.env.transform(transform) else {
                    return Err(UndefinedSymbolError::build(
                        origin,
                        origin.whole(),
                        SymbolKind::Transform,
                        transform,
                    )
                    .into());
                };
                self.apply_transform(origin, rule, vector)
            }
        }
    }

    fn vector(&self, origin: &SourceLine, name: &str) -> Result<&'a Vector, Error> {
        self.env.vector(name).ok_or_else(|| {
            UndefinedSymbolError::build(origin, origin.whole(), SymbolKind::Vector, name).into()
        })
    }

    fn basis(&self, origin: &SourceLine, name: &str) -> Result<&'a Basis, Error> {
        self.env.basis(name).ok_or_else(|| {
            UndefinedSymbolError::build(origin, origin.whole(), SymbolKind::Basis, name).into()
        })
    }

    /// Coordinates of `vector` in `basis`: solves `M x = v` where the columns
    /// of `M` are the basis members in declared order.
    pub fn change_basis(
        &self,
        origin: &SourceLine,
        vector: &Vector,
        basis: &Basis,
    ) -> Result<Vec<f64>, Error> {
        if basis.is_empty() {
            return Err(EmptyBasisError {
                src: origin.named_source(),
                bad_bit: origin.whole(),
                basis: basis.name.clone(),
            }
            .into());
        }

        let mut columns: Vec<&[f64]> = Vec::with_capacity(basis.len());
        for (member, name) in self.env.basis_members(basis).zip(&basis.members) {
            let Some(member) = member else {
                return Err(UndefinedSymbolError::build(
                    origin,
                    origin.whole(),
                    SymbolKind::Vector,
                    name,
                )
                .into());
            };
            columns.push(&member.components);
        }

        let Some(matrix) = Matrix::from_columns(&columns) else {
            return Err(DimensionMismatchError::build(
                origin,
                format!(
                    "basis `{}` has {} members but its vectors are not all {}-dimensional",
                    basis.name,
                    basis.len(),
                    basis.len()
                ),
            )
            .into());
        };
        trace!(basis = %basis.name, "change-of-basis matrix:\n{matrix}");

        match solve(matrix, &vector.components) {
            Ok(x) => {
                debug!(vector = %vector.name, basis = %basis.name, "solved change of basis");
                Ok(x)
            }
            Err(SolveError::DimensionMismatch { rows, found }) => {
                Err(DimensionMismatchError::build(
                    origin,
                    format!(
                        "vector `{}` has {found} components but basis `{}` spans {rows} dimensions",
                        vector.name, basis.name
                    ),
                )
                .into())
            }
            Err(reason @ SolveError::Singular { .. }) => Err(SingularMatrixError {
                src: origin.named_source(),
                bad_bit: origin.whole(),
                basis: basis.name.clone(),
                reason,
            }
            .into()),
        }
    }

    /// Applies `rule` to `vector`, whose components are read as coordinates
    /// in the rule's source basis.
    pub fn apply_transform(
        &self,
        origin: &SourceLine,
        rule: &TransformRule,
        vector: &Vector,
    ) -> Result<Vec<f64>, Error> {
        let from = self.basis(origin, &rule.from_basis)?;
        let to = self.basis(origin, &rule.to_basis)?;

        if vector.components.len() != from.len() {
            return Err(DimensionMismatchError::build(
                origin,
                format!(
                    "vector `{}` has {} components but basis `{}` has {} members",
                    vector.name,
                    vector.components.len(),
                    from.name,
                    from.len()
                ),
            )
            .into());
        }

        let mut result = vec![0.0; to.len()];
        for (member, &scalar) in from.members.iter().zip(&vector.components) {
            let Some(terms) = rule.map.get(member) else {
                return Err(MissingMappingError {
                    src: origin.named_source(),
                    bad_bit: origin.whole(),
                    transform: rule.name.clone(),
                    member: member.clone(),
                }
                .into());
            };
            for term in terms {
                let Some(j) = to.index_of(&term.vector) else {
                    return Err(UndefinedSymbolError::build(
                        origin,
                        origin.whole(),
                        SymbolKind::Vector,
                        &term.vector,
                    )
                    .within(&to.name)
                    .into());
                };
                result[j] += scalar * term.coefficient;
            }
        }
        debug!(transform = %rule.name, vector = %vector.name, "applied transform");
        Ok(result)
    }
}
