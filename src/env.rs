use std::{collections::BTreeMap, fmt::Display};

use crate::lex::{SourceLine, write_numbers};

#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    pub name: String,
    pub components: Vec<f64>,
    /// Name of the basis this vector was declared a member of.
    pub basis: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Basis {
    pub name: String,
    /// Member vector names; the order is the column order of the
    /// change-of-basis matrix.
    pub members: Vec<String>,
}

impl Basis {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn index_of(&self, vector: &str) -> Option<usize> {
        self.members.iter().position(|member| member == vector)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearTerm {
    pub coefficient: f64,
    pub vector: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformRule {
    pub name: String,
    pub from_basis: String,
    pub to_basis: String,
    /// Keyed by `from_basis` member name.
    pub map: BTreeMap<String, Vec<LinearTerm>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvalRequest {
    ChangeBasis {
        vector: String,
        basis: String,
        origin: SourceLine,
    },
    ApplyTransform {
        transform: String,
        vector: String,
        origin: SourceLine,
    },
}

impl EvalRequest {
    /// The statement the request was read from.
    pub fn origin(&self) -> &SourceLine {
        match self {
            EvalRequest::ChangeBasis { origin, .. } | EvalRequest::ApplyTransform { origin, .. } => {
                origin
            }
        }
    }
}

impl Display for EvalRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalRequest::ChangeBasis { vector, basis, .. } => write!(f, r"[\vec{{{vector}}}]_{basis}"),
            EvalRequest::ApplyTransform {
                transform, vector, ..
            } => write!(f, r"{transform}(\vec{{{vector}}})"),
        }
    }
}

/// The symbol table. Only the builder in [`crate::parse`] mutates it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    vectors: BTreeMap<String, Vector>,
    bases: BTreeMap<String, Basis>,
    transforms: BTreeMap<String, TransformRule>,
    eval: Option<EvalRequest>,
}

impl Environment {
    pub fn vector(&self, name: &str) -> Option<&Vector> {
        self.vectors.get(name)
    }

    pub fn basis(&self, name: &str) -> Option<&Basis> {
        self.bases.get(name)
    }

    pub fn transform(&self, name: &str) -> Option<&TransformRule> {
        self.transforms.get(name)
    }

    pub fn eval_request(&self) -> Option<&EvalRequest> {
        self.eval.as_ref()
    }

    pub fn vectors(&self) -> impl Iterator<Item = &Vector> {
        self.vectors.values()
    }

    pub fn bases(&self) -> impl Iterator<Item = &Basis> {
        self.bases.values()
    }

    pub fn transforms(&self) -> impl Iterator<Item = &TransformRule> {
        self.transforms.values()
    }

    /// The member vectors of `basis`, in declared order.
    pub fn basis_members<'a>(&'a self, basis: &'a Basis) -> impl Iterator<Item = Option<&'a Vector>> {
        basis.members.iter().map(|member| self.vectors.get(member))
    }

    pub(crate) fn insert_vector(&mut self, vector: Vector) {
        self.vectors.insert(vector.name.clone(), vector);
    }

    pub(crate) fn insert_basis(&mut self, basis: Basis) {
        for member in &basis.members {
            if let Some(vector) = self.vectors.get_mut(member) {
                vector.basis = Some(basis.name.clone());
            }
        }
        self.bases.insert(basis.name.clone(), basis);
    }

    pub(crate) fn transform_mut(&mut self, name: &str) -> Option<&mut TransformRule> {
        self.transforms.get_mut(name)
    }

    pub(crate) fn insert_transform(&mut self, rule: TransformRule) {
        self.transforms.insert(rule.name.clone(), rule);
    }

    /// Returns the request that was pending before, if any.
    pub(crate) fn set_eval_request(&mut self, request: EvalRequest) -> Option<EvalRequest> {
        self.eval.replace(request)
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for vector in self.vectors() {
            write!(f, "vector {} = (", vector.name)?;
            write_numbers(f, &vector.components)?;
            write!(f, ")")?;
            if let Some(basis) = &vector.basis {
                write!(f, " in {basis}")?;
            }
            writeln!(f)?;
        }
        for basis in self.bases() {
            writeln!(f, "basis {} = {{{}}}", basis.name, basis.members.join(", "))?;
        }
        for rule in self.transforms() {
            writeln!(f, "transform {}: {} -> {}", rule.name, rule.from_basis, rule.to_basis)?;
            for (domain, terms) in &rule.map {
                let terms: Vec<_> = terms
                    .iter()
                    .map(|term| format!("{}*{}", term.coefficient, term.vector))
                    .collect();
                writeln!(f, "  {}({domain}) = {}", rule.name, terms.join(" + "))?;
            }
        }
        match &self.eval {
            Some(request) => writeln!(f, "eval {request}"),
            None => writeln!(f, "eval <none>"),
        }
    }
}
