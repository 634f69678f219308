use std::{
    fmt::Display,
    io::{self, BufRead, Lines},
    sync::Arc,
};

use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;

use crate::config::Config;

#[derive(Error, Debug, Diagnostic)]
#[error("invalid {what} on line {line}: {text}")]
#[diagnostic(code(coord_eval::lex), help("expected {expected} here"))]
pub struct LexError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this does not match the grammar")]
    bad_bit: SourceSpan,

    line: usize,
    text: String,
    what: &'static str,
    expected: String,
}

impl LexError {
    fn build(line: &SourceLine, what: &'static str, at: usize, expected: impl Into<String>) -> Self {
        let at = at.min(line.text.len());
        LexError {
            src: line.named_source(),
            bad_bit: SourceSpan::from(at..line.text.len()),
            line: line.number,
            text: line.text.clone(),
            what,
            expected: expected.into(),
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// The offending line, trimmed.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("reading line {line} of `{filename}` failed")]
#[diagnostic(code(coord_eval::read))]
pub struct ReadError {
    filename: Arc<str>,
    line: usize,

    #[source]
    source: io::Error,
}

impl ReadError {
    pub fn line(&self) -> usize {
        self.line
    }
}

/// One trimmed input line and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub filename: Arc<str>,
    pub number: usize,
    pub text: String,
}

impl SourceLine {
    pub fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(
            format!("{}:{}", self.filename, self.number),
            self.text.clone(),
        )
    }

    pub fn whole(&self) -> SourceSpan {
        SourceSpan::from(0..self.text.len())
    }
}

/// A bare name such as a basis letter or a transform letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: SourceSpan,
}

/// `\vec{<letters>}[_<digits>]`, kept split so the builder can read the
/// basis prefix. The identifier proper is the concatenation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VecRef {
    pub letters: String,
    pub subscript: String,
    pub span: SourceSpan,
}

impl VecRef {
    pub fn name(&self) -> String {
        format!("{}{}", self.letters, self.subscript)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawTerm {
    pub coefficient: f64,
    pub vector: VecRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: SourceLine,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    VecAssign {
        vector: VecRef,
        components: Vec<f64>,
    },
    BasisAssign {
        basis: Ident,
        members: Vec<VecRef>,
    },
    TransformAssign {
        transform: Ident,
        domain: VecRef,
        terms: Vec<RawTerm>,
    },
    EvalChangeBasis {
        vector: VecRef,
        basis: Ident,
    },
    EvalTransform {
        transform: Ident,
        vector: VecRef,
    },
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TokenKind::VecAssign { vector, components } => {
                write!(f, "VEC_ASSIGN {} (", vector.name())?;
                write_numbers(f, components)?;
                write!(f, ")")
            }
            TokenKind::BasisAssign { basis, members } => {
                let members: Vec<_> = members.iter().map(VecRef::name).collect();
                write!(f, "BASIS_ASSIGN {} {{{}}}", basis.name, members.join(", "))
            }
            TokenKind::TransformAssign {
                transform,
                domain,
                terms,
            } => {
                let terms: Vec<_> = terms
                    .iter()
                    .map(|term| format!("{}*{}", term.coefficient, term.vector.name()))
                    .collect();
                write!(
                    f,
                    "TRANSFORM_ASSIGN {}({}) [{}]",
                    transform.name,
                    domain.name(),
                    terms.join(", ")
                )
            }
            TokenKind::EvalChangeBasis { vector, basis } => {
                write!(f, "EVAL_CHANGE_BASIS {} {}", vector.name(), basis.name)
            }
            TokenKind::EvalTransform { transform, vector } => {
                write!(f, "EVAL_TRANSFORM {} {}", transform.name, vector.name())
            }
        }
    }
}

pub(crate) fn write_numbers(f: &mut std::fmt::Formatter<'_>, numbers: &[f64]) -> std::fmt::Result {
    for (i, x) in numbers.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        // -0 prints as 0
        write!(f, "{}", x + 0.0)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    VecAssign,
    BasisAssign,
    TransformAssign,
    EvalChangeBasis,
    EvalTransform,
}

impl StatementKind {
    pub fn describe(self) -> &'static str {
        match self {
            StatementKind::VecAssign => "vector assignment",
            StatementKind::BasisAssign => "basis assignment",
            StatementKind::TransformAssign => "transform assignment",
            StatementKind::EvalChangeBasis => "change-of-basis evaluation",
            StatementKind::EvalTransform => "transform evaluation",
        }
    }
}

/// Picks the statement kind from structural cues only. The full grammar of
/// the kind is applied afterwards.
pub fn classify(line: &str) -> Option<StatementKind> {
    let applies_transform = transform_head(line) && line.contains(r"\vec");
    if line.contains("pmatrix") {
        Some(StatementKind::VecAssign)
    } else if line.contains("eval") && line.starts_with('[') {
        Some(StatementKind::EvalChangeBasis)
    } else if line.contains("eval") && applies_transform {
        Some(StatementKind::EvalTransform)
    } else if applies_transform {
        Some(StatementKind::TransformAssign)
    } else if line.contains('{') {
        Some(StatementKind::BasisAssign)
    } else {
        None
    }
}

fn transform_head(line: &str) -> bool {
    let mut chars = line.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.as_str().trim_start().starts_with('(')
}

/// `""` and `"+"` mean 1, `"-"` means -1, anything else must be a signed
/// decimal. Whitespace inside the text is ignored.
pub fn parse_coefficient(text: &str) -> Option<f64> {
    let text: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    match text.as_str() {
        "" | "+" => return Some(1.0),
        "-" => return Some(-1.0),
        _ => {}
    }

    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(&text);
    let dots = unsigned.matches('.').count();
    let digits = unsigned.chars().filter(char::is_ascii_digit).count();
    if dots > 1 || digits == 0 || digits + dots != unsigned.len() {
        return None;
    }
    text.parse().ok()
}

pub struct Lexer<R> {
    filename: Arc<str>,
    lines: Lines<R>,
    line_number: usize,
    config: Config,
}

impl<R: BufRead> Lexer<R> {
    pub fn new(filename: Option<&str>, reader: R) -> Self {
        Self::with_config(filename, reader, Config::default())
    }

    pub fn with_config(filename: Option<&str>, reader: R, config: Config) -> Self {
        Lexer {
            filename: Arc::from(filename.unwrap_or("<input>")),
            lines: reader.lines(),
            line_number: 0,
            config,
        }
    }
}

impl<R: BufRead> Iterator for Lexer<R> {
    type Item = Result<Token, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next = self.lines.next()?;
            self.line_number += 1;
            let raw = match next {
                Ok(raw) => raw,
                Err(source) => {
                    return Some(Err(ReadError {
                        filename: self.filename.clone(),
                        line: self.line_number,
                        source,
                    }
                    .into()));
                }
            };

            let text = raw.trim();
            if text.is_empty() || self.config.is_comment(text) {
                continue;
            }

            let line = SourceLine {
                filename: self.filename.clone(),
                number: self.line_number,
                text: text.to_string(),
            };
            return Some(scan(line));
        }
    }
}

fn scan(line: SourceLine) -> Result<Token, Error> {
    let Some(statement) = classify(&line.text) else {
        return Err(LexError::build(
            &line,
            "statement",
            0,
            "a vector, basis, transform or eval statement",
        )
        .into());
    };

    let kind = {
        let mut cursor = Cursor {
            line: &line,
            text: &line.text,
            pos: 0,
            statement,
        };
        let kind = match statement {
            StatementKind::VecAssign => cursor.vec_assign()?,
            StatementKind::BasisAssign => cursor.basis_assign()?,
            StatementKind::TransformAssign => cursor.transform_assign()?,
            StatementKind::EvalChangeBasis => cursor.eval_change_basis()?,
            StatementKind::EvalTransform => cursor.eval_transform()?,
        };
        cursor.finish()?;
        kind
    };

    Ok(Token { kind, line })
}

#[derive(Clone, Copy)]
enum Subscript {
    Optional,
    Required,
}

struct Cursor<'a> {
    line: &'a SourceLine,
    text: &'a str,
    pos: usize,
    statement: StatementKind,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn error(&self, at: usize, expected: impl Into<String>) -> Error {
        LexError::build(self.line, self.statement.describe(), at, expected).into()
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.text.len() - trimmed.len();
    }

    fn eat(&mut self, literal: &str) -> bool {
        self.skip_whitespace();
        if self.rest().starts_with(literal) {
            self.pos += literal.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, literal: &str) -> Result<(), Error> {
        if self.eat(literal) {
            Ok(())
        } else {
            Err(self.error(self.pos, format!("`{literal}`")))
        }
    }

    fn take_while(&mut self, check: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let end = rest.find(|c| !check(c)).unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    fn letters(&mut self) -> Result<Ident, Error> {
        self.skip_whitespace();
        let start = self.pos;
        let name = self.take_while(|c| c.is_ascii_alphabetic());
        if name.is_empty() {
            return Err(self.error(start, "one or more letters"));
        }
        Ok(Ident {
            name: name.to_string(),
            span: SourceSpan::from(start..self.pos),
        })
    }

    fn capital(&mut self) -> Result<Ident, Error> {
        self.skip_whitespace();
        let start = self.pos;
        match self.rest().chars().next() {
            Some(c) if c.is_ascii_uppercase() => {
                self.pos += c.len_utf8();
                Ok(Ident {
                    name: c.to_string(),
                    span: SourceSpan::from(start..self.pos),
                })
            }
            _ => Err(self.error(start, "a capital transform letter")),
        }
    }

    fn vec_ref(&mut self, subscript: Subscript) -> Result<VecRef, Error> {
        self.skip_whitespace();
        let start = self.pos;
        self.expect(r"\vec{")?;
        let letters = self.letters()?.name;
        self.expect("}")?;
        let mut end = self.pos;

        let subscript = if self.eat("_") {
            self.skip_whitespace();
            let at = self.pos;
            let digits = self.take_while(|c| c.is_ascii_digit());
            if digits.is_empty() {
                return Err(self.error(at, "a numeric subscript"));
            }
            end = self.pos;
            digits.to_string()
        } else if let Subscript::Required = subscript {
            return Err(self.error(self.pos, "a `_<digits>` subscript"));
        } else {
            String::new()
        };

        Ok(VecRef {
            letters,
            subscript,
            span: SourceSpan::from(start..end),
        })
    }

    fn signed_int(&mut self) -> Result<f64, Error> {
        self.skip_whitespace();
        let start = self.pos;
        if self.rest().starts_with(['+', '-']) {
            self.pos += 1;
        }
        let digits = self.take_while(|c| c.is_ascii_digit());
        if digits.is_empty() {
            return Err(self.error(start, "a signed integer"));
        }
        self.text[start..self.pos]
            .parse()
            .map_err(|_| self.error(start, "a signed integer"))
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.skip_whitespace();
        if self.rest().is_empty() {
            Ok(())
        } else {
            Err(self.error(self.pos, "the end of the line"))
        }
    }

    fn vec_assign(&mut self) -> Result<TokenKind, Error> {
        let vector = self.vec_ref(Subscript::Optional)?;
        self.expect("=")?;
        self.expect(r"\begin{pmatrix}")?;

        let mut components = vec![self.signed_int()?];
        while self.eat(r"\\") {
            components.push(self.signed_int()?);
        }
        self.expect(r"\end{pmatrix}")?;

        Ok(TokenKind::VecAssign { vector, components })
    }

    fn basis_assign(&mut self) -> Result<TokenKind, Error> {
        let basis = self.letters()?;
        self.expect("=")?;
        self.expect(r"\{")?;

        let mut members = Vec::new();
        if !self.eat(r"\}") {
            loop {
                members.push(self.vec_ref(Subscript::Required)?);
                if self.eat(",") {
                    continue;
                }
                self.expect(r"\}")?;
                break;
            }
        }

        Ok(TokenKind::BasisAssign { basis, members })
    }

    fn eval_change_basis(&mut self) -> Result<TokenKind, Error> {
        self.expect("[")?;
        let vector = self.vec_ref(Subscript::Optional)?;
        self.expect("]")?;
        self.expect("_")?;
        let basis = self.letters()?;
        self.expect(r"\leftarrow")?;
        self.expect(r"\text{eval}")?;

        Ok(TokenKind::EvalChangeBasis { vector, basis })
    }

    fn eval_transform(&mut self) -> Result<TokenKind, Error> {
        let transform = self.capital()?;
        self.expect("(")?;
        let vector = self.vec_ref(Subscript::Optional)?;
        self.expect(")")?;
        self.expect(r"\leftarrow")?;
        self.expect(r"\text{eval}")?;

        Ok(TokenKind::EvalTransform { transform, vector })
    }

    fn transform_assign(&mut self) -> Result<TokenKind, Error> {
        let transform = self.capital()?;
        self.expect("(")?;
        let domain = self.vec_ref(Subscript::Optional)?;
        self.expect(")")?;
        self.expect("=")?;

        let mut terms = vec![self.term(true)?];
        loop {
            self.skip_whitespace();
            if self.rest().is_empty() {
                break;
            }
            terms.push(self.term(false)?);
        }

        Ok(TokenKind::TransformAssign {
            transform,
            domain,
            terms,
        })
    }

    /// `<sign><coefficient>?[*|\cdot]\vec{..}[_..]`; only the leading term may
    /// omit its sign.
    fn term(&mut self, leading: bool) -> Result<RawTerm, Error> {
        self.skip_whitespace();
        let start = self.pos;
        let sign = self.sign();
        if sign.is_none() && !leading {
            return Err(self.error(start, "a `+` or `-` before the term"));
        }

        self.skip_whitespace();
        let number = self.take_while(|c| c.is_ascii_digit() || c == '.');
        let text = format!("{}{number}", sign.map(String::from).unwrap_or_default());
        let Some(coefficient) = parse_coefficient(&text) else {
            return Err(self.error(start, "a numeric coefficient"));
        };

        if !self.eat("*") {
            self.eat(r"\cdot");
        }
        let vector = self.vec_ref(Subscript::Optional)?;

        Ok(RawTerm {
            coefficient,
            vector,
        })
    }

    fn sign(&mut self) -> Option<char> {
        let c = self.rest().chars().next().filter(|c| matches!(c, '+' | '-'))?;
        self.pos += c.len_utf8();
        Some(c)
    }
}
