use std::io::BufRead;

use miette::Error;

pub mod config;
pub mod env;
pub mod eval;
pub mod lex;
pub mod parse;
pub mod solve;

pub use config::Config;
pub use env::Environment;
pub use eval::{Evaluation, Evaluator};
pub use lex::Lexer;
pub use parse::Parser;

/// Reads `reader` to the end, builds the environment and evaluates its
/// request. `Ok(None)` means the input held no eval statement.
pub fn run<R: BufRead>(
    filename: Option<&str>,
    reader: R,
    config: Config,
) -> Result<Option<Evaluation>, Error> {
    let env = Parser::with_config(filename, reader, config).parse()?;
    Evaluator::new(&env).run()
}
