use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use clap::Parser as _;
use clap::{ArgAction, Subcommand};
use coord_eval::lex::{LexError, ReadError};
use coord_eval::{Config, Evaluator, Lexer, Parser};
use miette::IntoDiagnostic;
use miette::WrapErr;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(clap::Parser, Debug)]
#[command(version, about = "Evaluate change-of-basis and linear transform requests")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Line prefix that marks a comment; repeat to allow several.
    /// Defaults to `;`, `*` and `%`.
    #[arg(long = "comment", value_name = "MARKER", global = true)]
    comments: Vec<String>,

    /// More logging on stderr (-v debug, -vv trace). RUST_LOG also works.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print one token per statement
    Tokenize { filename: Option<PathBuf> },
    /// Print the symbol table built from the input
    Parse { filename: Option<PathBuf> },
    /// Evaluate the last eval statement of the input
    Eval { filename: Option<PathBuf> },
}

fn main() -> miette::Result<()> {
    let args = Args::parse();

    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    match args.verbose {
        0 => {}
        1 => filter = filter.add_directive(tracing::Level::DEBUG.into()),
        _ => filter = filter.add_directive(tracing::Level::TRACE.into()),
    }
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();

    let config = if args.comments.is_empty() {
        Config::default()
    } else {
        Config::with_comment_markers(args.comments)
    };

    match args.command {
        Commands::Tokenize { filename } => {
            let (name, reader) = open(filename.as_deref())?;
            for token in Lexer::with_config(name.as_deref(), reader, config) {
                let token = match token {
                    Ok(token) => token,
                    Err(e) => {
                        if let Some(lex_error) = e.downcast_ref::<LexError>() {
                            eprintln!(
                                "[line {}] Error: {}",
                                lex_error.line(),
                                lex_error.text()
                            );
                        }
                        eprintln!("{e:?}");
                        std::process::exit(input_error_code(&e));
                    }
                };
                println!("{token}");
            }
        }
        Commands::Parse { filename } => {
            let (name, reader) = open(filename.as_deref())?;
            match Parser::with_config(name.as_deref(), reader, config).parse() {
                Ok(env) => print!("{env}"),
                Err(e) => {
                    eprintln!("{e:?}");
                    std::process::exit(input_error_code(&e));
                }
            }
        }
        Commands::Eval { filename } => {
            let (name, reader) = open(filename.as_deref())?;
            let env = match Parser::with_config(name.as_deref(), reader, config).parse() {
                Ok(env) => env,
                Err(e) => {
                    eprintln!("{e:?}");
                    std::process::exit(input_error_code(&e));
                }
            };
            match Evaluator::new(&env).run() {
                Ok(Some(evaluation)) => println!("{evaluation}"),
                Ok(None) => warn!("input has no eval statement"),
                Err(e) => {
                    eprintln!("{e:?}");
                    std::process::exit(70);
                }
            }
        }
    }
    Ok(())
}

/// 74 when the input could not be read, 65 when it did not lex or parse.
fn input_error_code(e: &miette::Error) -> i32 {
    if e.downcast_ref::<ReadError>().is_some() {
        74
    } else {
        65
    }
}

/// A missing path or `-` reads standard input.
fn open(filename: Option<&Path>) -> miette::Result<(Option<String>, Box<dyn BufRead>)> {
    match filename {
        None => Ok((Some("<stdin>".to_string()), Box::new(io::stdin().lock()))),
        Some(path) if path == Path::new("-") => {
            Ok((Some("<stdin>".to_string()), Box::new(io::stdin().lock())))
        }
        Some(path) => {
            let file = File::open(path)
                .into_diagnostic()
                .wrap_err_with(|| format!("reading `{}` failed", path.display()))?;
            if let Ok(metadata) = file.metadata() {
                info!(bytes = metadata.len(), "reading {}", path.display());
            }
            Ok((Some(path.display().to_string()), Box::new(BufReader::new(file))))
        }
    }
}
