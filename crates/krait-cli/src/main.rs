//! The `krait` command: tokenize, parse, compile, and optionally evaluate a
//! Python source file.
//!
//! With no mode flags the disassembly is printed. Errors render as
//! diagnostics against the source and exit non-zero.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use krait::{Diagnostic, Evaluator, compile_module, disassemble};

#[derive(Parser)]
#[command(
    name = "krait",
    version,
    about = "Python front-to-middle-end toolchain: tokens, AST, bytecode, eval"
)]
struct Cli {
    /// Python source file to process
    file: PathBuf,

    /// Print the token stream
    #[arg(long)]
    tokens: bool,

    /// Print the AST structure
    #[arg(long)]
    ast: bool,

    /// Print the AST rendered back to canonical source
    #[arg(long)]
    render: bool,

    /// Print the bytecode disassembly (the default action)
    #[arg(long)]
    dis: bool,

    /// Run the program with the expression evaluator and print its output
    #[arg(long)]
    eval: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: cannot read {}: {err}", cli.file.display());
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, &source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(diagnostic) => {
            eprint!("{diagnostic}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, source: &str) -> Result<(), Diagnostic> {
    if cli.tokens {
        let tokens = krait_parser::tokenize(source).map_err(|err| {
            Diagnostic::new(err.kind.to_string())
                .with_source(source.to_string())
                .with_label(err.location, 1, "here")
        })?;
        for token in &tokens {
            println!(
                "{:>4}:{:<4} {:<20} {:?}",
                token.line, token.column, token.kind, token.lexeme
            );
        }
    }

    let module = krait_parser::parse_module(source).map_err(|err| {
        Diagnostic::new(format!("syntax error: {}", err.message))
            .with_source(source.to_string())
            .with_label(err.location, err.lexeme.chars().count().max(1), "here")
    })?;

    if cli.ast {
        println!("{module:#?}");
    }
    if cli.render {
        print!("{}", krait_ast::render::render_module(&module));
    }

    if cli.eval {
        let mut evaluator = Evaluator::new();
        let result = evaluator.run_module(&module).map_err(|err| {
            Diagnostic::new(err.message.clone())
                .with_source(source.to_string())
                .with_label(err.location, 1, "while evaluating this")
        })?;
        for printed_line in evaluator.output() {
            println!("{printed_line}");
        }
        if let Some(value) = result {
            println!("{value}");
        }
        return Ok(());
    }

    let filename = cli.file.display().to_string();
    let (code, errors) = compile_module(&module, &filename);
    if !errors.is_empty() {
        let mut diagnostic = Diagnostic::new(format!(
            "compilation produced {} error(s)",
            errors.len()
        ))
        .with_source(source.to_string());
        for error in &errors {
            diagnostic = diagnostic.with_label(error.location, 1, error.kind.to_string());
        }
        return Err(diagnostic);
    }

    let show_dis = cli.dis || !(cli.tokens || cli.ast || cli.render);
    if show_dis {
        print!("{}", disassemble(&code));
    }
    Ok(())
}
