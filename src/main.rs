use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use rox::ast_printer::AstPrinter;
use rox::parser::Parser;
use rox::scanner::Scanner;
use rox::{Lox, LoxError};

const EXIT_USAGE: i32 = 64;

#[derive(ClapParser, Debug)]
#[command(version, about = "Lox language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to a file (app.log unless --log-file is given)
    #[arg(long, global = true)]
    log: bool,

    /// Where --log writes
    #[arg(long, global = true, value_name = "PATH", default_value = "app.log")]
    log_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize {
        filename: Option<PathBuf>,

        /// Print the tokens as a JSON array instead
        #[arg(long)]
        json: bool,
    },

    /// Parses input from a file as a single expression and prints its AST
    Parse { filename: Option<PathBuf> },

    /// Evaluates input from a file as a single expression and prints the result
    Evaluate { filename: Option<PathBuf> },

    /// Runs input from a file as a Lox program
    Run { filename: Option<PathBuf> },

    /// Starts an interactive session
    Repl,
}

/// Reads the contents of a file into a String
fn read_file(filename: &Path) -> Result<String> {
    info!("Reading file: {:?}", filename);
    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;
    let mut reader = BufReader::new(file);
    let mut buf = String::new();

    let bytes = reader
        .read_to_string(&mut buf)
        .context(format!("Failed to read file {:?}", filename))?;

    info!("Read {} bytes from {:?}", bytes, filename);

    Ok(buf)
}

fn init_logger(path: &Path) -> Result<()> {
    let log_file = File::create(path).context(format!("Failed to create {:?}", path))?;

    // Configure env_logger to write to file with module and source line
    Builder::new()
        .format(|buf, record| {
            let module = record.module_path().unwrap_or("<unnamed>");
            let module = module.strip_prefix("rox::").unwrap_or(module);
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized, writing to {:?}", path);
    Ok(())
}

/// Prints every diagnostic and exits with the code of the failed phase.
fn fail(errors: &[LoxError]) -> ! {
    for e in errors {
        debug!("Reporting: {}", e);
        eprintln!("{}", e);
    }

    let code: i32 = errors.first().map_or(65, LoxError::exit_code);
    debug!("Exiting with code {}", code);
    process::exit(code);
}

fn no_input(subcommand: &str) -> ! {
    info!("No filepath provided for {}", subcommand);
    println!("No input filepath was provided. Exiting...");
    process::exit(0);
}

fn main() -> Result<()> {
    let args: Cli = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help / --version land here too and are not failures.
            let code: i32 = if e.use_stderr() { EXIT_USAGE } else { 0 };
            e.print().context("Failed to print usage")?;
            process::exit(code);
        }
    };

    // Initialize logger only if --log flag is provided
    if args.log {
        init_logger(&args.log_file)?;
    } else {
        Builder::new().filter_level(log::LevelFilter::Off).init();
    }

    info!("CLI arguments: {:?}", args);

    match args.commands {
        Commands::Tokenize { filename, json } => {
            let Some(filename) = filename else {
                no_input("Tokenize");
            };

            info!("Running Tokenize subcommand");
            let source: String = read_file(&filename)?;

            let mut tokens = Vec::new();
            let mut errors: Vec<LoxError> = Vec::new();

            for result in Scanner::new(&source) {
                match result {
                    Ok(token) if json => tokens.push(token),
                    Ok(token) => println!("{}", token),
                    Err(e) => {
                        eprintln!("{}", e);
                        errors.push(e);
                    }
                }
            }

            if json {
                let out: String =
                    serde_json::to_string_pretty(&tokens).context("Failed to encode tokens")?;
                println!("{}", out);
            }

            if !errors.is_empty() {
                debug!("Tokenization failed, exiting with code 65");
                process::exit(65);
            }

            info!("Tokenization completed successfully");
        }

        Commands::Parse { filename } => {
            let Some(filename) = filename else {
                no_input("Parse");
            };

            info!("Running Parse subcommand");
            let source: String = read_file(&filename)?;

            let tokens = rox::scanner::scan_tokens(&source).unwrap_or_else(|e| fail(&e));
            match Parser::new(tokens).parse_expression() {
                Ok(expr) => {
                    let ast: String = AstPrinter::print(&expr);
                    debug!("AST: {}", ast);
                    println!("{}", ast);
                }
                Err(errors) => fail(&errors),
            }

            info!("Parse subcommand completed");
        }

        Commands::Evaluate { filename } => {
            let Some(filename) = filename else {
                no_input("Evaluate");
            };

            info!("Running Evaluate subcommand");
            let source: String = read_file(&filename)?;

            match Lox::new().evaluate(&source) {
                Ok(value) => {
                    debug!("Evaluated to: {}", value);
                    println!("{}", value);
                }
                Err(errors) => fail(&errors),
            }

            info!("Evaluate subcommand completed");
        }

        Commands::Run { filename } => {
            let Some(filename) = filename else {
                no_input("Run");
            };

            info!("Running Run subcommand");
            let source: String = read_file(&filename)?;
            info!("Provided input:\n {}", source);

            if let Err(errors) = Lox::new().run(&source) {
                fail(&errors);
            }

            info!("Program executed successfully");
        }

        Commands::Repl => repl()?,
    }

    Ok(())
}

/// Line‑at‑a‑time session.  Errors are reported and the prompt comes back;
/// globals defined on earlier lines stay visible.
fn repl() -> Result<()> {
    info!("Starting REPL");

    let mut rl = DefaultEditor::new().context("Failed to start line editor")?;
    let mut lox = Lox::new();

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }

                rl.add_history_entry(line.as_str()).ok();

                if let Err(errors) = lox.run(&line) {
                    for e in &errors {
                        eprintln!("{}", e);
                    }
                }
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => break,
            Err(e) => return Err(e).context("Failed to read line"),
        }
    }

    info!("REPL finished");
    Ok(())
}
