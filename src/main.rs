use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zy::tokenizer::{Token, TokenType, Tokenizer};

#[derive(Debug, Parser)]
#[command(name = "zy", version, about = "Tooling for zy scripts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the preprocessed token stream as JSON.
    Tokens(TokensArgs),
    /// Report tokens the tokenizer could not classify.
    Check(FileArgs),
}

#[derive(Debug, Args)]
struct FileArgs {
    file: PathBuf,
}

#[derive(Debug, Args)]
struct TokensArgs {
    file: PathBuf,
    /// Skip preprocessing and print the raw scan.
    #[arg(long)]
    raw: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0} unrecognized token(s)")]
    Diagnostics(usize),
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    tracing::debug!(command = ?cli.command, "starting");

    let result = match &cli.command {
        Command::Tokens(args) => tokens_command(args),
        Command::Check(args) => check_command(args),
    };
    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn tokens_command(args: &TokensArgs) -> Result<(), CliError> {
    let source = read(&args.file)?;
    let tokenizer = Tokenizer::new();
    let tokens = if args.raw {
        tokenizer.scan(source.as_bytes())
    } else {
        tokenizer.tokenize(&source)
    };
    println!("{}", serde_json::to_string_pretty(&tokens)?);
    Ok(())
}

fn unknown_tokens(tokens: &[Token]) -> Vec<&Token> {
    let mut found = Vec::new();
    for token in tokens {
        if token.kind == TokenType::Unknown {
            found.push(token);
        }
        found.extend(unknown_tokens(&token.children));
    }
    found
}

fn check_command(args: &FileArgs) -> Result<(), CliError> {
    let source = read(&args.file)?;
    let tokens = Tokenizer::new().tokenize(&source);
    let unknown = unknown_tokens(&tokens);
    for token in &unknown {
        println!(
            "{}:{}:{}: unrecognized token {:?}",
            args.file.display(),
            token.line + 1,
            token.column + 1,
            token.literal
        );
    }
    if unknown.is_empty() {
        println!("{}: ok ({} tokens)", args.file.display(), tokens.len());
        Ok(())
    } else {
        Err(CliError::Diagnostics(unknown.len()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn only_file_commands_are_accepted() {
        let cli = Cli::try_parse_from(["zy", "tokens", "main.zy", "--raw"]).unwrap();
        assert!(matches!(cli.command, Command::Tokens(TokensArgs { raw: true, .. })));
        assert!(Cli::try_parse_from(["zy", "--max-call-depth", "16", "check", "main.zy"]).is_err());
    }
}
