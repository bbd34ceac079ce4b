//! The `nt` command-line interface.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser as ClapParser, Subcommand};
use colored::Colorize;

use notewriter::{
    clock,
    errors::NtError,
    internal::index::PathSpec,
    lint::lint_paths,
    parser::ParserOptions,
    projection::Projection,
    repository::{Repository, StatusChange},
    srs::{self, Feedback, Review},
};

#[derive(ClapParser)]
#[command(
    name = "nt",
    about = "Version-controlled, content-addressed store for Markdown notes",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the .nt/ scaffolding in the current directory.
    Init,
    /// Parse matching files, write packfiles and stage them.
    Add {
        pathspec: Vec<String>,
    },
    /// Show staged and unstaged changes.
    Status,
    /// Unified diff between the working tree and committed packfiles.
    Diff {
        pathspec: Vec<String>,
    },
    /// Promote staged entries into a new commit.
    Commit {
        #[arg(short, long, default_value = "")]
        message: String,
    },
    /// Discard staged entries.
    Reset {
        pathspec: Vec<String>,
    },
    /// Delete orphan packfiles and blobs past the retention window.
    Gc,
    /// Print an object by OID or short OID.
    Cat {
        oid: String,
    },
    /// Run lint rules; exits 2 on violations.
    Lint {
        pathspec: Vec<String>,
    },
    /// Review due flashcards.
    Study {
        deck: Option<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode, NtError> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    match cli.command {
        Command::Init => match Repository::init(&cwd) {
            Ok(repo) => {
                println!("Initialized empty repository in {}", repo.root().join(".nt").display());
                Ok(ExitCode::SUCCESS)
            }
            Err(NtError::RepositoryExists(root)) => {
                eprintln!("Repository already exists at {}", root.display());
                Ok(ExitCode::FAILURE)
            }
            Err(e) => Err(e),
        },
        Command::Add { pathspec } => {
            let mut repo = Repository::open(&cwd)?;
            let report = repo.add(&pathspec)?;
            for path in &report.staged {
                println!("{} {path}", "staged:".green());
            }
            for path in &report.tombstoned {
                println!("{} {path}", "deleted:".red());
            }
            for (path, error) in &report.errors {
                eprintln!("{} {path}: {error}", "error:".red().bold());
            }
            if report.errors.is_empty() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Status => {
            let repo = Repository::open(&cwd)?;
            let report = repo.status()?;
            if report.is_clean() {
                println!("nothing to commit, working tree clean");
                return Ok(ExitCode::SUCCESS);
            }
            if !report.staged.is_empty() {
                println!("Changes to be committed:");
                for change in &report.staged {
                    println!("  {}", format_change(change).green());
                }
            }
            if !report.unstaged.is_empty() {
                println!("Changes not staged:");
                for change in &report.unstaged {
                    println!("  {}", format_change(change).red());
                }
            }
            if !report.untracked.is_empty() {
                println!("Untracked files:");
                for path in &report.untracked {
                    println!("  {}", path.red());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Diff { pathspec } => {
            let repo = Repository::open(&cwd)?;
            print!("{}", repo.diff(&pathspec)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Commit { message } => {
            let mut repo = Repository::open(&cwd)?;
            match repo.commit(&message) {
                Ok(commit) => {
                    println!(
                        "[{}] {} packfile(s)",
                        repo.index.short_oid(commit.oid),
                        commit.packfiles.len()
                    );
                    Ok(ExitCode::SUCCESS)
                }
                Err(NtError::EmptyStagingArea) => {
                    eprintln!("nothing staged; run `nt add` first");
                    Ok(ExitCode::FAILURE)
                }
                Err(e) => Err(e),
            }
        }
        Command::Reset { pathspec } => {
            let mut repo = Repository::open(&cwd)?;
            repo.reset(&pathspec)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Gc => {
            let mut repo = Repository::open(&cwd)?;
            let report = repo.gc()?;
            println!(
                "deleted {} packfile(s), {} blob(s)",
                report.deleted_packfiles.len(),
                report.deleted_blobs.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Cat { oid } => {
            let repo = Repository::open(&cwd)?;
            match repo.cat(&oid) {
                Ok(text) => {
                    println!("{text}");
                    Ok(ExitCode::SUCCESS)
                }
                Err(e @ (NtError::UnknownOid(_) | NtError::AmbiguousOid(_))) => {
                    eprintln!("{e}");
                    Ok(ExitCode::FAILURE)
                }
                Err(e) => Err(e),
            }
        }
        Command::Lint { pathspec } => {
            let repo = Repository::open(&cwd)?;
            let spec = PathSpec::compile(&pathspec)?;
            let files = repo.working_files(&spec);
            let schema = notewriter::attribute::schema::Schema::compile(&repo.config.lint.schema)?;
            let options = ParserOptions {
                generator_timeout: repo.config.core.generator_timeout(),
                generator_max_depth: repo.config.core.generator_max_depth,
            };
            let violations = lint_paths(
                repo.root(),
                &schema,
                options,
                &repo.config.lint.disabled_rules,
                &files,
            )?;
            for violation in &violations {
                println!(
                    "{}:{}: {} {}",
                    violation.path,
                    violation.line,
                    format!("[{}]", violation.rule).yellow(),
                    violation.message
                );
            }
            if violations.is_empty() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(2))
            }
        }
        Command::Study { deck } => {
            let mut repo = Repository::open(&cwd)?;
            study(&mut repo, deck.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn format_change(change: &StatusChange) -> String {
    match change {
        StatusChange::Added(p) => format!("new file: {p}"),
        StatusChange::Modified(p) => format!("modified: {p}"),
        StatusChange::Deleted(p) => format!("deleted:  {p}"),
    }
}

/// Interactive review session over due flashcards.
fn study(repo: &mut Repository, deck: Option<&str>) -> Result<(), NtError> {
    let db_path: PathBuf = repo.root().join(".nt/database.db");
    let mut projection = Projection::open(&db_path)?;
    projection.sync(repo)?;

    let deck_tag = deck
        .and_then(|name| repo.config.deck.get(name))
        .map(|d| d.query.clone())
        .or_else(|| deck.map(str::to_string));
    let due = projection.due_flashcards(clock::now(), deck_tag.as_deref())?;
    if due.is_empty() {
        println!("No cards due.");
        return Ok(());
    }

    let cards = repo.load_objects::<notewriter::internal::object::Flashcard>(
        notewriter::internal::object::ObjectKind::Flashcard,
    )?;
    let stdin = std::io::stdin();
    for oid in due {
        let Some(card) = cards.iter().find(|c| c.oid.to_string() == oid) else {
            continue;
        };
        let mut card = card.clone();
        println!("\n{}", card.short_title.bold());
        println!("{}", card.front);
        print!("{}", "-- press enter to reveal --".dimmed());
        std::io::stdout().flush()?;
        let mut line = String::new();
        stdin.lock().read_line(&mut line)?;
        println!("{}", card.back);
        print!("[1] again  [2] hard  [3] good  [4] easy  [5] too easy  [6] too hard > ");
        std::io::stdout().flush()?;
        line.clear();
        let started = std::time::Instant::now();
        stdin.lock().read_line(&mut line)?;
        let feedback = match line.trim() {
            "1" => Feedback::Again,
            "2" => Feedback::Hard,
            "4" => Feedback::Easy,
            "5" => Feedback::TooEasy,
            "6" => Feedback::TooHard,
            _ => Feedback::Good,
        };

        let now = clock::now();
        let outcome = srs::review(&card.settings, feedback, now, card.due_at);
        card.apply_review(outcome.settings, outcome.due_at);
        repo.save_flashcard(&card)?;
        projection.record_review(&Review {
            flashcard_oid: card.oid,
            feedback,
            duration_ms: started.elapsed().as_millis() as u64,
            completed_at: now,
            due_at: outcome.due_at,
            settings: outcome.settings,
        })?;
        println!("next review: {}", outcome.due_at.date_naive());
    }
    Ok(())
}
