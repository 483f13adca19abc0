use std::fmt;
use std::str::FromStr;
use std::io::{self, BufRead, Write};

use drill_core::model::{
    AnswerDetail, ConfigError, Difficulty, GenerationConfig, HistoryRecord, OperationMode,
};
use services::{
    AppServices, Clock, HistoryListItem, HistoryRecordId, HistoryService, PracticeLoopService,
    PracticeSession, SessionError, parse_answer,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, prelude::*};

const DEFAULT_DB_PATH: &str = "data/history.sqlite3";

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    Config(ConfigError),
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::Config(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<ConfigError> for ArgsError {
    fn from(err: ConfigError) -> Self {
        ArgsError::Config(err)
    }
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn require_number<T: FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw: value })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- practice [--db <sqlite_url>] [--name <student>]");
    eprintln!("        [--mode add|sub|mul|div|mixed] [--difficulty easy|medium|hard]");
    eprintln!("        [--operators <1-8>] [--parentheses <max_pairs>] [--count <5-50>]");
    eprintln!("  cargo run -p app -- history  [--db <sqlite_url>] [--filter <name>] [--id <n>]");
    eprintln!();
    eprintln!("Defaults for practice:");
    eprintln!("  --db sqlite://{DEFAULT_DB_PATH}");
    eprintln!("  --mode add --difficulty easy --operators 1 --count 10");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  DRILL_DB_URL, DRILL_LOG (tracing filter, default info)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Practice,
    History,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "practice" => Some(Self::Practice),
            "history" => Some(Self::History),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct PracticeArgs {
    db_url: String,
    name: Option<String>,
    config: GenerationConfig,
}

#[derive(Debug)]
struct HistoryArgs {
    db_url: String,
    filter: Option<String>,
    id: Option<i64>,
}

fn default_db_url() -> String {
    std::env::var("DRILL_DB_URL")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map_or_else(
            || normalize_sqlite_url(DEFAULT_DB_PATH.into()),
            normalize_sqlite_url,
        )
}

fn parse_db(args: &mut impl Iterator<Item = String>) -> Result<String, ArgsError> {
    let value = require_value(args, "--db")?;
    if value.trim().is_empty() {
        return Err(ArgsError::InvalidDbUrl { raw: value });
    }
    Ok(normalize_sqlite_url(value))
}

impl PracticeArgs {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let defaults = GenerationConfig::default();
        let mut db_url = default_db_url();
        let mut name = None;
        let mut mode = defaults.mode();
        let mut difficulty = defaults.difficulty();
        let mut operators = defaults.operator_count();
        let mut max_pairs = 0;
        let mut count = defaults.question_count();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => db_url = parse_db(args)?,
                "--name" => name = Some(require_value(args, "--name")?),
                "--mode" => mode = require_value(args, "--mode")?.parse::<OperationMode>()?,
                "--difficulty" => {
                    difficulty = require_value(args, "--difficulty")?.parse::<Difficulty>()?;
                }
                "--operators" => operators = require_number(args, "--operators")?,
                "--parentheses" => max_pairs = require_number(args, "--parentheses")?,
                "--count" => count = require_number(args, "--count")?,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let config =
            GenerationConfig::new(mode, difficulty, operators, max_pairs > 0, max_pairs, count)?;
        Ok(Self {
            db_url,
            name,
            config,
        })
    }
}

impl HistoryArgs {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = default_db_url();
        let mut filter = None;
        let mut id = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => db_url = parse_db(args)?,
                "--filter" => filter = Some(require_value(args, "--filter")?),
                "--id" => id = Some(require_number(args, "--id")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self { db_url, filter, id })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

//
// ─── TERMINAL I/O ──────────────────────────────────────────────────────────────
//

/// Print `label` and read one line; `None` on end of input.
fn prompt(
    lines: &mut impl Iterator<Item = io::Result<String>>,
    label: &str,
) -> io::Result<Option<String>> {
    print!("{label}");
    io::stdout().flush()?;
    lines.next().transpose()
}

fn confirm(
    lines: &mut impl Iterator<Item = io::Result<String>>,
    label: &str,
    default_yes: bool,
) -> io::Result<bool> {
    let Some(reply) = prompt(lines, label)? else {
        return Ok(false);
    };
    Ok(match reply.trim().to_lowercase().as_str() {
        "" => default_yes,
        "y" | "yes" => true,
        _ => false,
    })
}

fn end_of_input() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "input closed")
}

/// Ask until the session is finished. Returns `false` if the save never succeeded.
async fn answer_all(
    practice: &PracticeLoopService,
    session: &mut PracticeSession,
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> Result<bool, Box<dyn std::error::Error>> {
    while !session.is_finished() {
        let progress = session.progress();
        let label = format!(
            "[{}/{}] {} = ",
            progress.position,
            progress.total,
            session.current_question()?
        );
        let Some(line) = prompt(lines, &label)? else {
            return Err(end_of_input().into());
        };
        let value = match parse_answer(&line) {
            Ok(value) => value,
            Err(err) => {
                println!("  {err}, try again");
                continue;
            }
        };

        let outcome = practice.submit(session, value)?;
        if outcome.is_correct {
            println!("  correct!");
        } else {
            println!("  not quite, the answer is {}", outcome.correct_answer);
        }

        match practice.advance(session).await {
            Ok(_) => {}
            Err(SessionError::Storage(err)) => {
                println!("  could not save this session: {err}");
                return retry_save(practice, session, lines).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(true)
}

async fn retry_save(
    practice: &PracticeLoopService,
    session: &mut PracticeSession,
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> Result<bool, Box<dyn std::error::Error>> {
    while confirm(lines, "Retry saving? [Y/n] ", true)? {
        match practice.finalize(session).await {
            Ok(_) => return Ok(true),
            Err(SessionError::Storage(err)) => println!("  still failing: {err}"),
            Err(err) => return Err(err.into()),
        }
    }
    warn!("practice session left unsaved");
    Ok(false)
}

fn print_answers(details: &[AnswerDetail]) {
    for (i, detail) in details.iter().enumerate() {
        let mark = if detail.is_correct { "ok" } else { "x " };
        println!(
            "  {mark} {:>2}. {} = {} (you: {})",
            i + 1,
            detail.question,
            detail.correct_answer,
            detail.submitted
        );
    }
}

fn print_report(session: &PracticeSession, saved: bool) -> Result<(), SessionError> {
    let record = HistoryRecord::from_result(&session.finish()?);
    println!();
    println!(
        "{}: {}/{} correct ({:.0}%) in {}s",
        record.student_name(),
        record.score(),
        record.total_questions(),
        record.accuracy_percent(),
        record.elapsed_seconds()
    );
    print_answers(record.details());
    if !saved {
        println!("(not saved)");
    }
    println!();
    Ok(())
}

async fn run_practice(args: PracticeArgs) -> Result<(), Box<dyn std::error::Error>> {
    prepare_sqlite_file(&args.db_url)?;
    let services = AppServices::new_sqlite(&args.db_url, Clock::default_clock()).await?;
    let practice = services.practice();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    let name = match args.name {
        Some(name) => name,
        None => prompt(&mut lines, "Your name: ")?.ok_or_else(end_of_input)?,
    };
    let mut session = practice.start_session(&args.config, &name)?;

    loop {
        let saved = answer_all(&practice, &mut session, &mut lines).await?;
        print_report(&session, saved)?;
        if !confirm(&mut lines, "Practice again? [y/N] ", false)? {
            break;
        }
        session = practice.restart(&session)?;
    }

    info!("practice finished");
    Ok(())
}

async fn run_history(args: HistoryArgs) -> Result<(), Box<dyn std::error::Error>> {
    prepare_sqlite_file(&args.db_url)?;
    let services = AppServices::new_sqlite(&args.db_url, Clock::default_clock()).await?;
    let history = services.history();
    match args.id {
        Some(id) => print_detail(&history, id).await?,
        None => print_history(&history, args.filter.as_deref()).await?,
    }
    Ok(())
}

fn print_item(item: &HistoryListItem) {
    println!(
        "#{:<4} {}  {:<16} {:>2}/{:<2} {:>5.1}%  {}s",
        item.id,
        item.completed_at.format("%Y-%m-%d %H:%M"),
        item.student_name,
        item.correct,
        item.total,
        item.accuracy_percent,
        item.elapsed_seconds
    );
}

async fn print_history(history: &HistoryService, filter: Option<&str>) -> Result<(), SessionError> {
    let listing = history.list(filter).await?;
    if listing.skipped > 0 {
        println!("({} unreadable sessions skipped)", listing.skipped);
    }
    if listing.items.is_empty() {
        println!("no saved sessions");
        return Ok(());
    }

    for item in &listing.items {
        print_item(item);
    }
    if let Some(mean) = listing.summary.mean_accuracy_percent {
        println!(
            "{} sessions for {}, average accuracy {mean:.1}%",
            listing.summary.sessions,
            filter.unwrap_or("all students")
        );
    }
    Ok(())
}

async fn print_detail(history: &HistoryService, id: HistoryRecordId) -> Result<(), SessionError> {
    let Some(detail) = history.details(id).await? else {
        println!("no saved session #{id}");
        return Ok(());
    };
    print_item(&detail.item);
    print_answers(&detail.answers);
    Ok(())
}

/// Install the stderr subscriber so stdout stays free for the drill itself.
fn init_logging() {
    let env_filter =
        EnvFilter::try_from_env("DRILL_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_fmt::layer().with_writer(io::stderr))
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: practice when no subcommand is provided.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Practice,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Practice,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            io::Error::new(io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let report = |e: ArgsError| {
        eprintln!("{e}");
        print_usage();
        e
    };

    match cmd {
        Command::Practice => run_practice(PracticeArgs::parse(&mut iter).map_err(report)?).await,
        Command::History => run_history(HistoryArgs::parse(&mut iter).map_err(report)?).await,
    }
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
