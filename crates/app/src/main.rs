mod command;
mod platform;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use quiz_core::model::{AttemptStatus, QuizId};
use services::{
    ApiConfig, AttemptSession, BootstrapError, Bootstrapped, Clock, Destination, HostSignal,
    HttpQuizApi, KeyVerdict, NoticeLevel, Overlay, ProctorConfig, ProctorSession, QuizApi,
    ReviewView, Role, SessionBootstrapper, SessionDeps, SessionEvent, SubmitError,
};
use storage::{CredentialSlot, Storage};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt as log_fmt};

use command::{Command, HELP};
use platform::TerminalPlatform;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidQuizId { raw: String },
    InvalidRole { raw: String },
    MissingQuizId,
    MissingToken,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidQuizId { raw } => write!(f, "invalid --quiz-id value: {raw:?}"),
            ArgsError::InvalidRole { raw } => {
                write!(f, "invalid --role value: {raw} (student|reviewer)")
            }
            ArgsError::MissingQuizId => f.write_str("--quiz-id (or QUIZ_ID) is required"),
            ArgsError::MissingToken => {
                f.write_str("no credential: pass --token (or QUIZ_TOKEN) once to store one")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

struct Args {
    quiz_id: QuizId,
    token: Option<String>,
    role: Role,
    state_dir: Option<PathBuf>,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- --quiz-id <id> [--token <jwt>] [--role student|reviewer] [--state-dir <dir>]");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_ID, QUIZ_TOKEN, QUIZ_STATE_DIR, QUIZ_API_BASE_URL");
    eprintln!("  QUIZ_MAX_VIOLATIONS, QUIZ_FOCUS_GRACE_SECS, QUIZ_RESIZE_GRACE_SECS, QUIZ_TIME_WARNINGS");
    eprintln!("  RUST_LOG (default: info)");
}

fn parse_role(raw: &str) -> Result<Role, ArgsError> {
    match raw.to_ascii_lowercase().as_str() {
        "student" => Ok(Role::Student),
        "reviewer" | "instructor" => Ok(Role::Reviewer),
        _ => Err(ArgsError::InvalidRole {
            raw: raw.to_string(),
        }),
    }
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let mut quiz_id = std::env::var("QUIZ_ID").ok();
        let mut token = std::env::var("QUIZ_TOKEN").ok().filter(|t| !t.trim().is_empty());
        let mut state_dir = std::env::var("QUIZ_STATE_DIR").ok().map(PathBuf::from);
        let mut role = Role::Student;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--quiz-id" => quiz_id = Some(require_value(args, "--quiz-id")?),
                "--token" => token = Some(require_value(args, "--token")?),
                "--role" => role = parse_role(&require_value(args, "--role")?)?,
                "--state-dir" => state_dir = Some(PathBuf::from(require_value(args, "--state-dir")?)),
                "--help" | "-h" => return Ok(None),
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let raw = quiz_id.ok_or(ArgsError::MissingQuizId)?;
        let quiz_id = raw
            .parse::<QuizId>()
            .map_err(|_| ArgsError::InvalidQuizId { raw: raw.clone() })?;
        Ok(Some(Self {
            quiz_id,
            token,
            role,
            state_dir,
        }))
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    log_fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn option_letter(index: usize) -> char {
    ['A', 'B', 'C', 'D'].get(index).copied().unwrap_or('?')
}

fn print_questions(attempt: &AttemptSession) {
    println!(
        "{} ({}) - {} questions, {} minutes",
        attempt.quiz().title(),
        attempt.quiz().subject(),
        attempt.quiz().question_count(),
        attempt.quiz().timer_minutes()
    );
    for presented in 0..attempt.quiz().question_count() {
        let Some(question) = attempt.presented_question(presented) else {
            continue;
        };
        println!();
        println!("{}. {}", presented + 1, question.prompt());
        for (i, option) in question.options().iter().enumerate() {
            println!("   {}) {}", option_letter(i), option.text());
        }
    }
    println!();
}

fn print_review(view: &ReviewView) {
    println!("{} (review)", view.quiz.title());
    for (i, question) in view.quiz.questions().iter().enumerate() {
        println!();
        println!("{}. {}", i + 1, question.prompt());
        for (o, option) in question.options().iter().enumerate() {
            let marker = if question.correct() == u8::try_from(o).ok() {
                "*"
            } else {
                " "
            };
            println!("  {marker}{}) {}", option_letter(o), option.text());
        }
    }
}

fn render(event: &SessionEvent) {
    match event {
        SessionEvent::ActiveChanged(true) => println!("-- attempt in progress --"),
        SessionEvent::ActiveChanged(false) => println!("-- attempt closed --"),
        SessionEvent::Notice(notice) => {
            let tag = match notice.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Warning => "warning",
                NoticeLevel::Error => "error",
            };
            println!("[{tag}] {}", notice.message);
        }
        SessionEvent::OverlayChanged(Some(Overlay::FullscreenRequired)) => {
            println!("!! fullscreen required: type `enterfs` to continue");
        }
        SessionEvent::OverlayChanged(None) => println!("-- fullscreen restored --"),
        SessionEvent::Navigate(Destination::Results(receipt)) => match (receipt.score, receipt.total) {
            (Some(score), Some(total)) => println!("Result: {score}/{total}. {}", receipt.message),
            _ => println!("{}", receipt.message),
        },
        SessionEvent::Navigate(Destination::Login) => println!("Please sign in again."),
        SessionEvent::Navigate(Destination::QuizList) => println!("Returning to the quiz list."),
        SessionEvent::TimeWarning { .. }
        | SessionEvent::GraceCountdown { .. }
        | SessionEvent::ViolationRecorded { .. } => {}
    }
}

async fn handle(session: &ProctorSession, platform: &TerminalPlatform, command: Command) {
    match command {
        Command::Answer { question, option } => match session.select_answer(question, option) {
            Ok(()) => println!("question {} = {}", question + 1, option_letter(option.into())),
            Err(err) => println!("{err}"),
        },
        Command::Submit => match session.submit().await {
            Ok(_) => {}
            Err(SubmitError::Validation { first_unanswered }) => {
                println!("question {} is unanswered", first_unanswered + 1);
            }
            Err(err) => println!("submission failed: {err}"),
        },
        Command::Blur => {
            platform.set_focused(false);
            session.signal(HostSignal::Focus(false));
        }
        Command::Focus => {
            platform.set_focused(true);
            session.signal(HostSignal::Focus(true));
        }
        Command::Hide => {
            platform.set_hidden(true);
            session.signal(HostSignal::Visibility { hidden: true });
        }
        Command::Show => {
            platform.set_hidden(false);
            session.signal(HostSignal::Visibility { hidden: false });
        }
        Command::ExitFullscreen => {
            platform.set_fullscreen(false);
            session.signal(HostSignal::Fullscreen(false));
        }
        Command::EnterFullscreen => {
            platform.set_fullscreen(true);
            session.signal(HostSignal::Fullscreen(true));
        }
        Command::Dock => {
            platform.set_docked(true);
            session.poll_now();
        }
        Command::Undock => {
            platform.set_docked(false);
            session.poll_now();
        }
        Command::Key(chord) => {
            if session.signal(HostSignal::Key(chord)) == KeyVerdict::Block {
                println!("(key blocked)");
            }
        }
        Command::RightClick => {
            session.signal(HostSignal::ContextMenu);
        }
        Command::Copy => {
            if session.signal(HostSignal::Clipboard) == KeyVerdict::Block {
                println!("(clipboard blocked)");
            }
        }
        Command::Back => {
            session.signal(HostSignal::PopState);
        }
        Command::Status => {
            let status = session.status();
            let answers: Vec<String> = status
                .answers
                .iter()
                .map(|a| a.map_or_else(|| "-".to_string(), |o| option_letter(o.into()).to_string()))
                .collect();
            println!(
                "{} | {}s left | answers [{}] | violations {} ({} remaining){}",
                status.status,
                status.remaining_secs,
                answers.join(" "),
                status.violations,
                status.attempts_remaining,
                if status.retry_pending { " | submit to retry" } else { "" }
            );
        }
        Command::Help => println!("{HELP}"),
    }
}

async fn drive(
    session: &ProctorSession,
    platform: &TerminalPlatform,
    mut events: broadcast::Receiver<SessionEvent>,
) -> AttemptStatus {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let finished = session.finished();
    tokio::pin!(finished);

    loop {
        tokio::select! {
            status = &mut finished => {
                while let Ok(event) = events.try_recv() {
                    render(&event);
                }
                return status;
            }
            event = events.recv() => match event {
                Ok(event) => render(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "session events skipped"),
                Err(RecvError::Closed) => return session.status().status,
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match command::parse(&line) {
                    Ok(command) => handle(session, platform, command).await,
                    Err(err) => println!("{err}"),
                },
                Ok(None) => {
                    info!("input closed; waiting for the attempt to end");
                    stdin_open = false;
                }
                Err(err) => {
                    warn!(error = %err, "could not read input");
                    stdin_open = false;
                }
            },
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let Some(args) = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?
    else {
        print_usage();
        return Ok(());
    };

    init_logging();

    let storage = match &args.state_dir {
        Some(dir) => Storage::json_dir(dir)?,
        None => Storage::in_memory(),
    };
    let credentials = CredentialSlot::new(Arc::clone(&storage.shared));
    if let Some(token) = &args.token {
        credentials.save(token)?;
    }
    let token = credentials.load()?.ok_or(ArgsError::MissingToken)?;

    let api: Arc<dyn QuizApi> = Arc::new(HttpQuizApi::new(ApiConfig::from_env()?));
    let config = ProctorConfig::from_env();
    let clock = Clock::default_clock();

    let bootstrapper = SessionBootstrapper::new(clock, Arc::clone(&api));
    let attempt = match bootstrapper.fetch_session(&args.quiz_id, &token, args.role).await {
        Ok(Bootstrapped::Attempt(attempt)) => attempt,
        Ok(Bootstrapped::Review(view)) => {
            print_review(&view);
            return Ok(());
        }
        Err(BootstrapError::AlreadyAttempted) => {
            println!("You have already attempted this quiz.");
            render(&SessionEvent::Navigate(Destination::QuizList));
            return Ok(());
        }
        Err(BootstrapError::Unauthorized) => {
            credentials.clear()?;
            render(&SessionEvent::Navigate(Destination::Login));
            return Err(BootstrapError::Unauthorized.into());
        }
        Err(err) => return Err(err.into()),
    };

    print_questions(&attempt);
    let platform = Arc::new(TerminalPlatform::new());
    let session = ProctorSession::new(
        attempt,
        SessionDeps {
            api,
            platform: platform.clone(),
            storage,
            config,
            clock,
        },
    );
    let events = session.subscribe();
    session.start()?;
    println!("Type `help` for commands.");

    let status = drive(&session, &platform, events).await;
    info!(%status, "attempt finished");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
