use std::fmt;

use services::KeyChord;

/// One line typed by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Answer { question: usize, option: u8 },
    Submit,
    Blur,
    Focus,
    Hide,
    Show,
    ExitFullscreen,
    EnterFullscreen,
    Dock,
    Undock,
    Key(KeyChord),
    RightClick,
    Copy,
    Back,
    Status,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    Unknown(String),
    Usage(&'static str),
    InvalidQuestion(String),
    InvalidOption(String),
    InvalidChord(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Empty => f.write_str("empty command"),
            CommandError::Unknown(raw) => write!(f, "unknown command: {raw} (try `help`)"),
            CommandError::Usage(usage) => write!(f, "usage: {usage}"),
            CommandError::InvalidQuestion(raw) => write!(f, "invalid question number: {raw}"),
            CommandError::InvalidOption(raw) => {
                write!(f, "invalid option: {raw} (use a-d or 1-4)")
            }
            CommandError::InvalidChord(raw) => write!(f, "invalid key chord: {raw}"),
        }
    }
}

impl std::error::Error for CommandError {}

pub const HELP: &str = "\
commands:
  answer <question> <a-d|1-4>   select an option (questions are numbered as shown)
  submit                        submit the attempt
  blur | focus                  window loses / regains focus
  hide | show                   tab hidden / visible
  exitfs | enterfs              leave / re-enter fullscreen
  dock | undock                 simulate a docked devtools panel
  key <chord>                   press keys, e.g. `key ctrl+t`, `key esc`
  rightclick                    open the context menu
  copy                          copy to the clipboard
  back                          press the browser back button
  status                        show time, answers and violations";

/// Parse a line typed at the prompt.
///
/// Question numbers are 1-based; the returned index is 0-based.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err(CommandError::Empty);
    };
    let command = match head.to_ascii_lowercase().as_str() {
        "answer" | "a" => {
            let (Some(question), Some(option)) = (words.next(), words.next()) else {
                return Err(CommandError::Usage("answer <question> <option>"));
            };
            Command::Answer {
                question: parse_question(question)?,
                option: parse_option(option)?,
            }
        }
        "submit" => Command::Submit,
        "blur" => Command::Blur,
        "focus" => Command::Focus,
        "hide" => Command::Hide,
        "show" => Command::Show,
        "exitfs" => Command::ExitFullscreen,
        "enterfs" => Command::EnterFullscreen,
        "dock" => Command::Dock,
        "undock" => Command::Undock,
        "key" => {
            let Some(raw) = words.next() else {
                return Err(CommandError::Usage("key <chord>"));
            };
            let chord = raw
                .parse::<KeyChord>()
                .map_err(|_| CommandError::InvalidChord(raw.to_string()))?;
            Command::Key(chord)
        }
        "rightclick" => Command::RightClick,
        "copy" => Command::Copy,
        "back" => Command::Back,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(command)
}

fn parse_question(raw: &str) -> Result<usize, CommandError> {
    match raw.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(CommandError::InvalidQuestion(raw.to_string())),
    }
}

fn parse_option(raw: &str) -> Result<u8, CommandError> {
    let lowered = raw.to_ascii_lowercase();
    match lowered.as_str() {
        "a" | "1" => Ok(0),
        "b" | "2" => Ok(1),
        "c" | "3" => Ok(2),
        "d" | "4" => Ok(3),
        _ => Err(CommandError::InvalidOption(raw.to_string())),
    }
}
