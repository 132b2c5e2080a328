use std::path::PathBuf;

pub const HELP: &str = "\
Commands:
  <text>                    send a message (analyzes the attached report if one is pending)
  /attach <path>            attach a PNG, JPEG or WebP report to the next message
  /analyze <path> [prompt]  upload a report for analysis right away
  /detach                   drop the pending attachment
  /reset                    start a new conversation
  /history                  print the transcript
  /help                     show this help
  /quit                     exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Attach(PathBuf),
    Analyze { path: PathBuf, prompt: String },
    Detach,
    Reset,
    History,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Command::Send(line.to_string());
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    match name {
        "attach" if !args.is_empty() => Command::Attach(PathBuf::from(args)),
        "attach" => Command::Invalid("usage: /attach <path>".to_string()),
        "analyze" if !args.is_empty() => {
            let (path, prompt) = match args.split_once(char::is_whitespace) {
                Some((path, prompt)) => (path, prompt.trim()),
                None => (args, ""),
            };
            Command::Analyze {
                path: PathBuf::from(path),
                prompt: prompt.to_string(),
            }
        }
        "analyze" => Command::Invalid("usage: /analyze <path> [prompt]".to_string()),
        "detach" => Command::Detach,
        "reset" => Command::Reset,
        "history" => Command::History,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Invalid(format!("unknown command /{} (try /help)", other)),
    }
}
