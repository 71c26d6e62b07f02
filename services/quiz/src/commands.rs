/// One line typed by the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Anything that is not a slash command.
    Text(String),
    Next,
    Review,
    Finish,
    Restart,
    Score,
    Voice(bool),
    Help,
    Quit,
    Unknown(String),
}

pub const HELP: &str = "\
Commands:
  <text>        answer the current question (or start a quiz with this topic)
  /next         continue after an explanation
  /review       review the questions you scored low on
  /finish       stop reviewing and see the summary
  /restart      start over with a new topic
  /score        show the running scores
  /voice on|off toggle narration
  /quit         leave";

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Text(line.to_string());
        };
        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default().to_lowercase();
        let arg = words.next().map(str::to_lowercase);
        match (name.as_str(), arg.as_deref()) {
            ("next" | "n", None) => Self::Next,
            ("review", None) => Self::Review,
            ("finish", None) => Self::Finish,
            ("restart", None) => Self::Restart,
            ("score", None) => Self::Score,
            ("voice", Some("on")) => Self::Voice(true),
            ("voice", Some("off")) => Self::Voice(false),
            ("help" | "h" | "?", None) => Self::Help,
            ("quit" | "exit" | "q", None) => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}
