use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ask(String),
    Resolve { ticket: Uuid, technician: String, solution: String },
    Progress(Uuid),
    Close(Uuid),
    Feedback { answer: Uuid, is_valid: bool },
    Tickets,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  <question>                              ask the help desk
  /resolve <ticket-id> <technician> | <solution>
  /progress <ticket-id>                   mark a ticket in progress
  /close <ticket-id>                      close a resolved ticket
  /feedback <answer-id> ok|ko             rate an answer
  /tickets                                list tickets
  /quit";

fn parse_id(s: Option<&str>) -> Result<Uuid, String> {
    let raw = s.ok_or("missing id")?;
    Uuid::parse_str(raw).map_err(|e| format!("bad id {raw}: {e}"))
}

/// Parse one REPL line. `None` for a blank line.
pub fn parse(line: &str) -> Option<Result<Command, String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Ok(Command::Ask(line.to_owned())));
    };
    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let args = args.trim();
    let mut words = args.split_whitespace();

    let cmd = match name {
        "q" | "quit" | "exit" => Ok(Command::Quit),
        "h" | "help" => Ok(Command::Help),
        "tickets" => Ok(Command::Tickets),
        "progress" => parse_id(words.next()).map(Command::Progress),
        "close" => parse_id(words.next()).map(Command::Close),
        "feedback" => parse_id(words.next()).and_then(|answer| match words.next() {
            Some("ok") => Ok(Command::Feedback { answer, is_valid: true }),
            Some("ko") => Ok(Command::Feedback { answer, is_valid: false }),
            _ => Err("expected ok or ko".to_owned()),
        }),
        "resolve" => {
            let ticket = words.next();
            let rest = ticket.map(|t| args[t.len()..].trim()).unwrap_or_default();
            match (parse_id(ticket), rest.split_once('|')) {
                (Err(e), _) => Err(e),
                (Ok(_), None) => Err("expected <technician> | <solution>".to_owned()),
                (Ok(ticket), Some((tech, solution))) => Ok(Command::Resolve {
                    ticket,
                    technician: tech.trim().to_owned(),
                    solution: solution.trim().to_owned(),
                }),
            }
        }
        other => Err(format!("unknown command /{other}")),
    };
    Some(cmd)
}
