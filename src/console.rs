//! Line commands typed at the prompt.

use thiserror::Error;

use crate::drafts::DraftField;
use crate::session::CopyTarget;

pub const HELP: &str = "\
commands:
  set <id> owner|hours|minutes <value>   edit the reservation form
  focus <id> / blur <id>                 start or stop editing a row
  reserve <id> [<owner> <hours> <minutes>]
  release <id>                           asks for confirmation (y/n)
  ping <id>                              recheck health now
  copy <id> ssh|telnet                   copy a connection command
  dismiss                                clear notices
  refresh                                fetch the device list now
  help, quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Set {
        device_id: String,
        field: DraftField,
        value: String,
    },
    Focus(String),
    Blur(String),
    Reserve {
        device_id: String,
        owner: Option<String>,
        hours: Option<String>,
        minutes: Option<String>,
    },
    Release(String),
    Ping(String),
    Copy {
        device_id: String,
        target: CopyTarget,
    },
    Confirm(bool),
    Dismiss,
    Refresh,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command `{0}`, try `help`")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

impl UserCommand {
    /// `Ok(None)` for blank lines.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (head.to_lowercase().as_str(), args.as_slice()) {
            ("set", [id, field, value @ ..]) if !value.is_empty() => {
                let field = DraftField::parse(field)
                    .ok_or(ParseError::Usage("set <id> owner|hours|minutes <value>"))?;
                UserCommand::Set {
                    device_id: id.to_string(),
                    field,
                    value: value.join(" "),
                }
            }
            ("set", _) => return Err(ParseError::Usage("set <id> owner|hours|minutes <value>")),
            ("focus", [id]) => UserCommand::Focus(id.to_string()),
            ("blur", [id]) => UserCommand::Blur(id.to_string()),
            ("reserve", [id]) => UserCommand::Reserve {
                device_id: id.to_string(),
                owner: None,
                hours: None,
                minutes: None,
            },
            ("reserve", [id, owner, hours, minutes]) => UserCommand::Reserve {
                device_id: id.to_string(),
                owner: Some(owner.to_string()),
                hours: Some(hours.to_string()),
                minutes: Some(minutes.to_string()),
            },
            ("reserve", _) => return Err(ParseError::Usage("reserve <id> [<owner> <hours> <minutes>]")),
            ("release", [id]) => UserCommand::Release(id.to_string()),
            ("ping", [id]) => UserCommand::Ping(id.to_string()),
            ("copy", [id, target]) => UserCommand::Copy {
                device_id: id.to_string(),
                target: CopyTarget::parse(target).ok_or(ParseError::Usage("copy <id> ssh|telnet"))?,
            },
            ("copy", _) => return Err(ParseError::Usage("copy <id> ssh|telnet")),
            ("y" | "yes", []) => UserCommand::Confirm(true),
            ("n" | "no", []) => UserCommand::Confirm(false),
            ("dismiss", []) => UserCommand::Dismiss,
            ("refresh", []) => UserCommand::Refresh,
            ("help" | "?", _) => UserCommand::Help,
            ("quit" | "exit" | "q", []) => UserCommand::Quit,
            ("focus" | "blur" | "release" | "ping", _) => {
                return Err(ParseError::Usage("<command> <id>"))
            }
            _ => return Err(ParseError::Unknown(head.to_string())),
        };
        Ok(Some(command))
    }
}
