//! Terminal command parsing.
//!
//! A line starting with `/` is a command; anything else is typed into the
//! message input and submitted with Enter.

use crate::session::ViewInput;
use crate::view::KeyCode;

pub const HELP: &str = "/signin  /signout  /page <path>  /quit";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown command {0} ({})", HELP)]
    UnknownCommand(String),

    #[error("{0} needs an argument")]
    MissingArgument(&'static str),
}

/// Translate one input line into view inputs. Blank lines yield nothing.
pub fn parse_line(line: &str) -> Result<Vec<ViewInput>, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Ok(Vec::new());
    }

    let Some(command) = line.strip_prefix('/') else {
        return Ok(vec![
            ViewInput::TextChanged(line.to_string()),
            ViewInput::KeyDown(KeyCode::ENTER),
        ]);
    };

    let mut parts = command.split_whitespace();
    match parts.next() {
        Some("signin") => Ok(vec![ViewInput::SignIn]),
        Some("signout") => Ok(vec![ViewInput::SignOut]),
        Some("quit") => Ok(vec![ViewInput::Quit]),
        Some("page") => match parts.next() {
            Some(path) => Ok(vec![ViewInput::Navigate(path.to_string())]),
            None => Err(ParseError::MissingArgument("/page")),
        },
        _ => Err(ParseError::UnknownCommand(line.to_string())),
    }
}
