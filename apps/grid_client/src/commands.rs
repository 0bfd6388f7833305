//! Line-oriented commands read from stdin.

use anyhow::{anyhow, bail, Context, Result};
use shared::domain::Position;

pub const HELP: &str = "commands:
  select <row> <column>        mark a cell as the edit target
  edit <value>                 submit a value for the selected cell
  set <row> <column> <value>   select and edit in one step
  show                         print the grid
  help                         print this list
  quit                         leave the session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Select(Position),
    Edit(String),
    Set(Position, String),
    Show,
    Help,
    Quit,
}

/// Blank lines parse to `None`. Values keep their inner spacing.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim_start()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "select" | "s" => {
            let (position, extra) = parse_position(rest)?;
            if !extra.is_empty() {
                bail!("select takes only a row and a column");
            }
            Command::Select(position)
        }
        "edit" | "e" => Command::Edit(rest.to_string()),
        "set" => {
            let (position, value) = parse_position(rest)?;
            Command::Set(position, value.to_string())
        }
        "show" | "ls" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => bail!("unknown command '{other}', try 'help'"),
    };
    Ok(Some(command))
}

fn parse_position(input: &str) -> Result<(Position, &str)> {
    let (row, rest) = next_word(input).ok_or_else(|| anyhow!("missing row"))?;
    let (column, rest) = next_word(rest).ok_or_else(|| anyhow!("missing column"))?;
    let row = row
        .parse()
        .with_context(|| format!("row must be a non-negative number, got '{row}'"))?;
    let column = column
        .parse()
        .with_context(|| format!("column must be a non-negative number, got '{column}'"))?;
    Ok((Position::new(row, column), rest))
}

fn next_word(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    Some(match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (input, ""),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(parse_command("   ").unwrap(), None);
    }

    #[test]
    fn parses_select_and_set() {
        assert_eq!(
            parse_command("select 1 2").unwrap(),
            Some(Command::Select(Position::new(1, 2)))
        );
        assert_eq!(
            parse_command("set 0 4 hello  world").unwrap(),
            Some(Command::Set(Position::new(0, 4), "hello  world".to_string()))
        );
    }

    #[test]
    fn edit_without_value_clears_the_cell() {
        assert_eq!(
            parse_command("edit").unwrap(),
            Some(Command::Edit(String::new()))
        );
        assert_eq!(
            parse_command("EDIT  42 ").unwrap(),
            Some(Command::Edit("42".to_string()))
        );
    }

    #[test]
    fn rejects_bad_positions_and_unknown_verbs() {
        assert!(parse_command("select 1").is_err());
        assert!(parse_command("select -1 0").is_err());
        assert!(parse_command("select 1 2 3").is_err());
        assert!(parse_command("set x 1 v").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn parses_session_verbs() {
        assert_eq!(parse_command("show").unwrap(), Some(Command::Show));
        assert_eq!(parse_command("?").unwrap(), Some(Command::Help));
        assert_eq!(parse_command("quit").unwrap(), Some(Command::Quit));
    }
}
