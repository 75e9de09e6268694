//! Operator commands read from stdin by the service binary
use std::str::FromStr;

use crate::models::DeviceSelection;

pub const HELP: &str = "commands: tare, reset, connect, cancel, stop, scale, progressor, status, quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Tare,
    Reset,
    /// Progressor scan_and_connect
    Connect,
    /// Progressor stop_scanning
    Cancel,
    /// Progressor stop_monitoring
    Stop,
    Select(DeviceSelection),
    Status,
    Help,
    Quit,
}

impl Command {
    /// Whether the command only makes sense with the Progressor selected
    pub fn needs_progressor(&self) -> bool {
        matches!(
            self,
            Command::Tare | Command::Connect | Command::Cancel | Command::Stop
        )
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let word = line.trim().to_ascii_lowercase();
        let command = match word.as_str() {
            "tare" | "t" => Command::Tare,
            "reset" | "r" => Command::Reset,
            "connect" | "c" => Command::Connect,
            "cancel" => Command::Cancel,
            "stop" | "s" => Command::Stop,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => match other.parse::<DeviceSelection>() {
                Ok(selection) => Command::Select(selection),
                Err(_) => return Err(format!("unknown command '{}'", line.trim())),
            },
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("tare".parse(), Ok(Command::Tare));
        assert_eq!("  Reset \n".parse(), Ok(Command::Reset));
        assert_eq!("connect".parse(), Ok(Command::Connect));
        assert_eq!("cancel".parse(), Ok(Command::Cancel));
        assert_eq!("stop".parse(), Ok(Command::Stop));
        assert_eq!("q".parse(), Ok(Command::Quit));
        assert_eq!(
            "progressor".parse(),
            Ok(Command::Select(DeviceSelection::ActiveSensor))
        );
        assert_eq!(
            "whc06".parse(),
            Ok(Command::Select(DeviceSelection::PassiveScale))
        );
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            "jump".parse::<Command>(),
            Err("unknown command 'jump'".to_string())
        );
        assert!("".parse::<Command>().is_err());
    }

    #[test]
    fn test_progressor_only_commands() {
        assert!(Command::Tare.needs_progressor());
        assert!(Command::Stop.needs_progressor());
        assert!(!Command::Reset.needs_progressor());
        assert!(!Command::Select(DeviceSelection::ActiveSensor).needs_progressor());
    }
}
