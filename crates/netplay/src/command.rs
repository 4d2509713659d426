use std::net::SocketAddr;
use std::str::FromStr;

use crate::client::ConnectionState;
use crate::net::transport::{NetError, parse_port};

pub const HELP: &str = "\
start_server <ip> <port>        host a server
stop_server                     stop the hosted server
join_server <ip> <port> <name>  connect to a server
quit_server | leave_server      leave the current server
list                            list the players on the server
say <text>                      send a chat message
help                            show this text";

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("A server is already active on {0}")]
    ServerActive(SocketAddr),
    #[error("There is no active server")]
    NoServer,
    #[error("You are already in a server, leave it first")]
    AlreadyInServer,
    #[error("You are not in a server")]
    NotInServer,
    #[error("Not connected yet ({0})")]
    NotReady(ConnectionState),
    #[error("Invalid port '{0}'")]
    InvalidPort(String),
    #[error("Unknown command '{0}', try 'help'")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error(transparent)]
    Net(#[from] NetError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartServer { host: String, port: u16 },
    StopServer,
    JoinServer { host: String, port: u16, name: String },
    LeaveServer,
    List,
    Say(String),
    Help,
}

fn port_arg(text: &str) -> Result<u16, CommandError> {
    parse_port(text).ok_or_else(|| CommandError::InvalidPort(text.to_owned()))
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map(|(verb, rest)| (verb, rest.trim()))
            .unwrap_or((line, ""));
        let args: Vec<&str> = rest.split_whitespace().collect();

        match verb {
            "start_server" => match args.as_slice() {
                [host, port] => Ok(Command::StartServer {
                    host: host.to_string(),
                    port: port_arg(port)?,
                }),
                _ => Err(CommandError::Usage("start_server <ip> <port>")),
            },
            "stop_server" => Ok(Command::StopServer),
            "join_server" => match args.as_slice() {
                [host, port, name] => Ok(Command::JoinServer {
                    host: host.to_string(),
                    port: port_arg(port)?,
                    name: name.to_string(),
                }),
                _ => Err(CommandError::Usage("join_server <ip> <port> <name>")),
            },
            "quit_server" | "leave_server" => Ok(Command::LeaveServer),
            "list" => Ok(Command::List),
            "say" if !rest.is_empty() => Ok(Command::Say(rest.to_owned())),
            "say" => Err(CommandError::Usage("say <text>")),
            "help" => Ok(Command::Help),
            other => Err(CommandError::Unknown(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            "start_server 127.0.0.1 7777".parse::<Command>().unwrap(),
            Command::StartServer {
                host: "127.0.0.1".into(),
                port: 7777
            }
        );
        assert_eq!(
            "  join_server localhost 4000 Ann ".parse::<Command>().unwrap(),
            Command::JoinServer {
                host: "localhost".into(),
                port: 4000,
                name: "Ann".into()
            }
        );
        assert_eq!("quit_server".parse::<Command>().unwrap(), Command::LeaveServer);
        assert_eq!("leave_server".parse::<Command>().unwrap(), Command::LeaveServer);
        assert_eq!("list".parse::<Command>().unwrap(), Command::List);
        assert_eq!(
            "say hello   there".parse::<Command>().unwrap(),
            Command::Say("hello   there".into())
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "start_server 127.0.0.1 77x".parse::<Command>(),
            Err(CommandError::InvalidPort(p)) if p == "77x"
        ));
        assert!(matches!(
            "join_server 127.0.0.1 7777".parse::<Command>(),
            Err(CommandError::Usage(_))
        ));
        assert!(matches!("say".parse::<Command>(), Err(CommandError::Usage(_))));
        assert!(matches!(
            "dance".parse::<Command>(),
            Err(CommandError::Unknown(v)) if v == "dance"
        ));
    }
}
