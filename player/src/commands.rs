//! Interactive stdin commands

use std::io::BufRead;
use std::str::FromStr;
use std::thread;

use crossbeam::channel::{unbounded, Receiver};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Stop,
    Play(String),
    Preset(String),
    Stats,
    Help,
    Quit,
}

pub const HELP: &str = "commands: pause | resume | stop | play <url> | preset <name> | stats | help | quit";

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "stop" => Command::Stop,
            "stats" => Command::Stats,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            "play" if rest.is_empty() => return Err("play needs a URL".into()),
            "play" => Command::Play(rest.to_string()),
            "preset" if rest.is_empty() => return Err("preset needs a name".into()),
            "preset" => Command::Preset(rest.to_string()),
            "" => return Err("empty command".into()),
            other => return Err(format!("unknown command '{other}'")),
        };
        Ok(command)
    }
}

/// Read commands from stdin on a background thread. The channel closes at
/// end of input.
pub fn spawn_stdin_reader() -> std::io::Result<Receiver<Command>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(command) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("{e} ({HELP})"),
                }
            }
            debug!("stdin closed");
        })?;
    Ok(rx)
}
