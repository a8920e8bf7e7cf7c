// Console control surface: line commands mapped onto the monitor lifecycle

use std::io::BufRead;
use std::str::FromStr;

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
    Quit,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown command {0:?} (expected start, stop, status or quit)")]
pub struct UnknownCommand(String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" | "s" => Ok(Command::Start),
            "stop" | "x" => Ok(Command::Stop),
            "status" | "?" => Ok(Command::Status),
            "quit" | "q" | "exit" => Ok(Command::Quit),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

/// Reads commands from `input` on a plain thread and forwards them.
/// The thread is detached so a pending read never holds up process exit;
/// it ends at EOF or once the receiver is gone.
pub fn spawn_reader<R>(input: R) -> mpsc::Receiver<Command>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in input.lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!(error = %e, "reading commands failed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(cmd) => {
                    if tx.blocking_send(cmd).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("{}", e),
            }
        }
        tracing::debug!("command reader finished");
    });
    rx
}
