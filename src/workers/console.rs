//! Line-oriented console front end.
//!
//! Input is read from stdin one command per line; application events are
//! printed to stdout and received files are written to the download
//! directory.

use crate::core::connection::LinkFactory;
use crate::core::manager::ConnectionManager;
use crate::core::peer::{AppEvent, AppEventKind};
use crate::core::transfer::{TransferEvent, TransferJob};
use crate::utils::save::save_received;
use crate::utils::sos::SignalOfStop;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Recognised console commands.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// `peers`: list known peers and their state.
    Peers,
    /// `send <peer> <path>...`: queue files for a peer.
    Send { peer: String, paths: Vec<PathBuf> },
    /// `text <peer> <message>`: send a text message.
    Text { peer: String, message: String },
    Help,
    Quit,
}

pub const COMMAND_HELP: &[(&str, &str)] = &[
    ("peers", "List known peers"),
    ("send <peer> <path>...", "Send one or more files"),
    ("text <peer> <message>", "Send a text message"),
    ("help", "Show available commands"),
    ("quit", "Leave and exit"),
];

/// Parse one input line. `None` for a blank line.
pub fn parse_command(input: &str) -> Option<Result<ConsoleCommand, String>> {
    let trimmed = input.trim();
    let (cmd, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None if trimmed.is_empty() => return None,
        None => (trimmed, ""),
    };

    let parsed = match cmd {
        "peers" => Ok(ConsoleCommand::Peers),
        "help" | "?" => Ok(ConsoleCommand::Help),
        "quit" | "exit" => Ok(ConsoleCommand::Quit),
        "send" => {
            let mut parts = rest.split_whitespace();
            match parts.next() {
                Some(peer) => {
                    let paths: Vec<PathBuf> = parts.map(PathBuf::from).collect();
                    if paths.is_empty() {
                        Err("usage: send <peer> <path>...".to_string())
                    } else {
                        Ok(ConsoleCommand::Send {
                            peer: peer.to_string(),
                            paths,
                        })
                    }
                }
                None => Err("usage: send <peer> <path>...".to_string()),
            }
        }
        "text" => match rest.split_once(char::is_whitespace) {
            Some((peer, message)) if !message.trim().is_empty() => Ok(ConsoleCommand::Text {
                peer: peer.to_string(),
                message: message.trim().to_string(),
            }),
            _ => Err("usage: text <peer> <message>".to_string()),
        },
        other => Err(format!("Unknown command: {other}")),
    };
    Some(parsed)
}

// ── Input ────────────────────────────────────────────────────────────────────

/// Read commands from stdin until `quit`, end of input or `sos`.
pub async fn run_input<F: LinkFactory>(manager: ConnectionManager<F>, sos: SignalOfStop) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Ready as {}. Type `help` for commands.", manager.local_id());

    loop {
        let line = match sos.select(lines.next_line()).await {
            None => break,
            Some(Ok(Some(line))) => line,
            Some(Ok(None)) => {
                info!(event = "stdin_closed", "Input closed");
                break;
            }
            Some(Err(e)) => {
                error!(event = "stdin_failure", error = %e);
                break;
            }
        };

        match parse_command(&line) {
            None => continue,
            Some(Err(msg)) => println!("{msg}"),
            Some(Ok(ConsoleCommand::Quit)) => break,
            Some(Ok(cmd)) => execute(&manager, cmd).await,
        }
    }
    sos.cancel();
}

async fn execute<F: LinkFactory>(manager: &ConnectionManager<F>, cmd: ConsoleCommand) {
    match cmd {
        ConsoleCommand::Peers => {
            let ids = manager.peer_ids().await;
            if ids.is_empty() {
                println!("No peers.");
            }
            for id in ids {
                match manager.snapshot(&id).await {
                    Some(s) => println!(
                        "  {id}  {}  {}{}",
                        s.role,
                        s.state,
                        if s.busy {
                            format!("  sending ({} queued)", s.queued)
                        } else {
                            String::new()
                        }
                    ),
                    None => println!("  {id}"),
                }
            }
        }
        ConsoleCommand::Send { peer, paths } => {
            let mut jobs = Vec::with_capacity(paths.len());
            for path in &paths {
                match TransferJob::from_path(path).await {
                    Ok(job) => jobs.push(job),
                    Err(e) => println!("Skipping {}: {e:#}", path.display()),
                }
            }
            if jobs.is_empty() {
                return;
            }
            if let Err(e) = manager.send_files_to(&peer, jobs).await {
                println!("{e}");
            }
        }
        ConsoleCommand::Text { peer, message } => {
            if let Err(e) = manager.send_text_to(&peer, message).await {
                println!("{e}");
            }
        }
        ConsoleCommand::Help => {
            for (usage, what) in COMMAND_HELP {
                println!("  {usage:<24} {what}");
            }
        }
        ConsoleCommand::Quit => {}
    }
}

// ── Output ───────────────────────────────────────────────────────────────────

/// Print application events and store received files in `download_dir`.
pub async fn run_output(mut events: mpsc::UnboundedReceiver<AppEvent>, download_dir: PathBuf) {
    while let Some(event) = events.recv().await {
        report(&event, &download_dir).await;
    }
}

async fn report(event: &AppEvent, download_dir: &Path) {
    let peer = &event.peer_id;
    match &event.kind {
        AppEventKind::Joined => println!("+ {peer} joined"),
        AppEventKind::Left => println!("- {peer} left"),
        AppEventKind::StateChanged(state) => info!(event = "peer_state", peer = %peer, state = %state),
        AppEventKind::Unreachable => println!("! {peer} is unreachable"),
        AppEventKind::Transfer(t) => match t {
            TransferEvent::SendStarted { name, size, .. } => {
                println!("> {peer}: sending {name} ({size} bytes)")
            }
            TransferEvent::SendProgress { .. } | TransferEvent::ReceiveProgress { .. } => {}
            TransferEvent::SendComplete { name, .. } => println!("> {peer}: {name} delivered"),
            TransferEvent::SendAborted { name, reason, .. } => {
                println!("> {peer}: {name} aborted ({reason})")
            }
            TransferEvent::ReceiveStarted { name, size, .. } => {
                println!("< {peer}: receiving {name} ({size} bytes)")
            }
            TransferEvent::ReceiveAborted { name } => println!("< {peer}: {name} aborted"),
            TransferEvent::FileReceived(file) => {
                match save_received(download_dir, &file.name, &file.data).await {
                    Ok(path) => println!("< {peer}: saved {}", path.display()),
                    Err(e) => {
                        warn!(event = "save_failure", peer = %peer, name = %file.name, error = %e);
                        println!("< {peer}: could not save {}: {e:#}", file.name);
                    }
                }
            }
            TransferEvent::TextReceived(text) => println!("[{peer}] {text}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::ReceivedFile;
    use bytes::Bytes;

    #[test]
    fn blank_line_is_not_a_command() {
        assert!(parse_command("").is_none());
        assert!(parse_command("   ").is_none());
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse_command("peers"), Some(Ok(ConsoleCommand::Peers)));
        assert_eq!(parse_command(" quit "), Some(Ok(ConsoleCommand::Quit)));
        assert_eq!(parse_command("?"), Some(Ok(ConsoleCommand::Help)));
        assert!(matches!(parse_command("dance"), Some(Err(_))));
    }

    #[test]
    fn send_command() {
        assert_eq!(
            parse_command("send p1 a.txt /tmp/b.bin"),
            Some(Ok(ConsoleCommand::Send {
                peer: "p1".into(),
                paths: vec![PathBuf::from("a.txt"), PathBuf::from("/tmp/b.bin")],
            }))
        );
        assert!(matches!(parse_command("send p1"), Some(Err(_))));
        assert!(matches!(parse_command("send"), Some(Err(_))));
    }

    #[test]
    fn text_command_keeps_inner_spacing() {
        assert_eq!(
            parse_command("text p1 hello   there"),
            Some(Ok(ConsoleCommand::Text {
                peer: "p1".into(),
                message: "hello   there".into(),
            }))
        );
        assert!(matches!(parse_command("text p1"), Some(Err(_))));
    }

    #[tokio::test]
    async fn received_file_is_saved() {
        let dir = std::env::temp_dir().join("peerdrop_test").join("console");
        let _ = std::fs::remove_dir_all(&dir);

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(AppEvent {
            peer_id: "p1".into(),
            kind: AppEventKind::Transfer(TransferEvent::FileReceived(ReceivedFile {
                name: "note.txt".into(),
                mime: "text/plain".into(),
                size: 3,
                data: Bytes::from_static(b"abc"),
            })),
        })
        .unwrap();
        drop(tx);

        run_output(rx, dir.clone()).await;
        assert_eq!(std::fs::read(dir.join("note.txt")).unwrap(), b"abc");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
