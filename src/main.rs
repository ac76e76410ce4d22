//! Host runner: a simulated board driven from stdin.
//!
//! Each stdin line is either a peer command (`move_ack:e2e4`, `light_on:e2e4`,
//! ...), a link event (`connect`, `disconnect`), a status read (`status`,
//! printed as `== <status>`) or an operator action on the simulated board:
//!
//!   sim setup               place the full opening layout
//!   sim place <sq> <uid>    put a token on a square
//!   sim lift <sq>           remove whatever is on a square
//!   sim slide <from> <to>   move a token, knocking off any occupant
//!   sim fault <sq> <n>      fail the next n reads of a square
//!   sim faultrate <p>       fail any read with probability p (0 disables)
//!   sim clear               empty the board
//!
//! Outbound records are printed as `>> <record>`.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{watch, Mutex};
use tokio::time::Duration;

use boardsync::board::{Position, TokenId};
use boardsync::engine::{run_scan_loop, BoardContext, BoardEngine, CommandHandler};
use boardsync::logging::{log, obj, v_str, Domain, Level};
use boardsync::notify::{Transport, TransportError};
use boardsync::peripherals::LogPeripherals;
use boardsync::roster::Roster;
use boardsync::sensor::sim::ScriptedBoard;
use boardsync::state::Config;

struct StdoutTransport {
    out: Mutex<tokio::io::Stdout>,
}

#[async_trait]
impl Transport for StdoutTransport {
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut out = self.out.lock().await;
        let line = format!(">> {}\n", String::from_utf8_lossy(bytes));
        out.write_all(line.as_bytes())
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        out.flush()
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))
    }
}

fn load_roster(cfg: &Config) -> Result<Roster> {
    match &cfg.roster_path {
        Some(path) => Roster::from_json_file(path).with_context(|| format!("loading roster {path}")),
        None => Ok(Roster::standard()),
    }
}

fn square(arg: Option<&str>) -> Result<Position> {
    let raw = arg.context("missing square")?;
    raw.parse().with_context(|| format!("bad square {raw:?}"))
}

fn sim_command(board: &ScriptedBoard, roster: &Roster, args: &[&str]) -> Result<()> {
    match args.first().copied() {
        Some("setup") => {
            for (pos, token) in roster.opening_layout() {
                board.place(pos, token);
            }
        }
        Some("place") => {
            let pos = square(args.get(1).copied())?;
            let raw = args.get(2).context("missing uid")?;
            let token: TokenId = raw.parse().with_context(|| format!("bad uid {raw:?}"))?;
            board.place(pos, token);
        }
        Some("lift") => {
            board.lift(square(args.get(1).copied())?);
        }
        Some("slide") => {
            let from = square(args.get(1).copied())?;
            let to = square(args.get(2).copied())?;
            if board.occupant(from).is_none() {
                bail!("nothing on {from}");
            }
            board.slide(from, to);
        }
        Some("fault") => {
            let pos = square(args.get(1).copied())?;
            let n: u32 = args.get(2).unwrap_or(&"1").parse().context("bad fault count")?;
            board.fail_next(pos, n);
        }
        Some("faultrate") => {
            let raw = args.get(1).context("missing rate")?;
            let rate: f64 = raw.parse().with_context(|| format!("bad rate {raw:?}"))?;
            board.set_fault_rate(rate);
        }
        Some("clear") => board.clear(),
        other => bail!("unknown sim command {:?}", other.unwrap_or("")),
    }
    Ok(())
}

fn handle_line(
    line: &str,
    ctx: &BoardContext,
    handler: &CommandHandler,
    board: &ScriptedBoard,
    roster: &Roster,
) -> Result<()> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] => Ok(()),
        ["status"] => {
            println!("== {}", ctx.status());
            Ok(())
        }
        ["connect"] => {
            handler.connect();
            Ok(())
        }
        ["disconnect"] => {
            handler.disconnect();
            Ok(())
        }
        ["sim", rest @ ..] => sim_command(board, roster, rest),
        _ => {
            handler.handle_text(line)?;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let roster = load_roster(&cfg)?;
    let board = ScriptedBoard::new();
    let period = Duration::from_millis(cfg.sweep_interval_ms);

    let engine = BoardEngine::new(cfg, roster.clone(), Arc::new(LogPeripherals));
    let handler = engine.handler();
    let transport = Arc::new(StdoutTransport {
        out: Mutex::new(tokio::io::stdout()),
    });
    let sender = engine.spawn_sender(transport);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scanner = engine.scanner(board.clone());
    let scan = tokio::spawn(run_scan_loop(scanner, period, shutdown_rx));

    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("status", v_str(engine.context().status())),
            ("roster", json!(roster.len())),
            ("queue_capacity", json!(engine.context().queue().capacity())),
        ]),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "quit" {
            break;
        }
        if let Err(e) = handle_line(line, engine.context(), &handler, &board, &roster) {
            log(
                Level::Warn,
                Domain::System,
                "command_failed",
                obj(&[("raw", v_str(line)), ("error", v_str(&format!("{e:#}")))]),
            );
        }
    }

    shutdown_tx.send(true).ok();
    let sweeps = scan.await.context("scan loop panicked")?;
    engine.context().queue().close();
    let sent = sender.await.context("sender panicked")?;
    log(
        Level::Info,
        Domain::System,
        "shutdown",
        obj(&[
            ("sweeps", json!(sweeps)),
            ("sent", json!(sent)),
            ("overflow", json!(engine.context().queue().overflow_count())),
        ]),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use boardsync::sensor::{ReadOutcome, SweepReader};

    #[tokio::test]
    async fn test_sim_console_commands() {
        let board = ScriptedBoard::new();
        let roster = Roster::standard();
        sim_command(&board, &roster, &["setup"]).unwrap();
        assert_eq!(board.occupied(), 32);
        sim_command(&board, &roster, &["slide", "e2", "e4"]).unwrap();
        assert!(board.occupant("e2".parse().unwrap()).is_none());
        assert!(sim_command(&board, &roster, &["slide", "e2", "e4"]).is_err());

        sim_command(&board, &roster, &["faultrate", "1"]).unwrap();
        let mut reader = board.clone();
        assert_eq!(reader.read("a1".parse().unwrap()).await, ReadOutcome::Fault);
        sim_command(&board, &roster, &["faultrate", "0"]).unwrap();
        assert!(matches!(reader.read("a1".parse().unwrap()).await, ReadOutcome::Present(_)));
        assert!(sim_command(&board, &roster, &["faultrate", "lots"]).is_err());
    }
}
