//! Foreground engine.
//!
//! Reads one intent per stdin line and prints every engine event as a JSON
//! line on stdout. Closing stdin or typing `quit` stops the engine. With
//! `audio.enabled` the alarm and cues sound as terminal bells on stderr.

use clap::Args;
use reveille_core::{
    AlarmDraft, Config, EscalationAudio, Event, HeadlessOutput, Intent, SessionMachine,
    ThreadRandom, TickSource,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use super::open_clock;
use crate::bell::TerminalBell;

#[derive(Args)]
pub struct RunArgs {
    /// Force the in-process tick fallback instead of the tick thread
    #[arg(long)]
    no_tick_thread: bool,
}

const HELP: &str = "commands: dismiss [answer] | snooze | save <alarm json> | toggle <id> | \
enable <id> | disable <id> | delete <id> | cue | quit";

fn parse_intent(line: &str) -> Result<Intent, String> {
    let line = line.trim();
    if let Some(json) = line.strip_prefix("save ") {
        return serde_json::from_str::<AlarmDraft>(json)
            .map(Intent::Save)
            .map_err(|e| format!("bad alarm: {e}"));
    }
    let mut words = line.split_whitespace();
    let command = words.next().ok_or("empty command")?;
    let arg = words.next();
    if words.next().is_some() {
        return Err(format!("unrecognized: {line}"));
    }
    match (command, arg) {
        ("dismiss", None) => Ok(Intent::Dismiss(None)),
        ("dismiss", Some(n)) => n
            .parse()
            .map(|n| Intent::Dismiss(Some(n)))
            .map_err(|_| format!("not a number: {n}")),
        ("snooze", None) => Ok(Intent::Snooze),
        ("toggle", Some(id)) => Ok(Intent::Toggle(id.to_string())),
        ("enable", Some(id)) => Ok(Intent::SetEnabled(id.to_string(), true)),
        ("disable", Some(id)) => Ok(Intent::SetEnabled(id.to_string(), false)),
        ("delete", Some(id)) => Ok(Intent::Delete(id.to_string())),
        ("cue", None) => Ok(Intent::Cue),
        ("quit" | "exit", None) => Ok(Intent::Shutdown),
        _ => Err(format!("unrecognized: {line}")),
    }
}

fn print_event(event: &Event) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, kind = event.kind(), "event not serializable"),
    }
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let output = if config.audio.enabled {
        HeadlessOutput::running()
    } else {
        HeadlessOutput::muted()
    };
    let machine = SessionMachine::new(EscalationAudio::new(output), Box::new(ThreadRandom));
    let mut clock = open_clock(&config, machine)?;
    if config.audio.enabled {
        clock = clock.with_sink(Box::new(TerminalBell::stderr()));
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async move {
        let isolated = config.tick.isolated && !args.no_tick_thread;
        let ticks = TickSource::start(config.tick.period(), isolated)?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            eprintln!("{HELP}");
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match parse_intent(&line) {
                        Ok(intent) => {
                            if tx.send(intent).is_err() {
                                break;
                            }
                        }
                        Err(e) => eprintln!("{e}\n{HELP}"),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
        });

        tracing::info!(alarms = clock.alarms().len(), "engine running");
        clock.run(ticks, rx, |event| print_event(&event)).await;
        Ok::<(), Box<dyn std::error::Error>>(())
    });

    // A blocked stdin read would otherwise hold the runtime open.
    runtime.shutdown_background();
    result
}
