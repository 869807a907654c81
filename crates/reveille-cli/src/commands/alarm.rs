//! Alarm management commands for CLI.

use clap::Subcommand;
use reveille_core::{Alarm, AlarmDraft, Config, SessionMachine};

use super::{open_clock, report_warning};

#[derive(Subcommand)]
pub enum AlarmAction {
    /// List configured alarms
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a new alarm
    Add {
        /// Trigger time, 24h "HH:MM"
        #[arg(long)]
        time: String,
        #[arg(long, default_value = "Wake Up")]
        label: String,
        /// Weekdays, 0 = Sunday (e.g. "1,2,3,4,5"); omit for a one-shot alarm
        #[arg(long, value_delimiter = ',')]
        days: Vec<u8>,
        /// Require a math challenge to dismiss
        #[arg(long)]
        strict: bool,
        /// Challenge tier: easy, medium or hard
        #[arg(long, default_value = "medium")]
        difficulty: String,
    },
    /// Edit an existing alarm; omitted fields are kept
    Edit {
        /// Alarm ID
        id: String,
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        label: Option<String>,
        /// Replace the weekday set; `--days` alone makes it one-shot
        #[arg(long, value_delimiter = ',', num_args = 0..)]
        days: Option<Vec<u8>>,
        #[arg(long)]
        strict: Option<bool>,
        #[arg(long)]
        difficulty: Option<String>,
    },
    /// Delete an alarm
    Remove {
        /// Alarm ID
        id: String,
    },
    /// Flip an alarm's enabled flag
    Toggle {
        /// Alarm ID
        id: String,
    },
    /// Enable an alarm
    Enable {
        /// Alarm ID
        id: String,
    },
    /// Disable an alarm
    Disable {
        /// Alarm ID
        id: String,
    },
}

fn print_table(alarms: &[Alarm], clock24: bool) {
    if alarms.is_empty() {
        println!("no alarms");
        return;
    }
    for alarm in alarms {
        println!(
            "{}  {:>8}  {:<3}  {:<20}  {}{}",
            alarm.id,
            alarm.time.display(clock24),
            if alarm.enabled { "on" } else { "off" },
            alarm.days_summary(),
            alarm.label,
            if alarm.strict {
                format!("  [strict:{}]", alarm.difficulty)
            } else {
                String::new()
            },
        );
    }
}

pub fn run(action: AlarmAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let mut clock = open_clock(&config, SessionMachine::default())?;

    let events = match action {
        AlarmAction::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(clock.alarms())?);
            } else {
                print_table(clock.alarms(), config.display.clock24);
            }
            return Ok(());
        }
        AlarmAction::Add {
            time,
            label,
            days,
            strict,
            difficulty,
        } => {
            let draft = AlarmDraft {
                id: None,
                time,
                label,
                days,
                strict,
                difficulty,
            };
            let (alarm, events) = clock.request_save(&draft)?;
            println!("Alarm created: {}", alarm.id);
            println!("{}", serde_json::to_string_pretty(&alarm)?);
            events
        }
        AlarmAction::Edit {
            id,
            time,
            label,
            days,
            strict,
            difficulty,
        } => {
            let existing = clock
                .registry()
                .get(&id)
                .ok_or_else(|| format!("alarm not found: {id}"))?;
            let mut draft = AlarmDraft::from(existing);
            if let Some(time) = time {
                draft.time = time;
            }
            if let Some(label) = label {
                draft.label = label;
            }
            if let Some(days) = days {
                draft.days = days;
            }
            if let Some(strict) = strict {
                draft.strict = strict;
            }
            if let Some(difficulty) = difficulty {
                draft.difficulty = difficulty;
            }
            let (alarm, events) = clock.request_save(&draft)?;
            println!("Alarm updated: {}", alarm.id);
            println!("{}", serde_json::to_string_pretty(&alarm)?);
            events
        }
        AlarmAction::Remove { id } => {
            let events = clock.request_delete(&id)?;
            println!("Alarm removed: {id}");
            events
        }
        AlarmAction::Toggle { id } => {
            let events = clock.request_toggle(&id)?;
            let enabled = clock.registry().get(&id).is_some_and(|a| a.enabled);
            println!("{id}: {}", if enabled { "enabled" } else { "disabled" });
            events
        }
        AlarmAction::Enable { id } => {
            let events = clock.request_set_enabled(&id, true)?;
            println!("{id}: enabled");
            events
        }
        AlarmAction::Disable { id } => {
            let events = clock.request_set_enabled(&id, false)?;
            println!("{id}: disabled");
            events
        }
    };

    for event in &events {
        report_warning(event);
    }
    Ok(())
}
