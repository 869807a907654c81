pub mod alarm;
pub mod challenge;
pub mod config;
pub mod data;
pub mod run;

use reveille_core::{AlarmClock, ClockPolicy, Config, Database, Event, HeadlessOutput, SessionMachine};

/// Open the on-disk alarm list behind a coordinator.
pub(crate) fn open_clock(
    config: &Config,
    machine: SessionMachine<HeadlessOutput>,
) -> Result<AlarmClock<Database>, Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let (clock, boot_events) = AlarmClock::load(db, machine, ClockPolicy::from(config));
    for event in boot_events {
        report_warning(&event);
    }
    Ok(clock)
}

/// Surface a storage warning on stderr; other events are ignored.
pub(crate) fn report_warning(event: &Event) {
    if let Event::StorageWarning { message, .. } = event {
        eprintln!("warning: {message}");
    }
}
