//! Watch command implementation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use owo_colors::OwoColorize;
use sigscope_core::{GameDetector, GameState, SessionInfo, ShutdownSignal};
use tracing::info;

use crate::config::CliConfig;
use crate::input;

const STATUS_REFRESH: Duration = Duration::from_millis(250);

fn paint(state: GameState) -> String {
    let name: &'static str = state.into();
    match state {
        GameState::Unknown => name.dimmed().to_string(),
        GameState::NotRunning => name.red().to_string(),
        GameState::Connecting => name.yellow().to_string(),
        GameState::InMenu => name.cyan().to_string(),
        GameState::InGame => name.green().bold().to_string(),
    }
}

fn print_status(detector: &GameDetector) {
    let status = detector.status();
    let offsets = match &status.offsets {
        Some(offsets) => format!(
            "{}/{} fields at base {}",
            offsets.found_count(),
            offsets.fields().count(),
            offsets.base()
        ),
        None => "unresolved".to_string(),
    };
    let session = match &status.session {
        Some(session) => format!("{} (id {})", session.name, session.id),
        None => "-".to_string(),
    };
    println!(
        "   state {}  epoch {}  session {}  offsets {}",
        paint(status.state),
        status.epoch,
        session,
        offsets
    );
}

pub fn run(config: &CliConfig) -> Result<()> {
    let shutdown = Arc::new(ShutdownSignal::new());
    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping...");
        shutdown_ctrlc.trigger();
    })?;

    let detector_config = config.detector_config();
    let process_name = detector_config.process_name.clone();
    let detector = Arc::new(
        GameDetector::builder()
            .config(detector_config)
            .signatures(config.signature_table()?)
            .build()?,
    );

    let status_source = Arc::downgrade(&detector);
    detector.set_on_state_change(move |state| {
        let Some(detector) = status_source.upgrade() else {
            return;
        };
        match (state, detector.current_session()) {
            (GameState::InGame, Some(session)) => println!(
                "{} {} {} (id {}, joined {})",
                "->".dimmed(),
                paint(state),
                session.name.bold(),
                session.id,
                session.joined_at.format("%H:%M:%S")
            ),
            _ => println!("{} {}", "->".dimmed(), paint(state)),
        }
    });

    let status_source = Arc::downgrade(&detector);
    let _keyboard_handle = input::spawn_keyboard_monitor(Arc::clone(&shutdown), move || {
        if let Some(detector) = status_source.upgrade() {
            print_status(&detector);
        }
    });

    if !detector.start() {
        bail!("Memory access is not available; see the log for details");
    }
    println!(
        "Watching {}... (Press s for status, Esc or q to quit)",
        process_name
    );

    let mut last_session = None;
    while !shutdown.wait(STATUS_REFRESH) {
        // a new session while already InGame does not fire the callback
        let session = detector.current_session();
        if let Some(current) = &session
            && last_session
                .as_ref()
                .is_some_and(|last: &SessionInfo| last.id != current.id)
        {
            println!(
                "{} {} {} (id {})",
                "->".dimmed(),
                "Rejoined".green(),
                current.name.bold(),
                current.id
            );
        }
        last_session = session;
    }

    detector.stop();
    let status = detector.status();
    info!("Stopped in state {} (epoch {})", status.state, status.epoch);
    Ok(())
}
