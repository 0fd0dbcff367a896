//! Operator cancellation.
//!
//! Input sources (the console keyboard and Ctrl+C) push [`InputEvent`]s into
//! a channel. The listener thread takes the first event, requests `End`, and
//! exits. It also exits on its own once something else has ended the run.

use std::{
    fmt,
    sync::{Arc, Once},
    thread::JoinHandle,
    time::Duration,
};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal,
};
use tracing::{debug, info, warn};

use super::mode::ModeCell;
use crate::telemetry;

/// How often idle threads look at the shared mode.
pub const LISTENER_TICK: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Key(String),
    Interrupt,
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputEvent::Key(key) => write!(f, "key {key}"),
            InputEvent::Interrupt => f.write_str("interrupt"),
        }
    }
}

/// Spawn the thread that turns the first input event into `End`.
pub fn spawn_listener(mode: Arc<ModeCell>, events: Receiver<InputEvent>) -> Result<JoinHandle<()>> {
    telemetry::spawn_thread("cancel-listener", move || listen(&mode, &events))
        .context("failed to spawn cancellation listener")
}

fn listen(mode: &ModeCell, events: &Receiver<InputEvent>) {
    while !mode.is_cancelled() {
        match events.recv_timeout(LISTENER_TICK) {
            Ok(event) => {
                info!("{event} received; stopping");
                mode.cancel();
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("input sources closed");
                return;
            }
        }
    }
}

/// Forward Ctrl+C as an [`InputEvent::Interrupt`]. Installed once per process.
pub fn install_interrupt_handler(events: Sender<InputEvent>) {
    static HANDLER: Once = Once::new();
    HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            let _ = events.send(InputEvent::Interrupt);
        }) {
            warn!("failed to install Ctrl+C handler: {err}");
        }
    });
}

/// Puts the console in raw mode and restores it when dropped.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        telemetry::set_raw_console(true);
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        telemetry::set_raw_console(false);
        if let Err(err) = terminal::disable_raw_mode() {
            warn!("failed to restore the terminal: {err}");
        }
    }
}

/// Read console key presses until the run ends.
///
/// The terminal is raw for the reader's lifetime so a single key press is
/// delivered without Enter. Ctrl+C then arrives as a key event too.
pub fn spawn_keyboard_reader(
    mode: Arc<ModeCell>,
    events: Sender<InputEvent>,
) -> Result<JoinHandle<()>> {
    telemetry::spawn_thread("keyboard", move || {
        let _raw = match RawModeGuard::enable() {
            Ok(guard) => guard,
            Err(err) => {
                warn!("console input unavailable, keyboard cancel disabled: {err}");
                return;
            }
        };
        while !mode.is_cancelled() {
            match event::poll(LISTENER_TICK) {
                Ok(false) => {}
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                        if events.send(key_event(key)).is_err() {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("keyboard read failed: {err}");
                        return;
                    }
                },
                Err(err) => {
                    warn!("keyboard poll failed: {err}");
                    return;
                }
            }
        }
    })
    .context("failed to spawn keyboard reader")
}

fn key_event(key: KeyEvent) -> InputEvent {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        InputEvent::Interrupt
    } else {
        InputEvent::Key(format!("{:?}", key.code))
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Instant};

    use crossbeam_channel::unbounded;

    use super::*;
    use crate::capture::mode::Mode;

    #[test]
    fn first_event_ends_the_run() {
        let mode = Arc::new(ModeCell::new());
        mode.request(Mode::Adjust);
        let (tx, rx) = unbounded();
        let handle = spawn_listener(mode.clone(), rx).unwrap();

        tx.send(InputEvent::Key("q".into())).unwrap();
        handle.join().unwrap();
        assert_eq!(mode.get(), Mode::End);
    }

    #[test]
    fn listener_exits_when_run_ends_elsewhere() {
        let mode = Arc::new(ModeCell::new());
        let (_tx, rx) = unbounded::<InputEvent>();
        let handle = spawn_listener(mode.clone(), rx).unwrap();

        thread::sleep(LISTENER_TICK);
        let ended = Instant::now();
        mode.cancel();
        handle.join().unwrap();
        assert!(ended.elapsed() < LISTENER_TICK * 5);
    }

    #[test]
    fn raw_ctrl_c_counts_as_interrupt() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(key_event(ctrl_c), InputEvent::Interrupt);
        let plain = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE);
        assert_eq!(key_event(plain), InputEvent::Key("Char('c')".into()));
    }

    #[test]
    fn closed_sources_leave_the_mode_alone() {
        let mode = Arc::new(ModeCell::new());
        let (tx, rx) = unbounded::<InputEvent>();
        drop(tx);
        spawn_listener(mode.clone(), rx).unwrap().join().unwrap();
        assert_eq!(mode.get(), Mode::Wait);
    }
}
