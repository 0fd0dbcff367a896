//! Shared operating mode.

use std::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Idle until the scheduled target time.
    Wait = 0,
    /// Raster the head looking for a face.
    Search = 1,
    /// Nudge the head until the face sits in the frame center.
    Adjust = 2,
    /// Save one frame and schedule the next cycle.
    Capture = 3,
    /// Terminal. Nothing leaves this state.
    End = 4,
}

impl Mode {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Mode::Wait,
            1 => Mode::Search,
            2 => Mode::Adjust,
            3 => Mode::Capture,
            _ => Mode::End,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Wait => "wait",
            Mode::Search => "search",
            Mode::Adjust => "adjust",
            Mode::Capture => "capture",
            Mode::End => "end",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Mode shared between the controller and the cancellation listener.
///
/// Any thread may request `End`. Once `End` is stored every further request
/// is refused, so a cancellation can never be overwritten by a controller
/// transition that raced with it.
#[derive(Debug)]
pub struct ModeCell(AtomicU8);

impl Default for ModeCell {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(Mode::Wait as u8))
    }

    pub fn get(&self) -> Mode {
        Mode::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Store `next` unless the cell already holds `End`. Returns whether the
    /// request was applied.
    pub fn request(&self, next: Mode) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                (Mode::from_u8(raw) != Mode::End).then_some(next as u8)
            })
            .is_ok()
    }

    pub fn cancel(&self) {
        self.request(Mode::End);
    }

    pub fn is_cancelled(&self) -> bool {
        self.get() == Mode::End
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn starts_in_wait() {
        assert_eq!(ModeCell::new().get(), Mode::Wait);
    }

    #[test]
    fn transitions_apply_until_end() {
        let cell = ModeCell::new();
        assert!(cell.request(Mode::Search));
        assert!(cell.request(Mode::Adjust));
        assert_eq!(cell.get(), Mode::Adjust);

        cell.cancel();
        assert!(!cell.request(Mode::Capture));
        assert!(!cell.request(Mode::Wait));
        assert_eq!(cell.get(), Mode::End);
        assert!(cell.is_cancelled());
    }

    #[test]
    fn end_survives_racing_writers() {
        let cell = Arc::new(ModeCell::new());
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let cell = cell.clone();
                thread::spawn(move || {
                    for n in 0..1_000 {
                        if i == 0 && n == 10 {
                            cell.cancel();
                        }
                        let next = if n % 2 == 0 { Mode::Search } else { Mode::Adjust };
                        cell.request(next);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(cell.get(), Mode::End);
    }
}
