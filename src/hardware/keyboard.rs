// Keyboard teleop controller: WASD left stick, IJKL right stick, R/F speed, Q quit
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tracing::{info, warn};

use super::{Axis, ControllerInput, Result};
use crate::config::{JOYSTICK_MAX, KEYBOARD_INPUT_TIMEOUT};

// Stick deflection per speed level
const SPEEDS: [i32; 3] = [32, 64, JOYSTICK_MAX];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    None,
    Move,
    Speed,
    Quit,
}

#[derive(Debug)]
struct StickState {
    axes: [i32; 4],
    speed_idx: usize,
    last_movement_input: Instant,
    quit: bool,
}

impl StickState {
    fn handle_key(&mut self, code: KeyCode) -> KeyAction {
        let speed = SPEEDS[self.speed_idx];
        let movement = match code {
            KeyCode::Char('w') => Some((Axis::LeftY, speed)),
            KeyCode::Char('s') => Some((Axis::LeftY, -speed)),
            KeyCode::Char('a') => Some((Axis::LeftX, -speed)),
            KeyCode::Char('d') => Some((Axis::LeftX, speed)),
            KeyCode::Char('i') => Some((Axis::RightY, speed)),
            KeyCode::Char('k') => Some((Axis::RightY, -speed)),
            KeyCode::Char('j') => Some((Axis::RightX, -speed)),
            KeyCode::Char('l') => Some((Axis::RightX, speed)),
            _ => None,
        };
        if let Some((axis, value)) = movement {
            self.axes[axis.index()] = value;
            self.last_movement_input = Instant::now();
            return KeyAction::Move;
        }

        match code {
            KeyCode::Char('r') => {
                self.speed_idx = (self.speed_idx + 1).min(SPEEDS.len() - 1);
                print_speed(self.speed_idx);
                KeyAction::Speed
            }
            KeyCode::Char('f') => {
                self.speed_idx = self.speed_idx.saturating_sub(1);
                print_speed(self.speed_idx);
                KeyAction::Speed
            }
            KeyCode::Char('q') | KeyCode::Esc => {
                self.quit = true;
                KeyAction::Quit
            }
            _ => KeyAction::None,
        }
    }

    // Sticks spring back once keys stop arriving
    fn expire(&mut self, timeout: Duration) {
        if self.last_movement_input.elapsed() > timeout {
            self.axes = [0; 4];
        }
    }
}

/// Controller driven from the terminal. Clones share state: the runtime keeps
/// one to pump key events while the chassis reads sticks through another.
#[derive(Debug, Clone)]
pub struct KeyboardController {
    state: Rc<RefCell<StickState>>,
}

impl Default for KeyboardController {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardController {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(StickState {
                axes: [0; 4],
                speed_idx: 0,
                last_movement_input: Instant::now(),
                quit: false,
            })),
        }
    }

    /// Drain pending key events without blocking
    pub fn pump(&self) -> std::io::Result<()> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                if pressed {
                    self.press(code);
                }
            }
        }
        self.state.borrow_mut().expire(KEYBOARD_INPUT_TIMEOUT);
        Ok(())
    }

    pub fn press(&self, code: KeyCode) -> KeyAction {
        self.state.borrow_mut().handle_key(code)
    }

    pub fn quit_requested(&self) -> bool {
        self.state.borrow().quit
    }
}

impl ControllerInput for KeyboardController {
    fn analog(&mut self, axis: Axis) -> Result<i32> {
        Ok(self.state.borrow().axes[axis.index()])
    }
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}

/// Raw terminal mode for the lifetime of the guard
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn enable() -> std::io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to restore terminal: {}", e);
        }
    }
}
