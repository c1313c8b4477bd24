#[cfg(all(unix, not(target_os = "macos")))]
mod linux;

#[cfg(all(unix, not(target_os = "macos")))]
use crate::linux as imp;

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
use crate::windows as imp;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "macos")]
use crate::macos as imp;

mod keys;
mod screen;
mod window;

pub use {
    crate::{
        keys::{parse_key, parse_key_combination, FunctionKey},
        screen::{Screen, ScreenRect},
        window::Window,
    },
    enigo::{Button, Key},
};

use {
    anyhow::Context as _,
    enigo::{Direction, Enigo, Keyboard, Mouse},
    std::{
        sync::{Arc, Mutex},
        thread::sleep,
        time::Duration,
    },
    tracing::trace,
};

const DEFAULT_INPUT_DELAY: Duration = Duration::from_millis(200);
const SMOOTH_MOVE_STEP: Duration = Duration::from_millis(10);
const DOUBLE_CLICK_GAP: Duration = Duration::from_millis(60);

struct ContextData {
    imp: imp::Context,
    enigo: Mutex<Enigo>,
    input_delay: Duration,
}

#[derive(Clone)]
pub struct Context(Arc<ContextData>);

impl Context {
    #[allow(clippy::new_without_default)]
    pub fn new() -> anyhow::Result<Self> {
        Self::with_input_delay(DEFAULT_INPUT_DELAY)
    }

    /// Creates a context that pauses for `input_delay` after every injected input event.
    pub fn with_input_delay(input_delay: Duration) -> anyhow::Result<Self> {
        Ok(Self(Arc::new(ContextData {
            imp: imp::Context::new()?,
            enigo: Mutex::new(Enigo::new(&enigo::Settings::default())?),
            input_delay,
        })))
    }

    fn settle(&self) {
        sleep(self.0.input_delay);
    }

    pub fn all_windows(&self) -> anyhow::Result<Vec<Window>> {
        let mut windows = Vec::new();
        for inner in xcap::Window::all()? {
            match Window::new(self.clone(), inner) {
                Ok(window) => windows.push(window),
                Err(err) => trace!("skipping window: {:?}", err),
            }
        }
        Ok(windows)
    }

    /// Returns all windows whose title contains `title`.
    pub fn windows_by_title(&self, title: &str) -> anyhow::Result<Vec<Window>> {
        let windows = self.all_windows()?;
        Ok(windows
            .into_iter()
            .filter(|w| w.title().is_ok_and(|t| t.contains(title)))
            .collect())
    }

    /// Captures the primary monitor.
    pub fn capture_screen(&self) -> anyhow::Result<Screen> {
        let monitors = xcap::Monitor::all()?;
        let monitor = monitors
            .iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .or_else(|| monitors.first())
            .context("no monitors found")?;
        Ok(Screen::new(
            monitor.capture_image()?,
            monitor.x()?,
            monitor.y()?,
            imp::input_scale(monitor)?,
        ))
    }

    pub fn mouse_location(&self) -> anyhow::Result<(i32, i32)> {
        Ok(self.0.enigo.lock().unwrap().location()?)
    }

    pub fn mouse_move_global(&self, x: i32, y: i32) -> anyhow::Result<()> {
        self.0
            .enigo
            .lock()
            .unwrap()
            .move_mouse(x, y, enigo::Coordinate::Abs)?;
        self.settle();
        Ok(())
    }

    /// Moves the pointer along a straight line to `(x, y)` over `duration`.
    pub fn mouse_move_smooth(&self, x: i32, y: i32, duration: Duration) -> anyhow::Result<()> {
        if duration < SMOOTH_MOVE_STEP * 2 {
            return self.mouse_move_global(x, y);
        }
        let from = self.mouse_location()?;
        let steps = (duration.as_secs_f64() / SMOOTH_MOVE_STEP.as_secs_f64()).ceil() as u32;
        for step in 1..=steps {
            let (step_x, step_y) = interpolate(from, (x, y), step, steps);
            self.0
                .enigo
                .lock()
                .unwrap()
                .move_mouse(step_x, step_y, enigo::Coordinate::Abs)?;
            sleep(SMOOTH_MOVE_STEP);
        }
        self.settle();
        Ok(())
    }

    pub fn mouse_click(&self, button: Button) -> anyhow::Result<()> {
        self.0
            .enigo
            .lock()
            .unwrap()
            .button(button, Direction::Click)?;
        self.settle();
        Ok(())
    }

    pub fn mouse_double_click(&self, button: Button) -> anyhow::Result<()> {
        {
            let mut enigo = self.0.enigo.lock().unwrap();
            enigo.button(button, Direction::Click)?;
            sleep(DOUBLE_CLICK_GAP);
            enigo.button(button, Direction::Click)?;
        }
        self.settle();
        Ok(())
    }

    pub fn mouse_left_click(&self) -> anyhow::Result<()> {
        self.mouse_click(Button::Left)
    }

    // https://wiki.linuxquestions.org/wiki/List_of_keysyms
    pub fn key(&self, key: Key) -> anyhow::Result<()> {
        self.0.enigo.lock().unwrap().key(key, Direction::Click)?;
        self.settle();
        Ok(())
    }

    pub fn key_combination(&self, keys: &[Key]) -> anyhow::Result<()> {
        {
            let mut enigo = self.0.enigo.lock().unwrap();
            for key in keys {
                enigo.key(*key, Direction::Press)?;
            }
            for key in keys.iter().rev() {
                enigo.key(*key, Direction::Release)?;
            }
        }
        self.settle();
        Ok(())
    }

    pub fn type_text(&self, text: &str) -> anyhow::Result<()> {
        self.0.enigo.lock().unwrap().text(text)?;
        self.settle();
        Ok(())
    }

    /// Returns `true` if the function key is currently held down anywhere in the session.
    pub fn is_function_key_down(&self, key: FunctionKey) -> anyhow::Result<bool> {
        self.0.imp.is_function_key_down(key)
    }
}

fn interpolate(from: (i32, i32), to: (i32, i32), step: u32, steps: u32) -> (i32, i32) {
    let t = f64::from(step) / f64::from(steps.max(1));
    let x = f64::from(from.0) + f64::from(to.0 - from.0) * t;
    let y = f64::from(from.1) + f64::from(to.1 - from.1) * t;
    (x.round() as i32, y.round() as i32)
}

#[test]
fn interpolate_reaches_target() {
    assert_eq!(interpolate((0, 0), (100, -50), 0, 10), (0, 0));
    assert_eq!(interpolate((0, 0), (100, -50), 5, 10), (50, -25));
    assert_eq!(interpolate((0, 0), (100, -50), 10, 10), (100, -50));
    assert_eq!(interpolate((10, 10), (20, 20), 1, 0), (20, 20));
}
