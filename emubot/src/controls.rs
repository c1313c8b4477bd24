use {
    crate::error::BotError,
    screenctl::FunctionKey,
    std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread::{self, JoinHandle},
        time::{Duration, Instant},
    },
    tracing::{info, warn},
};

const SLICE: Duration = Duration::from_millis(50);
const HOTKEY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Pause and stop flags shared between the bot and the hotkey thread.
#[derive(Debug, Clone, Default)]
pub struct Controls {
    paused: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl Controls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!("stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Returns the new paused state.
    pub fn toggle_pause(&self) -> bool {
        let paused = !self.paused.fetch_xor(true, Ordering::SeqCst);
        if paused {
            info!("paused");
        } else {
            info!("resumed");
        }
        paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Blocks while paused. Fails with `BotError::Stopped` once a stop was requested.
    pub fn checkpoint(&self) -> Result<(), BotError> {
        loop {
            if self.is_stopped() {
                return Err(BotError::Stopped);
            }
            if !self.is_paused() {
                return Ok(());
            }
            thread::sleep(SLICE);
        }
    }

    /// Sleeps for `duration` of unpaused time.
    pub fn sleep(&self, duration: Duration) -> Result<(), BotError> {
        let mut remaining = duration;
        loop {
            self.checkpoint()?;
            if remaining.is_zero() {
                return Ok(());
            }
            let slice = remaining.min(SLICE);
            let started = Instant::now();
            thread::sleep(slice);
            if !self.is_paused() {
                remaining = remaining.saturating_sub(started.elapsed().min(slice));
            }
        }
    }

    /// Calls `probe` every `interval` until it returns a value or `timeout`
    /// passes. Pause and stop apply between attempts.
    pub fn poll<T>(
        &self,
        timeout: Duration,
        interval: Duration,
        mut probe: impl FnMut() -> anyhow::Result<Option<T>>,
    ) -> anyhow::Result<Option<T>> {
        let started = Instant::now();
        loop {
            self.checkpoint()?;
            if let Some(value) = probe()? {
                return Ok(Some(value));
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Ok(None);
            }
            self.sleep(interval.min(timeout - elapsed))?;
        }
    }

    /// Polls the hotkeys in a background thread until a stop is requested.
    ///
    /// `pause` toggles the paused state and `stop` requests a stop, each on a
    /// key press, not while the key is held.
    pub fn spawn_hotkey_listener(
        &self,
        ctx: screenctl::Context,
        pause: FunctionKey,
        stop: FunctionKey,
    ) -> JoinHandle<()> {
        let controls = self.clone();
        info!("hotkeys: {} pause/resume, {} stop", pause, stop);
        thread::spawn(move || {
            let mut was_down = (false, false);
            while !controls.is_stopped() {
                let down = match (ctx.is_function_key_down(pause), ctx.is_function_key_down(stop)) {
                    (Ok(pause_down), Ok(stop_down)) => (pause_down, stop_down),
                    (Err(err), _) | (_, Err(err)) => {
                        warn!("hotkeys are disabled: {:?}", err);
                        return;
                    }
                };
                let (pause_pressed, stop_pressed) = pressed(was_down, down);
                if pause_pressed {
                    controls.toggle_pause();
                }
                if stop_pressed {
                    controls.stop();
                }
                was_down = down;
                thread::sleep(HOTKEY_POLL_INTERVAL);
            }
        })
    }
}

fn pressed(was_down: (bool, bool), down: (bool, bool)) -> (bool, bool) {
    (down.0 && !was_down.0, down.1 && !was_down.1)
}

#[test]
fn stop_interrupts_sleep() {
    let controls = Controls::new();
    assert!(controls.checkpoint().is_ok());

    let remote = controls.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        remote.stop();
    });
    let started = Instant::now();
    let result = controls.sleep(Duration::from_secs(30));
    assert!(matches!(result, Err(BotError::Stopped)));
    assert!(started.elapsed() < Duration::from_secs(5));
    handle.join().unwrap();
    assert!(controls.is_stopped());
    assert!(controls.checkpoint().is_err());
}

#[test]
fn pause_extends_sleep() {
    let controls = Controls::new();
    assert!(controls.toggle_pause());
    assert!(controls.is_paused());

    let remote = controls.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        assert!(!remote.toggle_pause());
    });
    let started = Instant::now();
    controls.sleep(Duration::from_millis(100)).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(400));
    handle.join().unwrap();
    assert!(!controls.is_paused());
}

#[test]
fn poll_returns_value_or_times_out() {
    let controls = Controls::new();
    let mut attempts = 0;
    let found = controls
        .poll(Duration::from_secs(5), Duration::from_millis(10), || {
            attempts += 1;
            Ok((attempts == 3).then_some("window"))
        })
        .unwrap();
    assert_eq!(found, Some("window"));
    assert_eq!(attempts, 3);

    let missing = controls
        .poll(Duration::from_millis(100), Duration::from_millis(20), || {
            Ok(None::<()>)
        })
        .unwrap();
    assert_eq!(missing, None);
}

#[test]
fn stop_interrupts_poll() {
    let controls = Controls::new();
    let remote = controls.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        remote.stop();
    });
    let started = Instant::now();
    let result = controls.poll(Duration::from_secs(60), Duration::from_secs(3), || {
        Ok(None::<()>)
    });
    let err = result.unwrap_err();
    assert!(crate::error::is_stop(&err));
    assert!(started.elapsed() < Duration::from_secs(5));
    handle.join().unwrap();
}

#[test]
fn hotkeys_react_on_press_only() {
    assert_eq!(pressed((false, false), (true, false)), (true, false));
    assert_eq!(pressed((true, false), (true, false)), (false, false));
    assert_eq!(pressed((true, false), (false, true)), (false, true));
    assert_eq!(pressed((false, true), (false, true)), (false, false));
}
