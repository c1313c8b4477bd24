use {
    crate::FunctionKey,
    anyhow::{bail, ensure, Context as _},
    std::process::Command,
};

pub struct Context {}

impl Context {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {})
    }

    pub fn activate_window(&self, window: &crate::Window) -> anyhow::Result<()> {
        // We're not running a macos event loop in this process, so the easiest way
        // to raise another app is to ask System Events in a new process.
        let script = format!(
            "tell application \"System Events\" to set frontmost of \
             (first process whose unix id is {}) to true",
            window.pid()
        );
        let output = Command::new("osascript")
            .args(["-e", &script])
            .output()
            .context("failed to execute osascript")?;
        ensure!(output.status.success(), "osascript failed: {:?}", output);
        Ok(())
    }

    pub fn is_function_key_down(&self, key: FunctionKey) -> anyhow::Result<bool> {
        bail!("global hotkey {} is not supported on macOS", key)
    }
}

// Monitor captures are in physical pixels, pointer positions are in points.
pub fn input_scale(monitor: &xcap::Monitor) -> anyhow::Result<f32> {
    Ok(monitor.scale_factor()?)
}
