use {
    crate::FunctionKey,
    anyhow::bail,
    std::ffi::c_void,
    tracing::trace,
    windows_sys::Win32::{
        Foundation::GetLastError,
        UI::{
            HiDpi::{SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2},
            Input::KeyboardAndMouse::{GetAsyncKeyState, VK_F1},
            WindowsAndMessaging::SetForegroundWindow,
        },
    },
};

pub struct Context {}

impl Context {
    pub fn new() -> anyhow::Result<Self> {
        // Captured pixels and injected mouse coordinates must use the same
        // (physical) coordinate space.
        let ret =
            unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) };
        if ret == 0 {
            trace!("DPI awareness was already set (error code: {})", unsafe {
                GetLastError()
            });
        }
        Ok(Self {})
    }

    pub fn activate_window(&self, window: &crate::Window) -> anyhow::Result<()> {
        // xcap returns HWND pointer as window id.
        let ret = unsafe { SetForegroundWindow(window.id() as *mut c_void) };
        if ret == 0 {
            let error = unsafe { GetLastError() };
            bail!("failed to activate window (error code: {})", error);
        }
        Ok(())
    }

    pub fn is_function_key_down(&self, key: FunctionKey) -> anyhow::Result<bool> {
        let virtual_key = i32::from(VK_F1) + i32::from(key.number() - 1);
        let state = unsafe { GetAsyncKeyState(virtual_key) };
        Ok(state as u16 & 0x8000 != 0)
    }
}

pub fn input_scale(_monitor: &xcap::Monitor) -> anyhow::Result<f32> {
    Ok(1.0)
}
