use crate::Context;

/// A top-level window as reported by xcap.
#[derive(Clone)]
pub struct Window {
    id: u32,
    pid: u32,
    inner: xcap::Window,
    context: Context,
}

impl Window {
    pub(crate) fn new(context: Context, inner: xcap::Window) -> anyhow::Result<Self> {
        Ok(Self {
            id: inner.id()?,
            pid: inner.pid()?,
            inner,
            context,
        })
    }

    /// Native handle: X11 window id or `HWND`.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn title(&self) -> anyhow::Result<String> {
        Ok(self.inner.title()?)
    }

    /// Global position and size as `(x, y, width, height)`.
    pub fn rect(&self) -> anyhow::Result<(i32, i32, u32, u32)> {
        let inner = &self.inner;
        Ok((inner.x()?, inner.y()?, inner.width()?, inner.height()?))
    }

    /// Brings the window to the foreground.
    pub fn activate(&self) -> anyhow::Result<()> {
        self.context.0.imp.activate_window(self)
    }
}
