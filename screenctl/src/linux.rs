use std::{collections::HashMap, process::Command, sync::Mutex};

use anyhow::{bail, Context as _};
use x11rb::{
    connection::Connection as _, protocol::xproto::ConnectionExt, rust_connection::RustConnection,
};

use crate::FunctionKey;

// Keysym of F1; F2..F12 follow consecutively.
const XK_F1: u32 = 0xffbe;

pub struct Context {
    connection: RustConnection,
    keycodes: Mutex<HashMap<FunctionKey, Vec<u8>>>,
}

impl Context {
    pub fn new() -> anyhow::Result<Self> {
        let (connection, _screen_num) =
            x11rb::connect(None).context("failed to connect to the X server")?;
        Ok(Self {
            connection,
            keycodes: Mutex::new(HashMap::new()),
        })
    }

    pub fn activate_window(&self, window: &crate::Window) -> anyhow::Result<()> {
        let status = Command::new("xdotool")
            .arg("windowactivate")
            .arg("--sync")
            .arg(window.id().to_string())
            .status()
            .context("failed to execute command: xdotool windowactivate")?;
        if !status.success() {
            bail!("xdotool failed: {:?}", status);
        }
        Ok(())
    }

    fn keycodes_for(&self, key: FunctionKey) -> anyhow::Result<Vec<u8>> {
        if let Some(codes) = self.keycodes.lock().unwrap().get(&key) {
            return Ok(codes.clone());
        }
        let keysym = XK_F1 + u32::from(key.number() - 1);
        let setup = self.connection.setup();
        let min_keycode = setup.min_keycode;
        let count = setup.max_keycode - min_keycode + 1;
        let mapping = self
            .connection
            .get_keyboard_mapping(min_keycode, count)?
            .reply()
            .context("failed to query keyboard mapping")?;
        let per_keycode = usize::from(mapping.keysyms_per_keycode);
        let codes: Vec<u8> = if per_keycode == 0 {
            Vec::new()
        } else {
            mapping
                .keysyms
                .chunks(per_keycode)
                .enumerate()
                .filter(|(_, keysyms)| keysyms.contains(&keysym))
                .map(|(index, _)| min_keycode + index as u8)
                .collect()
        };
        self.keycodes.lock().unwrap().insert(key, codes.clone());
        Ok(codes)
    }

    pub fn is_function_key_down(&self, key: FunctionKey) -> anyhow::Result<bool> {
        let codes = self.keycodes_for(key)?;
        let keymap = self
            .connection
            .query_keymap()?
            .reply()
            .context("failed to query keymap")?
            .keys;
        Ok(codes
            .iter()
            .any(|&code| keymap[usize::from(code / 8)] & (1 << (code % 8)) != 0))
    }
}

pub fn input_scale(_monitor: &xcap::Monitor) -> anyhow::Result<f32> {
    Ok(1.0)
}
