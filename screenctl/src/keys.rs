use {
    anyhow::{bail, Context as _},
    enigo::Key,
    std::{fmt, str::FromStr},
};

/// One of the function keys F1 to F12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionKey(u8);

impl FunctionKey {
    pub fn new(number: u8) -> Option<Self> {
        (1..=12).contains(&number).then_some(Self(number))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn key(self) -> Key {
        match self.0 {
            1 => Key::F1,
            2 => Key::F2,
            3 => Key::F3,
            4 => Key::F4,
            5 => Key::F5,
            6 => Key::F6,
            7 => Key::F7,
            8 => Key::F8,
            9 => Key::F9,
            10 => Key::F10,
            11 => Key::F11,
            _ => Key::F12,
        }
    }
}

impl FromStr for FunctionKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let number = s
            .strip_prefix('F')
            .or_else(|| s.strip_prefix('f'))
            .with_context(|| format!("not a function key: {s:?}"))?;
        let number: u8 = number
            .parse()
            .with_context(|| format!("not a function key: {s:?}"))?;
        match Self::new(number) {
            Some(key) => Ok(key),
            None => bail!("function key out of range: {s:?}"),
        }
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Parses a key name such as `enter`, `ctrl`, `pagedown`, `f5` or a single character.
pub fn parse_key(name: &str) -> Option<Key> {
    let name = name.trim();
    let key = match name.to_ascii_lowercase().as_str() {
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "shift" => Key::Shift,
        "ctrl" | "control" => Key::Control,
        "alt" => Key::Alt,
        "meta" | "super" | "win" | "cmd" => Key::Meta,
        "escape" | "esc" => Key::Escape,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        lower => {
            if let Ok(function_key) = lower.parse::<FunctionKey>() {
                function_key.key()
            } else {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Unicode(c),
                    _ => return None,
                }
            }
        }
    };
    Some(key)
}

/// Parses a `+`-separated key combination such as `ctrl+shift+h`.
pub fn parse_key_combination(combination: &str) -> anyhow::Result<Vec<Key>> {
    let keys = combination
        .split('+')
        .map(|name| parse_key(name).with_context(|| format!("unknown key: {name:?}")))
        .collect::<anyhow::Result<Vec<_>>>()?;
    if keys.is_empty() {
        bail!("empty key combination");
    }
    Ok(keys)
}

#[test]
fn named_keys() {
    assert_eq!(parse_key("Enter"), Some(Key::Return));
    assert_eq!(parse_key(" ctrl "), Some(Key::Control));
    assert_eq!(parse_key("pagedown"), Some(Key::PageDown));
    assert_eq!(parse_key("F5"), Some(Key::F5));
    assert_eq!(parse_key("a"), Some(Key::Unicode('a')));
    assert_eq!(parse_key("A"), Some(Key::Unicode('A')));
    assert_eq!(parse_key("bogus"), None);
    assert_eq!(parse_key(""), None);
}

#[test]
fn key_combinations() {
    assert_eq!(
        parse_key_combination("ctrl+shift+h").unwrap(),
        vec![Key::Control, Key::Shift, Key::Unicode('h')]
    );
    assert!(parse_key_combination("ctrl+nope").is_err());
}

#[test]
fn function_keys() {
    let f2: FunctionKey = "F2".parse().unwrap();
    assert_eq!(f2.number(), 2);
    assert_eq!(f2.to_string(), "F2");
    assert_eq!("f12".parse::<FunctionKey>().unwrap().key(), Key::F12);
    assert!("F0".parse::<FunctionKey>().is_err());
    assert!("F13".parse::<FunctionKey>().is_err());
    assert!("enter".parse::<FunctionKey>().is_err());
}
