use {
    crate::{farming::Routine, schedule::parse_times},
    anyhow::{bail, Context as _},
    screenctl::{parse_key, parse_key_combination, FunctionKey},
    serde::{Deserialize, Serialize},
    std::{
        path::{Path, PathBuf},
        time::Duration,
    },
    strum::{Display, EnumIter, EnumString},
    tracing::info,
};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// On-screen UI elements the bot knows how to find.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Target {
    StartMenu,
    EmulatorWindow,
    EmulatorHome,
    GameIcon,
    TokenPack,
    WatchAd,
    SkipAd,
    CloseAd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClickKind {
    Single,
    #[default]
    Double,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pause after every input action, in seconds.
    pub delay: f64,
    /// Minimum match score for a template to count as found.
    pub confidence: f32,
    /// Time of the smooth mouse movement before a click, in seconds.
    pub move_duration: f64,
    pub click: ClickKind,
    /// Scale of the coarse template search pass.
    pub match_downscale: f32,
    pub images_dir: PathBuf,
    pub log_dir: PathBuf,
    pub screenshot_dir: PathBuf,
    pub emulator: EmulatorConfig,
    pub targets: Targets,
    pub timings: Timings,
    pub farming: FarmingConfig,
    pub hotkeys: HotkeysConfig,
    pub schedule: ScheduleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delay: 0.1,
            confidence: 0.65,
            move_duration: 0.2,
            click: ClickKind::default(),
            match_downscale: 0.5,
            images_dir: "images".into(),
            log_dir: "logs".into(),
            screenshot_dir: "screenshots".into(),
            emulator: EmulatorConfig::default(),
            targets: Targets::default(),
            timings: Timings::default(),
            farming: FarmingConfig::default(),
            hotkeys: HotkeysConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Text typed into the system search to start the emulator.
    pub name: String,
    /// Program and arguments that start the emulator. Replaces the start menu search.
    pub command: Option<Vec<String>>,
    /// Restricts template matching to the first window whose title contains this text.
    pub window_title: Option<String>,
    pub submit_key: String,
    /// Key combination that opens the emulator home screen, e.g. `ctrl+shift+h`.
    pub home_keys: Option<String>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            name: "BlueStacks".into(),
            command: None,
            window_title: None,
            submit_key: "enter".into(),
            home_keys: None,
        }
    }
}

/// Template locations relative to `images_dir`. A directory holds several
/// variants of the same element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Targets {
    pub start_menu: PathBuf,
    pub emulator_window: PathBuf,
    pub emulator_home: PathBuf,
    pub game_icon: PathBuf,
    pub token_pack: PathBuf,
    pub watch_ad: PathBuf,
    pub skip_ad: PathBuf,
    pub close_ad: PathBuf,
}

impl Default for Targets {
    fn default() -> Self {
        Self {
            start_menu: "windows/start_menu".into(),
            emulator_window: "bluestacks/window.png".into(),
            emulator_home: "bluestacks/home_button.png".into(),
            game_icon: "bluestacks/game_icon.png".into(),
            token_pack: "game/token_pack".into(),
            watch_ad: "game/ads/watch".into(),
            skip_ad: "game/ads/skip".into(),
            close_ad: "game/ads/close".into(),
        }
    }
}

impl Targets {
    pub fn get(&self, target: Target) -> &Path {
        match target {
            Target::StartMenu => &self.start_menu,
            Target::EmulatorWindow => &self.emulator_window,
            Target::EmulatorHome => &self.emulator_home,
            Target::GameIcon => &self.game_icon,
            Target::TokenPack => &self.token_pack,
            Target::WatchAd => &self.watch_ad,
            Target::SkipAd => &self.skip_ad,
            Target::CloseAd => &self.close_ad,
        }
    }
}

/// Waits and timeouts, all written as seconds in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    #[serde(with = "seconds")]
    pub poll_interval: Duration,
    #[serde(with = "seconds")]
    pub ready_timeout: Duration,
    #[serde(with = "seconds")]
    pub launch_timeout: Duration,
    #[serde(with = "seconds")]
    pub menu_delay: Duration,
    #[serde(with = "seconds")]
    pub search_delay: Duration,
    #[serde(with = "seconds")]
    pub home_screen_delay: Duration,
    #[serde(with = "seconds")]
    pub after_launch_click: Duration,
    #[serde(with = "seconds")]
    pub offer_delay: Duration,
    #[serde(with = "seconds")]
    pub after_click: Duration,
    #[serde(with = "seconds")]
    pub ad_duration: Duration,
    #[serde(with = "seconds")]
    pub cycle_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            ready_timeout: Duration::from_secs(60),
            launch_timeout: Duration::from_secs(120),
            menu_delay: Duration::from_secs(1),
            search_delay: Duration::from_secs(2),
            home_screen_delay: Duration::from_secs(5),
            after_launch_click: Duration::from_secs(3),
            offer_delay: Duration::from_secs(5),
            after_click: Duration::from_secs(3),
            ad_duration: Duration::from_secs(65),
            cycle_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmingConfig {
    pub max_rewards: u32,
    pub max_consecutive_failures: u32,
}

impl Default for FarmingConfig {
    fn default() -> Self {
        Self {
            max_rewards: 25,
            max_consecutive_failures: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeysConfig {
    pub enabled: bool,
    pub pause: String,
    pub stop: String,
}

impl Default for HotkeysConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pause: "F2".into(),
            stop: "F3".into(),
        }
    }
}

impl HotkeysConfig {
    pub fn keys(&self) -> anyhow::Result<(FunctionKey, FunctionKey)> {
        Ok((self.pause.parse()?, self.stop.parse()?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local times of day in `HH:MM` format.
    pub times: Vec<String>,
    pub routine: Routine,
    /// Run the launch sequence before farming.
    pub launch: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            times: vec!["09:00".into()],
            routine: Routine::default(),
            launch: true,
        }
    }
}

impl Config {
    /// Loads the config file. Returns `None` if it doesn't exist.
    pub fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.try_exists()? {
            return Ok(None);
        }
        let text = fs_err::read_to_string(path)?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("invalid config file {:?}", path))?;
        Ok(Some(config))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        fs_err::write(path, text)?;
        info!("configuration saved to {:?}", path);
        Ok(())
    }

    pub fn target_path(&self, target: Target) -> PathBuf {
        self.images_dir.join(self.targets.get(target))
    }

    /// Returns a description of every invalid setting.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !(0.01..=5.0).contains(&self.delay) {
            issues.push(format!(
                "delay ({}) should be between 0.01 and 5.0",
                self.delay
            ));
        }
        if !(0.1..=1.0).contains(&self.confidence) {
            issues.push(format!(
                "confidence ({}) should be between 0.1 and 1.0",
                self.confidence
            ));
        }
        if !(0.0..=2.0).contains(&self.move_duration) {
            issues.push(format!(
                "move_duration ({}) should be between 0.0 and 2.0",
                self.move_duration
            ));
        }
        if !(0.1..=1.0).contains(&self.match_downscale) {
            issues.push(format!(
                "match_downscale ({}) should be between 0.1 and 1.0",
                self.match_downscale
            ));
        }

        for (name, dir) in [
            ("images_dir", &self.images_dir),
            ("log_dir", &self.log_dir),
            ("screenshot_dir", &self.screenshot_dir),
        ] {
            if dir.as_os_str().is_empty() {
                issues.push(format!("{name} cannot be empty"));
            }
        }
        if !self.images_dir.as_os_str().is_empty() && !self.images_dir.is_dir() {
            issues.push(format!(
                "images_dir {:?} does not exist",
                self.images_dir
            ));
        }

        if self.emulator.name.trim().is_empty() && self.emulator.command.is_none() {
            issues.push("emulator.name cannot be empty without emulator.command".into());
        }
        if self
            .emulator
            .command
            .as_ref()
            .is_some_and(|command| command.is_empty())
        {
            issues.push("emulator.command cannot be an empty list".into());
        }
        if parse_key(&self.emulator.submit_key).is_none() {
            issues.push(format!(
                "emulator.submit_key {:?} is not a known key",
                self.emulator.submit_key
            ));
        }
        if let Some(keys) = &self.emulator.home_keys {
            if let Err(err) = parse_key_combination(keys) {
                issues.push(format!("emulator.home_keys: {err}"));
            }
        }

        if self.farming.max_rewards == 0 {
            issues.push("farming.max_rewards should be at least 1".into());
        }
        if self.farming.max_consecutive_failures == 0 {
            issues.push("farming.max_consecutive_failures should be at least 1".into());
        }
        if self.timings.poll_interval.is_zero() {
            issues.push("timings.poll_interval should be positive".into());
        }

        if let Err(err) = self.hotkeys.keys() {
            issues.push(format!("hotkeys: {err}"));
        }
        if self.hotkeys.pause.eq_ignore_ascii_case(&self.hotkeys.stop) {
            issues.push("hotkeys.pause and hotkeys.stop must differ".into());
        }
        if let Err(err) = parse_times(&self.schedule.times) {
            issues.push(format!("schedule.times: {err}"));
        }

        issues
    }

    pub fn ensure_valid(&self) -> anyhow::Result<()> {
        let issues = self.validate();
        if !issues.is_empty() {
            bail!("invalid configuration:\n  {}", issues.join("\n  "));
        }
        Ok(())
    }
}

mod seconds {
    use {
        serde::{de::Error as _, Deserialize, Deserializer, Serializer},
        std::time::Duration,
    };

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| D::Error::custom(format!("invalid number of seconds: {secs}")))
    }
}

#[test]
fn partial_config_uses_defaults() {
    let config: Config = serde_json::from_str(
        r#"{
            "confidence": 0.8,
            "click": "single",
            "emulator": { "window_title": "BlueStacks App Player" },
            "timings": { "ad_duration": 31.5 },
            "schedule": { "times": ["07:30", "19:00"], "routine": "rest" }
        }"#,
    )
    .unwrap();
    assert_eq!(config.confidence, 0.8);
    assert_eq!(config.click, ClickKind::Single);
    assert_eq!(config.delay, 0.1);
    assert_eq!(config.emulator.name, "BlueStacks");
    assert_eq!(
        config.emulator.window_title.as_deref(),
        Some("BlueStacks App Player")
    );
    assert_eq!(config.timings.ad_duration, Duration::from_millis(31_500));
    assert_eq!(config.timings.poll_interval, Duration::from_secs(3));
    assert_eq!(config.schedule.routine, Routine::Rest);
    assert_eq!(config.farming.max_rewards, 25);
}

#[test]
fn negative_durations_are_rejected() {
    let result = serde_json::from_str::<Config>(r#"{ "timings": { "after_click": -1 } }"#);
    assert!(result.is_err());
}

#[test]
fn save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    assert_eq!(Config::load(&path).unwrap(), None);

    let mut config = Config::default();
    config.targets.watch_ad = "ads/watch_button.png".into();
    config.save(&path).unwrap();
    assert_eq!(Config::load(&path).unwrap(), Some(config));

    fs_err::write(&path, "{ not json").unwrap();
    assert!(Config::load(&path).is_err());
}

#[test]
fn validation_reports_every_issue() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        images_dir: dir.path().into(),
        ..Config::default()
    };
    assert_eq!(config.validate(), Vec::<String>::new());

    let config = Config {
        delay: 0.0,
        confidence: 1.5,
        log_dir: PathBuf::new(),
        images_dir: dir.path().join("missing"),
        hotkeys: HotkeysConfig {
            enabled: true,
            pause: "F3".into(),
            stop: "F3".into(),
        },
        schedule: ScheduleConfig {
            times: vec!["25:00".into()],
            ..ScheduleConfig::default()
        },
        ..Config::default()
    };
    let issues = config.validate();
    assert_eq!(issues.len(), 6, "{issues:#?}");
    assert!(issues[0].starts_with("delay"));
    assert!(issues[1].starts_with("confidence"));
    assert!(issues[2].starts_with("log_dir"));
    assert!(issues[3].starts_with("images_dir"));
    assert!(config.ensure_valid().is_err());
}

#[test]
fn target_paths() {
    let config = Config::default();
    assert_eq!(
        config.target_path(Target::CloseAd),
        Path::new("images/game/ads/close")
    );
    assert_eq!("skip_ad".parse::<Target>().unwrap(), Target::SkipAd);
    assert_eq!(Target::EmulatorHome.to_string(), "emulator_home");
}
