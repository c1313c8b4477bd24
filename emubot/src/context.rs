use {
    crate::{
        assets::{Assets, TemplateSet},
        config::{ClickKind, Config, Target},
        controls::Controls,
        error::BotError,
        matcher::{Match, Matcher},
        screenshots::{next_indexed_path, save_timestamped},
    },
    anyhow::Context as _,
    chrono::Local,
    fs_err::create_dir_all,
    image::{imageops, GrayImage, Rgba, RgbaImage},
    imageproc::{drawing::draw_hollow_rect_mut, rect::Rect},
    screenctl::{parse_key, parse_key_combination, Button, Screen, ScreenRect},
    std::{
        path::{Path, PathBuf},
        sync::Arc,
        time::Duration,
    },
    strum::IntoEnumIterator,
    tracing::{debug, error, info, warn},
};

const FOUND_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const REGION_COLOR: Rgba<u8> = Rgba([255, 160, 0, 255]);

/// One screen capture prepared for matching.
pub struct Capture {
    pub screen: Screen,
    pub gray: GrayImage,
    /// Emulator window area, if it is configured and currently on screen.
    pub region: Option<ScreenRect>,
}

/// A target located on screen.
#[derive(Debug, Clone)]
pub struct Found {
    pub target: Target,
    pub matched: Match,
    /// Center of the match in global input coordinates.
    pub point: (i32, i32),
}

pub struct BotContext {
    screen: screenctl::Context,
    config: Config,
    assets: Assets,
    matcher: Matcher,
    controls: Controls,
}

impl BotContext {
    pub fn new(config: Config, controls: Controls) -> anyhow::Result<Self> {
        let input_delay =
            Duration::try_from_secs_f64(config.delay).context("invalid input delay")?;
        Ok(Self {
            screen: screenctl::Context::with_input_delay(input_delay)?,
            assets: Assets::new(&config.images_dir),
            matcher: Matcher::new(config.match_downscale),
            config,
            controls,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    pub fn screen_context(&self) -> &screenctl::Context {
        &self.screen
    }

    pub fn assets(&self) -> &Assets {
        &self.assets
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Waits `duration`, honouring pause and stop.
    pub fn sleep(&self, duration: Duration) -> anyhow::Result<()> {
        Ok(self.controls.sleep(duration)?)
    }

    pub fn checkpoint(&self) -> anyhow::Result<()> {
        Ok(self.controls.checkpoint()?)
    }

    pub fn capture(&self) -> anyhow::Result<Capture> {
        self.checkpoint()?;
        let screen = self.screen.capture_screen()?;
        let gray = imageops::grayscale(screen.image());
        let region = self.emulator_region(&screen)?;
        Ok(Capture {
            screen,
            gray,
            region,
        })
    }

    fn emulator_region(&self, screen: &Screen) -> anyhow::Result<Option<ScreenRect>> {
        let Some(title) = &self.config.emulator.window_title else {
            return Ok(None);
        };
        let Some(window) = self.screen.windows_by_title(title)?.into_iter().next() else {
            debug!("no window titled {:?}, searching the whole screen", title);
            return Ok(None);
        };
        let (x, y, width, height) = window.rect()?;
        Ok(screen.to_image_rect(x, y, width, height))
    }

    pub fn has_templates(&self, target: Target) -> bool {
        self.assets.exists(self.config.targets.get(target))
    }

    pub fn templates(&self, target: Target) -> anyhow::Result<Arc<TemplateSet>> {
        self.assets
            .load(&target.to_string(), self.config.targets.get(target))
    }

    /// Finds the best scoring variant of `target` in an existing capture.
    pub fn locate(&self, capture: &Capture, target: Target) -> anyhow::Result<Option<Found>> {
        let templates = self.templates(target)?;
        let best = templates
            .iter()
            .filter_map(|template| {
                self.matcher.find(
                    &capture.gray,
                    template,
                    capture.region,
                    self.config.confidence,
                )
            })
            .max_by(|a, b| a.score.total_cmp(&b.score));
        Ok(best.map(|matched| {
            let (x, y) = matched.center();
            debug!(
                "found {} at ({}, {}) with score {:.3} ({:?})",
                target, x, y, matched.score, matched.template
            );
            Found {
                target,
                point: capture.screen.to_global(x, y),
                matched,
            }
        }))
    }

    pub fn find(&self, target: Target) -> anyhow::Result<Option<Found>> {
        let capture = self.capture()?;
        self.locate(&capture, target)
    }

    /// Returns the best scoring of several targets in one capture.
    pub fn find_any(&self, targets: &[Target]) -> anyhow::Result<Option<Found>> {
        let capture = self.capture()?;
        let mut best: Option<Found> = None;
        for &target in targets {
            if let Some(found) = self.locate(&capture, target)? {
                if best
                    .as_ref()
                    .is_none_or(|b| found.matched.score > b.matched.score)
                {
                    best = Some(found);
                }
            }
        }
        Ok(best)
    }

    pub fn is_visible(&self, target: Target) -> anyhow::Result<bool> {
        Ok(self.find(target)?.is_some())
    }

    /// Finds `target` or fails with `BotError::NotFound`.
    pub fn require(&self, target: Target) -> anyhow::Result<Found> {
        Ok(self.find(target)?.ok_or(BotError::NotFound { target })?)
    }

    /// Polls for `target` every `poll_interval` until it appears or `timeout` passes.
    pub fn wait_for(&self, target: Target, timeout: Duration) -> anyhow::Result<Option<Found>> {
        let found = self.controls.poll(timeout, self.config.timings.poll_interval, || {
            self.find(target)
        })?;
        if found.is_none() {
            debug!("{} did not appear within {:?}", target, timeout);
        }
        Ok(found)
    }

    pub fn click_at(&self, (x, y): (i32, i32)) -> anyhow::Result<()> {
        self.checkpoint()?;
        let move_duration =
            Duration::try_from_secs_f64(self.config.move_duration).unwrap_or_default();
        self.screen.mouse_move_smooth(x, y, move_duration)?;
        match self.config.click {
            ClickKind::Single => self.screen.mouse_left_click()?,
            ClickKind::Double => self.screen.mouse_double_click(Button::Left)?,
        }
        Ok(())
    }

    pub fn click_found(&self, found: &Found) -> anyhow::Result<()> {
        info!("clicking {} at {:?}", found.target, found.point);
        self.click_at(found.point)
    }

    /// Clicks `target` if it is visible. Returns `false` if it isn't.
    pub fn click_target(&self, target: Target) -> anyhow::Result<bool> {
        match self.find(target)? {
            Some(found) => {
                self.click_found(&found)?;
                Ok(true)
            }
            None => {
                debug!("{} is not visible", target);
                Ok(false)
            }
        }
    }

    /// Clicks the best visible of `targets`.
    pub fn click_any(&self, targets: &[Target]) -> anyhow::Result<Option<Target>> {
        let Some(found) = self.find_any(targets)? else {
            return Ok(None);
        };
        self.click_found(&found)?;
        Ok(Some(found.target))
    }

    pub fn type_text(&self, text: &str) -> anyhow::Result<()> {
        self.checkpoint()?;
        self.screen.type_text(text)
    }

    pub fn press(&self, key_name: &str) -> anyhow::Result<()> {
        self.checkpoint()?;
        let key = parse_key(key_name).with_context(|| format!("unknown key {:?}", key_name))?;
        self.screen.key(key)
    }

    pub fn press_combination(&self, combination: &str) -> anyhow::Result<()> {
        self.checkpoint()?;
        self.screen
            .key_combination(&parse_key_combination(combination)?)
    }

    /// Brings the configured emulator window to the foreground. Returns `false`
    /// if no window title is configured.
    pub fn activate_emulator_window(&self, timeout: Duration) -> anyhow::Result<bool> {
        let Some(title) = &self.config.emulator.window_title else {
            return Ok(false);
        };
        let window = self
            .controls
            .poll(timeout, self.config.timings.poll_interval, || {
                Ok(self.screen.windows_by_title(title)?.into_iter().next())
            })?
            .with_context(|| format!("no window titled {:?} after {:?}", title, timeout))?;
        window.activate()?;
        info!("activated window {:?}", window.title()?);
        Ok(true)
    }

    /// Saves a screenshot as `<prefix>_<n>.png` for troubleshooting. Failures
    /// are logged, not returned.
    pub fn debug_screenshot(&self, prefix: &str) -> Option<PathBuf> {
        match self.save_debug_screenshot(prefix) {
            Ok(path) => {
                info!("debug screenshot saved to {:?}", path);
                Some(path)
            }
            Err(err) => {
                error!("failed to save debug screenshot {:?}: {:?}", prefix, err);
                None
            }
        }
    }

    fn save_debug_screenshot(&self, prefix: &str) -> anyhow::Result<PathBuf> {
        create_dir_all(&self.config.screenshot_dir)?;
        let path = next_indexed_path(&self.config.screenshot_dir, prefix)?;
        self.save_capture(&path)?;
        Ok(path)
    }

    /// Saves a screenshot as `<name>_<timestamp>.png`.
    pub fn screenshot(&self, name: &str) -> anyhow::Result<PathBuf> {
        let screen = self.screen.capture_screen()?;
        self.save_image(screen.image(), name)
    }

    /// Saves an already captured frame as `<name>_<timestamp>.png`.
    pub fn save_image(&self, image: &RgbaImage, name: &str) -> anyhow::Result<PathBuf> {
        let path = save_timestamped(&self.config.screenshot_dir, name, image, Local::now())?;
        info!("screenshot saved to {:?}", path);
        Ok(path)
    }

    fn save_capture(&self, path: &Path) -> anyhow::Result<()> {
        self.screen
            .capture_screen()?
            .image()
            .save(path)
            .with_context(|| format!("failed to save {:?}", path))
    }

    /// Saves a screenshot with a frame around every visible target and the
    /// search region.
    pub fn annotated_screenshot(&self, name: &str) -> anyhow::Result<(PathBuf, Vec<Found>)> {
        let capture = self.capture()?;
        let mut found = Vec::new();
        for target in Target::iter() {
            if !self.has_templates(target) {
                warn!("no templates for {}", target);
                continue;
            }
            match self.locate(&capture, target)? {
                Some(hit) => found.push(hit),
                None => info!("{} is not visible", target),
            }
        }

        let mut image = capture.screen.into_image();
        if let Some(region) = capture.region {
            draw_frame(&mut image, region, REGION_COLOR);
        }
        for hit in &found {
            info!(
                "{} at {:?}, score {:.3}",
                hit.target, hit.point, hit.matched.score
            );
            draw_frame(&mut image, hit.matched.rect, FOUND_COLOR);
        }

        let path = self.save_image(&image, name)?;
        Ok((path, found))
    }
}

fn draw_frame(image: &mut RgbaImage, rect: ScreenRect, color: Rgba<u8>) {
    // Two pixels wide so it stays visible on busy backgrounds.
    for inset in 0..2 {
        if rect.width <= inset * 2 || rect.height <= inset * 2 {
            break;
        }
        let frame = Rect::at((rect.x + inset) as i32, (rect.y + inset) as i32)
            .of_size(rect.width - inset * 2, rect.height - inset * 2);
        draw_hollow_rect_mut(image, frame, color);
    }
}

#[test]
fn frame_is_drawn_inside_rect() {
    let mut image = RgbaImage::new(20, 20);
    draw_frame(
        &mut image,
        ScreenRect {
            x: 5,
            y: 5,
            width: 6,
            height: 6,
        },
        FOUND_COLOR,
    );
    assert_eq!(*image.get_pixel(5, 5), FOUND_COLOR);
    assert_eq!(*image.get_pixel(6, 6), FOUND_COLOR);
    assert_eq!(*image.get_pixel(10, 10), FOUND_COLOR);
    assert_eq!(*image.get_pixel(7, 7), Rgba([0, 0, 0, 0]));
    assert_eq!(*image.get_pixel(4, 4), Rgba([0, 0, 0, 0]));
}
