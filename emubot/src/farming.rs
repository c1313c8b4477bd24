use {
    crate::{
        config::{Target, Timings},
        context::BotContext,
        error::{is_stop, BotError},
    },
    serde::{Deserialize, Serialize},
    std::{
        fmt,
        time::{Duration, Instant},
    },
    strum::{Display, EnumString},
    tracing::{error, info, warn},
};

/// Upper bound of ads dismissed in a row before a cycle.
const MAX_DISMISSED_ADS: u32 = 3;
const DISMISS_TARGETS: &[Target] = &[Target::CloseAd, Target::SkipAd];

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Display,
    EnumString,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Routine {
    /// Open the token pack offer, then watch its ad.
    #[default]
    Greens,
    /// Watch the ad offered on the rest screen.
    Rest,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub dismissed_before: u32,
    pub offer_clicked: bool,
    pub ad_watched: bool,
    pub duration: Duration,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StopReason {
    #[strum(serialize = "reward limit reached")]
    Completed,
    #[strum(serialize = "too many consecutive failures")]
    TooManyFailures,
    #[strum(serialize = "stopped by user")]
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FarmSummary {
    pub rewards: u32,
    pub cycles: u32,
    pub failures: u32,
    pub stop_reason: StopReason,
    pub duration: Duration,
}

impl fmt::Display for FarmSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} reward(s) in {} cycle(s), {} failure(s), {:?} ({})",
            self.rewards,
            self.cycles,
            self.failures,
            Duration::from_secs(self.duration.as_secs()),
            self.stop_reason
        )
    }
}

/// Counts cycle results and decides when farming is over.
#[derive(Debug, Clone, PartialEq)]
pub struct FarmProgress {
    max_rewards: u32,
    max_consecutive_failures: u32,
    pub rewards: u32,
    pub cycles: u32,
    pub failures: u32,
    pub consecutive_failures: u32,
}

impl FarmProgress {
    pub fn new(max_rewards: u32, max_consecutive_failures: u32) -> Self {
        Self {
            max_rewards,
            max_consecutive_failures,
            rewards: 0,
            cycles: 0,
            failures: 0,
            consecutive_failures: 0,
        }
    }

    pub fn record(&mut self, success: bool) {
        self.cycles += 1;
        if success {
            self.rewards += 1;
            self.consecutive_failures = 0;
        } else {
            self.failures += 1;
            self.consecutive_failures += 1;
        }
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.rewards >= self.max_rewards {
            Some(StopReason::Completed)
        } else if self.consecutive_failures >= self.max_consecutive_failures {
            Some(StopReason::TooManyFailures)
        } else {
            None
        }
    }

    pub fn summary(&self, stop_reason: StopReason, duration: Duration) -> FarmSummary {
        FarmSummary {
            rewards: self.rewards,
            cycles: self.cycles,
            failures: self.failures,
            stop_reason,
            duration,
        }
    }
}

pub struct Farmer<'a> {
    ctx: &'a BotContext,
    routine: Routine,
}

impl<'a> Farmer<'a> {
    pub fn new(ctx: &'a BotContext, routine: Routine) -> Self {
        Self { ctx, routine }
    }

    /// Runs cycles until `max_rewards` rewards, too many failures in a row, or a stop.
    pub fn farm(&self, max_rewards: u32) -> FarmSummary {
        let config = self.ctx.config();
        let started = Instant::now();
        let mut progress = FarmProgress::new(max_rewards, config.farming.max_consecutive_failures);
        info!(
            "farming {} (up to {} rewards, {:?} between cycles)",
            self.routine, max_rewards, config.timings.cycle_interval
        );

        let stop_reason = loop {
            if let Some(reason) = progress.stop_reason() {
                break reason;
            }
            match self.run_cycle() {
                Ok(report) => {
                    info!("cycle {} finished: {:?}", progress.cycles + 1, report);
                    progress.record(report.success);
                    info!("rewards collected: {}/{}", progress.rewards, max_rewards);
                }
                Err(err) if is_stop(&err) => break StopReason::Stopped,
                Err(err) if err.downcast_ref::<BotError>().is_some() => {
                    warn!("cycle failed, will retry: {:#}", err);
                    progress.record(false);
                }
                Err(err) => {
                    error!("error in farming cycle: {:?}", err);
                    self.ctx.debug_screenshot("farming_error");
                    progress.record(false);
                }
            }
            if progress.stop_reason().is_some() {
                continue;
            }
            info!("waiting {:?} until the next cycle", config.timings.cycle_interval);
            if self.ctx.sleep(config.timings.cycle_interval).is_err() {
                break StopReason::Stopped;
            }
        };

        let summary = progress.summary(stop_reason, started.elapsed());
        info!("farming finished: {}", summary);
        summary
    }

    /// Runs one reward cycle. Fails with `BotError::NotFound` when the offer
    /// can't be opened.
    pub fn run_cycle(&self) -> anyhow::Result<CycleReport> {
        let started = Instant::now();
        let timings = &self.ctx.config().timings;
        let mut report = CycleReport {
            dismissed_before: self.dismiss_ads()?,
            ..CycleReport::default()
        };

        if self.routine == Routine::Greens {
            self.click_or_report(Target::TokenPack, "token_icon_not_found")?;
        }
        self.ctx.sleep(timings.offer_delay)?;
        self.click_or_report(Target::WatchAd, "watch_ads_not_found")?;
        report.offer_clicked = true;
        self.ctx.sleep(timings.after_click)?;

        report.ad_watched = watch_ad(self.ctx, timings)? != AdOutcome::NotFound;
        report.success = true;
        report.duration = started.elapsed();
        Ok(report)
    }

    fn click_or_report(&self, target: Target, screenshot_prefix: &str) -> anyhow::Result<()> {
        if self.ctx.click_target(target)? {
            return Ok(());
        }
        error!("{} not found", target);
        self.ctx.debug_screenshot(screenshot_prefix);
        Err(BotError::NotFound { target }.into())
    }

    /// Clicks close or skip buttons left over from earlier ads.
    pub fn dismiss_ads(&self) -> anyhow::Result<u32> {
        let mut dismissed = 0;
        while dismissed < MAX_DISMISSED_ADS {
            let Some(target) = self.ctx.click_any(DISMISS_TARGETS)? else {
                break;
            };
            info!("dismissed a leftover ad ({})", target);
            dismissed += 1;
            self.ctx.sleep(self.ctx.config().timings.menu_delay)?;
        }
        Ok(dismissed)
    }
}

/// How the ad after a clicked offer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AdOutcome {
    Skipped,
    Closed,
    NotFound,
}

/// The screen operations ad watching needs.
pub trait AdScreen {
    /// Clicks `target` if it is visible.
    fn click_target(&self, target: Target) -> anyhow::Result<bool>;
    /// Clicks the best visible of `targets`.
    fn click_any(&self, targets: &[Target]) -> anyhow::Result<Option<Target>>;
    fn sleep(&self, duration: Duration) -> anyhow::Result<()>;
}

impl AdScreen for BotContext {
    fn click_target(&self, target: Target) -> anyhow::Result<bool> {
        BotContext::click_target(self, target)
    }

    fn click_any(&self, targets: &[Target]) -> anyhow::Result<Option<Target>> {
        BotContext::click_any(self, targets)
    }

    fn sleep(&self, duration: Duration) -> anyhow::Result<()> {
        BotContext::sleep(self, duration)
    }
}

/// Waits for the ad to finish and dismisses it.
///
/// A skipped ad keeps playing, so it gets another `ad_duration` before its
/// close button is clicked. A chained offer is only looked for after an ad
/// was closed directly.
pub fn watch_ad(screen: &impl AdScreen, timings: &Timings) -> anyhow::Result<AdOutcome> {
    info!("watching the ad for {:?}", timings.ad_duration);
    screen.sleep(timings.ad_duration)?;

    if screen.click_target(Target::SkipAd)? {
        info!("ad skipped, waiting for the close button");
        screen.sleep(timings.ad_duration)?;
        if !screen.click_target(Target::CloseAd)? {
            warn!("no close button after the skipped ad");
        }
        return Ok(AdOutcome::Skipped);
    }
    if screen.click_target(Target::CloseAd)? {
        after_close(screen, timings)?;
        return Ok(AdOutcome::Closed);
    }
    warn!("no ads found to close");
    Ok(AdOutcome::NotFound)
}

/// Handles a chained offer or a second ad after the first one was closed.
fn after_close(screen: &impl AdScreen, timings: &Timings) -> anyhow::Result<()> {
    if screen.click_target(Target::WatchAd)? {
        info!("another ad offered");
        screen.sleep(timings.after_click)?;
    } else {
        info!("checking for a second ad in {:?}", timings.ad_duration);
    }
    screen.sleep(timings.ad_duration)?;
    if screen.click_any(DISMISS_TARGETS)?.is_none() {
        info!("no second ad");
    }
    Ok(())
}

#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Click(Target),
    Sleep(Duration),
}

/// Screen with a fixed set of visible targets that records what was done.
#[cfg(test)]
struct FakeScreen {
    visible: Vec<Target>,
    steps: std::cell::RefCell<Vec<Step>>,
}

#[cfg(test)]
impl FakeScreen {
    fn new(visible: &[Target]) -> Self {
        Self {
            visible: visible.to_vec(),
            steps: Default::default(),
        }
    }

    fn steps(&self) -> Vec<Step> {
        self.steps.borrow().clone()
    }
}

#[cfg(test)]
impl AdScreen for FakeScreen {
    fn click_target(&self, target: Target) -> anyhow::Result<bool> {
        let visible = self.visible.contains(&target);
        if visible {
            self.steps.borrow_mut().push(Step::Click(target));
        }
        Ok(visible)
    }

    fn click_any(&self, targets: &[Target]) -> anyhow::Result<Option<Target>> {
        let found = targets.iter().copied().find(|t| self.visible.contains(t));
        if let Some(target) = found {
            self.steps.borrow_mut().push(Step::Click(target));
        }
        Ok(found)
    }

    fn sleep(&self, duration: Duration) -> anyhow::Result<()> {
        self.steps.borrow_mut().push(Step::Sleep(duration));
        Ok(())
    }
}

#[cfg(test)]
fn ad_timings() -> Timings {
    Timings {
        ad_duration: Duration::from_secs(65),
        after_click: Duration::from_secs(3),
        ..Timings::default()
    }
}

#[test]
fn skipped_ad_is_closed_without_looking_for_more() {
    let timings = ad_timings();
    let ad = timings.ad_duration;
    let screen = FakeScreen::new(&[Target::SkipAd, Target::CloseAd, Target::WatchAd]);
    assert_eq!(watch_ad(&screen, &timings).unwrap(), AdOutcome::Skipped);
    assert_eq!(
        screen.steps(),
        [
            Step::Sleep(ad),
            Step::Click(Target::SkipAd),
            Step::Sleep(ad),
            Step::Click(Target::CloseAd),
        ]
    );

    let screen = FakeScreen::new(&[Target::SkipAd]);
    assert_eq!(watch_ad(&screen, &timings).unwrap(), AdOutcome::Skipped);
    assert_eq!(
        screen.steps(),
        [Step::Sleep(ad), Step::Click(Target::SkipAd), Step::Sleep(ad)]
    );
}

#[test]
fn closed_ad_checks_for_a_second_one() {
    let timings = ad_timings();
    let ad = timings.ad_duration;
    let screen = FakeScreen::new(&[Target::CloseAd]);
    assert_eq!(watch_ad(&screen, &timings).unwrap(), AdOutcome::Closed);
    assert_eq!(
        screen.steps(),
        [
            Step::Sleep(ad),
            Step::Click(Target::CloseAd),
            Step::Sleep(ad),
            Step::Click(Target::CloseAd),
        ]
    );
}

#[test]
fn chained_offer_after_close_is_watched() {
    let timings = ad_timings();
    let ad = timings.ad_duration;
    let screen = FakeScreen::new(&[Target::CloseAd, Target::WatchAd]);
    assert_eq!(watch_ad(&screen, &timings).unwrap(), AdOutcome::Closed);
    assert_eq!(
        screen.steps(),
        [
            Step::Sleep(ad),
            Step::Click(Target::CloseAd),
            Step::Click(Target::WatchAd),
            Step::Sleep(timings.after_click),
            Step::Sleep(ad),
            Step::Click(Target::CloseAd),
        ]
    );
}

#[test]
fn missing_ad_buttons_are_reported() {
    let timings = ad_timings();
    let screen = FakeScreen::new(&[Target::WatchAd]);
    assert_eq!(watch_ad(&screen, &timings).unwrap(), AdOutcome::NotFound);
    assert_eq!(screen.steps(), [Step::Sleep(timings.ad_duration)]);
    assert_eq!(AdOutcome::NotFound.to_string(), "not_found");
}

#[test]
fn progress_stops_after_enough_rewards() {
    let mut progress = FarmProgress::new(2, 3);
    assert_eq!(progress.stop_reason(), None);
    progress.record(true);
    progress.record(false);
    assert_eq!(progress.stop_reason(), None);
    progress.record(true);
    assert_eq!(progress.stop_reason(), Some(StopReason::Completed));

    let summary = progress.summary(StopReason::Completed, Duration::from_millis(61_500));
    assert_eq!(
        (summary.rewards, summary.cycles, summary.failures),
        (2, 3, 1)
    );
    assert_eq!(
        summary.to_string(),
        "2 reward(s) in 3 cycle(s), 1 failure(s), 61s (reward limit reached)"
    );
}

#[test]
fn progress_stops_after_consecutive_failures() {
    let mut progress = FarmProgress::new(25, 2);
    progress.record(false);
    progress.record(true);
    progress.record(false);
    assert_eq!(progress.consecutive_failures, 1);
    assert_eq!(progress.stop_reason(), None);
    progress.record(false);
    assert_eq!(progress.stop_reason(), Some(StopReason::TooManyFailures));
    assert_eq!(progress.failures, 3);
}

#[test]
fn routine_names() {
    assert_eq!(Routine::default(), Routine::Greens);
    assert_eq!("rest".parse::<Routine>().unwrap(), Routine::Rest);
    assert_eq!(Routine::Greens.to_string(), "greens");
    assert_eq!(
        serde_json::from_str::<Routine>("\"rest\"").unwrap(),
        Routine::Rest
    );
}
