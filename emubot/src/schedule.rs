use {
    crate::{
        context::BotContext,
        error::is_stop,
        farming::{Farmer, StopReason},
        launcher,
    },
    anyhow::{bail, Context as _},
    chrono::{DateTime, Days, Local, NaiveTime, TimeZone},
    itertools::Itertools,
    tracing::{error, info},
};

pub const TIME_FORMAT: &str = "%H:%M";

pub fn parse_time(text: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), TIME_FORMAT)
        .with_context(|| format!("invalid time {:?}, expected HH:MM", text))
}

/// Parses a list of `HH:MM` times, sorted and without duplicates.
pub fn parse_times(texts: &[String]) -> anyhow::Result<Vec<NaiveTime>> {
    if texts.is_empty() {
        bail!("at least one time is required");
    }
    let times: Vec<NaiveTime> = texts.iter().map(|t| parse_time(t)).try_collect()?;
    Ok(times.into_iter().sorted().dedup().collect())
}

/// Returns the first of `times` strictly after `now`: today if one is still
/// ahead, otherwise the earliest one tomorrow.
///
/// Local times skipped by a clock change are moved to the next day.
pub fn next_run<Tz: TimeZone>(now: &DateTime<Tz>, times: &[NaiveTime]) -> Option<DateTime<Tz>> {
    let today = now.date_naive();
    (0..3)
        .filter_map(|days| today.checked_add_days(Days::new(days)))
        .flat_map(|date| times.iter().map(move |time| date.and_time(*time)))
        .filter_map(|local| now.timezone().from_local_datetime(&local).earliest())
        .find(|candidate| candidate > now)
}

/// Launches and farms at every configured time until stopped.
pub fn run(ctx: &BotContext) -> anyhow::Result<()> {
    let config = ctx.config();
    let times = parse_times(&config.schedule.times)?;
    info!(
        "scheduled daily at {}",
        times.iter().map(|t| t.format(TIME_FORMAT)).join(", ")
    );

    loop {
        let now = Local::now();
        let next = next_run(&now, &times).context("no upcoming run time")?;
        let wait = (next - now).to_std().unwrap_or_default();
        info!("next run at {} (in {:?})", next.format("%Y-%m-%d %H:%M"), wait);
        ctx.sleep(wait)?;

        if config.schedule.launch {
            if let Err(err) = launcher::launch(ctx) {
                if is_stop(&err) {
                    return Err(err);
                }
                error!("skipping this run: {:?}", err);
                continue;
            }
        }
        let summary = Farmer::new(ctx, config.schedule.routine).farm(config.farming.max_rewards);
        if summary.stop_reason == StopReason::Stopped {
            return Ok(());
        }
    }
}

#[test]
fn times_are_parsed_sorted_and_unique() {
    let times = parse_times(&["19:30".into(), "07:05".into(), " 19:30 ".into()]).unwrap();
    assert_eq!(
        times,
        [
            NaiveTime::from_hms_opt(7, 5, 0).unwrap(),
            NaiveTime::from_hms_opt(19, 30, 0).unwrap()
        ]
    );
    assert!(parse_time("24:00").is_err());
    assert!(parse_time("7pm").is_err());
    assert!(parse_times(&[]).is_err());
    assert!(parse_times(&["09:00".into(), "nope".into()]).is_err());
}

#[test]
fn next_run_is_strictly_later_and_within_a_day() {
    use chrono::{Duration, Utc};

    let times = parse_times(&["09:00".into(), "18:00".into()]).unwrap();
    let at = |h, m| Utc.with_ymd_and_hms(2024, 5, 10, h, m, 0).unwrap();

    assert_eq!(next_run(&at(8, 0), &times), Some(at(9, 0)));
    assert_eq!(next_run(&at(9, 0), &times), Some(at(18, 0)));
    assert_eq!(
        next_run(&at(18, 30), &times),
        Some(Utc.with_ymd_and_hms(2024, 5, 11, 9, 0, 0).unwrap())
    );

    let single = parse_times(&["12:00".into()]).unwrap();
    let now = at(12, 0);
    let next = next_run(&now, &single).unwrap();
    assert!(next > now);
    assert!(next - now <= Duration::hours(24));
}
