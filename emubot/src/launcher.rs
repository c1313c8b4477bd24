use {
    crate::{
        config::Target,
        context::BotContext,
        error::{is_stop, BotError},
    },
    anyhow::{bail, Context as _},
    std::{process::Command, time::Duration},
    tracing::{error, info, warn},
};

/// Starts the emulator and opens the game.
///
/// A `launch_error_<n>.png` screenshot is saved if any step fails.
pub fn launch(ctx: &BotContext) -> anyhow::Result<()> {
    info!("launching {}", ctx.config().emulator.name);
    let result = run_launch_sequence(ctx);
    if let Err(err) = &result {
        if !is_stop(err) {
            error!("launch failed: {:?}", err);
            ctx.debug_screenshot("launch_error");
        }
    }
    result
}

fn run_launch_sequence(ctx: &BotContext) -> anyhow::Result<()> {
    let timings = &ctx.config().timings;

    start_emulator(ctx)?;
    wait_for_emulator(ctx, timings.ready_timeout)?;
    if let Err(err) = ctx.activate_emulator_window(timings.ready_timeout) {
        warn!("failed to activate the emulator window: {:?}", err);
    }
    go_home(ctx)?;

    ctx.sleep(timings.home_screen_delay)?;
    let icon = ctx.require(Target::GameIcon)?;
    ctx.click_found(&icon)?;
    ctx.sleep(timings.after_launch_click)?;
    wait_for_emulator(ctx, timings.launch_timeout)?;
    info!("game launched");
    Ok(())
}

pub fn start_emulator(ctx: &BotContext) -> anyhow::Result<()> {
    let emulator = &ctx.config().emulator;
    if let Some(command) = &emulator.command {
        let Some((program, args)) = command.split_first() else {
            bail!("emulator command is empty");
        };
        let child = Command::new(program)
            .args(args)
            .spawn()
            .with_context(|| format!("failed to start {:?}", program))?;
        info!("started {:?} (pid {})", program, child.id());
        return Ok(());
    }

    if !ctx.click_target(Target::StartMenu)? {
        return Err(BotError::NotFound {
            target: Target::StartMenu,
        })
        .context("cannot open the start menu");
    }
    ctx.sleep(ctx.config().timings.menu_delay)?;
    ctx.type_text(&emulator.name)?;
    ctx.sleep(ctx.config().timings.search_delay)?;
    ctx.press(&emulator.submit_key)?;
    info!("requested {} from the start menu", emulator.name);
    Ok(())
}

/// Waits until the emulator window template is visible.
///
/// A timeout is not an error because the emulator may be ready without the
/// template matching. Without a window template the full timeout is waited.
pub fn wait_for_emulator(ctx: &BotContext, timeout: Duration) -> anyhow::Result<()> {
    if !ctx.has_templates(Target::EmulatorWindow) {
        warn!(
            "no {} template, waiting {:?} instead",
            Target::EmulatorWindow,
            timeout
        );
        return ctx.sleep(timeout);
    }
    info!("waiting for the emulator (up to {:?})", timeout);
    if ctx.wait_for(Target::EmulatorWindow, timeout)?.is_some() {
        info!("emulator is ready");
    } else {
        warn!(
            "{}",
            BotError::Timeout {
                target: Target::EmulatorWindow,
                waited: timeout,
            }
        );
    }
    Ok(())
}

/// Returns to the emulator home screen.
pub fn go_home(ctx: &BotContext) -> anyhow::Result<()> {
    if ctx.has_templates(Target::EmulatorHome) && ctx.click_target(Target::EmulatorHome)? {
        return Ok(());
    }
    match &ctx.config().emulator.home_keys {
        Some(keys) => {
            info!("pressing {} to open the home screen", keys);
            ctx.press_combination(keys)
        }
        None => {
            info!("home button not visible, assuming the home screen is open");
            Ok(())
        }
    }
}
