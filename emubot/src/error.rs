use {crate::config::Target, std::time::Duration, thiserror::Error};

/// Conditions that routines branch on. Everything else is a plain `anyhow::Error`.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("stopped by user")]
    Stopped,
    #[error("{target} not found on screen")]
    NotFound { target: Target },
    #[error("{target} did not appear within {waited:?}")]
    Timeout { target: Target, waited: Duration },
}

/// Returns `true` if the error chain is a user requested stop.
pub fn is_stop(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<BotError>(), Some(BotError::Stopped))
}

pub fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<BotError>(),
        Some(BotError::NotFound { .. } | BotError::Timeout { .. })
    )
}

#[test]
fn stop_is_detected_through_context() {
    use anyhow::Context as _;

    let err = Err::<(), _>(BotError::Stopped)
        .context("while farming")
        .unwrap_err();
    assert!(is_stop(&err));
    assert!(!is_not_found(&err));

    let err = anyhow::Error::from(BotError::NotFound {
        target: Target::WatchAd,
    });
    assert!(is_not_found(&err));
    assert_eq!(err.to_string(), "watch_ad not found on screen");
}
