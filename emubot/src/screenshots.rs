use {
    anyhow::Context as _,
    chrono::{DateTime, Local},
    fs_err::{create_dir_all, read_dir},
    image::RgbaImage,
    std::path::{Path, PathBuf},
};

/// Returns `<dir>/<prefix>_<n>.png` where `n` starts at the number of files
/// already named `<prefix>_*` and grows until the name is free.
pub fn next_indexed_path(dir: &Path, prefix: &str) -> anyhow::Result<PathBuf> {
    let start = format!("{prefix}_");
    let mut index = 0;
    if dir.try_exists()? {
        for entry in read_dir(dir)? {
            if entry?.file_name().to_string_lossy().starts_with(&start) {
                index += 1;
            }
        }
    }
    loop {
        let path = dir.join(format!("{prefix}_{index}.png"));
        if !path.try_exists()? {
            return Ok(path);
        }
        index += 1;
    }
}

/// Returns `<dir>/<name>_<YYYYmmdd_HHMMSS>.png`.
pub fn timestamped_path(dir: &Path, name: &str, now: DateTime<Local>) -> PathBuf {
    dir.join(format!("{}_{}.png", name, now.format("%Y%m%d_%H%M%S")))
}

/// Writes `image` to `<dir>/<name>_<YYYYmmdd_HHMMSS>.png`, creating `dir` if needed.
pub fn save_timestamped(
    dir: &Path,
    name: &str,
    image: &RgbaImage,
    now: DateTime<Local>,
) -> anyhow::Result<PathBuf> {
    create_dir_all(dir)?;
    let path = timestamped_path(dir, name, now);
    image
        .save(&path)
        .with_context(|| format!("failed to save {:?}", path))?;
    Ok(path)
}

#[test]
fn indexed_paths_never_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let first = next_indexed_path(dir.path(), "watch_ads_not_found").unwrap();
    assert_eq!(first, dir.path().join("watch_ads_not_found_0.png"));

    let missing = dir.path().join("missing");
    assert_eq!(
        next_indexed_path(&missing, "launch_error").unwrap(),
        missing.join("launch_error_0.png")
    );

    fs_err::write(&first, b"").unwrap();
    fs_err::write(dir.path().join("token_icon_not_found_0.png"), b"").unwrap();
    let second = next_indexed_path(dir.path(), "watch_ads_not_found").unwrap();
    assert_eq!(second, dir.path().join("watch_ads_not_found_1.png"));

    // A gap in numbering moves the counter past the existing file.
    fs_err::write(dir.path().join("watch_ads_not_found_2.png"), b"").unwrap();
    let third = next_indexed_path(dir.path(), "watch_ads_not_found").unwrap();
    assert_eq!(third, dir.path().join("watch_ads_not_found_3.png"));
    assert!(!third.exists());
}

#[test]
fn timestamped_names() {
    use chrono::TimeZone;

    let now = Local.with_ymd_and_hms(2024, 12, 31, 23, 59, 58).unwrap();
    assert_eq!(
        timestamped_path(Path::new("shots"), "screenshot", now),
        Path::new("shots/screenshot_20241231_235958.png")
    );
}

#[test]
fn saved_image_is_the_given_frame() {
    use chrono::TimeZone;

    let dir = tempfile::tempdir().unwrap();
    let shots = dir.path().join("shots");
    let frame = RgbaImage::from_fn(6, 4, |x, y| {
        image::Rgba([x as u8 * 40, y as u8 * 60, 7, 255])
    });
    let now = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

    let path = save_timestamped(&shots, "diagnose", &frame, now).unwrap();
    assert_eq!(path, shots.join("diagnose_20240102_030405.png"));
    let saved = image::open(&path).unwrap().into_rgba8();
    assert_eq!(saved, frame);
}
