use {
    crate::{
        assets::{list_images, Template, TemplateSet},
        config::{Config, Target},
        context::BotContext,
        matcher::{Match, Matcher},
    },
    image::GrayImage,
    screenctl::ScreenRect,
    std::{
        fmt,
        path::{Path, PathBuf},
    },
    tracing::info,
};

pub const CONFIDENCE_LADDER: [f32; 6] = [0.9, 0.8, 0.75, 0.7, 0.6, 0.5];

/// Resolves a target name or an image path. Relative paths that don't exist
/// as given are looked up in the images directory.
pub fn resolve(config: &Config, target_or_path: &str) -> (String, PathBuf) {
    if let Ok(target) = target_or_path.parse::<Target>() {
        return (target.to_string(), config.target_path(target));
    }
    let path = Path::new(target_or_path);
    let path = if path.is_relative() && !path.exists() {
        config.images_dir.join(path)
    } else {
        path.to_path_buf()
    };
    (target_or_path.to_string(), path)
}

/// Highest ladder confidence that `score` still passes.
pub fn suggested_confidence(score: f32) -> Option<f32> {
    CONFIDENCE_LADDER.into_iter().find(|&c| score >= c)
}

pub struct TemplateReport {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub best: Option<Match>,
}

pub struct DiagnosisReport {
    pub name: String,
    pub path: PathBuf,
    pub screenshot: PathBuf,
    pub configured_confidence: f32,
    pub templates: Vec<TemplateReport>,
    pub directory_images: Vec<PathBuf>,
}

/// Scores every template against one frame.
pub fn score_templates(
    matcher: &Matcher,
    templates: &[Template],
    screen: &GrayImage,
    region: Option<ScreenRect>,
) -> Vec<TemplateReport> {
    templates
        .iter()
        .map(|template| TemplateReport {
            path: template.path.clone(),
            width: template.width(),
            height: template.height(),
            best: matcher.best_match(screen, template, region),
        })
        .collect()
}

pub fn diagnose(ctx: &BotContext, target_or_path: &str) -> anyhow::Result<DiagnosisReport> {
    let (name, path) = resolve(ctx.config(), target_or_path);
    info!("diagnosing {} ({:?})", name, path);
    let set = TemplateSet::load(&name, &path)?;
    let capture = ctx.capture()?;
    let screenshot = ctx.save_image(capture.screen.image(), "diagnose")?;
    let templates = score_templates(ctx.matcher(), &set, &capture.gray, capture.region);

    let dir = if path.is_dir() {
        path.clone()
    } else {
        path.parent().map(Path::to_path_buf).unwrap_or_default()
    };
    let directory_images = if dir.is_dir() {
        list_images(&dir)?
    } else {
        Vec::new()
    };

    Ok(DiagnosisReport {
        name,
        path,
        screenshot,
        configured_confidence: ctx.config().confidence,
        templates,
        directory_images,
    })
}

impl fmt::Display for DiagnosisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "template: {} ({:?})", self.name, self.path)?;
        writeln!(f, "screenshot: {:?}", self.screenshot)?;
        for template in &self.templates {
            writeln!(f)?;
            writeln!(
                f,
                "{:?}: {}x{}",
                template.path, template.width, template.height
            )?;
            let Some(best) = &template.best else {
                writeln!(f, "  larger than the search area, can never match")?;
                continue;
            };
            let (x, y) = best.center();
            writeln!(f, "  best score {:.3} at ({}, {})", best.score, x, y)?;
            for confidence in CONFIDENCE_LADDER {
                let verdict = if best.score >= confidence {
                    "found"
                } else {
                    "not found"
                };
                writeln!(f, "  confidence {:.2}: {}", confidence, verdict)?;
            }
            let configured = if best.score >= self.configured_confidence {
                "matches"
            } else {
                "does not match"
            };
            writeln!(
                f,
                "  configured confidence {:.2} {}",
                self.configured_confidence, configured
            )?;
            if let Some(suggested) = suggested_confidence(best.score) {
                writeln!(f, "  suggested confidence: {:.2}", suggested)?;
            }
        }
        if !self.directory_images.is_empty() {
            writeln!(f)?;
            writeln!(f, "images in the directory:")?;
            for image in &self.directory_images {
                writeln!(f, "  {:?}", image)?;
            }
        }
        Ok(())
    }
}

#[test]
fn suggested_confidence_uses_ladder() {
    assert_eq!(suggested_confidence(0.95), Some(0.9));
    assert_eq!(suggested_confidence(0.77), Some(0.75));
    assert_eq!(suggested_confidence(0.5), Some(0.5));
    assert_eq!(suggested_confidence(0.49), None);
}

#[test]
fn resolves_targets_and_paths() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        images_dir: dir.path().into(),
        ..Config::default()
    };
    assert_eq!(
        resolve(&config, "skip_ad"),
        ("skip_ad".to_string(), dir.path().join("game/ads/skip"))
    );
    assert_eq!(
        resolve(&config, "ads/close_15.png"),
        (
            "ads/close_15.png".to_string(),
            dir.path().join("ads/close_15.png")
        )
    );
    let absolute = dir.path().join("icon.png");
    assert_eq!(
        resolve(&config, absolute.to_str().unwrap()).1,
        absolute
    );
}

#[test]
fn templates_are_scored_against_the_same_frame() {
    use image::imageops;

    let screen = crate::matcher::texture(120, 90, 7);
    let icon = Template::new(
        "icon.png",
        imageops::crop_imm(&screen, 32, 20, 24, 20).to_image(),
    );
    let huge = Template::new("huge.png", GrayImage::new(200, 10));

    let reports = score_templates(&Matcher::new(1.0), &[icon, huge], &screen, None);
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].path, PathBuf::from("icon.png"));
    assert_eq!((reports[0].width, reports[0].height), (24, 20));
    let best = reports[0].best.as_ref().unwrap();
    assert_eq!((best.rect.x, best.rect.y), (32, 20));
    assert!(best.score > 0.999, "{}", best.score);
    assert!(reports[1].best.is_none());
}
