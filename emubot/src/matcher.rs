//! Grayscale template search.
//!
//! Candidates are located with imageproc's normalized cross-correlation on a
//! downscaled copy of the screen, then refined at full resolution around the
//! coarse hit. The reported score is the zero-mean normalized correlation of the
//! final patch, which is what a confidence threshold is compared against.

use {
    crate::assets::Template,
    image::{
        imageops::{self, FilterType},
        GrayImage, ImageBuffer, Luma,
    },
    imageproc::template_matching::{match_template, MatchTemplateMethod},
    screenctl::ScreenRect,
    std::path::PathBuf,
};

/// Coarse search is skipped when the scaled template would be smaller than this.
pub const MIN_COARSE_TEMPLATE_SIDE: u32 = 8;

/// Patches with less variance than this are treated as uniform.
const UNIFORM_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub rect: ScreenRect,
    pub score: f32,
    pub template: PathBuf,
}

impl Match {
    pub fn center(&self) -> (u32, u32) {
        (
            self.rect.x + self.rect.width / 2,
            self.rect.y + self.rect.height / 2,
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    downscale: f32,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Matcher {
    pub fn new(downscale: f32) -> Self {
        Self {
            downscale: if downscale.is_finite() {
                downscale.clamp(0.1, 1.0)
            } else {
                1.0
            },
        }
    }

    /// Returns the best location of `template` in `screen`, whatever its score.
    ///
    /// `region` limits the search; coordinates of the result are always
    /// relative to the whole `screen`.
    pub fn best_match(
        &self,
        screen: &GrayImage,
        template: &Template,
        region: Option<ScreenRect>,
    ) -> Option<Match> {
        let area = clip(
            region.unwrap_or(ScreenRect {
                x: 0,
                y: 0,
                width: screen.width(),
                height: screen.height(),
            }),
            screen,
        )?;
        let (width, height) = template.image.dimensions();
        if width == 0 || height == 0 || width > area.width || height > area.height {
            return None;
        }

        let haystack = imageops::crop_imm(screen, area.x, area.y, area.width, area.height).to_image();
        let stats = TemplateStats::new(&template.image);
        let (guess_x, guess_y, margin) = self.coarse_hit(&haystack, &template.image, stats.uniform);

        let max_x = area.width - width;
        let max_y = area.height - height;
        let guess_x = guess_x.min(max_x);
        let guess_y = guess_y.min(max_y);

        let mut best: Option<(u32, u32, f64)> = None;
        for y in guess_y.saturating_sub(margin)..=(guess_y + margin).min(max_y) {
            for x in guess_x.saturating_sub(margin)..=(guess_x + margin).min(max_x) {
                let score = stats.score(&haystack, x, y);
                if best.is_none_or(|(_, _, best_score)| score > best_score) {
                    best = Some((x, y, score));
                }
            }
        }

        let (x, y, score) = best?;
        Some(Match {
            rect: ScreenRect {
                x: area.x + x,
                y: area.y + y,
                width,
                height,
            },
            score: score as f32,
            template: template.path.clone(),
        })
    }

    /// Returns the best match if its score reaches `confidence`.
    pub fn find(
        &self,
        screen: &GrayImage,
        template: &Template,
        region: Option<ScreenRect>,
        confidence: f32,
    ) -> Option<Match> {
        self.best_match(screen, template, region)
            .filter(|m| m.score >= confidence)
    }

    /// Approximate full resolution location and the refinement margin it needs.
    fn coarse_hit(&self, haystack: &GrayImage, template: &GrayImage, uniform: bool) -> (u32, u32, u32) {
        let scale = self.downscale;
        let scaled = |value: u32| ((value as f32 * scale).round() as u32).max(1);
        let (small_template_w, small_template_h) = (scaled(template.width()), scaled(template.height()));
        let (small_haystack_w, small_haystack_h) = (scaled(haystack.width()), scaled(haystack.height()));

        let coarse = scale < 1.0
            && small_template_w.min(small_template_h) >= MIN_COARSE_TEMPLATE_SIDE
            && small_template_w <= small_haystack_w
            && small_template_h <= small_haystack_h;
        if !coarse {
            let (x, y) = locate(haystack, template, uniform);
            return (x, y, 2);
        }

        let small_haystack =
            imageops::resize(haystack, small_haystack_w, small_haystack_h, FilterType::Triangle);
        let small_template =
            imageops::resize(template, small_template_w, small_template_h, FilterType::Triangle);
        let (x, y) = locate(&small_haystack, &small_template, uniform);

        let scale_x = haystack.width() as f32 / small_haystack_w as f32;
        let scale_y = haystack.height() as f32 / small_haystack_h as f32;
        let margin = (1.0 / scale).ceil() as u32 * 2 + 2;
        (
            (x as f32 * scale_x).round() as u32,
            (y as f32 * scale_y).round() as u32,
            margin,
        )
    }
}

/// Clips `rect` to the image. Returns `None` if nothing remains.
fn clip(rect: ScreenRect, image: &GrayImage) -> Option<ScreenRect> {
    let right = rect.x.saturating_add(rect.width).min(image.width());
    let bottom = rect.y.saturating_add(rect.height).min(image.height());
    if rect.x >= right || rect.y >= bottom {
        return None;
    }
    Some(ScreenRect {
        x: rect.x,
        y: rect.y,
        width: right - rect.x,
        height: bottom - rect.y,
    })
}

fn locate(image: &GrayImage, template: &GrayImage, uniform: bool) -> (u32, u32) {
    // Normalized correlation is undefined for a uniform template.
    let location = if uniform {
        let result = match_template(image, template, MatchTemplateMethod::SumOfSquaredErrors);
        extreme(&result, true)
    } else {
        let result = match_template(image, template, MatchTemplateMethod::CrossCorrelationNormalized);
        extreme(&result, false)
    };
    location.unwrap_or((0, 0))
}

/// Location of the lowest or highest finite value.
fn extreme(result: &ImageBuffer<Luma<f32>, Vec<f32>>, lowest: bool) -> Option<(u32, u32)> {
    let mut best: Option<(u32, u32, f32)> = None;
    for (x, y, value) in result.enumerate_pixels() {
        let value = value[0];
        if !value.is_finite() {
            continue;
        }
        let better = best.is_none_or(|(_, _, best_value)| {
            if lowest {
                value < best_value
            } else {
                value > best_value
            }
        });
        if better {
            best = Some((x, y, value));
        }
    }
    best.map(|(x, y, _)| (x, y))
}

struct TemplateStats<'a> {
    template: &'a GrayImage,
    mean: f64,
    centered: Vec<f64>,
    norm_sq: f64,
    uniform: bool,
}

impl<'a> TemplateStats<'a> {
    fn new(template: &'a GrayImage) -> Self {
        let pixels = template.as_raw();
        let mean = pixels.iter().map(|&p| f64::from(p)).sum::<f64>() / pixels.len() as f64;
        let centered: Vec<f64> = pixels.iter().map(|&p| f64::from(p) - mean).collect();
        let norm_sq = centered.iter().map(|v| v * v).sum::<f64>();
        Self {
            template,
            mean,
            centered,
            norm_sq,
            uniform: norm_sq < UNIFORM_EPSILON,
        }
    }

    /// Zero-mean normalized correlation of the patch at `(x, y)`, clamped to `0..=1`.
    fn score(&self, image: &GrayImage, x: u32, y: u32) -> f64 {
        let (width, height) = self.template.dimensions();
        let stride = image.width() as usize;
        let raw = image.as_raw();
        let count = f64::from(width * height);

        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut cross = 0.0;
        for row in 0..height {
            let start = (y + row) as usize * stride + x as usize;
            let patch_row = &raw[start..start + width as usize];
            let template_row =
                &self.centered[(row * width) as usize..((row + 1) * width) as usize];
            for (&p, &t) in patch_row.iter().zip(template_row) {
                let p = f64::from(p);
                sum += p;
                sum_sq += p * p;
                cross += p * t;
            }
        }
        let patch_var = sum_sq - sum * sum / count;

        if self.uniform {
            let same_level = (sum / count - self.mean).abs() < 0.5;
            return if patch_var < UNIFORM_EPSILON.max(count * 1e-9) && same_level {
                1.0
            } else {
                0.0
            };
        }
        if patch_var < UNIFORM_EPSILON {
            return 0.0;
        }
        (cross / (patch_var * self.norm_sq).sqrt()).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
pub(crate) fn texture(width: u32, height: u32, seed: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let (bx, by) = (x / 4, y / 4);
        let mut h = bx.wrapping_mul(73_856_093) ^ by.wrapping_mul(19_349_663) ^ seed;
        h ^= h >> 13;
        h = h.wrapping_mul(0x5bd1_e995);
        h ^= h >> 15;
        Luma([(h % 251) as u8 + 1])
    })
}

#[cfg(test)]
fn cut(image: &GrayImage, x: u32, y: u32, width: u32, height: u32) -> Template {
    Template::new(
        "cut.png",
        imageops::crop_imm(image, x, y, width, height).to_image(),
    )
}

#[test]
fn template_cut_from_screen_is_found_at_origin() {
    let screen = texture(160, 120, 0);
    let template = cut(&screen, 40, 24, 32, 24);
    for downscale in [1.0, 0.5] {
        let found = Matcher::new(downscale)
            .find(&screen, &template, None, 0.65)
            .unwrap();
        assert_eq!(
            found.rect,
            ScreenRect {
                x: 40,
                y: 24,
                width: 32,
                height: 24
            },
            "downscale {downscale}"
        );
        assert!(found.score > 0.999, "{}", found.score);
        assert_eq!(found.center(), (56, 36));
        assert_eq!(found.template, PathBuf::from("cut.png"));
    }
}

#[test]
fn downscaled_search_refines_odd_offsets() {
    let screen = texture(160, 120, 0);
    let template = cut(&screen, 41, 25, 32, 24);
    let found = Matcher::new(0.5).best_match(&screen, &template, None).unwrap();
    assert_eq!((found.rect.x, found.rect.y), (41, 25));
    assert!(found.score > 0.999, "{}", found.score);
}

#[test]
fn oversized_template_never_matches() {
    let screen = texture(40, 30, 0);
    let template = Template::new("big.png", texture(41, 10, 0));
    assert_eq!(Matcher::new(0.5).best_match(&screen, &template, None), None);

    let screen = texture(160, 120, 0);
    let template = cut(&screen, 0, 0, 32, 24);
    let region = ScreenRect {
        x: 0,
        y: 0,
        width: 31,
        height: 100,
    };
    assert_eq!(
        Matcher::new(1.0).best_match(&screen, &template, Some(region)),
        None
    );
}

#[test]
fn uniform_template_matches_identical_patch_only() {
    let mut screen = texture(160, 120, 0);
    for y in 30..50 {
        for x in 50..70 {
            screen.put_pixel(x, y, Luma([0]));
        }
    }
    let black = Template::new("black.png", GrayImage::new(20, 20));
    for downscale in [1.0, 0.5] {
        let found = Matcher::new(downscale)
            .best_match(&screen, &black, None)
            .unwrap();
        assert_eq!((found.rect.x, found.rect.y), (50, 30));
        assert_eq!(found.score, 1.0);
    }

    let gray = Template::new("gray.png", GrayImage::from_pixel(20, 20, Luma([128])));
    assert_eq!(Matcher::new(1.0).find(&screen, &gray, None, 0.1), None);
}

#[test]
fn threshold_is_respected() {
    let screen = texture(160, 120, 0);
    let other = Template::new("other.png", texture(64, 48, 0x1234_5678));
    let matcher = Matcher::new(0.5);
    let best = matcher.best_match(&screen, &other, None).unwrap();
    assert!(best.score < 0.65, "{}", best.score);
    assert_eq!(matcher.find(&screen, &other, None, 0.65), None);

    let template = cut(&screen, 40, 24, 32, 24);
    for confidence in [0.1, 0.5, 0.9, 0.99] {
        let found = matcher.find(&screen, &template, None, confidence).unwrap();
        assert!(found.score >= confidence);
    }
}

#[test]
fn region_limits_search() {
    let screen = texture(160, 120, 0);
    let template = cut(&screen, 40, 24, 48, 36);
    let matcher = Matcher::new(1.0);

    let around = ScreenRect {
        x: 32,
        y: 16,
        width: 72,
        height: 56,
    };
    let found = matcher.find(&screen, &template, Some(around), 0.65).unwrap();
    assert_eq!((found.rect.x, found.rect.y), (40, 24));

    let elsewhere = ScreenRect {
        x: 90,
        y: 64,
        width: 70,
        height: 56,
    };
    assert_eq!(matcher.find(&screen, &template, Some(elsewhere), 0.65), None);

    let outside = ScreenRect {
        x: 200,
        y: 0,
        width: 10,
        height: 10,
    };
    assert_eq!(matcher.best_match(&screen, &template, Some(outside)), None);
}
