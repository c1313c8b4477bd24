use image::RgbaImage;

/// A rectangle in screen image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A captured monitor image together with its placement in the global
/// input coordinate space.
///
/// Image pixels can differ from input coordinates on HiDPI displays
/// (macOS reports pointer positions in points), so `scale` is the number of
/// image pixels per input unit.
pub struct Screen {
    image: RgbaImage,
    origin_x: i32,
    origin_y: i32,
    scale: f32,
}

impl Screen {
    pub fn new(image: RgbaImage, origin_x: i32, origin_y: i32, scale: f32) -> Self {
        Self {
            image,
            origin_x,
            origin_y,
            scale: if scale > 0.0 { scale } else { 1.0 },
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Converts a point of the image into global input coordinates.
    pub fn to_global(&self, x: u32, y: u32) -> (i32, i32) {
        (
            self.origin_x + (x as f32 / self.scale).round() as i32,
            self.origin_y + (y as f32 / self.scale).round() as i32,
        )
    }

    /// Converts a rectangle in global input coordinates into image pixels,
    /// clipped to the image. Returns `None` if nothing of it is on this screen.
    pub fn to_image_rect(&self, x: i32, y: i32, width: u32, height: u32) -> Option<ScreenRect> {
        let left = ((x - self.origin_x) as f32 * self.scale).round() as i64;
        let top = ((y - self.origin_y) as f32 * self.scale).round() as i64;
        let right = left + (width as f32 * self.scale).round() as i64;
        let bottom = top + (height as f32 * self.scale).round() as i64;

        let left = left.clamp(0, i64::from(self.image.width()));
        let top = top.clamp(0, i64::from(self.image.height()));
        let right = right.clamp(0, i64::from(self.image.width()));
        let bottom = bottom.clamp(0, i64::from(self.image.height()));
        if right <= left || bottom <= top {
            return None;
        }
        Some(ScreenRect {
            x: left as u32,
            y: top as u32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }
}

#[test]
fn screen_to_global_applies_origin_and_scale() {
    let screen = Screen::new(RgbaImage::new(200, 100), 1920, 0, 1.0);
    assert_eq!(screen.to_global(10, 20), (1930, 20));

    let retina = Screen::new(RgbaImage::new(400, 200), 0, 0, 2.0);
    assert_eq!(retina.to_global(100, 50), (50, 25));
}

#[test]
fn screen_rect_is_clipped() {
    let screen = Screen::new(RgbaImage::new(200, 100), 100, 100, 1.0);
    assert_eq!(
        screen.to_image_rect(150, 120, 400, 20),
        Some(ScreenRect {
            x: 50,
            y: 20,
            width: 150,
            height: 20
        })
    );
    assert_eq!(
        screen.to_image_rect(0, 0, 50, 50),
        None,
        "rect left of the monitor"
    );

    let retina = Screen::new(RgbaImage::new(400, 200), 0, 0, 2.0);
    assert_eq!(
        retina.to_image_rect(10, 10, 20, 20),
        Some(ScreenRect {
            x: 20,
            y: 20,
            width: 40,
            height: 40
        })
    );
}
