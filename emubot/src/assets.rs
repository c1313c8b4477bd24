use {
    anyhow::{bail, ensure, Context as _},
    derive_more::Deref,
    fs_err::read_dir,
    image::{GrayImage, ImageReader},
    itertools::Itertools,
    std::{
        collections::HashMap,
        path::{Path, PathBuf},
        sync::{Arc, Mutex},
    },
    tracing::debug,
};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// A grayscale reference image.
#[derive(Debug, Clone)]
pub struct Template {
    pub path: PathBuf,
    pub image: GrayImage,
}

impl Template {
    pub fn new(path: impl Into<PathBuf>, image: GrayImage) -> Self {
        Self {
            path: path.into(),
            image,
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::new(path, load_image(path)?))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// All variants of one UI element.
#[derive(Debug, Deref)]
pub struct TemplateSet {
    pub name: String,
    #[deref]
    templates: Vec<Template>,
}

impl TemplateSet {
    /// Loads a single image file or every image of a directory, sorted by file name.
    pub fn load(name: impl Into<String>, path: &Path) -> anyhow::Result<Self> {
        let name = name.into();
        if !path.try_exists()? {
            bail!("template {:?} not found at {:?}", name, path);
        }
        let templates: Vec<Template> = if path.is_dir() {
            list_images(path)?
                .iter()
                .map(|file| Template::load(file))
                .try_collect()?
        } else {
            vec![Template::load(path)?]
        };
        ensure!(
            !templates.is_empty(),
            "template directory {:?} contains no images",
            path
        );
        debug!("loaded {} template(s) for {}", templates.len(), name);
        Ok(Self { name, templates })
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Returns image files of `dir`, sorted by name. Subdirectories are not searched.
pub fn list_images(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Loads template sets relative to the images directory and keeps them in memory.
pub struct Assets {
    images_dir: PathBuf,
    cache: Mutex<HashMap<PathBuf, Arc<TemplateSet>>>,
}

impl Assets {
    pub fn new(images_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.images_dir.join(relative)
    }

    pub fn exists(&self, relative: &Path) -> bool {
        self.resolve(relative).exists()
    }

    pub fn load(&self, name: &str, relative: &Path) -> anyhow::Result<Arc<TemplateSet>> {
        let path = self.resolve(relative);
        if let Some(set) = self.cache.lock().unwrap().get(&path) {
            return Ok(Arc::clone(set));
        }
        let set = Arc::new(
            TemplateSet::load(name, &path)
                .with_context(|| format!("failed to load template {:?}", name))?,
        );
        self.cache
            .lock()
            .unwrap()
            .insert(path, Arc::clone(&set));
        Ok(set)
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
        debug!("template cache cleared");
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

pub fn load_image(path: &Path) -> anyhow::Result<GrayImage> {
    let reader =
        ImageReader::open(path).with_context(|| format!("failed to open image {:?}", path))?;
    let image = reader
        .with_guessed_format()
        .with_context(|| format!("failed to read image {:?}", path))?
        .decode()
        .with_context(|| format!("failed to decode image {:?}", path))?;
    Ok(image.into_luma8())
}

#[cfg(test)]
fn write_test_image(path: &Path, value: u8) {
    GrayImage::from_pixel(4, 3, image::Luma([value]))
        .save(path)
        .unwrap();
}

#[test]
fn template_set_from_file_and_directory() {
    let dir = tempfile::tempdir().unwrap();
    let ads = dir.path().join("ads");
    fs_err::create_dir(&ads).unwrap();
    write_test_image(&ads.join("b_close.png"), 10);
    write_test_image(&ads.join("a_close.PNG"), 20);
    write_test_image(&ads.join("c_close.jpg"), 30);
    fs_err::write(ads.join("notes.txt"), "not an image").unwrap();
    fs_err::create_dir(ads.join("old")).unwrap();

    let files = list_images(&ads).unwrap();
    let names = files
        .iter()
        .map(|f| f.file_name().unwrap().to_str().unwrap())
        .collect_vec();
    assert_eq!(names, ["a_close.PNG", "b_close.png", "c_close.jpg"]);

    let set = TemplateSet::load("close_ad", &ads).unwrap();
    assert_eq!(set.len(), 3);
    assert_eq!(set[1].path, ads.join("b_close.png"));
    assert_eq!((set[0].width(), set[0].height()), (4, 3));
    assert_eq!(set[1].image.get_pixel(0, 0)[0], 10);

    let single = TemplateSet::load("close_ad", &ads.join("b_close.png")).unwrap();
    assert_eq!(single.len(), 1);

    assert!(TemplateSet::load("close_ad", &ads.join("old")).is_err());
    assert!(TemplateSet::load("close_ad", &dir.path().join("missing.png")).is_err());
}

#[test]
fn assets_cache() {
    let dir = tempfile::tempdir().unwrap();
    write_test_image(&dir.path().join("icon.png"), 200);
    let assets = Assets::new(dir.path());
    assert!(assets.exists(Path::new("icon.png")));
    assert!(!assets.exists(Path::new("other.png")));

    let first = assets.load("icon", Path::new("icon.png")).unwrap();
    let second = assets.load("icon", Path::new("icon.png")).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(assets.cached_count(), 1);

    assets.clear_cache();
    assert_eq!(assets.cached_count(), 0);
    let third = assets.load("icon", Path::new("icon.png")).unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
}
