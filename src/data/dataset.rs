use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The two diagnostic classes. The numeric value doubles as the class index
/// used for one-hot targets and confusion matrix rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Normal = 0,
    Pneumonia = 1,
}

impl Label {
    pub const ALL: [Label; 2] = [Label::Normal, Label::Pneumonia];
    pub const COUNT: usize = 2;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: usize) -> Option<Label> {
        match idx {
            0 => Some(Label::Normal),
            1 => Some(Label::Pneumonia),
            _ => None,
        }
    }

    /// Directory name expected under each split root.
    pub fn dir_name(self) -> &'static str {
        match self {
            Label::Normal => "NORMAL",
            Label::Pneumonia => "PNEUMONIA",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Label> {
        match name.to_uppercase().as_str() {
            "NORMAL" => Some(Label::Normal),
            "PNEUMONIA" => Some(Label::Pneumonia),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg" | "png"))
        .unwrap_or(false)
}

/// One split of the X-ray dataset, discovered from a directory whose
/// immediate subdirectories name the classes.
#[derive(Clone)]
pub struct XrayDataset {
    samples: Vec<(PathBuf, Label)>,
    counts: [usize; Label::COUNT],
    root: PathBuf,
}

impl XrayDataset {
    /// Expected structure:
    /// <root>/
    /// ├── NORMAL/*.{jpg,jpeg,png}
    /// └── PNEUMONIA/*.{jpg,jpeg,png}
    ///
    /// Fails if the root is missing, if the class directories are not exactly
    /// the two known labels, or if a class directory holds no images.
    pub fn from_dir(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.is_dir() {
            return Err(anyhow::anyhow!(
                "dataset directory not found: {}",
                root.display()
            ));
        }

        let mut class_dirs: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if entry.path().is_dir() {
                class_dirs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        class_dirs.sort();

        if class_dirs.len() != Label::COUNT
            || class_dirs.iter().any(|d| Label::from_dir_name(d).is_none())
        {
            return Err(anyhow::anyhow!(
                "expected exactly the class directories NORMAL and PNEUMONIA under {}, found {:?}",
                root.display(),
                class_dirs
            ));
        }

        let mut samples = Vec::new();
        let mut counts = [0usize; Label::COUNT];

        for label in Label::ALL {
            let class_dir = root.join(label.dir_name());
            let mut paths: Vec<PathBuf> = WalkDir::new(&class_dir)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|p| p.is_file() && is_image_file(p))
                .collect();
            paths.sort();

            if paths.is_empty() {
                return Err(anyhow::anyhow!(
                    "no image files found in {}",
                    class_dir.display()
                ));
            }

            counts[label.index()] = paths.len();
            samples.extend(paths.into_iter().map(|p| (p, label)));
        }

        log::info!(
            "loaded {} samples from {} ({} NORMAL, {} PNEUMONIA)",
            samples.len(),
            root.display(),
            counts[Label::Normal.index()],
            counts[Label::Pneumonia.index()]
        );

        Ok(Self {
            samples,
            counts,
            root,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, idx: usize) -> Option<(&Path, Label)> {
        self.samples.get(idx).map(|(p, l)| (p.as_path(), *l))
    }

    /// Samples in discovery order: all NORMAL paths sorted, then all
    /// PNEUMONIA paths sorted. This order is what the validation loader
    /// iterates, so it is stable across runs.
    pub fn samples(&self) -> &[(PathBuf, Label)] {
        &self.samples
    }

    /// Ordered label sequence, one entry per sample.
    pub fn labels(&self) -> Vec<Label> {
        self.samples.iter().map(|(_, l)| *l).collect()
    }

    pub fn class_count(&self, label: Label) -> usize {
        self.counts[label.index()]
    }

    pub fn num_classes(&self) -> usize {
        Label::COUNT
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::RgbImage;
    use tempfile::TempDir;

    pub(crate) fn write_image(path: &Path) {
        let img = RgbImage::from_fn(8, 8, |x, y| image::Rgb([x as u8 * 16, y as u8 * 16, 128]));
        img.save(path).unwrap();
    }

    pub(crate) fn synthetic_split(normal: usize, pneumonia: usize) -> TempDir {
        let dir = TempDir::new().unwrap();
        for label in Label::ALL {
            std::fs::create_dir(dir.path().join(label.dir_name())).unwrap();
        }
        for i in 0..normal {
            write_image(&dir.path().join("NORMAL").join(format!("n{i:03}.png")));
        }
        for i in 0..pneumonia {
            write_image(&dir.path().join("PNEUMONIA").join(format!("p{i:03}.png")));
        }
        dir
    }

    #[test]
    fn discovers_both_classes() {
        let dir = synthetic_split(3, 2);
        let ds = XrayDataset::from_dir(dir.path()).unwrap();
        assert_eq!(ds.len(), 5);
        assert_eq!(ds.class_count(Label::Normal), 3);
        assert_eq!(ds.class_count(Label::Pneumonia), 2);
    }

    #[test]
    fn sample_order_is_sorted_and_stable() {
        let dir = synthetic_split(2, 2);
        let a = XrayDataset::from_dir(dir.path()).unwrap();
        let b = XrayDataset::from_dir(dir.path()).unwrap();
        assert_eq!(a.samples(), b.samples());
        assert_eq!(
            a.labels(),
            vec![
                Label::Normal,
                Label::Normal,
                Label::Pneumonia,
                Label::Pneumonia
            ]
        );
    }

    #[test]
    fn rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(XrayDataset::from_dir(&missing).is_err());
    }

    #[test]
    fn rejects_unexpected_class_set() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("NORMAL")).unwrap();
        std::fs::create_dir(dir.path().join("COVID")).unwrap();
        assert!(XrayDataset::from_dir(dir.path()).is_err());
    }

    #[test]
    fn rejects_empty_class_dir() {
        let dir = synthetic_split(2, 0);
        assert!(XrayDataset::from_dir(dir.path()).is_err());
    }
}
