use crate::error::{Result, StackError};
use glob::{glob, Pattern};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Image files and their labels, aligned by position.
#[derive(Debug, Clone)]
pub struct SourceSet {
    pub images: Vec<PathBuf>,
    pub labels: Vec<PathBuf>,
}

impl SourceSet {
    /// Pair images and labels positionally; both lists must be equally long.
    pub fn new(images: Vec<PathBuf>, labels: Vec<PathBuf>) -> Result<Self> {
        if images.len() != labels.len() {
            return Err(StackError::CountMismatch {
                images: images.len(),
                labels: labels.len(),
            });
        }
        Ok(Self { images, labels })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Recursively find images below `root` and the labels next to them.
///
/// Files matching `label_glob` are never treated as images. Labels are
/// looked up in each image's own directory.
pub fn discover_sources(root: &Path, file_glob: &str, label_glob: &str) -> Result<SourceSet> {
    if !root.exists() {
        return Err(StackError::SourceNotFound(root.to_path_buf()));
    }

    let label_pattern = Pattern::new(label_glob)?;
    let image_glob = format!(
        "{}/**/{}",
        Pattern::escape(&root.to_string_lossy()),
        file_glob
    );

    let mut images = Vec::new();
    for entry in glob(&image_glob)? {
        let path = entry?;
        if !path.is_file() || matches_file_name(&label_pattern, &path) {
            continue;
        }
        images.push(path);
    }
    images.sort();

    if images.is_empty() {
        return Err(StackError::NoImagesFound(root.to_path_buf()));
    }

    let mut labels = Vec::new();
    for image in &images {
        let parent = image.parent().unwrap_or(root);
        let label_glob_in_dir = format!(
            "{}/{}",
            Pattern::escape(&parent.to_string_lossy()),
            label_glob
        );
        let mut found: Vec<PathBuf> = glob(&label_glob_in_dir)?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|p| p.is_file())
            .collect();
        found.sort();
        debug!("{} -> labels {:?}", image.display(), found);
        labels.extend(found);
    }

    info!(
        "Discovered {} images and {} labels below {}",
        images.len(),
        labels.len(),
        root.display()
    );
    SourceSet::new(images, labels)
}

fn matches_file_name(pattern: &Pattern, path: &Path) -> bool {
    path.file_name()
        .map(|name| pattern.matches(&name.to_string_lossy()))
        .unwrap_or(false)
}
