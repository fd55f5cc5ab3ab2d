use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use image::imageops::FilterType;

use super::{AssetError, AssetRef, AssetSource, ContentFit, DeliveryMode, ImageRequest};

/// Photo library laid out on disk.
///
/// Every image file below `root` is an asset identified by its `/`-separated
/// relative path. Each non-hidden top-level folder is a group whose members
/// are the images below it.
#[derive(Debug, Clone)]
pub struct FolderLibrary {
    root: PathBuf,
}

impl FolderLibrary {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, AssetError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(AssetError::Enumerate {
                location: root.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn asset_path(&self, asset: &AssetRef) -> PathBuf {
        asset
            .as_str()
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    fn asset_ref_for(&self, path: &Path) -> Option<AssetRef> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy().into_owned())
            .collect();
        (!parts.is_empty()).then(|| AssetRef::new(parts.join("/")))
    }

    fn collect_assets(&self, dir: &Path) -> Result<Vec<AssetRef>, AssetError> {
        let mut files = Vec::new();
        collect_images_recursive(dir, &mut files)?;
        let mut assets: Vec<AssetRef> = files
            .iter()
            .filter_map(|path| self.asset_ref_for(path))
            .collect();
        assets.sort();
        Ok(assets)
    }
}

impl AssetSource for FolderLibrary {
    fn list_groups(&self) -> Result<Vec<String>, AssetError> {
        let mut groups = Vec::new();
        for entry in read_dir(&self.root)? {
            let path = entry.path();
            if path.is_dir() && !is_hidden(&path) {
                groups.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        groups.sort();
        Ok(groups)
    }

    fn list_assets(&self) -> Result<Vec<AssetRef>, AssetError> {
        self.collect_assets(&self.root)
    }

    fn list_group_items(&self, group: &str) -> Result<Vec<AssetRef>, AssetError> {
        let dir = self.root.join(group);
        if group.is_empty() || group.contains(['/', '\\']) || !dir.is_dir() {
            return Err(AssetError::UnknownGroup(group.to_string()));
        }
        self.collect_assets(&dir)
    }

    fn fetch_image(
        &self,
        asset: &AssetRef,
        request: ImageRequest,
    ) -> Result<DynamicImage, AssetError> {
        let path = self.asset_path(asset);
        let decoded = image::open(&path).map_err(|err| AssetError::ImageUnavailable {
            asset: asset.clone(),
            reason: err.to_string(),
        })?;
        Ok(render(decoded, request))
    }
}

/// True when the path names a file whose format the image decoder knows.
pub(crate) fn is_image_file(path: &Path) -> bool {
    path.is_file() && image::ImageFormat::from_path(path).is_ok()
}

pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn render(image: DynamicImage, request: ImageRequest) -> DynamicImage {
    let filter = match request.mode {
        DeliveryMode::Fast => FilterType::Nearest,
        DeliveryMode::Opportunistic => FilterType::Triangle,
        DeliveryMode::Exact => FilterType::Lanczos3,
    };
    let (width, height) = (request.width.max(1), request.height.max(1));
    match request.fit {
        ContentFit::AspectFit => image.resize(width, height, filter),
        ContentFit::AspectFill => image.resize_to_fill(width, height, filter),
    }
}

fn read_dir(dir: &Path) -> Result<Vec<fs::DirEntry>, AssetError> {
    let enumerate_error = |reason: String| AssetError::Enumerate {
        location: dir.display().to_string(),
        reason,
    };
    fs::read_dir(dir)
        .map_err(|err| enumerate_error(err.to_string()))?
        .map(|entry| entry.map_err(|err| enumerate_error(err.to_string())))
        .collect()
}

fn collect_images_recursive(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), AssetError> {
    for entry in read_dir(dir)? {
        let path = entry.path();
        if is_hidden(&path) {
            continue;
        }
        if path.is_dir() {
            collect_images_recursive(&path, out)?;
        } else if is_image_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}
