use crate::error::{AnalysisError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Converts a slide into a deep-zoom pyramid somewhere under `out_dir`.
pub trait DeepZoomTiler: Send + Sync {
    /// Returns the path of the generated `.dzi` descriptor.
    fn tile(&self, slide: &Path, out_dir: &Path) -> Result<PathBuf>;
}

/// Shells out to `vips dzsave`.
#[derive(Debug, Clone)]
pub struct VipsTiler {
    program: PathBuf,
}

impl Default for VipsTiler {
    fn default() -> Self {
        Self { program: PathBuf::from("vips") }
    }
}

impl VipsTiler {
    /// Use a specific `vips` executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }
}

/// `<out_dir>/<slide file stem>`, the base name handed to dzsave.
pub fn dzi_base(slide: &Path, out_dir: &Path) -> Result<PathBuf> {
    let stem = slide
        .file_stem()
        .ok_or_else(|| AnalysisError::invalid(format!("slide path has no file name: {}", slide.display())))?;
    Ok(out_dir.join(stem))
}

/// The descriptor dzsave writes for `base`. The suffix is appended, never
/// substituted, so dots inside the stem survive.
pub fn dzi_path(base: &Path) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".dzi");
    PathBuf::from(name)
}

impl DeepZoomTiler for VipsTiler {
    fn tile(&self, slide: &Path, out_dir: &Path) -> Result<PathBuf> {
        if !slide.exists() {
            return Err(AnalysisError::not_found(format!("WSI file not found: {}", slide.display())));
        }
        std::fs::create_dir_all(out_dir)?;
        let base = dzi_base(slide, out_dir)?;

        tracing::info!("Tiling {} into {}", slide.display(), base.display());
        let output = Command::new(&self.program)
            .arg("dzsave")
            .arg(slide)
            .arg(&base)
            .output()
            .map_err(|e| AnalysisError::processing(format!("failed to run {}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!("Tiling error: {}", stderr.trim());
            return Err(AnalysisError::processing(format!(
                "vips dzsave exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(dzi_path(&base))
    }
}
