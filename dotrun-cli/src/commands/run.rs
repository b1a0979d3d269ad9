//! `dotrun run` - execute an assembly's entry point.

use std::path::Path;

use anyhow::Context;
use dotrun::{engine::Engine, CilImage};

pub fn run(path: &Path, args: &[String], search_dir: Option<&Path>) -> anyhow::Result<()> {
    let image = CilImage::from_file(path)
        .with_context(|| format!("failed to load assembly '{}'", path.display()))?;

    let default_dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let search_dir = search_dir
        .or(default_dir)
        .unwrap_or_else(|| Path::new("."));

    let mut engine = Engine::new(image, search_dir)
        .with_context(|| format!("failed to initialize engine for '{}'", path.display()))?;
    engine.start(args)?;
    Ok(())
}
