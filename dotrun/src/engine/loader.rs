//! Assembly loading and reference resolution.
//!
//! Starting from the main assembly, the loader resolves every referenced
//! assembly by simple name, probing in order:
//!
//! 1. `<search-dir>/<name>.exe`
//! 2. `<search-dir>/<name>.dll`
//! 3. `<cwd>/<name>.exe`
//! 4. `<cwd>/<name>.dll`
//!
//! `mscorlib` is always resolved first; when no file is found for it the
//! loader continues, because the internal-method registry provides the
//! base-library surface. Any other unresolved reference aborts loading.
//! Newly loaded assemblies have their own references resolved transitively
//! until the set is stable.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, warn};

use crate::{metadata::CilImage, Error::AssemblyNotFound, Result};

/// Loads the main image and the transitive closure of its references.
///
/// The returned vector is in load order with the main assembly first;
/// type-initializer execution follows this order.
///
/// # Errors
///
/// Returns [`AssemblyNotFound`] for an unresolvable reference other than
/// `mscorlib`, or a parse error for a reference that exists but is not a
/// valid assembly.
pub fn load_all(main: CilImage, search_dir: &Path) -> Result<Vec<Arc<CilImage>>> {
    let mut images = vec![Arc::new(main)];
    let mut loaded: HashSet<String> = images.iter().map(|i| i.name().to_string()).collect();
    let mut queue: Vec<String> = Vec::new();

    enqueue_references(&images[0], &loaded, &mut queue);

    while let Some(name) = queue.pop() {
        if loaded.contains(&name) {
            continue;
        }

        match probe(&name, search_dir) {
            Some(path) => {
                debug!("loading referenced assembly '{name}' from {}", path.display());
                let image = Arc::new(CilImage::from_file(&path)?);
                loaded.insert(name);
                enqueue_references(&image, &loaded, &mut queue);
                images.push(image);
            }
            None if name == "mscorlib" => {
                // The registry impersonates the base library
                debug!("no mscorlib on the search path; using internal methods only");
                loaded.insert(name);
            }
            None => {
                warn!("referenced assembly '{name}' was not found");
                return Err(AssemblyNotFound(name));
            }
        }
    }

    Ok(images)
}

fn enqueue_references(image: &CilImage, loaded: &HashSet<String>, queue: &mut Vec<String>) {
    for reference in image.references() {
        if loaded.contains(reference) || queue.contains(reference) {
            continue;
        }
        // mscorlib is resolved before anything else; the queue pops from
        // the back
        if reference == "mscorlib" {
            queue.push(reference.clone());
        } else {
            queue.insert(0, reference.clone());
        }
    }
}

fn probe(name: &str, search_dir: &Path) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok();

    let mut candidates = vec![
        search_dir.join(format!("{name}.exe")),
        search_dir.join(format!("{name}.dll")),
    ];
    if let Some(cwd) = cwd {
        candidates.push(cwd.join(format!("{name}.exe")));
        candidates.push(cwd.join(format!("{name}.dll")));
    }

    candidates.into_iter().find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_order_prefers_search_dir_and_exe() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("lib.exe");
        let dll = dir.path().join("lib.dll");
        std::fs::write(&dll, b"x").unwrap();

        assert_eq!(probe("lib", dir.path()), Some(dll.clone()));

        std::fs::write(&exe, b"x").unwrap();
        assert_eq!(probe("lib", dir.path()), Some(exe));

        assert_eq!(probe("absent", dir.path()), None);
    }

    #[test]
    fn missing_mscorlib_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let main = CilImage::from_parts("demo", Vec::new(), None, vec!["mscorlib".to_string()]);

        let images = load_all(main, dir.path()).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].name(), "demo");
    }

    #[test]
    fn missing_reference_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let main = CilImage::from_parts("demo", Vec::new(), None, vec!["helpers".to_string()]);

        assert!(matches!(
            load_all(main, dir.path()),
            Err(AssemblyNotFound(name)) if name == "helpers"
        ));
    }
}
