//! Component discovery and linking.
//!
//! Recursively scans a directory for component sources, compiles them in
//! parallel and links compiled modules into runtime descriptors by resolving
//! their component imports relative to the importing file.

use rayon::prelude::*;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, error, warn};
use walkdir::WalkDir;

use crate::compile::{compile_sfc, CompileOptions};
use crate::descriptor::ComponentDescriptor;
use crate::ir::ComponentModule;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiscoveryError {
    #[error("{0} is not a directory")]
    NotADirectory(String),
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("component {0} was not discovered")]
    Unknown(String),
    #[error("{importer} imports {specifier}, which was not discovered")]
    MissingImport { importer: String, specifier: String },
    #[error("import cycle: {0}")]
    Cycle(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Recursively find component sources under `dir`.
fn find_component_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if path.is_file() && path.to_string_lossy().ends_with(extension) {
                    files.push(normalize_path(path));
                }
            }
            Err(err) => warn!(error = %err, "skipping unreadable entry"),
        }
    }
    files.sort();
    files
}

/// Compiles every component under `dir`. Compile failures are kept as
/// fallback modules.
pub fn discover_components(
    dir: &Path,
    options: &CompileOptions,
) -> Result<ComponentLibrary, DiscoveryError> {
    if !dir.is_dir() {
        return Err(DiscoveryError::NotADirectory(dir.display().to_string()));
    }
    let files = find_component_files(dir, &options.extension);

    let modules = files
        .par_iter()
        .map(|path| {
            let source = fs::read_to_string(path).map_err(|e| DiscoveryError::Read {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            let result = compile_sfc(&source, &path.to_string_lossy(), options);
            for err in &result.errors {
                error!(file = %path.display(), error = %err, "component compiled to fallback");
            }
            Ok((path.clone(), result.module))
        })
        .collect::<Result<HashMap<PathBuf, ComponentModule>, DiscoveryError>>()?;

    debug!(dir = %dir.display(), count = modules.len(), "discovered components");
    Ok(ComponentLibrary {
        root: normalize_path(dir),
        modules,
        linked: RefCell::new(HashMap::new()),
    })
}

/// Lexically resolves `.` and `..` components.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIBRARY
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ComponentLibrary {
    root: PathBuf,
    modules: HashMap<PathBuf, ComponentModule>,
    linked: RefCell<HashMap<PathBuf, Rc<ComponentDescriptor>>>,
}

impl ComponentLibrary {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Discovered component paths, sorted.
    pub fn paths(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = self.modules.keys().map(PathBuf::as_path).collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&self.root.join(path))
        }
    }

    /// Compiled module for `path` (absolute, or relative to the root).
    pub fn module(&self, path: impl AsRef<Path>) -> Option<&ComponentModule> {
        self.modules.get(&self.resolve(path.as_ref()))
    }

    /// Modules that failed to compile.
    pub fn failures(&self) -> Vec<&ComponentModule> {
        let mut failed: Vec<&ComponentModule> =
            self.modules.values().filter(|m| m.is_fallback()).collect();
        failed.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        failed
    }

    /// Linked descriptor for `path`. Results are memoised.
    pub fn descriptor(&self, path: impl AsRef<Path>) -> Result<Rc<ComponentDescriptor>, LinkError> {
        let path = self.resolve(path.as_ref());
        self.link(&path, &mut Vec::new())
    }

    fn link(
        &self,
        path: &Path,
        visiting: &mut Vec<PathBuf>,
    ) -> Result<Rc<ComponentDescriptor>, LinkError> {
        if let Some(done) = self.linked.borrow().get(path) {
            return Ok(done.clone());
        }
        if let Some(start) = visiting.iter().position(|p| p == path) {
            let chain: Vec<String> = visiting[start..]
                .iter()
                .chain(std::iter::once(&path.to_path_buf()))
                .map(|p| p.display().to_string())
                .collect();
            return Err(LinkError::Cycle(chain.join(" -> ")));
        }
        let module = self
            .modules
            .get(path)
            .ok_or_else(|| LinkError::Unknown(path.display().to_string()))?;

        visiting.push(path.to_path_buf());
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut children = HashMap::new();
        for component in &module.components {
            let target = normalize_path(&base.join(&component.source));
            if !self.modules.contains_key(&target) {
                visiting.pop();
                return Err(LinkError::MissingImport {
                    importer: path.display().to_string(),
                    specifier: component.source.clone(),
                });
            }
            match self.link(&target, visiting) {
                Ok(child) => {
                    children.insert(component.name.clone(), child);
                }
                Err(err) => {
                    visiting.pop();
                    return Err(err);
                }
            }
        }
        visiting.pop();

        let descriptor = Rc::new(ComponentDescriptor::from_module(module, &children));
        self.linked
            .borrow_mut()
            .insert(path.to_path_buf(), descriptor.clone());
        debug!(file = %path.display(), "linked component");
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/b/./../c/d.olova")),
            PathBuf::from("/a/c/d.olova")
        );
        assert_eq!(normalize_path(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn test_missing_directory() {
        let err = discover_components(Path::new("/definitely/not/here"), &CompileOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, DiscoveryError::NotADirectory(_)));
    }
}
