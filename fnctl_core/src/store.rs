// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
//! Persistence of the function descriptor at `<root>/func.toml`.
//!
//! Saves are atomic (temporary file + rename) and guarded by the descriptor
//! generation: a save fails with `Error::Conflict` if the file on disk was
//! saved by someone else since the descriptor was loaded.
use fnctl_api::error::{Error, Result};
use fnctl_api::function::{Function, DESCRIPTOR_FILE};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(serde::Deserialize)]
struct Generation {
    #[serde(default)]
    generation: u64,
}

pub fn descriptor_path(root: &Path) -> PathBuf {
    root.join(DESCRIPTOR_FILE)
}

/// Load the descriptor of the function at `root`.
///
/// Fails with `NotInitialized` if there is no descriptor and with
/// `CorruptState` if there is one that cannot be parsed or is inconsistent.
pub fn load(root: &Path) -> Result<Function> {
    let root = fnctl_api::util::absolute_root(root).map_err(|e| Error::io(root, e))?;
    let path = descriptor_path(&root);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(Error::NotInitialized(root)),
        Err(err) => return Err(Error::io(path, err)),
    };
    let mut function: Function = toml::from_str(&raw).map_err(|e| Error::CorruptState {
        path: path.clone(),
        detail: e.to_string(),
    })?;
    function.validate().map_err(|detail| Error::CorruptState { path, detail })?;
    function.root = root;
    Ok(function)
}

/// True if a valid descriptor exists at `root`.
pub fn initialized(root: &Path) -> bool {
    load(root).is_ok()
}

/// Persist `function` to its root, bumping its generation on success.
pub fn save(function: &mut Function) -> Result<()> {
    if function.root.as_os_str().is_empty() {
        return Err(Error::InvalidInput("function root path is required".to_string()));
    }
    let path = function.descriptor_path();

    let on_disk = on_disk_generation(&path)?;
    if on_disk != function.generation {
        return Err(Error::Conflict {
            path,
            expected: function.generation,
            found: on_disk,
        });
    }

    let mut next = function.clone();
    next.generation += 1;
    let raw = toml::to_string(&next).map_err(|e| Error::CorruptState {
        path: path.clone(),
        detail: format!("cannot serialize descriptor: {}", e),
    })?;

    std::fs::create_dir_all(&function.root).map_err(|e| Error::io(&function.root, e))?;
    let tmp_path = function.root.join(format!(".{}.{}.tmp", DESCRIPTOR_FILE, uuid::Uuid::new_v4()));
    if let Err(err) = write_synced(&tmp_path, raw.as_bytes()) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Error::io(tmp_path, err));
    }
    if let Err(err) = std::fs::rename(&tmp_path, &path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Error::io(path, err));
    }

    log::debug!("saved descriptor of '{}' at generation {}", next.name, next.generation);
    function.generation = next.generation;
    Ok(())
}

fn on_disk_generation(path: &Path) -> Result<u64> {
    match std::fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<Generation>(&raw)
            .map(|g| g.generation)
            .map_err(|e| Error::CorruptState {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(err) => Err(Error::io(path, err)),
    }
}

fn write_synced(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}
