// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
//! File-backed job registry: one empty marker file per running instance at
//! `<root>/.func/instances/<port>`, so that independent processes working on
//! the same project can discover each other's instances.
use fnctl_api::error::{Error, Result};
use fnctl_api::function::RUN_DATA_DIR;
use std::path::{Path, PathBuf};

pub const INSTANCES_DIR: &str = "instances";

pub fn instances_dir(root: &Path) -> PathBuf {
    root.join(RUN_DATA_DIR).join(INSTANCES_DIR)
}

pub struct FileRegistry {
    root: PathBuf,
    dir: PathBuf,
}

impl FileRegistry {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            dir: instances_dir(root),
        }
    }

    fn marker(&self, port: u16) -> PathBuf {
        self.dir.join(port.to_string())
    }
}

impl fnctl_api::registry::JobRegistry for FileRegistry {
    fn claim(&self, port: u16) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let marker = self.marker(port);
        // create_new fails if the marker exists, which makes the claim exclusive across processes.
        match std::fs::OpenOptions::new().write(true).create_new(true).open(&marker) {
            Ok(_) => {
                log::debug!("claimed port {} for {}", port, self.root.display());
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Err(Error::ResourceConflict {
                root: self.root.clone(),
                port,
            }),
            Err(err) => Err(Error::io(marker, err)),
        }
    }

    fn release(&self, port: u16) -> Result<()> {
        let marker = self.marker(port);
        match std::fs::remove_file(&marker) {
            Ok(_) => {
                log::debug!("released port {} for {}", port, self.root.display());
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::io(marker, err)),
        }
    }

    fn list(&self) -> Result<Vec<u16>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(Error::io(&self.dir, err)),
        };
        let mut ports = vec![];
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.dir, e))?;
            let name = entry.file_name();
            match name.to_str().and_then(|n| n.parse::<u16>().ok()) {
                Some(port) => ports.push(port),
                None => log::warn!("ignoring unexpected entry {:?} in {}", name, self.dir.display()),
            }
        }
        ports.sort_unstable();
        Ok(ports)
    }
}

/// Provider of `FileRegistry` instances, the default for `Client`.
#[derive(Default)]
pub struct FileRegistryProvider {}

impl fnctl_api::registry::RegistryProvider for FileRegistryProvider {
    fn registry_for(&self, root: &Path) -> std::sync::Arc<dyn fnctl_api::registry::JobRegistry> {
        std::sync::Arc::new(FileRegistry::new(root))
    }
}
