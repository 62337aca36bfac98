// SPDX-FileCopyrightText: © 2023 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2023 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

/// Write a configuration template to `path`, refusing to overwrite.
pub fn create_template(path: &str, content: &str) -> anyhow::Result<()> {
    if path.is_empty() {
        anyhow::bail!("empty template path");
    }
    match std::path::Path::new(&path).exists() {
        true => anyhow::bail!("cannot overwrite configuration file: {}", path),
        false => {
            std::fs::write(path, content)?;
            log::info!("configuration template written to {}", path);
            Ok(())
        }
    }
}

/// Absolute form of `root`, without requiring it to exist.
pub fn absolute_root(root: &std::path::Path) -> std::io::Result<std::path::PathBuf> {
    if root.is_absolute() {
        Ok(root.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(root))
    }
}
