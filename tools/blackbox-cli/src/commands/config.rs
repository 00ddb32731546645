//! Show or persist the effective configuration.

use std::path::Path;

use blackbox_common::config::{config_file_path, AppConfig};

pub fn run(app: &AppConfig, path: Option<&Path>, write: bool) -> anyhow::Result<()> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);

    if write {
        app.save_to(&path)?;
        println!("Wrote {}", path.display());
    } else {
        println!("# {}", path.display());
        println!("{}", serde_json::to_string_pretty(app)?);
    }
    Ok(())
}
