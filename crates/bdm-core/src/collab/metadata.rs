use std::io::Write;
use std::path::PathBuf;

use crate::item::ItemDescriptor;

/// Write the item's metadata blob as `<folder>/<filename>` (pretty JSON, atomic).
pub fn write_inline_metadata(item: &ItemDescriptor, filename: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(&item.target_folder)?;
    let target = item.target_folder.join(filename);
    let json = serde_json::to_vec_pretty(&item.metadata)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&item.target_folder)?;
    tmp.write_all(&json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(&target).map_err(|e| e.error)?;
    Ok(target)
}
