use std::path::{Path, PathBuf};

use tracing::info;
use uuid::Uuid;

use crate::data_model::Metadata;
use crate::error::{PipelineError, Result};
use crate::utils::common::sanitize_file_name;

/// Writes `<name>-content.<ext>`, `<name>-meta.txt` and `<name>-error.txt`
/// for a document that failed to parse. Returns the written paths.
pub fn save_parse_error(
    dir: &Path,
    reference: &str,
    content_type: Option<&str>,
    content: &[u8],
    metadata: &Metadata,
    error: &PipelineError,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let base_name = reference
        .rsplit(['/', '\\', '!'])
        .find(|s| !s.is_empty())
        .unwrap_or(reference);
    let stem = format!("{}-{}", sanitize_file_name(base_name), Uuid::new_v4());
    let ext = content_extension(reference, content_type);

    let content_path = dir.join(format!("{}-content.{}", stem, ext));
    std::fs::write(&content_path, content)?;

    let mut meta_text = String::new();
    for (key, values) in metadata.iter() {
        for value in values {
            meta_text.push_str(&format!("{}={}\n", key, value));
        }
    }
    let meta_path = dir.join(format!("{}-meta.txt", stem));
    std::fs::write(&meta_path, meta_text)?;

    let error_path = dir.join(format!("{}-error.txt", stem));
    std::fs::write(
        &error_path,
        format!("reference: {}\nkind: {}\nerror: {}\n", reference, error.kind(), error),
    )?;

    info!(dir = %dir.display(), %reference, "Saved parse error artifacts");
    Ok(vec![content_path, meta_path, error_path])
}

fn content_extension(reference: &str, content_type: Option<&str>) -> String {
    let from_reference = reference
        .rsplit(['/', '\\'])
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    if let Some(ext) = from_reference {
        return ext.to_lowercase();
    }
    content_type
        .and_then(|ct| ct.split(';').next())
        .and_then(|ct| ct.rsplit('/').next())
        .map(|sub| sub.rsplit(['+', '.', '-']).next().unwrap_or(sub).trim().to_lowercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "bin".to_string())
}
