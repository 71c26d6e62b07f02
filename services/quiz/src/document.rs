use anyhow::{Context, Result, bail};
use quiz_core::configuration::DocumentHandle;
use std::fs;
use std::path::Path;

/// Largest reference document forwarded to the collaborators.
pub const MAX_DOCUMENT_BYTES: usize = 100_000;

/// Reads a UTF-8 text or markdown file into a handle the session can forward.
pub fn load_document(path: &Path) -> Result<DocumentHandle> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read reference document: {}", path.display()))?;
    if bytes.len() > MAX_DOCUMENT_BYTES {
        bail!(
            "Reference document {} is {} bytes, the limit is {}",
            path.display(),
            bytes.len(),
            MAX_DOCUMENT_BYTES
        );
    }
    let content = String::from_utf8(bytes)
        .with_context(|| format!("Reference document is not UTF-8 text: {}", path.display()))?;
    if content.trim().is_empty() {
        bail!("Reference document {} is empty", path.display());
    }

    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
        .to_string();
    tracing::info!("Loaded reference document '{}' ({} bytes)", name, content.len());
    Ok(DocumentHandle { name, content })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_load_document() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.md");
        let mut file = fs::File::create(&path)?;
        writeln!(file, "# Photosynthesis\nLight becomes sugar.")?;

        let document = load_document(&path)?;
        assert_eq!(document.name, "notes.md");
        assert!(document.content.contains("Light becomes sugar."));
        Ok(())
    }

    #[test]
    fn test_rejects_binary_empty_and_oversized_files() -> Result<()> {
        let dir = tempdir()?;

        let binary = dir.path().join("image.png");
        fs::write(&binary, [0xff, 0xfe, 0x00, 0x9f])?;
        assert!(load_document(&binary).is_err());

        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "  \n")?;
        assert!(load_document(&empty).is_err());

        let large = dir.path().join("large.txt");
        fs::write(&large, "a".repeat(MAX_DOCUMENT_BYTES + 1))?;
        assert!(load_document(&large).is_err());

        assert!(load_document(&dir.path().join("missing.txt")).is_err());
        Ok(())
    }
}
