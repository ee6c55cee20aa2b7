//! Payload materialization.
//!
//! A payload is either a path to an existing file or inline JSON object
//! text. Both end up as a private temporary file (the artifact) that is
//! uploaded and then removed.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bootvol_shared::errors::{BootvolError, BootvolResult};
use serde_json::{Map, Value};
use tempfile::TempPath;

/// Longest payload excerpt quoted in error messages.
const ERROR_EXCERPT_CHARS: usize = 80;

/// Temporary file holding a materialized payload.
///
/// Removed on drop. Removal failures are logged, never returned.
#[derive(Debug)]
pub struct Artifact {
    path: Option<TempPath>,
    source: PayloadSource,
}

/// Where the artifact bytes came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    File(PathBuf),
    Inline,
}

impl Artifact {
    pub fn path(&self) -> &Path {
        match &self.path {
            Some(path) => &**path,
            None => Path::new(""),
        }
    }

    pub fn source(&self) -> &PayloadSource {
        &self.source
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let shown = path.display().to_string();
        match path.close() {
            Ok(()) => tracing::trace!(artifact = %shown, "Removed artifact"),
            Err(e) => tracing::warn!(
                artifact = %shown,
                error = %e,
                "Failed to remove temporary artifact"
            ),
        }
    }
}

/// Materialize `payload` into a new artifact.
///
/// `hint_name` only prefixes the temp file name; uniqueness comes from the
/// temp file primitive. `temp_dir` defaults to the system temp directory.
pub fn materialize(
    payload: &str,
    hint_name: &str,
    temp_dir: Option<&Path>,
) -> BootvolResult<Artifact> {
    tracing::debug!(hint = %hint_name, "Creating temporary artifact");

    if let Some(source) = existing_file(payload)? {
        let (mut file, path) = create_temp(hint_name, temp_dir)?;
        let mut input = File::open(&source).map_err(|e| {
            BootvolError::io(format!("opening payload file {}", source.display()), e)
        })?;
        io::copy(&mut input, &mut file).map_err(|e| {
            BootvolError::io(
                format!("copying payload file {} to {}", source.display(), path.display()),
                e,
            )
        })?;
        file.sync_all()
            .map_err(|e| BootvolError::io(format!("flushing {}", path.display()), e))?;
        return Ok(Artifact {
            path: Some(path),
            source: PayloadSource::File(source),
        });
    }

    validate_inline(payload)?;

    let (mut file, path) = create_temp(hint_name, temp_dir)?;
    file.write_all(payload.as_bytes()).map_err(|e| {
        BootvolError::io(format!("writing inline payload to {}", path.display()), e)
    })?;
    file.sync_all()
        .map_err(|e| BootvolError::io(format!("flushing {}", path.display()), e))?;

    Ok(Artifact {
        path: Some(path),
        source: PayloadSource::Inline,
    })
}

/// Any existing path is a file payload; only regular files can be read.
fn existing_file(payload: &str) -> BootvolResult<Option<PathBuf>> {
    if payload.is_empty() {
        return Ok(None);
    }
    let path = PathBuf::from(payload);
    match std::fs::metadata(&path) {
        Ok(meta) if meta.is_file() => Ok(Some(path)),
        Ok(_) => Err(BootvolError::io(
            format!("reading payload file {}", path.display()),
            io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        )),
        Err(_) => Ok(None),
    }
}

/// Inline payloads must be a JSON object at the top level.
fn validate_inline(payload: &str) -> BootvolResult<()> {
    serde_json::from_str::<Map<String, Value>>(payload)
        .map(|_| ())
        .map_err(|e| {
            tracing::debug!(error = %e, "Inline payload rejected");
            BootvolError::InvalidPayloadFormat {
                payload: excerpt(payload),
            }
        })
}

fn excerpt(payload: &str) -> String {
    let mut chars = payload.chars();
    let head: String = chars.by_ref().take(ERROR_EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

fn create_temp(hint_name: &str, temp_dir: Option<&Path>) -> BootvolResult<(File, TempPath)> {
    let prefix = format!("{}-", sanitize_hint(hint_name));
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix);
    let named = match temp_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|e| BootvolError::io("creating temporary artifact", e))?;
    Ok(named.into_parts())
}

fn sanitize_hint(hint: &str) -> String {
    let cleaned: String = hint
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "payload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const IGNITION: &str = r#"{"ignition":{"version":"3.0.0"}}"#;

    #[test]
    fn test_file_payload_copied_verbatim() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("ign.json");
        // Not JSON on purpose: file payloads are never validated.
        let bytes: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        std::fs::write(&source, &bytes).unwrap();

        let artifact = materialize(source.to_str().unwrap(), "node1", Some(dir.path())).unwrap();
        assert_eq!(std::fs::read(artifact.path()).unwrap(), bytes);
        assert_eq!(artifact.source(), &PayloadSource::File(source.clone()));
        assert_ne!(artifact.path(), source.as_path());
    }

    #[test]
    fn test_inline_payload_written_raw() {
        let dir = TempDir::new().unwrap();
        // Whitespace and key order must survive; the parsed form is not used.
        let payload = "{ \"b\": 1,\n  \"a\": [true] }";

        let artifact = materialize(payload, "node1", Some(dir.path())).unwrap();
        assert_eq!(std::fs::read_to_string(artifact.path()).unwrap(), payload);
        assert_eq!(artifact.source(), &PayloadSource::Inline);
    }

    #[test]
    fn test_rejects_non_object_inline() {
        for payload in ["not json and not a file", "[1,2,3]", "\"str\"", "42", ""] {
            let err = materialize(payload, "node1", None).unwrap_err();
            assert!(
                matches!(err, BootvolError::InvalidPayloadFormat { .. }),
                "payload {:?} gave {:?}",
                payload,
                err
            );
        }
    }

    #[test]
    fn test_rejected_payload_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let _ = materialize("not json", "node1", Some(dir.path())).unwrap_err();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_directory_payload_is_io_error() {
        let dir = TempDir::new().unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir(&scratch).unwrap();

        let err = materialize(dir.path().to_str().unwrap(), "node1", Some(scratch.as_path())).unwrap_err();
        assert!(matches!(err, BootvolError::Io(ref e) if e.kind() == io::ErrorKind::InvalidInput));
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[test]
    fn test_artifact_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let artifact = materialize(IGNITION, "node1", Some(dir.path())).unwrap();
        let path = artifact.path().to_path_buf();
        assert!(path.exists());

        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn test_names_derive_from_hint_and_never_collide() {
        let dir = TempDir::new().unwrap();
        let a = materialize(IGNITION, "worker/0", Some(dir.path())).unwrap();
        let b = materialize(IGNITION, "worker/0", Some(dir.path())).unwrap();

        let name = a.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("worker_0-"));
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_error_excerpt_is_bounded() {
        let payload = "x".repeat(1000);
        let err = materialize(&payload, "node1", None).unwrap_err();
        assert!(err.to_string().len() < 200);
    }
}
