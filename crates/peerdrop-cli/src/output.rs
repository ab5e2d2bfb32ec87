//! Writing received files into the output directory.

use std::io;
use std::path::{Path, PathBuf};

use peerdrop_session::ReceivedFile;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

const MAX_DUPLICATES: u32 = 10_000;

/// Reduce a peer-supplied name to a single safe path component.
pub fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

fn numbered(name: &str, n: u32) -> String {
    let path = Path::new(name);
    match (path.file_stem().and_then(|s| s.to_str()), path.extension().and_then(|e| e.to_str())) {
        (Some(stem), Some(ext)) if !stem.is_empty() => format!("{stem} ({n}).{ext}"),
        _ => format!("{name} ({n})"),
    }
}

/// Write `file` under `dir` without overwriting anything already there.
/// `name.txt` becomes `name (1).txt`, `name (2).txt`, ... on collision.
pub async fn save_received(dir: &Path, file: &ReceivedFile) -> io::Result<PathBuf> {
    let name = sanitize_file_name(&file.meta.name);

    for n in 0..=MAX_DUPLICATES {
        let candidate = if n == 0 { name.clone() } else { numbered(&name, n) };
        let path = dir.join(candidate);
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(mut out) => {
                out.write_all(&file.data).await?;
                out.flush().await?;
                return Ok(path);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("too many files named '{name}' in {}", dir.display()),
    ))
}
