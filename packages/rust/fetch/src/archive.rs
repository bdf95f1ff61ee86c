//! Unpacking of downloaded source bundles.
//!
//! arXiv serves either a gzip-compressed tarball (multi-file sources) or a
//! single gzip-compressed `.tex` file. Both are detected by content, not by
//! name or `Content-Type`.

use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, instrument, warn};

use papersplit_shared::{PaperSplitError, Result};

/// Offset of the `ustar` magic in a tar header block.
const USTAR_MAGIC_OFFSET: usize = 257;

/// What [`extract_archive`] found and wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedKind {
    /// A tarball with this many regular files unpacked.
    Tarball { files: usize },
    /// A single LaTeX file written under the given name.
    SingleFile { name: String },
}

/// Unpack `archive` into `dest`.
///
/// Tar entries with absolute paths or `..` components are skipped.
#[instrument(skip_all, fields(archive = %archive.display(), dest = %dest.display()))]
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<ExtractedKind> {
    let raw = std::fs::read(archive).map_err(|e| PaperSplitError::io(archive, e))?;

    let data = if is_gzip(&raw) {
        let mut decoded = Vec::new();
        GzDecoder::new(raw.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|e| PaperSplitError::Archive(format!("gzip decode failed: {e}")))?;
        decoded
    } else {
        raw
    };

    std::fs::create_dir_all(dest).map_err(|e| PaperSplitError::io(dest, e))?;

    if is_tar(&data) {
        let files = unpack_tar(&data, dest)?;
        debug!(files, "tarball extracted");
        return Ok(ExtractedKind::Tarball { files });
    }

    if data.starts_with(b"%PDF") {
        return Err(PaperSplitError::Archive(
            "source bundle is a PDF; no LaTeX source is available".into(),
        ));
    }

    let stem = archive
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("main");
    let name = format!("{stem}.tex");
    let target = dest.join(&name);
    std::fs::write(&target, &data).map_err(|e| PaperSplitError::io(&target, e))?;

    debug!(%name, "single-file source written");
    Ok(ExtractedKind::SingleFile { name })
}

fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&[0x1f, 0x8b])
}

fn is_tar(data: &[u8]) -> bool {
    data.get(USTAR_MAGIC_OFFSET..USTAR_MAGIC_OFFSET + 5) == Some(b"ustar".as_slice())
}

fn unpack_tar(data: &[u8], dest: &Path) -> Result<usize> {
    let mut archive = Archive::new(Cursor::new(data));
    let entries = archive
        .entries()
        .map_err(|e| PaperSplitError::Archive(format!("invalid tar archive: {e}")))?;

    let mut count = 0;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| PaperSplitError::Archive(format!("corrupt tar entry: {e}")))?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let raw_path = entry
            .path()
            .map_err(|e| PaperSplitError::Archive(format!("unreadable entry path: {e}")))?
            .into_owned();

        let Some(relative) = sanitize_path(&raw_path) else {
            warn!(path = %raw_path.display(), "skipping unsafe archive path");
            continue;
        };

        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PaperSplitError::io(parent, e))?;
        }
        entry
            .unpack(&target)
            .map_err(|e| PaperSplitError::io(&target, e))?;
        count += 1;
    }

    Ok(count)
}

/// Keep only normal components; reject anything that escapes `dest`.
fn sanitize_path(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{gzip, tarball, temp_dir};

    #[test]
    fn extracts_gzipped_tarball() {
        let tmp = temp_dir("ps-archive");
        let archive = tmp.join("2401.00001.download");
        let tar = tarball(&[
            ("main.tex", "\\documentclass{article}\n"),
            ("figs/plot.png", "PNG"),
        ]);
        std::fs::write(&archive, gzip(&tar)).unwrap();

        let dest = tmp.join("out");
        let kind = extract_archive(&archive, &dest).unwrap();

        assert_eq!(kind, ExtractedKind::Tarball { files: 2 });
        assert!(dest.join("main.tex").is_file());
        assert_eq!(std::fs::read_to_string(dest.join("figs/plot.png")).unwrap(), "PNG");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn extracts_single_gzipped_file() {
        let tmp = temp_dir("ps-archive");
        let archive = tmp.join("2401.00002.download");
        std::fs::write(&archive, gzip(b"\\documentclass{article}\nHi\n")).unwrap();

        let dest = tmp.join("out");
        let kind = extract_archive(&archive, &dest).unwrap();

        assert_eq!(
            kind,
            ExtractedKind::SingleFile {
                name: "2401.00002.tex".into()
            }
        );
        let text = std::fs::read_to_string(dest.join("2401.00002.tex")).unwrap();
        assert!(text.contains("\\documentclass"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn accepts_uncompressed_tarball() {
        let tmp = temp_dir("ps-archive");
        let archive = tmp.join("plain.download");
        std::fs::write(&archive, tarball(&[("paper.tex", "x")])).unwrap();

        let kind = extract_archive(&archive, &tmp.join("out")).unwrap();
        assert_eq!(kind, ExtractedKind::Tarball { files: 1 });

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_pdf_only_bundle() {
        let tmp = temp_dir("ps-archive");
        let archive = tmp.join("pdf.download");
        std::fs::write(&archive, gzip(b"%PDF-1.5 ...")).unwrap();

        let err = extract_archive(&archive, &tmp.join("out")).unwrap_err();
        assert!(matches!(err, PaperSplitError::Archive(_)));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn skips_path_traversal_entries() {
        let tmp = temp_dir("ps-archive");
        let archive = tmp.join("evil.download");

        let mut builder = tar::Builder::new(Vec::new());
        let body = b"owned";
        let mut header = tar::Header::new_gnu();
        let name = b"../escaped.tex";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, &body[..]).unwrap();

        let mut ok = tar::Header::new_gnu();
        ok.set_path("safe.tex").unwrap();
        ok.set_size(2);
        ok.set_mode(0o644);
        ok.set_cksum();
        builder.append(&ok, &b"ok"[..]).unwrap();
        std::fs::write(&archive, builder.into_inner().unwrap()).unwrap();

        let dest = tmp.join("out");
        let kind = extract_archive(&archive, &dest).unwrap();

        assert_eq!(kind, ExtractedKind::Tarball { files: 1 });
        assert!(dest.join("safe.tex").is_file());
        assert!(!tmp.join("escaped.tex").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn sanitize_path_rules() {
        assert_eq!(sanitize_path(Path::new("a/./b.tex")), Some(PathBuf::from("a/b.tex")));
        assert_eq!(sanitize_path(Path::new("/etc/passwd")), None);
        assert_eq!(sanitize_path(Path::new("a/../../b")), None);
        assert_eq!(sanitize_path(Path::new(".")), None);
    }
}
