//! Reading and writing gzipped chart archives
//!
//! Charts are packaged the Helm way: a `.tgz` whose single top-level
//! directory holds `Chart.yaml`, `values.yaml`, `templates/` and `charts/`.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path};
use tar::{Archive, Builder, Header};
use walkdir::WalkDir;

use crate::error::{CoreError, Result};

/// Files of a chart keyed by their path relative to the chart root
pub type ChartFiles = BTreeMap<String, Vec<u8>>;

/// Read every regular file of a gzipped tarball into memory
///
/// The leading directory of each entry is stripped, so the keys are
/// relative to the chart root (`Chart.yaml`, `templates/service.yaml`).
pub fn read_archive<R: Read>(reader: R) -> Result<ChartFiles> {
    let decoder = GzDecoder::new(reader);
    let mut archive = Archive::new(decoder);
    let mut files = ChartFiles::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry.path()?.into_owned();
        let parts: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(p) => Some(p.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        let key = match parts.len() {
            0 => continue,
            1 => parts[0].clone(),
            _ => parts[1..].join("/"),
        };

        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        files.insert(key, content);
    }

    if files.is_empty() {
        return Err(CoreError::Archive {
            message: "archive contains no files".to_string(),
        });
    }

    Ok(files)
}

/// Read a gzipped tarball from disk
pub fn read_archive_file(path: &Path) -> Result<ChartFiles> {
    let file = File::open(path).map_err(|e| CoreError::Archive {
        message: format!("cannot open {}: {}", path.display(), e),
    })?;
    read_archive(file)
}

/// Read every regular file below `dir`
pub fn read_directory(dir: &Path) -> Result<ChartFiles> {
    let mut files = ChartFiles::new();

    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| CoreError::Io(std::io::Error::other(e.to_string())))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let key = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        files.insert(key, std::fs::read(entry.path())?);
    }

    Ok(files)
}

/// Package a chart directory as a gzipped tarball under `top_level/`
pub fn pack_directory(dir: &Path, top_level: &str, output: &Path) -> Result<()> {
    let file = File::create(output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    for (rel, content) in read_directory(dir)? {
        let mut header = Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, format!("{}/{}", top_level, rel), content.as_slice())?;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;

    Ok(())
}
