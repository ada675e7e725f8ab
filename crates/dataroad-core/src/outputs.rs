use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use polars::prelude::{CsvWriter, DataFrame, SerWriter};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{PipelineError, Result};

/// A fully written temporary file waiting to be renamed over its destination.
#[derive(Debug)]
pub struct StagedFile {
    temp: NamedTempFile,
    destination: PathBuf,
}

impl StagedFile {
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Renames the staged file over its destination.
    pub fn commit(self) -> Result<()> {
        self.temp.persist(&self.destination)?;
        info!(path = %self.destination.display(), "output committed");
        Ok(())
    }
}

/// Stages `df` as comma-separated text with a header for `path`.
pub fn stage_table(df: &mut DataFrame, path: &Path) -> Result<StagedFile> {
    stage(path, |writer| {
        CsvWriter::new(writer)
            .include_header(true)
            .with_separator(b',')
            .finish(df)?;
        Ok(())
    })
}

/// Stages the run manifest as pretty JSON for `path`.
pub fn stage_manifest<T: Serialize>(manifest: &T, path: &Path) -> Result<StagedFile> {
    stage(path, |writer| {
        serde_json::to_writer_pretty(&mut *writer, manifest)?;
        writer.write_all(b"\n")?;
        Ok(())
    })
}

/// Commits staged files in order. Staging already checked every destination, so
/// nothing is renamed when any output could not be produced.
pub fn commit_all(staged: Vec<StagedFile>) -> Result<()> {
    for file in staged {
        file.commit()?;
    }
    Ok(())
}

/// Writes `df` to `path` on its own; readers see the previous file or the complete
/// new one.
pub fn write_table(df: &mut DataFrame, path: &Path) -> Result<()> {
    stage_table(df, path)?.commit()
}

/// Fills a temporary file in the destination directory.
fn stage<F>(path: &Path, fill: F) -> Result<StagedFile>
where
    F: FnOnce(&mut BufWriter<&mut fs::File>) -> Result<()>,
{
    if path.is_dir() {
        return Err(PipelineError::DestinationIsDirectory(path.to_path_buf()));
    }
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(directory)?;

    let mut temp = NamedTempFile::new_in(directory)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        fill(&mut writer)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    Ok(StagedFile {
        temp,
        destination: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use polars::prelude::*;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn replaces_previous_output_and_leaves_no_temp_files() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("processed").join("base_analitica.csv");

        let mut first = df!("cod_municipio" => &["355030", "330455"])?;
        write_table(&mut first, &path)?;
        let mut second = df!("cod_municipio" => &["310620"])?;
        write_table(&mut second, &path)?;

        assert_eq!(fs::read_to_string(&path)?, "cod_municipio\n310620\n");
        let entries = fs::read_dir(path.parent().unwrap())?.count();
        assert_eq!(entries, 1);
        Ok(())
    }

    #[test]
    fn staged_files_are_invisible_until_committed() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("base_analitica.csv");

        let mut df = df!("cod_municipio" => &["001"])?;
        let staged = stage_table(&mut df, &path)?;
        assert!(!path.exists());
        assert_eq!(staged.destination(), path.as_path());

        commit_all(vec![staged])?;
        assert_eq!(fs::read_to_string(&path)?, "cod_municipio\n001\n");
        Ok(())
    }

    #[test]
    fn staging_onto_a_directory_fails_and_drops_the_temp_file() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("base_analitica.manifest.json");
        fs::create_dir(&path)?;

        let result = stage_manifest(&serde_json::json!({ "rows": 1 }), &path);

        assert!(matches!(result, Err(PipelineError::DestinationIsDirectory(_))));
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }
}
