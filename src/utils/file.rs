use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use uuid::Uuid;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::defs::PipelineError;

lazy_static! {
    // genome.1.bt2, genome.rev.1.bt2, large-index .bt2l
    static ref BT2_INDEX_FILE: Regex = Regex::new(r"^(.+?)\.(?:rev\.)?\d+\.bt2l?$").unwrap();
}

/// Creates `<parent>/<prefix><uuid>`. The uuid keeps concurrent workers that
/// share `parent` from colliding even when they start in the same instant.
pub fn make_unique_dir(parent: &Path, prefix: &str) -> io::Result<PathBuf> {
    let dir = parent.join(format!("{}{}", prefix, Uuid::new_v4()));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Moves a file, falling back to copy-and-delete across filesystems.
pub async fn relocate_file(src: &Path, dst: &Path) -> io::Result<()> {
    match tokio::fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!("rename {} -> {} failed ({}); copying", src.display(), dst.display(), e);
            tokio::fs::copy(src, dst).await?;
            tokio::fs::remove_file(src).await
        }
    }
}

/// Finds the Bowtie2 index prefix inside `index_dir`.
///
/// # Arguments
///
/// * `index_dir` - directory returned by the genome-index service
///
/// # Returns
/// `<index_dir>/<prefix>`, the form tophat expects as its index argument.
pub fn genome_index_prefix(index_dir: &Path) -> Result<PathBuf, PipelineError> {
    let mut names: Vec<String> = std::fs::read_dir(index_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    debug!("genome index files: {:?}", names);

    names
        .iter()
        .find_map(|name| BT2_INDEX_FILE.captures(name).map(|caps| caps[1].to_string()))
        .map(|prefix| index_dir.join(prefix))
        .ok_or_else(|| {
            PipelineError::DataIntegrity(format!(
                "no Bowtie2 index files found in {}",
                index_dir.display()
            ))
        })
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// Zips every file under `dir` (flattened to file names) into `zip_path`.
pub fn zip_directory(dir: &Path, zip_path: &Path) -> Result<PathBuf, PipelineError> {
    let zip_err = |e: zip::result::ZipError| PipelineError::IOError(format!("{}: {}", zip_path.display(), e));

    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();

    let mut writer = ZipWriter::new(File::create(zip_path)?);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    for path in files {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if name.ends_with(".DS_Store") {
            continue;
        }
        writer.start_file(name.as_str(), options).map_err(zip_err)?;
        let mut source = File::open(&path)?;
        io::copy(&mut source, &mut writer)?;
    }

    writer.finish().map_err(zip_err)?;
    Ok(zip_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_unique_dirs_do_not_collide() -> io::Result<()> {
        let root = tempdir()?;
        let a = make_unique_dir(root.path(), "reads_file_")?;
        let b = make_unique_dir(root.path(), "reads_file_")?;
        assert_ne!(a, b);
        assert!(a.is_dir() && b.is_dir());
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("reads_file_"));
        Ok(())
    }

    #[test]
    fn test_genome_index_prefix_forward_and_reverse() -> Result<(), PipelineError> {
        let dir = tempdir()?;
        for name in ["GRCh38.rev.1.bt2", "GRCh38.rev.2.bt2", "GRCh38.1.bt2", "GRCh38.fa"] {
            File::create(dir.path().join(name))?;
        }
        assert_eq!(genome_index_prefix(dir.path())?, dir.path().join("GRCh38"));

        let rev_only = tempdir()?;
        File::create(rev_only.path().join("my.genome.rev.1.bt2l"))?;
        assert_eq!(genome_index_prefix(rev_only.path())?, rev_only.path().join("my.genome"));
        Ok(())
    }

    #[test]
    fn test_genome_index_prefix_missing() -> io::Result<()> {
        let dir = tempdir()?;
        File::create(dir.path().join("notes.txt"))?;
        assert!(matches!(
            genome_index_prefix(dir.path()),
            Err(PipelineError::DataIntegrity(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_relocate_file() -> io::Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("download.fq");
        std::fs::write(&src, "@r1\nACGT\n+\nIIII\n")?;
        let dst = dir.path().join("SE_reads.fastq");
        relocate_file(&src, &dst).await?;
        assert!(!src.exists());
        assert_eq!(std::fs::read_to_string(&dst)?, "@r1\nACGT\n+\nIIII\n");
        Ok(())
    }

    #[test]
    fn test_zip_directory_flattens_and_skips_ds_store() -> Result<(), PipelineError> {
        let dir = tempdir()?;
        let result = dir.path().join("tophat2_result_x");
        std::fs::create_dir_all(result.join("logs"))?;
        std::fs::write(result.join("align_summary.txt"), "summary")?;
        std::fs::write(result.join("logs").join("tophat.log"), "log")?;
        std::fs::write(result.join(".DS_Store"), "junk")?;

        let zip_path = zip_directory(&result, &dir.path().join("out.zip"))?;
        let mut archive = zip::ZipArchive::new(File::open(zip_path)?).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["align_summary.txt", "tophat.log"]);

        let mut content = String::new();
        archive.by_name("align_summary.txt").unwrap().read_to_string(&mut content)?;
        assert_eq!(content, "summary");
        Ok(())
    }
}
