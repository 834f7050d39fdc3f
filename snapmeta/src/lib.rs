mod cleanup;
mod metadata;

pub use cleanup::cleanup_name;
pub use metadata::{extract, Record, DEFAULT_IGNORE, TAIL_LEN};

use anyhow::{Context as _, Result};
use clap::*;
use rayon::prelude::*;
use std::fs;
use std::io::{Read as _, Seek as _, SeekFrom};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const EXT: &[&str] = &["avi", "tp", "mpg", "mp4"];

#[derive(Debug, Parser)]
/// Extract the show metadata embedded near the end of old SnapStream tv
/// recordings and pair it with the remuxed copies as json sidecar files.
pub struct Args {
    #[arg(long, short)]
    /// directory containing the recording files
    src: PathBuf,

    #[arg(long, short)]
    /// mirror directory to write the json into (print to stdout when absent)
    dst: Option<PathBuf>,

    #[arg(long, default_values_t = DEFAULT_IGNORE.iter().map(ToString::to_string))]
    /// metadata keys to drop, without the SS- prefix
    ignore: Vec<String>,

    #[arg(long, short)]
    /// process the files on a thread pool instead of one by one
    parallel: bool,
}

impl Args {
    pub fn exec(&self) -> Result<()> {
        let files = WalkDir::new(&self.src)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|v| v.file_type().is_file())
            .filter(|v| {
                v.path()
                    .extension()
                    .and_then(|x| x.to_str())
                    .filter(|x| EXT.contains(x))
                    .is_some()
            })
            .map(|v| v.into_path())
            .collect::<Vec<_>>();

        log::info!("Found {} recording files", files.len());

        if self.parallel {
            files.par_iter().for_each(|path| self.process(path));
        } else {
            files.iter().for_each(|path| self.process(path));
        }

        Ok(())
    }

    // One bad recording must not stop the scan.
    fn process(&self, path: &Path) {
        if let Err(why) = self.process_file(path) {
            log::error!("Failed to process {:?}\n{:#?}", path, why);
        }
    }

    fn process_file(&self, path: &Path) -> Result<()> {
        let data = read_tail(path, TAIL_LEN)?;

        let Some(mut record) = extract(&data, &self.ignore)? else {
            log::warn!("No metadata in {:?}", path);
            return Ok(());
        };

        let filename = path
            .file_name()
            .and_then(|v| v.to_str())
            .context("Invalid file name")?;

        record.insert("SOURCE".to_owned(), filename.to_owned());
        record.insert("SOURCE_CLEAN".to_owned(), cleanup_name(filename));

        let json = serde_json::to_string_pretty(&record)?;

        match &self.dst {
            Some(dst) => self.write_sidecar(dst, path, &json),
            None => {
                println!("{json}");
                Ok(())
            }
        }
    }

    /// Write the json next to the remuxed copy of `path` under `dst`,
    /// mirroring the source directory layout. The sidecar only makes sense
    /// beside its mkv, so nothing is written when that is missing, and an
    /// existing sidecar is never overwritten.
    fn write_sidecar(&self, dst: &Path, path: &Path, json: &str) -> Result<()> {
        let rel = path.strip_prefix(&self.src).unwrap_or(path);
        let dir = match rel.parent() {
            Some(parent) => dst.join(parent),
            None => dst.to_owned(),
        };

        let stem = path
            .file_stem()
            .and_then(|v| v.to_str())
            .context("Invalid file name")?;
        let clean = cleanup_name(stem);

        let remux = dir.join(format!("{clean}.mkv"));
        let sidecar = dir.join(format!("{clean}.json"));

        if !remux.exists() {
            log::warn!("Missing {:?} for {:?}", remux, path);
            return Ok(());
        }

        if sidecar.exists() {
            log::info!("Keeping existing {:?}", sidecar);
            return Ok(());
        }

        log::info!("Writing {:?}", sidecar);
        fs::write(&sidecar, json)?;

        // The sidecar should carry the recording's dates, not today's.
        let meta = fs::metadata(path)?;
        filetime::set_file_times(
            &sidecar,
            filetime::FileTime::from_last_access_time(&meta),
            filetime::FileTime::from_last_modification_time(&meta),
        )?;

        Ok(())
    }
}

fn read_tail(path: &Path, len: u64) -> Result<Vec<u8>> {
    let mut file = fs::File::open(path)?;

    if file.metadata()?.len() > len {
        file.seek(SeekFrom::End(-(len as i64)))?;
    }

    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(src: &Path, dst: Option<&Path>) -> Args {
        Args {
            src: src.to_owned(),
            dst: dst.map(Path::to_owned),
            ignore: DEFAULT_IGNORE.iter().map(ToString::to_string).collect(),
            parallel: false,
        }
    }

    fn recording() -> Vec<u8> {
        let mut data = vec![b'x'; 512];
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(b"SS-Actors\0\0SS-Genre\0Comedy\0SS-ShowSqueeze\0Yes\0");
        data
    }

    #[test]
    fn read_tail_returns_the_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        fs::write(&path, b"0123456789").unwrap();

        assert_eq!(read_tail(&path, 4).unwrap(), b"6789");
        assert_eq!(read_tail(&path, 100).unwrap(), b"0123456789");
    }

    #[test]
    fn sidecar_lands_next_to_the_remux() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("test1.avi"), recording()).unwrap();
        fs::write(dst.path().join("test1.mkv"), b"").unwrap();

        args(src.path(), Some(dst.path())).exec().unwrap();

        let json = fs::read_to_string(dst.path().join("test1.json")).unwrap();
        let record: Record = serde_json::from_str(&json).unwrap();

        assert_eq!(record["SOURCE"], "test1.avi");
        assert_eq!(record["SOURCE_CLEAN"], "test1.avi");
        assert_eq!(record["Actors"], "");
        assert_eq!(record["Genre"], "Comedy");
        assert!(!record.contains_key("ShowSqueeze"));

        let src_meta = fs::metadata(src.path().join("test1.avi")).unwrap();
        let sidecar_meta = fs::metadata(dst.path().join("test1.json")).unwrap();
        assert_eq!(
            filetime::FileTime::from_last_modification_time(&sidecar_meta),
            filetime::FileTime::from_last_modification_time(&src_meta),
        );
    }

    #[test]
    fn missing_remux_skips_the_write() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("test1.avi"), recording()).unwrap();

        args(src.path(), Some(dst.path())).exec().unwrap();

        assert!(!dst.path().join("test1.json").exists());
    }

    #[test]
    fn existing_sidecar_is_kept() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("test1.avi"), recording()).unwrap();
        fs::write(dst.path().join("test1.mkv"), b"").unwrap();
        fs::write(dst.path().join("test1.json"), b"keep").unwrap();

        args(src.path(), Some(dst.path())).exec().unwrap();

        assert_eq!(fs::read(dst.path().join("test1.json")).unwrap(), b"keep");
    }

    #[test]
    fn files_without_metadata_are_not_fatal() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("empty.avi"), b"no table here").unwrap();

        args(src.path(), Some(dst.path())).exec().unwrap();

        assert!(!dst.path().join("empty.json").exists());
    }
}
