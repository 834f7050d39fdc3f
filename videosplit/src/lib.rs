mod mediainfo;

pub use mediainfo::{format_to_ext, probe, Container, Track};

use anyhow::{bail, Result};
use clap::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;

const EXT: &[&str] = &["mkv", "mp4", "m4v"];

#[derive(Debug, Parser)]
/// Extract audio, subtitle or video tracks from container files into
/// separate files. Needs mediainfo, mkvtoolnix and MP4Box on the path.
pub struct Args {
    #[arg(long, short)]
    /// save the tracks in another directory (default: next to the video)
    dst: Option<PathBuf>,

    #[arg(long, short = 'n')]
    /// print the commands instead of running them
    dry_run: bool,

    #[arg(long)]
    /// extract video tracks
    video: bool,

    #[arg(long)]
    /// extract audio tracks
    audio: bool,

    #[arg(long)]
    /// extract subtitle tracks
    subtitles: bool,

    #[arg(long)]
    /// extract chapters (Matroska only)
    chapters: bool,

    #[arg(required = true)]
    /// video file(s) or directories to scan
    files: Vec<PathBuf>,
}

impl Args {
    pub fn exec(&self) -> Result<()> {
        if !(self.video || self.audio || self.subtitles || self.chapters) {
            bail!("Nothing to do, pass at least one of --video/--audio/--subtitles/--chapters");
        }

        for path in self.files.iter().flat_map(|v| scan(v)) {
            log::info!("Parsing {:?}", path);

            if let Err(why) = self.split(&path) {
                log::error!("Failed to process {:?}\n{:#?}", path, why);
            }
        }

        Ok(())
    }

    fn wants(&self, kind: &str) -> bool {
        match kind {
            "Video" => self.video,
            "Audio" => self.audio,
            "Text" => self.subtitles,
            _ => false,
        }
    }

    fn split(&self, path: &Path) -> Result<()> {
        let target = self.target_base(path);
        let (container, mut tracks) = probe(path)?;
        tracks.retain(|v| self.wants(&v.kind));

        match container {
            Container::Matroska => self.split_mkv(path, &target, &tracks),
            Container::Mp4 => self.split_mp4(path, &target, &tracks),
            Container::Other(format) => {
                log::error!("{:?}: container {:?} is not supported", path, format);
                Ok(())
            }
        }
    }

    fn target_base(&self, path: &Path) -> PathBuf {
        let base = path.with_extension("");

        match &self.dst {
            Some(dst) if dst.is_dir() => dst.join(base.file_name().unwrap()),
            Some(dst) => dst.clone(),
            None => base,
        }
    }

    // mkvextract takes every selected track in one run.
    fn split_mkv(&self, path: &Path, target: &Path, tracks: &[Track]) -> Result<()> {
        let args = mkv_args(target, tracks, self.chapters);

        if args.is_empty() {
            log::info!("{:?}: no matching tracks found", path);
            return Ok(());
        }

        let mut command = Command::new("mkvextract");
        command.arg(path).args(args);
        self.run(command)
    }

    fn split_mp4(&self, path: &Path, target: &Path, tracks: &[Track]) -> Result<()> {
        if tracks.is_empty() {
            log::info!("{:?}: no matching tracks found", path);
            return Ok(());
        }

        for track in tracks {
            let output = format!("{}.{}", target.display(), track.name());
            // MP4Box counts tracks from one.
            let id = (track.index + 1).to_string();

            if track.ext == "srt" {
                // MP4Box has no srt output target, so capture its stdout.
                let mut command = Command::new("MP4Box");
                command.arg(path).args(["-std", "-srt", &id]);

                log::info!("Executing command\n{:?}", &command);

                if self.dry_run {
                    continue;
                }

                let out = command.output()?;
                if !out.status.success() {
                    bail!("MP4Box exited with {}", out.status);
                }

                fs::write(&output, &out.stdout)?;
            } else {
                let mut command = Command::new("MP4Box");
                command
                    .arg(path)
                    .arg("-raw")
                    .arg(format!("{id}:output={output}"));
                self.run(command)?;
            }
        }

        Ok(())
    }

    fn run(&self, mut command: Command) -> Result<()> {
        log::info!("Executing command\n{:?}", &command);

        if self.dry_run {
            return Ok(());
        }

        let status = command.spawn()?.wait()?;
        if !status.success() {
            bail!("{:?} exited with {}", command.get_program(), status);
        }

        Ok(())
    }
}

fn scan(path: &Path) -> Vec<PathBuf> {
    if !path.is_dir() {
        return vec![path.to_owned()];
    }

    WalkDir::new(path)
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
        .collect()
}

fn mkv_args(target: &Path, tracks: &[Track], chapters: bool) -> Vec<String> {
    let mut args = Vec::new();

    if chapters {
        args.push("chapters".to_owned());
        args.push(format!("{}.chapters.xml", target.display()));
    }

    if !tracks.is_empty() {
        args.push("tracks".to_owned());
        args.extend(
            tracks
                .iter()
                .map(|v| format!("{}:{}.{}", v.index, target.display(), v.name())),
        );
    }

    args
}
