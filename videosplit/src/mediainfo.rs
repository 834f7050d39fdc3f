use anyhow::Result;
use serde::*;
use std::path::Path;
use std::process::Command;

// Keyed by mediainfo's Format or CodecID values.
const CODEC_TO_EXT: &[(&str, &str)] = &[
    ("AAC", "aac"),
    ("AC3", "ac3"),
    ("AC-3", "ac3"),
    ("A_MPEG/L3", "mp3"),
    ("S_VOBSUB", "idx"),
    ("VobSub", "idx"),
    ("PGS", "sup"),
    ("S_TEXT/ASS", "sup"),
    ("S_TEXT", "srt"),
    ("tx3g", "srt"),
    ("AVC", "h264"),
    ("HEVC", "h265"),
];

#[derive(Deserialize)]
struct Report {
    media: Media,
}

#[derive(Deserialize)]
struct Media {
    track: Vec<RawTrack>,
}

#[derive(Deserialize)]
struct RawTrack {
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "@typeorder")]
    type_order: Option<String>,
    #[serde(rename = "ID")]
    id: Option<String>,
    #[serde(rename = "StreamOrder")]
    stream_order: Option<String>,
    #[serde(rename = "Format", default)]
    format: String,
    #[serde(rename = "CodecID", default)]
    codec_id: String,
    #[serde(rename = "Language")]
    language: Option<String>,
    #[serde(rename = "Forced")]
    forced: Option<String>,
    #[serde(rename = "Title")]
    title: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Container {
    Matroska,
    Mp4,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// mediainfo track type: Video, Audio or Text.
    pub kind: String,
    /// zero-based stream index, as mkvextract counts tracks.
    pub index: u64,
    /// position shown in the output file name; mediainfo's order within the
    /// type when known, the raw ID otherwise.
    pub label: String,
    pub language: String,
    pub title: String,
    pub ext: String,
}

impl Track {
    /// Name-extension for the track's output file.
    pub fn name(&self) -> String {
        if self.title.is_empty() {
            format!("{}.{}.{}", self.label, self.language, self.ext)
        } else {
            let title = self.title.replace('/', "-");
            format!("{}.{}.{}.{}", self.label, title, self.language, self.ext)
        }
    }
}

/// Read the container format and the available tracks from a video file.
pub fn probe(path: &Path) -> Result<(Container, Vec<Track>)> {
    let cmd = Command::new("mediainfo")
        .arg("--output=JSON")
        .arg(path)
        .output()?;

    let report = serde_json::from_slice(&cmd.stdout)?;
    Ok(parse_report(report))
}

fn parse_report(report: Report) -> (Container, Vec<Track>) {
    let mut container = Container::Other(String::new());
    let mut tracks = Vec::new();

    for track in report.media.track {
        if track.kind == "General" {
            container = match track.format.as_str() {
                "Matroska" => Container::Matroska,
                "MPEG-4" => Container::Mp4,
                other => Container::Other(other.to_owned()),
            };
            continue;
        }

        if track.kind == "Menu" {
            continue;
        }

        // IDs start at one; anything unnumbered is not extractable.
        let Some(id) = track
            .id
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&v| v > 0)
        else {
            continue;
        };

        let label = track
            .type_order
            .or(track.stream_order)
            .unwrap_or_else(|| id.to_string());

        let mut language = track
            .language
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "en".to_owned());

        if track.forced.as_deref() == Some("Yes") {
            language.push_str("-forced");
        }

        tracks.push(Track {
            ext: format_to_ext(&track.codec_id, &track.format),
            kind: track.kind,
            index: id - 1,
            label,
            language,
            title: track.title.unwrap_or_default(),
        });
    }

    (container, tracks)
}

/// Map a track to the file extension to save it under, trying the format
/// name, the codec id, then the codec id family before the first slash.
pub fn format_to_ext(codec: &str, format: &str) -> String {
    let family = codec.split('/').next().unwrap_or(codec);

    for key in [format, codec, family] {
        if let Some((_, ext)) = CODEC_TO_EXT.iter().find(|(name, _)| *name == key) {
            return (*ext).to_owned();
        }
    }

    log::warn!("Unknown track codec={:?} format={:?}", codec, format);
    format.to_owned()
}
