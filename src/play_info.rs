use serde::Deserialize;
use serde_aux::prelude::*;

// Shape of getRoomPlayInfo, trimmed to the fields this crate reads. `data` is
// kept loose so error bodies with an odd `data` still report their `code`.

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiResponse {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoomPlayInfo {
    #[serde(default)]
    pub playurl_info: Option<PlayInfo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlayInfo {
    pub playurl: PlayUrl,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlayUrl {
    pub stream: Vec<StreamDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamDescriptor {
    pub format: Vec<FormatDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FormatDescriptor {
    pub codec: Vec<CodecEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CodecEntry {
    pub codec_name: String,
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub current_qn: u32,
    pub accept_qn: Vec<u32>,
    pub base_url: String,
    pub url_info: Vec<UrlInfo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UrlInfo {
    pub host: String,
    pub extra: String,
}

impl CodecEntry {
    pub fn is_named(&self, name: &str) -> bool {
        self.codec_name.eq_ignore_ascii_case(name)
    }

    // accept_qn is sorted best first
    pub fn best_quality(&self) -> Option<u32> {
        self.accept_qn.first().copied()
    }

    pub fn stream_url(&self) -> Option<String> {
        self.url_info
            .first()
            .map(|info| format!("{}{}{}", info.host, self.base_url, info.extra))
    }
}

impl PlayInfo {
    // Only the first format of the first stream counts, the rest are redundant
    pub fn available_codecs(&self) -> &[CodecEntry] {
        self.playurl
            .stream
            .first()
            .and_then(|stream| stream.format.first())
            .map(|format| format.codec.as_slice())
            .unwrap_or(&[])
    }

    pub fn codec(&self, name: &str) -> Option<&CodecEntry> {
        self.available_codecs().iter().find(|c| c.is_named(name))
    }

    pub fn best_quality_for(&self, name: &str) -> Option<u32> {
        self.codec(name)?.best_quality()
    }

    pub fn validate(&self) -> Result<(), String> {
        let codecs = self.available_codecs();
        if codecs.is_empty() {
            return Err("live room has an empty codec list".into());
        }

        match codecs.iter().find(|c| c.accept_qn.is_empty()) {
            Some(c) => Err(format!("codec {} has no accepted quality", c.codec_name)),
            None => Ok(()),
        }
    }
}

// Codec name to best tier, in catalog order. Names compare case-insensitively
// and the first entry wins when a name repeats, as in `PlayInfo::codec`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodecCatalog {
    entries: Vec<(String, u32)>,
}

impl CodecCatalog {
    pub fn from_play_info(info: &PlayInfo) -> Self {
        let mut catalog = Self::default();
        for codec in info.available_codecs() {
            if let Some(qn) = codec.best_quality() {
                catalog.insert(&codec.codec_name, qn);
            }
        }
        catalog
    }

    fn insert(&mut self, name: &str, qn: u32) {
        if self.best_quality_for(name).is_none() {
            self.entries.push((name.to_string(), qn));
        }
    }

    pub fn best_quality_for(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, qn)| *qn)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }
}
