use std::fmt;

use crate::play_info::{CodecCatalog, PlayInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Avc,
    Hevc,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Avc => "avc",
            Codec::Hevc => "hevc",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CodecPolicy {
    /// HEVC at its best quality if offered, else AVC
    #[default]
    PreferHevc,
    /// Always AVC
    AvcOnly,
    /// Whichever codec reaches the higher quality, HEVC on a tie
    BestPreferHevc,
    /// Whichever codec reaches the higher quality, AVC on a tie
    BestPreferAvc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub codec: Codec,
    pub quality: u32,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SelectError {
    #[error("No supported codec in catalog (found: {0:?})")]
    NoKnownCodec(Vec<String>),
}

pub fn select(info: &PlayInfo, prefer_modern: bool) -> Result<Selection, SelectError> {
    let policy = if prefer_modern {
        CodecPolicy::PreferHevc
    } else {
        CodecPolicy::AvcOnly
    };
    select_with_policy(info, policy)
}

pub fn select_with_policy(info: &PlayInfo, policy: CodecPolicy) -> Result<Selection, SelectError> {
    let catalog = CodecCatalog::from_play_info(info);
    let avc = catalog.best_quality_for(Codec::Avc.as_str());
    let hevc = catalog.best_quality_for(Codec::Hevc.as_str());

    let pick = |codec, quality| Ok(Selection { codec, quality });

    match (avc, hevc) {
        (None, None) => Err(SelectError::NoKnownCodec(catalog.names())),
        (Some(avc), None) => pick(Codec::Avc, avc),
        (None, Some(hevc)) => {
            if policy == CodecPolicy::AvcOnly {
                warn!("AVC stream not offered, falling back to HEVC");
            }
            pick(Codec::Hevc, hevc)
        }
        (Some(avc), Some(hevc)) => match policy {
            CodecPolicy::PreferHevc => pick(Codec::Hevc, hevc),
            CodecPolicy::AvcOnly => pick(Codec::Avc, avc),
            CodecPolicy::BestPreferHevc if avc > hevc => pick(Codec::Avc, avc),
            CodecPolicy::BestPreferHevc => pick(Codec::Hevc, hevc),
            CodecPolicy::BestPreferAvc if hevc > avc => pick(Codec::Hevc, hevc),
            CodecPolicy::BestPreferAvc => pick(Codec::Avc, avc),
        },
    }
}
