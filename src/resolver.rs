use crate::{
    api::{FetchError, PlayInfoSource},
    selector::Codec,
};

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("Could not re-fetch room info")]
    Fetch(#[from] FetchError),
    #[error("Room went offline before the stream URL was resolved")]
    Offline,
    #[error("Codec {0} missing from re-fetched room info")]
    MissingCodec(Codec),
    #[error("Codec {0} has no URL info")]
    MissingUrlInfo(Codec),
}

// The platform only hands out complete URL fragments for the tier that was
// asked for, so the detection response can't be reused.
pub async fn resolve<S>(source: &S, codec: Codec, quality: u32) -> Result<String, ResolveError>
where
    S: PlayInfoSource + ?Sized,
{
    let info = source.fetch(quality).await?.ok_or(ResolveError::Offline)?;

    let entry = info
        .codec(codec.as_str())
        .ok_or(ResolveError::MissingCodec(codec))?;

    if entry.current_qn != 0 && entry.current_qn != quality {
        warn!(
            "Asked for {} quality {}, platform serves {}",
            codec, quality, entry.current_qn
        );
    }

    entry
        .stream_url()
        .ok_or(ResolveError::MissingUrlInfo(codec))
}
