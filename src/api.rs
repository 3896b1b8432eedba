use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::{
    play_info::{ApiResponse, PlayInfo, RoomPlayInfo},
    util,
};

pub const ROOM_PLAY_INFO_API: &str =
    "https://api.live.bilibili.com/xlive/web-room/v2/index/getRoomPlayInfo";

// qn=0 lets the platform pick
pub const DEFAULT_QUALITY: u32 = 0;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Could not fetch room info: {0}")]
    Http(#[from] util::HttpError),
    #[error("Could not parse room info")]
    Json(#[from] serde_json::Error),
    #[error("Platform returned error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("Unexpected room info: {0}")]
    Schema(String),
}

#[async_trait]
pub trait PlayInfoSource: Send + Sync {
    fn room_id(&self) -> u64;

    // Ok(None) while the room is offline
    async fn fetch(&self, quality: u32) -> Result<Option<PlayInfo>, FetchError>;
}

pub struct ApiClient {
    http: util::HttpClient,
    room_id: u64,
}

impl ApiClient {
    pub fn new(http: util::HttpClient, room_id: u64) -> Self {
        Self { http, room_id }
    }

    pub fn http(&self) -> &util::HttpClient {
        &self.http
    }

    pub fn api_url(&self, quality: u32) -> String {
        format!(
            "{}?room_id={}&protocol=0,1&format=0,2&codec=0,1&qn={}&platform=web&ptype=16",
            ROOM_PLAY_INFO_API, self.room_id, quality
        )
    }
}

#[async_trait]
impl PlayInfoSource for ApiClient {
    fn room_id(&self) -> u64 {
        self.room_id
    }

    async fn fetch(&self, quality: u32) -> Result<Option<PlayInfo>, FetchError> {
        let url = self.api_url(quality);
        debug!("GET {}", url);

        let body = self.http.fetch_text(&url).await?;
        parse_response(&body)
    }
}

fn room_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(?:https?://)?live\.bilibili\.com/(?:h5/)?)?(\d+)/?(?:[?#].*)?$")
            .expect("room URL pattern should compile")
    })
}

// Bare room id, or a live room URL such as https://live.bilibili.com/744393
pub fn parse_room_id(input: &str) -> Option<u64> {
    room_url_regex()
        .captures(input.trim())?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

pub fn parse_response(body: &str) -> Result<Option<PlayInfo>, FetchError> {
    let resp: ApiResponse = serde_json::from_str(body)?;

    if resp.code != 0 {
        return Err(FetchError::Api {
            code: resp.code,
            message: resp.message,
        });
    }

    let data: RoomPlayInfo = match resp.data {
        Some(data) if !data.is_null() => serde_json::from_value(data)?,
        _ => return Ok(None),
    };
    let info = match data.playurl_info {
        Some(info) => info,
        None => return Ok(None),
    };

    info.validate().map_err(FetchError::Schema)?;

    Ok(Some(info))
}
