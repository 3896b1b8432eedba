use serde_json::json;

use crate::play_info::PlayInfo;

pub fn get_test_json(fname: &str) -> String {
    let mut d = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    d.push("resources/test/");
    d.push(fname);
    std::fs::read_to_string(d).expect(format!("Could not read {}", fname).as_str())
}

// Single stream and format; every codec points at
// https://a.example/live/<name>?auth=1
pub fn play_info(codecs: &[(&str, Vec<u32>)]) -> PlayInfo {
    play_info_with_urls(
        &codecs
            .iter()
            .map(|(name, qn)| {
                (
                    *name,
                    qn.clone(),
                    "https://a.example",
                    format!("/live/{}", name),
                    "?auth=1",
                )
            })
            .collect::<Vec<_>>(),
    )
}

pub fn play_info_with_urls(codecs: &[(&str, Vec<u32>, &str, String, &str)]) -> PlayInfo {
    let codec: Vec<_> = codecs
        .iter()
        .map(|(name, qn, host, base_url, extra)| {
            json!({
                "codec_name": name,
                "current_qn": qn.first().copied().unwrap_or(0),
                "accept_qn": qn,
                "base_url": base_url,
                "url_info": [{ "host": host, "extra": extra }],
            })
        })
        .collect();

    serde_json::from_value(json!({
        "playurl": {
            "stream": [{
                "format": [{ "codec": codec }],
            }],
        }
    }))
    .expect("Could not build PlayInfo")
}
