use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref YOUTUBE_WATCH_REGEX: Regex =
        Regex::new(r"youtube\.com/watch\?(?:.*&)?v=([A-Za-z0-9_-]+)").unwrap();
    static ref YOUTUBE_SHORT_REGEX: Regex = Regex::new(r"youtu\.be/([A-Za-z0-9_-]+)").unwrap();
    static ref VIMEO_REGEX: Regex = Regex::new(r"vimeo\.com/(\d+)").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum VideoEmbed {
    Youtube { embed_url: String },
    Vimeo { embed_url: String },
    /// Not a known host: the client plays the file directly
    File { url: String },
}

pub fn embed_for(video_url: &str) -> VideoEmbed {
    let url = video_url.trim();

    if let Some(caps) = YOUTUBE_WATCH_REGEX
        .captures(url)
        .or_else(|| YOUTUBE_SHORT_REGEX.captures(url))
    {
        return VideoEmbed::Youtube {
            embed_url: format!("https://www.youtube.com/embed/{}", &caps[1]),
        };
    }

    if let Some(caps) = VIMEO_REGEX.captures(url) {
        return VideoEmbed::Vimeo {
            embed_url: format!("https://player.vimeo.com/video/{}", &caps[1]),
        };
    }

    VideoEmbed::File {
        url: url.to_string(),
    }
}
