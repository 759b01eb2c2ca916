//! Media retrieval for multimodal notifications
//!
//! Turns a webhook-supplied URL into a local file the gateway can attach.
//! Live streams (RTSP/HLS) are captured with ffmpeg for a bounded duration;
//! direct files are downloaded over HTTP.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

use crate::message::Segment;

const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".avi", ".mov", ".mkv", ".flv", ".webm", ".m4v", ".3gp", ".m3u8", ".ts", ".mpeg",
    ".mpg", ".wmv", ".asf", ".rm", ".rmvb",
];

const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".svg", ".ico", ".tiff", ".tif", ".heic",
    ".heif",
];

/// What kind of attachment a URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
    File,
}

/// URL path with query string removed and percent-encoding decoded
fn url_path(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);
    let path = without_query
        .split_once("://")
        .and_then(|(_, rest)| rest.split_once('/'))
        .map(|(_, path)| format!("/{path}"))
        .unwrap_or_default();

    urlencoding::decode(&path)
        .map(|decoded| decoded.to_lowercase())
        .unwrap_or_else(|_| path.to_lowercase())
}

/// Classify a URL by protocol and file extension
pub fn detect_kind(url: &str) -> MediaKind {
    let url_lower = url.to_lowercase();
    if ["rtsp://", "rtmp://", "rtspt://", "rtmpt://"]
        .iter()
        .any(|scheme| url_lower.starts_with(scheme))
    {
        return MediaKind::Video;
    }

    let path = url_path(url);
    if VIDEO_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) || url_lower.contains("m3u8") {
        return MediaKind::Video;
    }
    if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return MediaKind::Image;
    }
    MediaKind::File
}

/// Whether the URL is a live stream that needs bounded capture
fn is_stream(url: &str) -> bool {
    let url_lower = url.to_lowercase();
    ["rtsp://", "rtmp://", "rtspt://", "rtmpt://"]
        .iter()
        .any(|scheme| url_lower.starts_with(scheme))
        || url_path(url).contains(".m3u8")
}

/// The appropriate outbound segment for a fetched attachment
pub fn attachment_segment(kind: MediaKind, path: &Path) -> Segment {
    let path = path.to_string_lossy().to_string();
    match kind {
        MediaKind::Video => Segment::video(path),
        MediaKind::Image => Segment::Image { file: path },
        MediaKind::File => Segment::file(path),
    }
}

fn output_file(output_dir: &Path, prefix: &str, url: &str, default_ext: &str) -> PathBuf {
    let path = url_path(url);
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| format!(".{ext}"))
        .filter(|ext| ext != ".m3u8")
        .unwrap_or_else(|| default_ext.to_string());

    let token = Uuid::new_v4().simple().to_string();
    output_dir.join(format!("{prefix}_{}{ext}", &token[..8]))
}

/// Fetch the media behind `url` into `output_dir`.
///
/// `duration` caps live-stream capture in seconds; direct files ignore it.
pub async fn fetch(url: &str, duration: u64, output_dir: &Path) -> Result<(PathBuf, MediaKind)> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("creating media directory {}", output_dir.display()))?;

    let kind = detect_kind(url);
    let path = match kind {
        MediaKind::Video => capture_video(url, duration, output_dir).await?,
        MediaKind::Image => download(url, output_file(output_dir, "image", url, ".jpg")).await?,
        MediaKind::File => download(url, output_file(output_dir, "download", url, ".bin")).await?,
    };

    Ok((path, kind))
}

/// Capture a video URL with ffmpeg. A nonzero exit still counts as success
/// when the output file was produced, because ffmpeg reports broken stream
/// tails as errors after writing a perfectly usable file.
async fn capture_video(url: &str, duration: u64, output_dir: &Path) -> Result<PathBuf> {
    let output_path = output_file(output_dir, "video", url, ".mp4");
    let streaming = is_stream(url);

    let mut cmd = Command::new("ffmpeg");
    if streaming {
        cmd.args(["-extension_picky", "0", "-allowed_extensions", "ALL"]);
    }
    cmd.args(["-i", url]);
    if streaming {
        cmd.args(["-t", &duration.to_string()]);
    }
    cmd.args(["-c", "copy"]);
    if streaming {
        cmd.args(["-f", "mp4"]);
    }
    cmd.arg("-y").arg(&output_path);
    cmd.kill_on_drop(true);

    let timeout = if streaming {
        Duration::from_secs(duration + 30)
    } else {
        Duration::from_secs(300)
    };

    log::info!("Capturing video from {url} with ffmpeg...");
    let status = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| anyhow!("ffmpeg timed out capturing {url}"))?
        .context("running ffmpeg (is it installed?)")?;

    let produced = tokio::fs::metadata(&output_path)
        .await
        .map(|meta| meta.len() > 0)
        .unwrap_or(false);

    if !status.status.success() {
        if produced {
            log::info!(
                "ffmpeg exited with {:?}, but the output file was created",
                status.status.code()
            );
        } else {
            let stderr = String::from_utf8_lossy(&status.stderr);
            let _ = tokio::fs::remove_file(&output_path).await;
            bail!("ffmpeg failed for {url}: {stderr}");
        }
    } else if !produced {
        let _ = tokio::fs::remove_file(&output_path).await;
        bail!("ffmpeg produced no output for {url}");
    }

    log::info!("Captured video to {}", output_path.display());
    Ok(output_path)
}

/// Stream a direct file download to disk
async fn download(url: &str, output_path: PathBuf) -> Result<PathBuf> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("building download client")?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("downloading {url}"))?
        .error_for_status()
        .with_context(|| format!("download of {url} failed"))?;

    let mut file = tokio::fs::File::create(&output_path)
        .await
        .with_context(|| format!("creating {}", output_path.display()))?;

    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("reading download stream")?;
        file.write_all(&chunk).await.context("writing download")?;
        written += chunk.len() as u64;
    }
    file.flush().await.context("flushing download")?;

    if written == 0 {
        let _ = tokio::fs::remove_file(&output_path).await;
        bail!("downloaded file from {url} is empty");
    }

    log::info!("Downloaded {url} to {} ({written} bytes)", output_path.display());
    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_kind_by_protocol() {
        assert_eq!(detect_kind("rtsp://cam.local/stream"), MediaKind::Video);
        assert_eq!(detect_kind("rtmp://cam.local/live"), MediaKind::Video);
    }

    #[test]
    fn test_detect_kind_by_extension() {
        assert_eq!(detect_kind("http://host/clip.mp4"), MediaKind::Video);
        assert_eq!(detect_kind("http://host/live.m3u8?token=x"), MediaKind::Video);
        assert_eq!(detect_kind("http://host/photo.JPG"), MediaKind::Image);
        assert_eq!(detect_kind("http://host/report.pdf"), MediaKind::File);
        assert_eq!(detect_kind("http://host/page"), MediaKind::File);
    }

    #[test]
    fn test_detect_kind_percent_encoded() {
        assert_eq!(
            detect_kind("http://host/snapshot%20front%20door.png"),
            MediaKind::Image
        );
    }

    #[test]
    fn test_is_stream() {
        assert!(is_stream("rtsp://cam.local/stream"));
        assert!(is_stream("http://host/live.m3u8"));
        assert!(!is_stream("http://host/clip.mp4"));
    }

    #[test]
    fn test_output_file_extension() {
        let dir = PathBuf::from("/tmp");
        let path = output_file(&dir, "video", "http://host/clip.mkv", ".mp4");
        assert!(path.to_string_lossy().ends_with(".mkv"));

        // playlists produce an mp4, not an .m3u8 file
        let path = output_file(&dir, "video", "http://host/live.m3u8", ".mp4");
        assert!(path.to_string_lossy().ends_with(".mp4"));

        let path = output_file(&dir, "download", "http://host/no_extension", ".bin");
        assert!(path.to_string_lossy().ends_with(".bin"));
    }

    #[test]
    fn test_attachment_segment_types() {
        let path = Path::new("/tmp/x.mp4");
        assert!(matches!(
            attachment_segment(MediaKind::Video, path),
            Segment::Video { .. }
        ));
        assert!(matches!(
            attachment_segment(MediaKind::Image, path),
            Segment::Image { .. }
        ));
        assert!(matches!(
            attachment_segment(MediaKind::File, path),
            Segment::File { .. }
        ));
    }

    #[tokio::test]
    async fn test_fetch_downloads_direct_file() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/snapshot.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 64]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (file, kind) = fetch(
            &format!("{}/snapshot.png", server.uri()),
            60,
            dir.path(),
        )
        .await
        .unwrap();

        assert_eq!(kind, MediaKind::Image);
        assert_eq!(tokio::fs::metadata(&file).await.unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_fetch_empty_download_fails() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty.bin"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fetch(&format!("{}/empty.bin", server.uri()), 60, dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
