use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use reqwest::Client;
use tokio::io::AsyncWriteExt;

use crate::fetch::USER_AGENT;
use crate::types::StreamCandidate;

/// Streams a resolved candidate to disk. This is the whole of the download
/// path; queueing, retries and library management belong to whatever wraps
/// the binary.
pub async fn download_to_file(candidate: &StreamCandidate, dest: &Path) -> Result<()> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("failed to create download HTTP client")?;

    let mut request = client.get(&candidate.url);
    for (key, value) in &candidate.headers {
        request = request.header(key, value);
    }
    let mut response = request
        .send()
        .await
        .with_context(|| format!("request failed for {}", candidate.url))?;
    let status = response.status();
    if !status.is_success() {
        bail!("HTTP {status}");
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create download directory {}", parent.display()))?;
    }
    let mut file = tokio::fs::File::create(dest)
        .await
        .with_context(|| format!("failed to create {}", dest.display()))?;

    let total = response.content_length();
    let mut written: u64 = 0;
    let mut last_report: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .with_context(|| format!("failed to read bytes for {}", candidate.url))?
    {
        file.write_all(&chunk)
            .await
            .with_context(|| format!("failed to write {}", dest.display()))?;
        written += chunk.len() as u64;
        if written - last_report >= 16 * 1024 * 1024 {
            last_report = written;
            match total {
                Some(total) if total > 0 => {
                    println!(
                        "Downloaded {} / {} MiB ({}%)",
                        written / (1024 * 1024),
                        total / (1024 * 1024),
                        written * 100 / total
                    );
                }
                _ => println!("Downloaded {} MiB", written / (1024 * 1024)),
            }
        }
    }
    file.flush()
        .await
        .with_context(|| format!("failed to flush {}", dest.display()))?;
    Ok(())
}

/// Builds a safe destination file name under `dir` for one episode.
pub fn download_dest(dir: &Path, title: &str, episode: &str, url: &str) -> PathBuf {
    let ext = infer_extension(url);
    dir.join(format!(
        "{} - Episode {}.{ext}",
        sanitize_segment(title),
        sanitize_segment(episode)
    ))
}

fn sanitize_segment(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | ' ') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim().to_string();
    if trimmed.is_empty() {
        String::from("unknown")
    } else {
        trimmed
    }
}

fn infer_extension(url: &str) -> String {
    let path = url.split('?').next().unwrap_or(url);
    match path.rsplit('.').next().map(|s| s.to_ascii_lowercase()) {
        Some(ext) if matches!(ext.as_str(), "mp4" | "mkv" | "webm" | "m3u8" | "ts") => ext,
        _ => String::from("mp4"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_names_are_sanitized() {
        let dest = download_dest(
            Path::new("/tmp"),
            "Great Show: Part 2",
            "1",
            "https://cdn.example/ep1.mp4?token=x",
        );
        assert_eq!(
            dest,
            Path::new("/tmp/Great Show_ Part 2 - Episode 1.mp4")
        );
    }

    #[test]
    fn unknown_extensions_default_to_mp4() {
        assert_eq!(infer_extension("https://cdn.example/stream"), "mp4");
        assert_eq!(infer_extension("https://cdn.example/x.m3u8"), "m3u8");
    }
}
