//! mpv backend. The player is spawned with an IPC socket and polled for
//! `time-pos` / `duration` once a second by the session coordinator; header
//! and subtitle handling mirrors what mpv expects on its command line.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::PlayerError;
use crate::session::{PlaybackRequest, PlaybackStatus, PlayerBackend};

pub const PLAYER_ENV_KEY: &str = "ANZU_PLAYER";

/// Player command from the environment, split shell-style so
/// `ANZU_PLAYER="flatpak run io.mpv.Mpv"` works. Defaults to plain mpv.
pub fn player_command() -> (String, Vec<String>) {
    let raw = std::env::var(PLAYER_ENV_KEY)
        .ok()
        .filter(|val| !val.trim().is_empty())
        .unwrap_or_else(|| "mpv".to_string());
    match shlex::split(&raw) {
        Some(parts) if !parts.is_empty() => {
            let mut iter = parts.into_iter();
            let program = iter.next().unwrap_or_else(|| "mpv".to_string());
            (program, iter.collect())
        }
        _ => (raw, Vec::new()),
    }
}

pub struct MpvBackend {
    child: Option<Child>,
    reader: Option<BufReader<OwnedReadHalf>>,
    writer: Option<OwnedWriteHalf>,
    socket_path: PathBuf,
    request_id: u64,
}

impl MpvBackend {
    pub fn new() -> Self {
        let socket_path =
            std::env::temp_dir().join(format!("anzu-mpv-{}.sock", std::process::id()));
        Self {
            child: None,
            reader: None,
            writer: None,
            socket_path,
            request_id: 0,
        }
    }

    async fn connect(&mut self) -> Result<(), PlayerError> {
        // mpv creates the socket shortly after startup
        for _ in 0..50 {
            match UnixStream::connect(&self.socket_path).await {
                Ok(stream) => {
                    let (read, write) = stream.into_split();
                    self.reader = Some(BufReader::new(read));
                    self.writer = Some(write);
                    return Ok(());
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
        Err(PlayerError::Protocol(
            "mpv did not open its IPC socket".to_string(),
        ))
    }

    async fn command(&mut self, command: Vec<Value>) -> Result<Option<Value>, PlayerError> {
        self.request_id += 1;
        let request_id = self.request_id;
        let payload = serde_json::json!({
            "command": command,
            "request_id": request_id,
        });
        let line = format!("{payload}\n");

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| PlayerError::Protocol("IPC socket not connected".to_string()))?;
        writer.write_all(line.as_bytes()).await?;

        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| PlayerError::Protocol("IPC socket not connected".to_string()))?;
        // skip asynchronous event lines until our reply comes back
        loop {
            let mut response = String::new();
            let read = reader.read_line(&mut response).await?;
            if read == 0 {
                return Err(PlayerError::Protocol("IPC socket closed".to_string()));
            }
            match parse_ipc_reply(&response, request_id) {
                IpcReply::Data(data) => return Ok(data),
                IpcReply::Unavailable => return Ok(None),
                IpcReply::Error(message) => return Err(PlayerError::Protocol(message)),
                IpcReply::NotOurs => continue,
            }
        }
    }

    async fn get_property_f64(&mut self, name: &str) -> Result<Option<f64>, PlayerError> {
        let data = self
            .command(vec![Value::from("get_property"), Value::from(name)])
            .await?;
        Ok(data.and_then(|v| v.as_f64()))
    }
}

impl Default for MpvBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerBackend for MpvBackend {
    async fn load(&mut self, request: PlaybackRequest) -> Result<(), PlayerError> {
        let (program, base_args) = player_command();
        let mut cmd = Command::new(&program);
        cmd.args(&base_args);
        cmd.arg("--quiet");
        cmd.arg("--terminal=no");
        cmd.arg(format!("--force-media-title={}", request.title));
        cmd.arg(format!(
            "--input-ipc-server={}",
            self.socket_path.display()
        ));
        if let Some(sub) = &request.subtitle {
            cmd.arg(format!("--sub-file={sub}"));
        }
        for (key, value) in &request.headers {
            if key.eq_ignore_ascii_case("user-agent") {
                cmd.arg(format!("--user-agent={value}"));
            } else if key.eq_ignore_ascii_case("referer") {
                cmd.arg(format!("--referrer={value}"));
                cmd.arg(format!("--http-header-fields=Referer: {value}"));
            } else {
                cmd.arg(format!("--http-header-fields={key}: {value}"));
            }
        }
        cmd.arg(&request.url);
        cmd.kill_on_drop(true);

        debug!(%program, url = %request.url, "launching player");
        let child = cmd.spawn().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                PlayerError::NotFound(program.clone())
            } else {
                PlayerError::Ipc(err)
            }
        })?;
        self.child = Some(child);
        self.connect().await?;
        if let Some(resume) = request.resume_from {
            // mpv may still be opening the file; a refused seek just means
            // playback starts from zero
            self.seek(resume).await.ok();
        }
        Ok(())
    }

    async fn status(&mut self) -> Result<PlaybackStatus, PlayerError> {
        if let Some(child) = &mut self.child {
            if let Ok(Some(_)) = child.try_wait() {
                return Ok(PlaybackStatus {
                    ended: true,
                    ..Default::default()
                });
            }
        }
        let position_secs = self.get_property_f64("time-pos").await?;
        let duration_secs = self
            .get_property_f64("duration")
            .await?
            .filter(|d| d.is_finite() && *d > 0.0);
        Ok(PlaybackStatus {
            position_secs,
            duration_secs,
            ended: false,
        })
    }

    async fn seek(&mut self, secs: f64) -> Result<(), PlayerError> {
        self.command(vec![
            Value::from("seek"),
            Value::from(secs),
            Value::from("absolute"),
        ])
        .await?;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PlayerError> {
        if self.writer.is_some() {
            // best effort; the player may already be gone
            self.command(vec![Value::from("quit")]).await.ok();
        }
        self.reader = None;
        self.writer = None;
        let status = match self.child.take() {
            Some(mut child) => child.wait().await.ok(),
            None => None,
        };
        std::fs::remove_file(&self.socket_path).ok();
        if let Some(status) = status {
            if !status.success() {
                return Err(PlayerError::Exited(status));
            }
        }
        Ok(())
    }
}

enum IpcReply {
    Data(Option<Value>),
    Unavailable,
    Error(String),
    NotOurs,
}

fn parse_ipc_reply(line: &str, request_id: u64) -> IpcReply {
    #[derive(Deserialize)]
    struct RawReply {
        #[serde(default)]
        data: Option<Value>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        request_id: Option<u64>,
        #[serde(default)]
        event: Option<String>,
    }

    let Ok(reply) = serde_json::from_str::<RawReply>(line) else {
        return IpcReply::NotOurs;
    };
    if reply.event.is_some() || reply.request_id != Some(request_id) {
        return IpcReply::NotOurs;
    }
    match reply.error.as_deref() {
        Some("success") => IpcReply::Data(reply.data),
        Some("property unavailable") => IpcReply::Unavailable,
        Some(other) => IpcReply::Error(other.to_string()),
        None => IpcReply::Data(reply.data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_reply_carries_the_data() {
        let line = r#"{"data":421.5,"error":"success","request_id":7}"#;
        match parse_ipc_reply(line, 7) {
            IpcReply::Data(Some(value)) => assert_eq!(value.as_f64(), Some(421.5)),
            _ => panic!("expected data"),
        }
    }

    #[test]
    fn unavailable_property_is_a_skip_not_an_error() {
        let line = r#"{"error":"property unavailable","request_id":3}"#;
        assert!(matches!(parse_ipc_reply(line, 3), IpcReply::Unavailable));
    }

    #[test]
    fn event_lines_are_ignored() {
        let line = r#"{"event":"playback-restart"}"#;
        assert!(matches!(parse_ipc_reply(line, 1), IpcReply::NotOurs));
    }

    #[test]
    fn replies_to_other_requests_are_ignored() {
        let line = r#"{"data":1.0,"error":"success","request_id":2}"#;
        assert!(matches!(parse_ipc_reply(line, 9), IpcReply::NotOurs));
    }

    #[test]
    fn player_command_splits_shell_style() {
        // SAFETY: test process is single-threaded at this point
        unsafe { std::env::set_var(PLAYER_ENV_KEY, "flatpak run io.mpv.Mpv --fs") };
        let (program, args) = player_command();
        assert_eq!(program, "flatpak");
        assert_eq!(args, vec!["run", "io.mpv.Mpv", "--fs"]);
        unsafe { std::env::remove_var(PLAYER_ENV_KEY) };
    }
}
