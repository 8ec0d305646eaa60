//! Newline-delimited JSON over stdio. One request per line, one reply per
//! line; requests are handled concurrently and replies carry the request id.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tracing::{debug, warn};

use crate::{
    error::RunnerError,
    execution::Engine,
    files::DEFAULT_MAX_SIZE_KB,
};

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    ExecuteCode {
        code: String,
        #[serde(default)]
        requirements: String,
    },
    ReadFile {
        path: String,
        #[serde(default = "default_max_size_kb")]
        max_size_kb: u64,
    },
    ReadImageFile {
        path: String,
    },
}

fn default_max_size_kb() -> u64 {
    DEFAULT_MAX_SIZE_KB
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Value,
    #[serde(flatten)]
    request: Request,
}

#[derive(Debug, Serialize)]
struct Response {
    id: Value,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
}

impl Response {
    fn ok(id: Value, result: Value) -> Self {
        Self { id, ok: true, result: Some(result), error: None, error_kind: None }
    }

    fn err(id: Value, message: String, kind: &'static str) -> Self {
        Self { id, ok: false, result: None, error: Some(message), error_kind: Some(kind) }
    }
}

pub async fn dispatch(engine: &Engine, request: Request) -> Result<Value, RunnerError> {
    let value = match request {
        Request::ExecuteCode { code, requirements } => {
            serde_json::to_value(engine.execute_code(&code, &requirements).await?)
        }
        Request::ReadFile { path, max_size_kb } => {
            serde_json::to_value(engine.read_file(&path, max_size_kb)?)
        }
        Request::ReadImageFile { path } => serde_json::to_value(engine.read_image(&path)?),
    };
    value.map_err(|e| RunnerError::Io(e.into()))
}

/// Handle one request line. Never fails: every error becomes an error reply.
pub async fn handle_line(engine: &Engine, line: &str) -> String {
    let response = match serde_json::from_str::<Envelope>(line) {
        Ok(Envelope { id, request }) => match dispatch(engine, request).await {
            Ok(result) => Response::ok(id, result),
            Err(e) => {
                warn!(kind = e.kind(), "request failed");
                Response::err(id, e.to_string(), e.kind())
            }
        },
        Err(e) => Response::err(Value::Null, format!("invalid request: {e}"), "invalid_request"),
    };
    serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"ok":false,"error":"unserializable response"}"#.to_string())
}

pub async fn serve<R, W>(engine: Arc<Engine>, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let write = async move {
        while let Some(reply) = rx.recv().await {
            writer.write_all(reply.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<_, anyhow::Error>(())
    };

    let (r, w) = tokio::join!(read_requests(engine, reader, tx), write);
    r?;
    w?;
    Ok(())
}

/// Spawns a task per request. Returns once input is exhausted; replies still
/// in flight hold their own sender.
async fn read_requests<R>(engine: Arc<Engine>, reader: R, tx: mpsc::UnboundedSender<String>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        debug!(len = line.len(), "request");
        let engine = engine.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let reply = handle_line(&engine, &line).await;
            let _ = tx.send(reply);
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::RunnerSettings, process::Tool};

    fn engine(dir: &std::path::Path) -> Engine {
        let mut settings = RunnerSettings::new(dir);
        settings.package_manager = Tool::new("definitely-not-a-real-program");
        Engine::new(settings)
    }

    #[tokio::test]
    async fn malformed_lines_get_error_replies() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = engine(tmp.path());

        let reply: Value = serde_json::from_str(&handle_line(&engine, "not json").await)?;
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error_kind"], "invalid_request");

        let reply: Value =
            serde_json::from_str(&handle_line(&engine, r#"{"id":1,"op":"launch"}"#).await)?;
        assert_eq!(reply["ok"], false);
        Ok(())
    }

    #[tokio::test]
    async fn read_file_round_trip() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        std::fs::write(tmp.path().join("notes.txt"), "hi")?;
        let engine = engine(tmp.path());

        let reply: Value = serde_json::from_str(
            &handle_line(&engine, r#"{"id":"a","op":"read_file","path":"notes.txt"}"#).await,
        )?;
        assert_eq!(reply["id"], "a");
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["result"], "File: notes.txt\n\n```txt\nhi\n```");

        let reply: Value = serde_json::from_str(
            &handle_line(&engine, r#"{"id":2,"op":"read_image_file","path":"../x.png"}"#).await,
        )?;
        assert_eq!(reply["error_kind"], "access_denied");
        Ok(())
    }

    #[tokio::test]
    async fn serve_answers_every_line() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = Arc::new(engine(tmp.path()));
        let input: &'static [u8] =
            b"{\"id\":1,\"op\":\"read_file\",\"path\":\"missing\"}\n\ngarbage\n";
        let mut out = Vec::new();
        serve(engine, tokio::io::BufReader::new(input), &mut out).await?;

        let replies: Vec<Value> = String::from_utf8(out)?
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(replies.len(), 2);
        assert!(replies.iter().all(|r| r["ok"] == false));
        Ok(())
    }
}
