//! Server-Sent Events 传输
//!
//! `GET {base}/notifications/stream?userId=<id>`，只消费名为 `notification` 的事件。

use futures_util::StreamExt;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ChannelHandle, ChannelSink, NotificationTransport};
use crate::client::authorize;
use crate::error::{NotifyError, Result};
use crate::identity::Identity;
use crate::notification::event::NotificationEvent;

/// 通知事件名
pub const NOTIFICATION_EVENT: &str = "notification";

/// 单行上限，超出即判定通道失败
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// 单条消息 data 累计上限
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// 一条完整的 SSE 消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    pub event: String,
    pub data: String,
}

/// 增量 SSE 解码器，可以喂入任意切分的字节块
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// 未成行的字节（可能截断在 UTF-8 字符中间）
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    data_bytes: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 喂入一个字节块，返回其中完成的消息。
    /// 行或消息超出上限时返回 `Transport` 错误，解码器随之作废。
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseMessage>> {
        self.pending.extend_from_slice(chunk);
        let mut messages = Vec::new();

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            if pos > MAX_LINE_BYTES {
                return Err(line_too_long(pos));
            }
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = text.strip_suffix('\r').unwrap_or(&text);

            if line.is_empty() {
                if let Some(message) = self.dispatch() {
                    messages.push(message);
                }
                continue;
            }
            self.field(line)?;
        }

        if self.pending.len() > MAX_LINE_BYTES {
            return Err(line_too_long(self.pending.len()));
        }
        Ok(messages)
    }

    fn field(&mut self, line: &str) -> Result<()> {
        // 注释行（心跳）
        if line.starts_with(':') {
            return Ok(());
        }
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match name {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                self.data_bytes += value.len() + 1;
                if self.data_bytes > MAX_MESSAGE_BYTES {
                    return Err(NotifyError::Transport(format!(
                        "message exceeds {} bytes",
                        MAX_MESSAGE_BYTES
                    )));
                }
                self.data.push(value.to_string());
            }
            _ => {}
        }
        Ok(())
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let event = self.event.take();
        self.data_bytes = 0;
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseMessage {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

fn line_too_long(len: usize) -> NotifyError {
    NotifyError::Transport(format!("line of {} bytes exceeds {}", len, MAX_LINE_BYTES))
}

/// SSE 推送通道
#[derive(Debug, Clone)]
pub struct SseTransport {
    client: Client,
    base_url: String,
}

impl SseTransport {
    /// 长连接只限制建连时间，不设整体超时
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| NotifyError::Transport(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn stream_url(&self, identity: &Identity) -> String {
        format!(
            "{}/notifications/stream?userId={}",
            self.base_url, identity.user_id
        )
    }
}

impl NotificationTransport for SseTransport {
    fn open(&self, identity: &Identity, sink: Arc<dyn ChannelSink>) -> ChannelHandle {
        let handle = ChannelHandle::new();
        let cancel = handle.token();
        let client = self.client.clone();
        let url = self.stream_url(identity);
        let identity = identity.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(user_id = identity.user_id, "Stream closed");
                    return;
                }
                result = run_stream(&client, &url, &identity, sink.as_ref()) => result,
            };

            if cancel.is_cancelled() {
                return;
            }
            let error = match result {
                Ok(()) => NotifyError::Transport("stream ended by server".to_string()),
                Err(e) => e,
            };
            warn!(user_id = identity.user_id, error = %error, "Stream failed");
            sink.on_error(error);
        });

        handle
    }
}

/// 读取整条流；正常返回表示服务端关闭了连接
async fn run_stream(
    client: &Client,
    url: &str,
    identity: &Identity,
    sink: &dyn ChannelSink,
) -> Result<()> {
    let response = authorize(client.get(url), identity)
        .header("Accept", "text/event-stream")
        .send()
        .await
        .map_err(|e| NotifyError::Transport(format!("connect failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(NotifyError::Transport(format!("HTTP {}", status)));
    }

    info!(user_id = identity.user_id, "Stream connected");
    sink.on_open();

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| NotifyError::Transport(format!("stream error: {}", e)))?;
        for message in decoder.feed(&chunk)? {
            if message.event != NOTIFICATION_EVENT {
                continue;
            }
            match NotificationEvent::decode(&message.data) {
                Ok(event) => sink.on_event(event),
                Err(e) => warn!(error = %e, data = %message.data, "Skipping malformed notification"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_handles_split_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: notif").unwrap().is_empty());
        assert!(decoder.feed(b"ication\r\ndata: {\"id\":").unwrap().is_empty());

        let messages = decoder.feed(b"1}\r\n\r\n").unwrap();
        assert_eq!(
            messages,
            vec![SseMessage {
                event: "notification".to_string(),
                data: "{\"id\":1}".to_string(),
            }]
        );
    }

    #[test]
    fn test_decoder_ignores_comments_and_empty_events() {
        let mut decoder = SseDecoder::new();
        let messages = decoder
            .feed(b":keepalive\n\nevent: ping\n\nid: 4\ndata: a\ndata: b\n\n")
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event, "message");
        assert_eq!(messages[0].data, "a\nb");
    }

    #[test]
    fn test_decoder_keeps_split_utf8() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: 好\n\n".as_bytes();
        assert!(decoder.feed(&bytes[..7]).unwrap().is_empty());
        let messages = decoder.feed(&bytes[7..]).unwrap();
        assert_eq!(messages[0].data, "好");
    }

    #[test]
    fn test_decoder_rejects_unterminated_line() {
        let mut decoder = SseDecoder::new();
        let chunk = vec![b'x'; MAX_LINE_BYTES];
        assert!(decoder.feed(b"data: ").unwrap().is_empty());

        let err = decoder.feed(&chunk).unwrap_err();
        assert!(matches!(err, NotifyError::Transport(msg) if msg.contains("exceeds")));
    }

    #[test]
    fn test_decoder_rejects_oversized_message() {
        let mut decoder = SseDecoder::new();
        let line = format!("data: {}\n", "y".repeat(60 * 1024));
        let err = (0..20).find_map(|_| decoder.feed(line.as_bytes()).err());
        assert!(matches!(err, Some(NotifyError::Transport(msg)) if msg.contains("message exceeds")));
    }

    #[test]
    fn test_decoder_accepts_line_at_limit() {
        let mut decoder = SseDecoder::new();
        let mut line = b"data: ".to_vec();
        line.resize(MAX_LINE_BYTES, b'z');
        line.extend_from_slice(b"\n\n");

        let messages = decoder.feed(&line).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data.len(), MAX_LINE_BYTES - 6);
    }

    #[test]
    fn test_stream_url() {
        let transport = SseTransport::new("http://host/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            transport.stream_url(&Identity::new(42)),
            "http://host/api/notifications/stream?userId=42"
        );
    }
}
