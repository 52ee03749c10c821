//! Minimal SSE line parser, adapted from the provider crate's streaming
//! response parser to the direction of data flow this crate needs:
//! consuming an upstream byte stream rather than relaying one downstream.

use bytes::Bytes;
use futures::Stream;
use tokio_stream::StreamExt;

#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

pub fn parse_sse_stream(
    byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<SseEvent, String>> + Send {
    futures::stream::unfold(
        (Box::pin(byte_stream), String::new()),
        |(mut stream, mut buffer)| async move {
            loop {
                if let Some(pos) = find_event_boundary(&buffer) {
                    let block = buffer[..pos].to_string();
                    let skip = if buffer[pos..].starts_with("\r\n\r\n") { 4 } else { 2 };
                    buffer = buffer[pos + skip..].to_string();
                    if let Some(event) = parse_event_block(&block) {
                        return Some((Ok(event), (stream, buffer)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => match std::str::from_utf8(&bytes) {
                        Ok(text) => buffer.push_str(text),
                        Err(e) => {
                            return Some((Err(format!("invalid UTF-8 in SSE stream: {e}")), (stream, buffer)));
                        }
                    },
                    Some(Err(e)) => {
                        return Some((Err(e.to_string()), (stream, buffer)));
                    }
                    None => {
                        if !buffer.trim().is_empty() {
                            let block = std::mem::take(&mut buffer);
                            if let Some(event) = parse_event_block(&block) {
                                return Some((Ok(event), (stream, buffer)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

fn find_event_boundary(s: &str) -> Option<usize> {
    s.find("\n\n").or_else(|| s.find("\r\n\r\n"))
}

fn parse_event_block(block: &str) -> Option<SseEvent> {
    let mut event_type: Option<String> = None;
    let mut data_lines: Vec<String> = Vec::new();

    for line in block.lines() {
        let line = line.trim_start_matches('\r');
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim_start().to_string());
        }
    }

    if data_lines.is_empty() {
        return None;
    }

    Some(SseEvent {
        event: event_type.unwrap_or_default(),
        data: data_lines.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_with_type() {
        let block = "event: put\ndata: {\"path\":\"/\"}";
        let event = parse_event_block(block).unwrap();
        assert_eq!(event.event, "put");
        assert_eq!(event.data, "{\"path\":\"/\"}");
    }

    #[test]
    fn parses_multiline_data() {
        let block = "event: patch\ndata: line1\ndata: line2";
        let event = parse_event_block(block).unwrap();
        assert_eq!(event.data, "line1\nline2");
    }

    #[test]
    fn skips_comment_only_block() {
        assert!(parse_event_block(": keep-alive").is_none());
    }
}
