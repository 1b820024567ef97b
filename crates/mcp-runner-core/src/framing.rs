use crate::error::ChannelError;
use crate::message::Message;
use crate::stdio::OutputSink;
use tokio::io::AsyncRead;
use tokio_stream::StreamExt;
use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, FramedRead};
use tracing::warn;

/// Decodes a byte stream into text chunks without splitting multi-byte
/// characters; an incomplete trailing sequence waits for the next read.
///
/// Invalid sequences never end the stream: they are replaced with U+FFFD
/// and decoding continues after them.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8ChunkCodec;

impl Decoder for Utf8ChunkCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        match std::str::from_utf8(&src[..]) {
            Ok(s) => {
                let out = s.to_owned();
                src.clear();
                Ok(Some(out))
            }
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                if valid == 0 {
                    return Ok(None);
                }

                let out = String::from_utf8_lossy(&src[..valid]).into_owned();
                src.advance(valid);
                Ok(Some(out))
            }
            Err(e) => {
                let end = e.valid_up_to() + e.error_len().unwrap_or(1);
                warn!(offset = e.valid_up_to(), "Replacing invalid UTF-8 in input");
                let out = String::from_utf8_lossy(&src[..end]).into_owned();
                src.advance(end);
                Ok(Some(out))
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(chunk) = self.decode(src)? {
            return Ok(Some(chunk));
        }
        if src.is_empty() {
            return Ok(None);
        }
        // A truncated sequence at end of stream cannot complete anymore
        let out = String::from_utf8_lossy(&src[..]).into_owned();
        src.clear();
        Ok(Some(out))
    }
}

/// Remove every complete line from `buffer`, leaving the trailing fragment.
///
/// Lines may end in `\n` or `\r\n`; empty and whitespace-only lines are skipped.
pub fn drain_complete_lines(buffer: &mut String) -> Vec<String> {
    let Some(last_newline) = buffer.rfind('\n') else {
        return Vec::new();
    };

    let rest = buffer.split_off(last_newline + 1);
    let complete = std::mem::replace(buffer, rest);

    complete
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_owned)
        .collect()
}

/// Newline-delimited JSON-RPC decoder for the child's stdout.
///
/// A line that is not a JSON object is a decoding error and ends the stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageCodec;

impl MessageCodec {
    fn parse_line(line: &[u8]) -> Result<Message, ChannelError> {
        let text = std::str::from_utf8(line)
            .map_err(|e| ChannelError::InvalidMessage(format!("invalid UTF-8: {e}")))?;
        Message::parse(text).map_err(|e| ChannelError::InvalidMessage(e.to_string()))
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ChannelError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(position) = src.iter().position(|byte| *byte == b'\n') {
            let line = src.split_to(position + 1);
            let line = trim_line_ending(&line);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Self::parse_line(line).map(Some);
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        if src.iter().all(u8::is_ascii_whitespace) {
            src.clear();
            return Ok(None);
        }
        let line = src.split_to(src.len());
        Self::parse_line(trim_line_ending(&line)).map(Some)
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Copy `io` to `out` as UTF-8 text until end of stream.
pub async fn relay_text<R: AsyncRead + Unpin>(io: R, out: OutputSink) -> std::io::Result<()> {
    let mut frames = FramedRead::with_capacity(io, Utf8ChunkCodec, 1024);
    while let Some(frame) = frames.next().await {
        out.write_text(&frame?).await?;
    }
    Ok(())
}
