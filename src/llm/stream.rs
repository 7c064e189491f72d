//! Incremental SSE decoding.
//!
//! Providers deliver `event:` / `data:` frames as byte chunks that do not
//! respect line boundaries. [`StreamParser`] keeps the incomplete tail of the
//! last chunk and only interprets complete lines. Bytes are buffered rather
//! than text so a multi-byte character split across chunks decodes intact.
//!
//! What a `data:` payload means is provider specific; that knowledge lives
//! behind [`DeltaDecoder`].

use serde_json::Value;
use tracing::debug;

/// Turns one decoded `data:` payload into a text delta, if it carries one.
pub trait DeltaDecoder {
    /// `event` is the name from a preceding `event:` line, if any.
    fn decode_delta(&self, event: Option<&str>, payload: &Value) -> Option<String>;
}

impl<D: DeltaDecoder + ?Sized> DeltaDecoder for &D {
    fn decode_delta(&self, event: Option<&str>, payload: &Value) -> Option<String> {
        (**self).decode_delta(event, payload)
    }
}

/// Decoder for the relay's own framing (`event: chunk` + `data: {"text": ...}`),
/// as produced by [`crate::types::StreamEvent::to_sse`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayEventDecoder;

impl DeltaDecoder for RelayEventDecoder {
    fn decode_delta(&self, event: Option<&str>, payload: &Value) -> Option<String> {
        match event {
            None | Some("chunk") => payload
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_string),
            Some(_) => None,
        }
    }
}

pub struct StreamParser<D> {
    decoder: D,
    pending: Vec<u8>,
    current_event: Option<String>,
}

impl<D: DeltaDecoder> StreamParser<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            pending: Vec::new(),
            current_event: None,
        }
    }

    /// Feed one network chunk; `sink` receives each delta in order.
    pub fn feed(&mut self, chunk: &[u8], sink: &mut impl FnMut(String)) {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return;
        };
        let tail = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, tail);

        for line in complete.split(|b| *b == b'\n') {
            self.process_line(line, sink);
        }
    }

    /// Flush at end of stream: a leftover partial line is processed as a
    /// final line batch.
    pub fn finish(&mut self, sink: &mut impl FnMut(String)) {
        if self.pending.is_empty() {
            return;
        }
        let rest = std::mem::take(&mut self.pending);
        for line in rest.split(|b| *b == b'\n') {
            self.process_line(line, sink);
        }
    }

    fn process_line(&mut self, raw: &[u8], sink: &mut impl FnMut(String)) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        if let Some(name) = line.strip_prefix("event:") {
            self.current_event = Some(name.trim().to_string());
            return;
        }

        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        let event = self.current_event.take();

        if data == "[DONE]" {
            return;
        }

        match serde_json::from_str::<Value>(data) {
            Ok(payload) => {
                if let Some(delta) = self.decoder.decode_delta(event.as_deref(), &payload) {
                    sink(delta);
                }
            }
            Err(e) => {
                debug!(error = %e, "skipping malformed stream frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect<D: DeltaDecoder>(decoder: D, chunks: &[&[u8]]) -> Vec<String> {
        let mut parser = StreamParser::new(decoder);
        let mut out = Vec::new();
        for chunk in chunks {
            parser.feed(chunk, &mut |d| out.push(d));
        }
        parser.finish(&mut |d| out.push(d));
        out
    }

    fn split_every(bytes: &[u8], size: usize) -> Vec<&[u8]> {
        bytes.chunks(size).collect()
    }

    #[test]
    fn test_single_byte_chunks() {
        let stream: &[u8] = b"event: chunk\ndata: {\"text\":\"Hi\"}\n\n";
        let chunks = split_every(stream, 1);
        assert_eq!(collect(RelayEventDecoder, &chunks), vec!["Hi".to_string()]);
    }

    #[test]
    fn test_every_split_point_is_equivalent() {
        let stream = "event: chunk\ndata: {\"text\":\"héllo \"}\n\nevent: chunk\r\ndata: {\"text\":\"wörld\"}\n\nevent: done\ndata: {\"text\":\"ignored\"}\n\n";
        let bytes = stream.as_bytes();
        let expected = collect(RelayEventDecoder, &[bytes]);
        assert_eq!(expected, vec!["héllo ".to_string(), "wörld".to_string()]);

        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(collect(RelayEventDecoder, &[a, b]), expected, "split at {}", split);
        }
        for size in 1..8 {
            assert_eq!(collect(RelayEventDecoder, &split_every(bytes, size)), expected);
        }
    }

    #[test]
    fn test_done_sentinel_and_malformed_json() {
        let stream: &[u8] = b"data: [DONE]\ndata: {not json\ndata: {\"text\":\"ok\"}\n";
        assert_eq!(collect(RelayEventDecoder, &[stream]), vec!["ok".to_string()]);
    }

    #[test]
    fn test_trailing_line_without_newline() {
        let out = collect(RelayEventDecoder, &[&b"data: {\"text\":\"a\"}\ndata: {\"text\":\"b\"}"[..]]);
        assert_eq!(out, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_event_name_resets_after_data() {
        // The second data line has no event of its own, so it is a chunk.
        let stream: &[u8] = b"event: error\ndata: {\"text\":\"x\"}\ndata: {\"text\":\"y\"}\n";
        assert_eq!(collect(RelayEventDecoder, &[stream]), vec!["y".to_string()]);
    }

    #[test]
    fn test_data_without_space() {
        assert_eq!(
            collect(RelayEventDecoder, &[&b"data:{\"text\":\"tight\"}\n"[..]]),
            vec!["tight".to_string()]
        );
    }

    #[test]
    fn test_comments_and_other_fields_ignored() {
        let stream: &[u8] = b": keep-alive\nid: 7\nretry: 100\ndata: {\"text\":\"z\"}\n";
        assert_eq!(collect(RelayEventDecoder, &[stream]), vec!["z".to_string()]);
    }
}
