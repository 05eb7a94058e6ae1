// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

// NDJSON line framing over a chunked byte stream.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

/// Splits arbitrary byte chunks into newline-terminated lines.
///
/// Lines are returned without their `\n` / `\r\n` terminator. Blank lines
/// are skipped.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: BytesMut,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1).freeze();
            if let Some(line) = non_blank(line) {
                lines.push(line);
            }
        }
        lines
    }

    /// Flush the trailing partial line at end of input.
    pub fn finish(&mut self) -> Option<Bytes> {
        let rest = std::mem::take(&mut self.buffer).freeze();
        non_blank(rest)
    }
}

fn non_blank(line: Bytes) -> Option<Bytes> {
    let end = line
        .iter()
        .rposition(|b| !matches!(b, b'\n' | b'\r'))
        .map(|i| i + 1)?;
    let line = line.slice(..end);
    if line.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        Some(line)
    }
}

struct LineState<S> {
    input: S,
    splitter: LineSplitter,
    pending: VecDeque<Bytes>,
    done: bool,
}

/// Adapt a byte-chunk stream into a stream of NDJSON lines.
///
/// An error from `input` is forwarded once and ends the line stream.
pub fn ndjson_lines<S, E>(input: S) -> impl Stream<Item = Result<Bytes, E>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Send + 'static,
{
    let state = LineState {
        input,
        splitter: LineSplitter::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(line) = st.pending.pop_front() {
                return Some((Ok(line), st));
            }
            if st.done {
                return None;
            }
            match st.input.next().await {
                Some(Ok(chunk)) => {
                    let lines = st.splitter.push(&chunk);
                    st.pending.extend(lines);
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.done = true;
                    let rest = st.splitter.finish();
                    st.pending.extend(rest);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_lines() {
        let mut s = LineSplitter::new();
        let lines = s.push(b"{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(lines, vec![Bytes::from("{\"a\":1}"), Bytes::from("{\"b\":2}")]);
        assert_eq!(s.finish(), None);
    }

    #[test]
    fn joins_lines_split_across_chunks() {
        let mut s = LineSplitter::new();
        assert!(s.push(b"{\"type\":").is_empty());
        assert_eq!(s.push(b"\"x\"}\r\n"), vec![Bytes::from("{\"type\":\"x\"}")]);
    }

    #[test]
    fn skips_blank_lines() {
        let mut s = LineSplitter::new();
        assert_eq!(s.push(b"\n\r\n  \na\n"), vec![Bytes::from("a")]);
    }

    #[test]
    fn flushes_trailing_partial_line() {
        let mut s = LineSplitter::new();
        assert!(s.push(b"tail").is_empty());
        assert_eq!(s.finish(), Some(Bytes::from("tail")));
        assert_eq!(s.finish(), None);
    }

    #[tokio::test]
    async fn line_stream_forwards_error_and_stops() {
        let chunks: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from("one\ntw")),
            Ok(Bytes::from("o\n")),
            Err("reset".to_string()),
            Ok(Bytes::from("never\n")),
        ];
        let lines: Vec<_> = ndjson_lines(futures_util::stream::iter(chunks))
            .collect()
            .await;
        assert_eq!(
            lines,
            vec![
                Ok(Bytes::from("one")),
                Ok(Bytes::from("two")),
                Err("reset".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn line_stream_flushes_at_eof() {
        let chunks: Vec<Result<Bytes, String>> = vec![Ok(Bytes::from("a\nb"))];
        let lines: Vec<_> = ndjson_lines(futures_util::stream::iter(chunks))
            .collect()
            .await;
        assert_eq!(lines, vec![Ok(Bytes::from("a")), Ok(Bytes::from("b"))]);
    }
}
