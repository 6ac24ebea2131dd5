/// Incremental UTF-8 decoder for chunked response bodies.
///
/// A chunk boundary may fall inside a multi-byte character; the incomplete
/// tail is held back and prepended to the next chunk.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

const REPLACEMENT: char = '\u{FFFD}';

impl Utf8StreamDecoder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Decodes as much of `chunk` as forms complete characters.
    /// Invalid sequences are replaced with U+FFFD.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut buffered = std::mem::take(&mut self.pending);
        buffered.extend_from_slice(chunk);

        let mut out = String::with_capacity(buffered.len());
        let mut input = buffered.as_slice();

        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));

                    match e.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT);
                            input = &rest[len..];
                        }
                        None => {
                            self.pending = rest.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flushes bytes left over at end of stream. A truncated character
    /// becomes U+FFFD.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&tail).into_owned())
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passthrough() {
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.decode(b"hello"), "hello");
        assert!(!decoder.has_pending());
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_split_multibyte_character() {
        let bytes = "学".as_bytes();
        assert_eq!(bytes.len(), 3);

        let mut decoder = Utf8StreamDecoder::new();
        let first = decoder.decode(&bytes[..1]);
        assert_eq!(first, "");
        assert!(decoder.has_pending());

        let second = decoder.decode(&bytes[1..]);
        assert_eq!(second, "学");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_split_across_three_chunks_with_text() {
        let text = "校历 ok ✅";
        let bytes = text.as_bytes();
        let mut decoder = Utf8StreamDecoder::new();
        let mut out = String::new();

        for chunk in bytes.chunks(2) {
            out.push_str(&decoder.decode(chunk));
        }

        assert_eq!(out, text);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_emoji_split_at_every_offset() {
        let bytes = "a😀b".as_bytes();
        for split in 0..=bytes.len() {
            let mut decoder = Utf8StreamDecoder::new();
            let mut out = decoder.decode(&bytes[..split]);
            out.push_str(&decoder.decode(&bytes[split..]));
            assert_eq!(out, "a😀b", "split at {split}");
        }
    }

    #[test]
    fn test_invalid_byte_is_replaced() {
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.decode(b"a\xFFb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_truncated_tail_flushes_replacement() {
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.decode(b"ok\xE5\xAD"), "ok");
        assert_eq!(decoder.finish().as_deref(), Some("\u{FFFD}"));
        assert!(decoder.finish().is_none());
    }
}
