//! Buffered message bodies.

use axum::body::Bytes;

/// A message body held as the chunks it was received in.
///
/// Chunks are reference-counted `Bytes`, so cloning a body (for example to
/// replay it on a retry) does not copy the payload.
#[derive(Debug, Clone, Default)]
pub struct MessageBody {
    chunks: Vec<Bytes>,
    len: usize,
}

impl MessageBody {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let mut body = Self::empty();
        body.push_chunk(bytes.into());
        body
    }

    /// Append a received chunk. Empty chunks are ignored.
    pub fn push_chunk(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push(chunk);
    }

    /// Replace the whole body.
    pub fn set(&mut self, bytes: impl Into<Bytes>) {
        self.dispose();
        self.push_chunk(bytes.into());
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// The body as one contiguous buffer. A single-chunk body is returned
    /// without copying.
    pub fn to_bytes(&self) -> Bytes {
        match self.chunks.as_slice() {
            [] => Bytes::new(),
            [single] => single.clone(),
            many => {
                let mut buf = Vec::with_capacity(self.len);
                for chunk in many {
                    buf.extend_from_slice(chunk);
                }
                Bytes::from(buf)
            }
        }
    }

    /// Lossy UTF-8 view, for debugging and tests.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.to_bytes()).into_owned()
    }

    /// Release all buffered memory.
    pub fn dispose(&mut self) {
        self.chunks = Vec::new();
        self.len = 0;
    }
}

impl From<&'static str> for MessageBody {
    fn from(s: &'static str) -> Self {
        Self::from_bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for MessageBody {
    fn from(s: String) -> Self {
        Self::from_bytes(Bytes::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_concatenate() {
        let mut body = MessageBody::empty();
        body.push_chunk(Bytes::from_static(b"hello "));
        body.push_chunk(Bytes::new());
        body.push_chunk(Bytes::from_static(b"world"));
        assert_eq!(body.chunks().len(), 2);
        assert_eq!(body.len(), 11);
        assert_eq!(body.to_text(), "hello world");
    }

    #[test]
    fn test_dispose_releases() {
        let mut body = MessageBody::from("payload");
        body.dispose();
        assert!(body.is_empty());
        assert!(body.chunks().is_empty());
    }

    #[test]
    fn test_set_replaces() {
        let mut body = MessageBody::from("a");
        body.push_chunk(Bytes::from_static(b"b"));
        body.set("c");
        assert_eq!(body.to_text(), "c");
        assert_eq!(body.len(), 1);
    }
}
