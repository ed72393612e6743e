//! HTTP client - multipart uploads with progress reporting.

use std::{
    fmt, io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use futures::{
    stream::{self, BoxStream},
    Stream, StreamExt, TryStreamExt,
};
use reqwest::{
    multipart::{Form, Part},
    Body,
};

/// Upload progress callback.
///
/// Receives cumulative number of bytes sent so far, and total number of bytes to send.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Default size of a single body chunk for in-memory parts.
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Content of a single form part.
enum PartContent {
    /// In-memory content, length is known.
    Bytes(Bytes),
    /// Streamed content with an optional known length.
    Stream {
        body: BoxStream<'static, io::Result<Bytes>>,
        len: Option<u64>,
    },
}

impl PartContent {
    fn len(&self) -> Option<u64> {
        match self {
            Self::Bytes(buf) => Some(buf.len() as u64),
            Self::Stream { len, .. } => *len,
        }
    }
}

/// Single form part.
struct UploadPart {
    name: String,
    file_name: Option<String>,
    mime: Option<String>,
    content: PartContent,
}

/// Multipart form to be sent with [`RequestClient::upload_file`].
///
/// [`RequestClient::upload_file`]: crate::RequestClient::upload_file
#[must_use]
pub struct UploadForm {
    parts: Vec<UploadPart>,
    chunk_size: usize,
}

impl fmt::Debug for UploadForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadForm")
            .field("parts", &self.parts.iter().map(|p| &p.name).collect::<Vec<_>>())
            .field("total_len", &self.total_len())
            .finish()
    }
}

impl Default for UploadForm {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadForm {
    /// Create empty form.
    pub fn new() -> Self {
        Self {
            parts: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set size of chunks used to send in-memory parts.
    ///
    /// Progress is reported once per chunk.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Add text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value: String = value.into();
        self.parts.push(UploadPart {
            name: name.into(),
            file_name: None,
            mime: None,
            content: PartContent::Bytes(Bytes::from(value)),
        });
        self
    }

    /// Add in-memory file.
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(UploadPart {
            name: name.into(),
            file_name: Some(file_name.into()),
            mime: None,
            content: PartContent::Bytes(content.into()),
        });
        self
    }

    /// Add streamed file.
    ///
    /// If `len` is [`None`], total upload size is unknown and no progress is reported.
    pub fn file_stream<S>(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        body: S,
        len: Option<u64>,
    ) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.parts.push(UploadPart {
            name: name.into(),
            file_name: Some(file_name.into()),
            mime: None,
            content: PartContent::Stream {
                body: body.boxed(),
                len,
            },
        });
        self
    }

    /// Set MIME type of the most recently added part.
    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        if let Some(part) = self.parts.last_mut() {
            part.mime = Some(mime.into());
        }
        self
    }

    /// Total size of all parts, if every part has a known size.
    #[must_use]
    pub fn total_len(&self) -> Option<u64> {
        self.parts.iter().map(|p| p.content.len()).sum()
    }

    /// Convert into [`reqwest`] multipart form, reporting progress as parts are sent.
    ///
    /// Callback is only attached when total size is known.
    pub(crate) fn into_multipart(
        self,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Form, reqwest::Error> {
        let total = self.total_len();
        let tracker = match (on_progress, total) {
            (Some(cb), Some(total)) => Some(ProgressTracker {
                loaded: Arc::new(AtomicU64::new(0)),
                total,
                cb,
            }),
            _ => None,
        };
        let chunk_size = self.chunk_size;
        self.parts.into_iter().try_fold(Form::new(), |form, part| {
            let len = part.content.len();
            let chunks = match part.content {
                PartContent::Bytes(buf) => chunked(buf, chunk_size),
                PartContent::Stream { body, .. } => body,
            };
            let chunks = match &tracker {
                Some(tracker) => tracker.observe(chunks),
                None => chunks,
            };
            let body = Body::wrap_stream(chunks);
            let mut mp_part = match len {
                Some(len) => Part::stream_with_length(body, len),
                None => Part::stream(body),
            };
            if let Some(file_name) = part.file_name {
                mp_part = mp_part.file_name(file_name);
            }
            if let Some(mime) = &part.mime {
                mp_part = mp_part.mime_str(mime)?;
            }
            Ok(form.part(part.name, mp_part))
        })
    }
}

/// Shared state for reporting cumulative progress across all parts.
#[derive(Clone)]
struct ProgressTracker {
    loaded: Arc<AtomicU64>,
    total: u64,
    cb: ProgressCallback,
}

impl ProgressTracker {
    fn observe(
        &self,
        chunks: BoxStream<'static, io::Result<Bytes>>,
    ) -> BoxStream<'static, io::Result<Bytes>> {
        let tracker = self.clone();
        chunks
            .inspect_ok(move |chunk| {
                let sent = chunk.len() as u64;
                let loaded = tracker.loaded.fetch_add(sent, Ordering::AcqRel) + sent;
                (tracker.cb)(loaded.min(tracker.total), tracker.total);
            })
            .boxed()
    }
}

/// Split buffer into a stream of chunks.
fn chunked(buf: Bytes, chunk_size: usize) -> BoxStream<'static, io::Result<Bytes>> {
    let chunks: Vec<_> = (0..buf.len())
        .step_by(chunk_size)
        .map(|start| buf.slice(start..(start + chunk_size).min(buf.len())))
        .collect();
    stream::iter(chunks.into_iter().map(Ok)).boxed()
}
