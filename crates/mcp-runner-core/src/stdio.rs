use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Unpin + Sync + Send>>>;

/// Shared handle to one of the runner's output streams
pub struct OutputSink(SharedWriter);

impl Clone for OutputSink {
    fn clone(&self) -> Self {
        OutputSink(self.0.clone())
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink").finish_non_exhaustive()
    }
}

impl OutputSink {
    pub fn new(t: Box<dyn AsyncWrite + Unpin + Sync + Send>) -> OutputSink {
        OutputSink(Arc::new(Mutex::new(t)))
    }

    pub fn stdout() -> OutputSink {
        Self::new(Box::new(tokio::io::stdout()))
    }

    pub fn stderr() -> OutputSink {
        Self::new(Box::new(tokio::io::stderr()))
    }

    /// An in-memory sink and a handle to read back what was written
    pub fn capture() -> (OutputSink, CapturedOutput) {
        let captured = CapturedOutput::default();
        (Self::new(Box::new(captured.clone())), captured)
    }

    pub fn inner(&self) -> SharedWriter {
        self.0.clone()
    }

    /// Write `text` and flush. Writes from clones never interleave.
    pub async fn write_text(&self, text: &str) -> std::io::Result<()> {
        let mut writer = self.0.lock().await;
        writer.write_all(text.as_bytes()).await?;
        writer.flush().await
    }
}

/// Buffer filled by a sink created with [`OutputSink::capture`]
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput(Arc<std::sync::Mutex<Vec<u8>>>);

impl CapturedOutput {
    pub fn contents(&self) -> String {
        let bytes = match self.0.lock() {
            Ok(bytes) => bytes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }
}

impl AsyncWrite for CapturedOutput {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        let mut bytes = match self.0.lock() {
            Ok(bytes) => bytes,
            Err(poisoned) => poisoned.into_inner(),
        };
        bytes.extend_from_slice(buf);
        std::task::Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }
}
