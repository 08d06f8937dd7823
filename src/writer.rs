//! Streaming object upload.
//!
//! An [`ObjectWriter`] turns a sequence of `write` calls into a single
//! insert request.  Construction spawns one background task that runs the
//! request with the consumer end of a [`pipe`](crate::pipe) as its body;
//! each `write` hands bytes across the pipe and returns once the request
//! has taken them.  `close` ends the body, after which the request can
//! finish and [`ObjectWriter::result`] yields the stored object.
//!
//! Local pipe failures are reported by `write` and `close` and stick to
//! the writer.  Failures of the request itself are only reported by
//! `result`.

use futures::future::{FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::errors::StorageError;
use crate::metrics;
use crate::pipe::{pipe, PipeWriter};
use crate::transport::backend::{Media, ObjectTransport};
use crate::types::Object;

type Outcome = Result<Object, StorageError>;

/// Cloneable handle on the outcome of an upload.
///
/// The outcome is set exactly once by the background task; every clone
/// observes the same value.
#[derive(Clone)]
pub struct Completion {
    done: Shared<oneshot::Receiver<Outcome>>,
}

impl Completion {
    fn new(rx: oneshot::Receiver<Outcome>) -> Self {
        Self { done: rx.shared() }
    }

    fn ready(outcome: Outcome) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self::new(rx)
    }

    /// Wait for the upload to finish.
    pub async fn result(&self) -> Outcome {
        match self.done.clone().await {
            Ok(outcome) => outcome,
            Err(_) => Err(StorageError::TaskAborted),
        }
    }

    /// Whether the outcome is already available.
    pub fn is_finished(&self) -> bool {
        self.done.clone().now_or_never().is_some()
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Incremental writer for one object.
pub struct ObjectWriter {
    pipe: PipeWriter,
    /// First local error; once set every later `write`/`close` returns it.
    err: Option<StorageError>,
    completion: Completion,
    bucket: String,
    name: String,
    written: u64,
}

impl ObjectWriter {
    /// Start uploading `info` through `transport`.
    ///
    /// `info` supplies the target bucket and name plus the writable
    /// metadata.  An empty bucket or name fails the writer immediately:
    /// `write`, `close` and `result` all return
    /// [`StorageError::InvalidArgument`] and no request is made.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(ctx: &Context, transport: Arc<dyn ObjectTransport>, info: Object) -> Self {
        let (pipe_writer, pipe_reader) = pipe();
        let bucket = info.bucket.clone();
        let name = info.name.clone();

        let invalid = if bucket.is_empty() {
            Some(StorageError::invalid_argument("object writer: bucket name is empty"))
        } else if name.is_empty() {
            Some(StorageError::invalid_argument("object writer: object name is empty"))
        } else {
            None
        };
        if let Some(err) = invalid {
            warn!("Rejecting upload to {}/{}: {}", bucket, name, err);
            return Self {
                pipe: pipe_writer,
                err: Some(err.clone()),
                completion: Completion::ready(Err(err)),
                bucket,
                name,
                written: 0,
            };
        }

        let (tx, rx) = oneshot::channel();
        let media = Media::new(info.content_type.clone(), pipe_reader);
        let raw = info.to_raw_object();
        let task_ctx = ctx.clone();
        let task_bucket = bucket.clone();

        debug!("Starting upload: bucket={} name={}", bucket, name);
        tokio::spawn(async move {
            let outcome = task_ctx
                .run(transport.insert_object(task_ctx.clone(), &task_bucket, raw, media))
                .await
                .map(|stored| Object::from(&stored));
            match &outcome {
                Ok(object) => {
                    metrics::record_upload("ok");
                    info!(
                        "Upload finished: bucket={} name={} size={} generation={}",
                        object.bucket, object.name, object.size, object.generation
                    );
                }
                Err(e) => {
                    metrics::record_upload(e.code());
                    warn!("Upload to {} failed: {}", task_bucket, e);
                }
            }
            let _ = tx.send(outcome);
        });

        Self {
            pipe: pipe_writer,
            err: None,
            completion: Completion::new(rx),
            bucket,
            name,
            written: 0,
        }
    }

    /// Hand `data` to the upload, waiting until the request has taken it.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, StorageError> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        match self.pipe.write(data).await {
            Ok(n) => {
                self.written += n as u64;
                metrics::record_bytes(n);
                Ok(n)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// End the content.  The upload can finish only after this.
    pub fn close(&mut self) -> Result<(), StorageError> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        if self.pipe.close() {
            debug!(
                "Closed upload: bucket={} name={} bytes={}",
                self.bucket, self.name, self.written
            );
        }
        Ok(())
    }

    /// Wait for the upload to finish and return the stored object.
    ///
    /// Blocks until [`close`](Self::close) has been called and the request
    /// has completed.  Every call returns the same outcome.
    pub async fn result(&self) -> Result<Object, StorageError> {
        self.completion.result().await
    }

    /// A handle for awaiting the outcome from another task.
    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn fail(&mut self, err: StorageError) -> StorageError {
        metrics::record_write_error(err.code());
        warn!(
            "Upload write to {}/{} failed: {}",
            self.bucket, self.name, err
        );
        self.err = Some(err.clone());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{RawBucket, RawObject, RawObjects};
    use crate::transport::backend::TransportFuture;
    use crate::transport::memory::MemoryTransport;
    use crate::types::Query;
    use chrono::{TimeZone, Utc};
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Records the uploaded body and answers with a canned response.
    struct RecordingTransport {
        received: Mutex<Vec<u8>>,
        chunks: AtomicUsize,
        /// Fail without reading the body.
        reject: bool,
        /// Hold the response until notified.
        gate: Option<Arc<Notify>>,
        response: Result<RawObject, StorageError>,
    }

    impl RecordingTransport {
        fn answering(response: Result<RawObject, StorageError>) -> Self {
            Self {
                received: Mutex::new(Vec::new()),
                chunks: AtomicUsize::new(0),
                reject: false,
                gate: None,
                response,
            }
        }

        fn echo() -> Self {
            Self::answering(Ok(RawObject::default()))
        }

        fn received(&self) -> Vec<u8> {
            self.received.lock().unwrap().clone()
        }
    }

    impl ObjectTransport for RecordingTransport {
        fn insert_object(
            &self,
            _ctx: Context,
            bucket: &str,
            object: RawObject,
            mut media: Media,
        ) -> TransportFuture<'_, RawObject> {
            let bucket = bucket.to_string();
            Box::pin(async move {
                if self.reject {
                    return Err(StorageError::Api {
                        code: 403,
                        message: "forbidden".into(),
                    });
                }
                while let Some(chunk) = media.next().await {
                    let chunk = chunk.map_err(|e| anyhow::anyhow!("body read failed: {e}"))?;
                    self.chunks.fetch_add(1, Ordering::SeqCst);
                    self.received.lock().unwrap().extend_from_slice(&chunk);
                }
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                let mut stored = self.response.clone()?;
                if stored.bucket.is_empty() {
                    stored.bucket = bucket;
                }
                if stored.name.is_empty() {
                    stored.name = object.name;
                }
                Ok(stored)
            })
        }

        fn get_object(&self, _: Context, _: &str, _: &str) -> TransportFuture<'_, RawObject> {
            Box::pin(async { Err(unsupported()) })
        }

        fn get_bucket(&self, _: Context, _: &str) -> TransportFuture<'_, RawBucket> {
            Box::pin(async { Err(unsupported()) })
        }

        fn list_objects(&self, _: Context, _: &str, _: Query) -> TransportFuture<'_, RawObjects> {
            Box::pin(async { Err(unsupported()) })
        }
    }

    fn unsupported() -> StorageError {
        StorageError::Api {
            code: 501,
            message: "not implemented".into(),
        }
    }

    fn writer(transport: &Arc<RecordingTransport>, ctx: &Context) -> ObjectWriter {
        let transport: Arc<dyn ObjectTransport> = transport.clone();
        ObjectWriter::new(ctx, transport, Object::new("b", "o.txt").with_content_type("text/plain"))
    }

    #[tokio::test]
    async fn test_bytes_arrive_in_write_order() {
        let transport = Arc::new(RecordingTransport::echo());
        let mut w = writer(&transport, &Context::background());

        for part in [&b"one "[..], b"two ", b"", b"three"] {
            assert_eq!(w.write(part).await.unwrap(), part.len());
        }
        w.close().unwrap();
        w.result().await.unwrap();

        assert_eq!(transport.received(), b"one two three");
        // The empty write never reaches the pipe.
        assert_eq!(transport.chunks.load(Ordering::SeqCst), 3);
        assert_eq!(w.bytes_written(), 13);
    }

    #[tokio::test]
    async fn test_end_to_end_result() {
        let updated = "2024-03-01T12:30:45.5Z";
        let response = RawObject {
            bucket: "b".into(),
            name: "o.txt".into(),
            content_type: "text/plain".into(),
            size: 11,
            generation: 1,
            updated: updated.into(),
            ..Default::default()
        };
        let transport = Arc::new(RecordingTransport::answering(Ok(response)));
        let mut w = writer(&transport, &Context::background());

        w.write(b"hello").await.unwrap();
        w.write(b" world").await.unwrap();
        w.close().unwrap();
        let object = w.result().await.unwrap();

        assert_eq!(object.name, "o.txt");
        assert_eq!(object.bucket, "b");
        assert_eq!(object.size, 11);
        assert_eq!(object.generation, 1);
        assert_eq!(
            object.updated,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap()
                + chrono::Duration::milliseconds(500)
        );
        assert_eq!(transport.received(), b"hello world");
    }

    #[tokio::test]
    async fn test_result_waits_for_close() {
        let transport = Arc::new(RecordingTransport::echo());
        let mut w = writer(&transport, &Context::background());
        w.write(b"abc").await.unwrap();

        let completion = w.completion();
        let waiter = tokio::spawn(async move { completion.result().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        assert!(!w.completion().is_finished());

        w.close().unwrap();
        let object = waiter.await.unwrap().unwrap();
        assert_eq!(object.name, "o.txt");
        assert!(w.completion().is_finished());
    }

    #[tokio::test]
    async fn test_result_waits_for_call() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(RecordingTransport {
            gate: Some(gate.clone()),
            ..RecordingTransport::echo()
        });
        let mut w = writer(&transport, &Context::background());
        w.write(b"abc").await.unwrap();
        w.close().unwrap();

        let completion = w.completion();
        let waiter = tokio::spawn(async move { completion.result().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        gate.notify_one();
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_result_is_repeatable() {
        let transport = Arc::new(RecordingTransport::answering(Ok(RawObject {
            size: 3,
            generation: 7,
            ..Default::default()
        })));
        let mut w = writer(&transport, &Context::background());
        w.write(b"abc").await.unwrap();
        w.close().unwrap();

        let first = w.result().await.unwrap();
        let second = w.result().await.unwrap();
        let third = w.completion().result().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(first.generation, 7);
    }

    #[tokio::test]
    async fn test_remote_failure_only_from_result() {
        let transport = Arc::new(RecordingTransport::answering(Err(StorageError::Api {
            code: 500,
            message: "backend error".into(),
        })));
        let mut w = writer(&transport, &Context::background());

        assert_eq!(w.write(b"hello").await.unwrap(), 5);
        w.close().unwrap();

        for _ in 0..2 {
            let err = w.result().await.unwrap_err();
            assert!(matches!(err, StorageError::Api { code: 500, .. }));
        }
        assert_eq!(transport.received(), b"hello");
    }

    #[tokio::test]
    async fn test_local_error_is_sticky() {
        let transport = Arc::new(RecordingTransport {
            reject: true,
            ..RecordingTransport::echo()
        });
        let mut w = writer(&transport, &Context::background());

        let err = w.write(b"abc").await.unwrap_err();
        assert!(matches!(err, StorageError::BrokenPipe));

        // No further pipe traffic once the error is recorded.
        let err = w.write(b"def").await.unwrap_err();
        assert!(matches!(err, StorageError::BrokenPipe));
        assert!(matches!(w.close(), Err(StorageError::BrokenPipe)));
        assert_eq!(transport.chunks.load(Ordering::SeqCst), 0);
        assert_eq!(w.bytes_written(), 0);

        // The remote failure stays on its own channel.
        let err = w.result().await.unwrap_err();
        assert!(matches!(err, StorageError::Api { code: 403, .. }));
    }

    #[tokio::test]
    async fn test_write_after_close() {
        let transport = Arc::new(RecordingTransport::echo());
        let mut w = writer(&transport, &Context::background());
        w.write(b"abc").await.unwrap();
        w.close().unwrap();
        w.close().unwrap();

        assert!(matches!(w.write(b"x").await, Err(StorageError::ClosedPipe)));
        assert!(matches!(w.close(), Err(StorageError::ClosedPipe)));

        // The upload itself was unaffected.
        w.result().await.unwrap();
        assert_eq!(transport.received(), b"abc");
    }

    #[tokio::test]
    async fn test_invalid_target() {
        let transport = Arc::new(RecordingTransport::echo());
        let dyn_transport: Arc<dyn ObjectTransport> = transport.clone();
        let mut w = ObjectWriter::new(&Context::background(), dyn_transport, Object::new("", "o"));

        assert!(w.completion().is_finished());
        assert_eq!(w.write(b"x").await.unwrap_err().code(), "InvalidArgument");
        assert_eq!(w.close().unwrap_err().code(), "InvalidArgument");
        assert_eq!(w.result().await.unwrap_err().code(), "InvalidArgument");

        let dyn_transport: Arc<dyn ObjectTransport> = transport.clone();
        let w = ObjectWriter::new(&Context::background(), dyn_transport, Object::new("b", ""));
        assert_eq!(w.result().await.unwrap_err().code(), "InvalidArgument");
        assert_eq!(transport.chunks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_drop_without_close_aborts() {
        let transport = Arc::new(RecordingTransport::echo());
        let mut w = writer(&transport, &Context::background());
        w.write(b"partial").await.unwrap();

        let completion = w.completion();
        drop(w);
        let err = completion.result().await.unwrap_err();
        assert_eq!(err.code(), "Transport");
    }

    #[tokio::test]
    async fn test_cancel_fails_call() {
        let transport = Arc::new(RecordingTransport::echo());
        let ctx = Context::background();
        let mut w = writer(&transport, &ctx);
        w.write(b"abc").await.unwrap();

        ctx.cancel();
        assert!(matches!(w.result().await, Err(StorageError::Cancelled)));

        // The request is gone, so the pipe is broken.
        assert!(matches!(w.write(b"def").await, Err(StorageError::BrokenPipe)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fails_call() {
        let transport = Arc::new(RecordingTransport::echo());
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        let mut w = writer(&transport, &ctx);
        w.write(b"abc").await.unwrap();

        assert!(matches!(
            w.result().await,
            Err(StorageError::DeadlineExceeded)
        ));
    }

    #[tokio::test]
    async fn test_upload_through_memory_transport() {
        let memory = Arc::new(MemoryTransport::new());
        let transport: Arc<dyn ObjectTransport> = memory.clone();
        let mut info = Object::new("b", "docs/readme.md").with_content_type("text/markdown");
        info.metadata.insert("origin".into(), "test".into());

        let mut w = ObjectWriter::new(&Context::background(), transport, info);
        assert_eq!(w.bucket(), "b");
        assert_eq!(w.name(), "docs/readme.md");
        w.write(b"# title\n").await.unwrap();
        w.close().unwrap();

        let object = w.result().await.unwrap();
        assert_eq!(object.size, 8);
        assert_eq!(object.content_type, "text/markdown");
        assert_eq!(object.metadata.get("origin").map(String::as_str), Some("test"));
        assert_eq!(object.md5.len(), 16);
        assert_eq!(object.crc32c.len(), 4);
        assert!(!object.is_deleted());
        assert_eq!(
            memory.data("b", "docs/readme.md").await.unwrap(),
            bytes::Bytes::from_static(b"# title\n")
        );
    }
}
