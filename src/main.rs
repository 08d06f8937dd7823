//! gcs-store command-line client.
//!
//! Uploads stream from a file or stdin straight into the insert request;
//! nothing is buffered beyond one read chunk.  Results are printed as
//! pretty JSON.  Ctrl+C cancels the in-flight request.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::info;

use gcs_store::config::{load_config, Config};
use gcs_store::{Client, Context, Object, ObjectWriter, Query, StorageError};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "gcs-store",
    version,
    about = "Cloud Storage client with streaming uploads"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Give up on the request after this many seconds.
    #[arg(short, long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file (or stdin) as an object.
    Put {
        #[arg(short, long)]
        bucket: String,

        #[arg(short, long)]
        name: String,

        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,

        /// Custom metadata as KEY=VALUE, repeatable.
        #[arg(short, long, value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,

        /// File to upload; stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Show an object's metadata.
    Stat {
        #[arg(short, long)]
        bucket: String,

        #[arg(short, long)]
        name: String,
    },
    /// Show a bucket's metadata.
    Bucket { name: String },
    /// List one page of objects.
    Ls {
        bucket: String,

        #[arg(short, long, default_value = "")]
        prefix: String,

        #[arg(short, long, default_value = "")]
        delimiter: String,

        /// Include non-current versions.
        #[arg(long)]
        versions: bool,

        #[arg(long, default_value_t = 0)]
        max_results: u32,

        /// Page token from a previous listing.
        #[arg(long, default_value = "")]
        cursor: String,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))
}

/// Stream `reader` into `writer` and wait for the stored object.
async fn upload<R: AsyncRead + Unpin>(
    writer: &mut ObjectWriter,
    reader: R,
) -> anyhow::Result<Object> {
    let mut chunks = ReaderStream::new(reader);
    while let Some(chunk) = chunks.next().await {
        if let Err(err) = writer.write(&chunk?).await {
            return Err(upload_error(writer, err).await.into());
        }
    }
    if let Err(err) = writer.close() {
        return Err(upload_error(writer, err).await.into());
    }
    Ok(writer.result().await?)
}

/// A broken pipe usually means the request already failed.  Prefer that
/// failure over the local symptom.
async fn upload_error(writer: &ObjectWriter, local: StorageError) -> StorageError {
    if !local.is_local() {
        return local;
    }
    match writer.result().await {
        Err(remote) => remote,
        Ok(_) => local,
    }
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    init_tracing(&config);
    if let Some(path) = &cli.config {
        info!("Loaded configuration from {}", path.display());
    }
    gcs_store::metrics::describe_metrics();

    let client = Client::from_config(&config.client)?;

    let mut ctx = Context::background();
    if let Some(secs) = cli.timeout {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received SIGINT, cancelling");
            interrupt.cancel();
        }
    });

    let output = match cli.command {
        Command::Put {
            bucket,
            name,
            content_type,
            metadata,
            file,
        } => {
            let mut info = Object::new(bucket, name).with_content_type(content_type);
            info.metadata = metadata.into_iter().collect::<HashMap<_, _>>();
            let reader: Box<dyn AsyncRead + Unpin + Send> = match &file {
                Some(path) => Box::new(tokio::fs::File::open(path).await?),
                None => Box::new(tokio::io::stdin()),
            };

            let mut writer = client.new_writer(&ctx, info);
            let object = upload(&mut writer, reader).await?;
            info!(
                "Uploaded {} bytes to {}/{}",
                writer.bytes_written(),
                object.bucket,
                object.name
            );
            serde_json::to_string_pretty(&object)?
        }
        Command::Stat { bucket, name } => {
            let object = client.object(&ctx, &bucket, &name).await?;
            serde_json::to_string_pretty(&object)?
        }
        Command::Bucket { name } => {
            let bucket = client.bucket(&ctx, &name).await?;
            serde_json::to_string_pretty(&bucket)?
        }
        Command::Ls {
            bucket,
            prefix,
            delimiter,
            versions,
            max_results,
            cursor,
        } => {
            let query = Query {
                delimiter,
                prefix,
                versions,
                cursor,
                max_results,
            };
            let page = client.list_objects(&ctx, &bucket, &query).await?;
            serde_json::to_string_pretty(&page)?
        }
    };
    println!("{output}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcs_store::raw::{RawBucket, RawObject, RawObjects};
    use gcs_store::transport::backend::{Media, ObjectTransport, TransportFuture};
    use gcs_store::transport::memory::MemoryTransport;
    use std::sync::Arc;

    /// Refuses every upload without reading the body.
    struct Refusing;

    impl ObjectTransport for Refusing {
        fn insert_object(
            &self,
            _: Context,
            _: &str,
            _: RawObject,
            _: Media,
        ) -> TransportFuture<'_, RawObject> {
            Box::pin(async {
                Err(StorageError::Api {
                    code: 403,
                    message: "upload: Access denied.".into(),
                })
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
            message: "unsupported".into(),
        }
    }

    #[tokio::test]
    async fn test_upload_reports_server_rejection() {
        let client = Client::new(Arc::new(Refusing));
        let mut writer = client.new_writer(&Context::background(), Object::new("b", "o"));

        let err = upload(&mut writer, &b"some content"[..]).await.unwrap_err();
        match err.downcast_ref::<StorageError>() {
            Some(StorageError::Api { code, .. }) => assert_eq!(*code, 403),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_from_reader() {
        let client = Client::new(Arc::new(MemoryTransport::new()));
        let mut writer = client.new_writer(&Context::background(), Object::new("b", "o"));

        let object = upload(&mut writer, &b"some content"[..]).await.unwrap();
        assert_eq!(object.size, 12);
        assert_eq!(writer.bytes_written(), 12);
    }

    #[tokio::test]
    async fn test_upload_error_keeps_local_cause_without_remote_failure() {
        let client = Client::new(Arc::new(MemoryTransport::new()));
        let mut writer = client.new_writer(&Context::background(), Object::new("b", "o"));
        writer.close().unwrap();

        let err = upload_error(&writer, StorageError::ClosedPipe).await;
        assert!(matches!(err, StorageError::ClosedPipe));
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("origin=cli").unwrap(),
            ("origin".to_string(), "cli".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
    }
}
