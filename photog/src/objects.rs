//! This module provides the [ObjectStore] trait, to which canonical image bytes are published under
//! content-derived keys, along with a local directory implementation and an HTTP implementation which speaks the
//! subset of the Azure Blob REST API needed to upload a block blob.

use {
    anyhow::{anyhow, Result},
    async_trait::async_trait,
    bytes::Bytes,
    http::{header, Request, Uri},
    hyper::{client::HttpConnector, Body, Client},
    hyper_rustls::{HttpsConnector, HttpsConnectorBuilder},
    mime::Mime,
    std::{io::Write, path::PathBuf, sync::Arc},
    tempfile::NamedTempFile,
    tokio::{fs, task},
    tracing::debug,
};

/// Key-addressed blob store which full-size images are uploaded to
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, replacing any existing object with that key.
    async fn put_object(&self, key: &str, data: Bytes, content_type: &Mime) -> Result<()>;
}

/// Open the object store described by `location`.
///
/// An `http://` or `https://` URL selects an [HttpStore] rooted at that URL; anything else (optionally prefixed
/// with `file://`) is treated as a directory for a [DirectoryStore].
pub fn open(location: &str) -> Result<Arc<dyn ObjectStore>> {
    Ok(if location.starts_with("http://") || location.starts_with("https://") {
        Arc::new(HttpStore::new(location)?)
    } else {
        Arc::new(DirectoryStore::new(crate::paths::expand_home(
            location.strip_prefix("file://").unwrap_or(location),
        )))
    })
}

/// `ObjectStore` which writes each object to a file named by its key under a root directory
///
/// Content types are not recorded.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for DirectoryStore {
    async fn put_object(&self, key: &str, data: Bytes, content_type: &Mime) -> Result<()> {
        let path = self.root.join(key);

        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("invalid object key: {}", key))?
            .to_owned();

        fs::create_dir_all(&parent).await?;

        // Write to a temporary file and rename it into place so that concurrent uploads of the same key never
        // interleave.
        task::spawn_blocking({
            let path = path.clone();

            move || {
                let mut tmp = NamedTempFile::new_in(&parent)?;
                tmp.write_all(&data)?;
                tmp.persist(&path)?;

                Ok::<_, anyhow::Error>(())
            }
        })
        .await??;

        debug!("wrote {} ({})", path.display(), content_type);

        Ok(())
    }
}

/// `ObjectStore` which uploads each object with an HTTP PUT to `<base>/<key>`
///
/// Any query string in the base URL (e.g. a shared access signature) is carried over to each request.
///
/// `https://` URLs are verified against the Mozilla root certificates bundled by `webpki-roots`.
pub struct HttpStore {
    client: Client<HttpsConnector<HttpConnector>>,
    base: Uri,
}

impl HttpStore {
    pub fn new(base: &str) -> Result<Self> {
        let base = base.parse::<Uri>()?;

        if !matches!(base.scheme_str(), Some("http" | "https")) || base.authority().is_none() {
            return Err(anyhow!("unsupported object store URL: {}", base));
        }

        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        Ok(Self {
            client: Client::builder().build(connector),
            base,
        })
    }

    fn uri(&self, key: &str) -> Result<Uri> {
        let path = self.base.path().trim_end_matches('/');

        Ok(format!(
            "{}://{}{}/{}{}",
            self.base.scheme_str().unwrap_or("http"),
            self.base
                .authority()
                .ok_or_else(|| anyhow!("missing authority"))?,
            path,
            key,
            if let Some(query) = self.base.query() {
                format!("?{}", query)
            } else {
                String::new()
            }
        )
        .parse()?)
    }
}

#[async_trait]
impl ObjectStore for HttpStore {
    async fn put_object(&self, key: &str, data: Bytes, content_type: &Mime) -> Result<()> {
        let uri = self.uri(key)?;

        let request = Request::put(uri.clone())
            .header(header::CONTENT_TYPE, content_type.as_ref())
            .header(header::CONTENT_LENGTH, data.len())
            .header("x-ms-blob-type", "BlockBlob")
            .body(Body::from(data))?;

        let response = self.client.request(request).await?;

        let status = response.status();

        if status.is_success() {
            debug!("PUT {} yielded {}", uri, status);

            Ok(())
        } else {
            let body = hyper::body::to_bytes(response.into_body()).await?;

            Err(anyhow!(
                "PUT {} yielded {}: {}",
                uri,
                status,
                String::from_utf8_lossy(&body)
            ))
        }
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        std::net::SocketAddr,
        tempfile::TempDir,
        tokio::sync::mpsc::{self, UnboundedReceiver},
        warp::{http::StatusCode, path::FullPath, Filter},
    };

    #[derive(Debug)]
    struct Received {
        path: String,
        query: Option<String>,
        content_type: String,
        blob_type: String,
        body: Bytes,
    }

    /// Start a server which records each PUT it receives, responding to those under /denied with 403 FORBIDDEN.
    fn serve() -> (SocketAddr, UnboundedReceiver<Received>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let routes = warp::put()
            .and(warp::path::full())
            .and(warp::query::raw().map(Some).or(warp::any().map(|| None)).unify())
            .and(warp::header::<String>("content-type"))
            .and(warp::header::<String>("x-ms-blob-type"))
            .and(warp::body::bytes())
            .map(
                move |path: FullPath,
                      query: Option<String>,
                      content_type: String,
                      blob_type: String,
                      body: Bytes| {
                    let path = path.as_str().to_owned();

                    let status = if path.starts_with("/denied") {
                        StatusCode::FORBIDDEN
                    } else {
                        StatusCode::CREATED
                    };

                    let _ = tx.send(Received {
                        path,
                        query,
                        content_type,
                        blob_type,
                        body,
                    });

                    warp::reply::with_status("done", status)
                },
            );

        let (address, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));

        tokio::spawn(server);

        (address, rx)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn http_put() -> Result<()> {
        let (address, mut rx) = serve();

        let store = HttpStore::new(&format!("http://{}/$web/?sv=2020&sig=abc", address))?;

        store
            .put_object("images/0a1b.jpg", Bytes::from_static(b"jpeg bytes"), &mime::IMAGE_JPEG)
            .await?;

        let received = rx.recv().await.unwrap();

        assert_eq!(received.path, "/$web/images/0a1b.jpg");
        assert_eq!(received.query.as_deref(), Some("sv=2020&sig=abc"));
        assert_eq!(received.content_type, "image/jpeg");
        assert_eq!(received.blob_type, "BlockBlob");
        assert_eq!(&received.body[..], b"jpeg bytes");

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn http_put_failure() -> Result<()> {
        let (address, _rx) = serve();

        let store = open(&format!("http://{}/denied", address))?;

        assert!(store
            .put_object("images/0a1b.jpg", Bytes::from_static(b"jpeg bytes"), &mime::IMAGE_JPEG)
            .await
            .is_err());

        Ok(())
    }

    #[test]
    fn urls() -> Result<()> {
        assert!(HttpStore::new("ftp://example.com/images").is_err());
        assert!(HttpStore::new("/not/a/url").is_err());

        let store = HttpStore::new("https://example.blob.core.windows.net/$web/?sv=2020&sig=abc")?;

        assert_eq!(
            store.uri("images/0a1b.jpg")?,
            "https://example.blob.core.windows.net/$web/images/0a1b.jpg?sv=2020&sig=abc"
        );

        let store = HttpStore::new("http://127.0.0.1:10000/devstoreaccount1")?;

        assert_eq!(
            store.uri("images/0a1b.jpg")?,
            "http://127.0.0.1:10000/devstoreaccount1/images/0a1b.jpg"
        );

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn directory() -> Result<()> {
        let dir = TempDir::new()?;

        let store = open(&format!("file://{}", dir.path().to_str().unwrap()))?;

        store
            .put_object("images/0a1b.jpg", Bytes::from_static(b"first"), &mime::IMAGE_JPEG)
            .await?;

        let path = dir.path().join("images/0a1b.jpg");

        assert_eq!(fs::read(&path).await?, b"first");

        store
            .put_object("images/0a1b.jpg", Bytes::from_static(b"second"), &mime::IMAGE_JPEG)
            .await?;

        assert_eq!(fs::read(&path).await?, b"second");

        Ok(())
    }
}
