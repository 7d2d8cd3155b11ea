//! Byte-stream transports for the push channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

use super::error::PushError;
use crate::client::Endpoints;
use crate::job::JobId;

/// Time allowed to establish the TCP/TLS connection for a stream.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw body of an open event stream.
pub type ByteStream = BoxStream<'static, Result<Bytes, PushError>>;

/// Opens the event stream for a job.
pub trait PushTransport: Send + Sync {
    /// Connect to the event stream of `job_id`, resuming after
    /// `last_event_id` when one is known.
    fn connect(
        &self,
        job_id: &JobId,
        last_event_id: Option<&str>,
    ) -> impl Future<Output = Result<ByteStream, PushError>> + Send;
}

impl<T: PushTransport> PushTransport for Arc<T> {
    fn connect(
        &self,
        job_id: &JobId,
        last_event_id: Option<&str>,
    ) -> impl Future<Output = Result<ByteStream, PushError>> + Send {
        (**self).connect(job_id, last_event_id)
    }
}

/// Server-sent events over HTTP.
pub struct HttpPushTransport {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl HttpPushTransport {
    /// Create a transport for the backend at `base_url`.
    ///
    /// The client has no overall request timeout: streams stay open for as
    /// long as the job runs.
    pub fn new(base_url: &str) -> Result<Self, PushError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| PushError::Connect(e.to_string()))?;
        let endpoints = Endpoints::new(base_url).map_err(|e| PushError::Connect(e.to_string()))?;
        Ok(Self { http, endpoints })
    }
}

impl PushTransport for HttpPushTransport {
    async fn connect(&self, job_id: &JobId, last_event_id: Option<&str>) -> Result<ByteStream, PushError> {
        let mut request = self
            .http
            .get(self.endpoints.events(job_id))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache");
        if let Some(id) = last_event_id {
            request = request.header("Last-Event-ID", id);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PushError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Http(status.as_u16()));
        }

        tracing::debug!(job_id = %job_id, resume_from = ?last_event_id, "Event stream connected");
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| PushError::Stream(e.to_string())))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpPushTransport::new("::"),
            Err(PushError::Connect(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpPushTransport::new(&format!("http://{addr}/api")).unwrap();
        let result = transport.connect(&JobId::from("abc"), None).await;

        assert!(matches!(result, Err(PushError::Connect(_))));
    }
}
