//! In-process streaming transport.
//!
//! A [`ChannelSession`] is the host end of a persistent channel to one
//! plugin; the plugin end is a [`StreamEndpoint`] yielding [`StreamCall`]s.
//! Many requests share the channel, each answered through its own reply
//! slot, so no per-call connection setup happens.

use crate::plugin::{BackendError, StreamSession};
use async_trait::async_trait;
use perch_core::message::{ProxyRequest, ProxyResponse};
use std::future::Future;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// One request travelling to the plugin, with its reply slot.
pub struct StreamCall {
    pub request: ProxyRequest,
    reply: oneshot::Sender<Option<ProxyResponse>>,
}

impl StreamCall {
    /// Answer the call. `None` tells the host the route is unknown.
    pub fn respond(self, response: Option<ProxyResponse>) {
        if self.reply.send(response).is_err() {
            debug!("Stream caller went away before the reply");
        }
    }
}

/// Host end of the channel.
#[derive(Clone)]
pub struct ChannelSession {
    tx: mpsc::Sender<StreamCall>,
}

/// Plugin end of the channel.
pub struct StreamEndpoint {
    rx: mpsc::Receiver<StreamCall>,
}

/// Open a channel able to queue `buffer` requests.
pub fn channel(buffer: usize) -> (ChannelSession, StreamEndpoint) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (ChannelSession { tx }, StreamEndpoint { rx })
}

impl ChannelSession {
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl StreamSession for ChannelSession {
    async fn send_http(&self, req: ProxyRequest) -> Result<Option<ProxyResponse>, BackendError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StreamCall { request: req, reply })
            .await
            .map_err(|_| BackendError::Closed)?;
        rx.await.map_err(|_| BackendError::Closed)
    }
}

impl StreamEndpoint {
    /// Next call, or `None` once every session handle is dropped.
    pub async fn recv(&mut self) -> Option<StreamCall> {
        self.rx.recv().await
    }

    /// Answer calls concurrently with `handler` until the host hangs up.
    pub async fn serve<F, Fut>(mut self, handler: F)
    where
        F: Fn(ProxyRequest) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Option<ProxyResponse>> + Send + 'static,
    {
        while let Some(call) = self.rx.recv().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                let StreamCall { request, reply } = call;
                let response = handler(request).await;
                let _ = reply.send(response);
            });
        }
        debug!("Stream endpoint closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_over_channel() {
        let (session, endpoint) = channel(8);
        tokio::spawn(endpoint.serve(|req: ProxyRequest| async move {
            if req.path == "/known" {
                Some(ProxyResponse::new(200).with_body(req.user_id))
            } else {
                None
            }
        }));

        let resp = session
            .send_http(ProxyRequest::new("GET", "/known").with_user(Some("u1".into())))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(&resp.body[..], b"u1");

        let unknown = session.send_http(ProxyRequest::new("GET", "/nope")).await.unwrap();
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn dropped_endpoint_is_closed_error() {
        let (session, endpoint) = channel(1);
        drop(endpoint);
        let err = session.send_http(ProxyRequest::new("GET", "/")).await.unwrap_err();
        assert!(matches!(err, BackendError::Closed));
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn call_dropped_without_reply_is_closed_error() {
        let (session, mut endpoint) = channel(1);
        tokio::spawn(async move {
            while let Some(call) = endpoint.recv().await {
                drop(call);
            }
        });
        let err = session.send_http(ProxyRequest::new("GET", "/")).await.unwrap_err();
        assert!(matches!(err, BackendError::Closed));
    }

    #[tokio::test]
    async fn requests_are_multiplexed() {
        let (session, endpoint) = channel(16);
        tokio::spawn(endpoint.serve(|req: ProxyRequest| async move {
            Some(ProxyResponse::new(200).with_body(req.path))
        }));

        let mut handles = Vec::new();
        for i in 0..10 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                let path = format!("/item/{i}");
                let resp = session
                    .send_http(ProxyRequest::new("GET", &path))
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(resp.body, path.as_bytes());
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }
}
