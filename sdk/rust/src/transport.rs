//! The transport seam.
//!
//! The SDK never talks to the network itself. A [`Transport`] receives the
//! compiled request and returns the raw GraphQL response; subscriptions
//! return a [`ResponseStream`] fed through an mpsc channel.
//!
//! Cancellation goes through [`AbortController`] / [`AbortSignal`]: the
//! client races every transport future against the signal.

use crate::error::{SdkError, SdkResult};
use async_trait::async_trait;
use indexmap::IndexMap;
use recordql_syntax::CompiledOperation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// A GraphQL request as sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,
    pub variables: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl From<CompiledOperation> for GraphQLRequest {
    fn from(compiled: CompiledOperation) -> Self {
        Self {
            query: compiled.query,
            variables: compiled.variables,
            operation_name: compiled.operation_name,
        }
    }
}

/// A GraphQL response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLResponse {
    /// Creates a successful response.
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    /// Creates a response carrying only errors.
    pub fn errors(errors: Vec<GraphQLError>) -> Self {
        Self {
            errors,
            ..Self::default()
        }
    }

    /// Returns true if the response has top-level errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A top-level GraphQL error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<HashMap<String, Value>>,
}

impl GraphQLError {
    /// Creates an error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }

    /// The `extensions.code` entry, if any.
    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .and_then(Value::as_str)
    }
}

/// Per-request options handed to the transport.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Signal that aborts the request.
    pub abort: Option<AbortSignal>,
    /// Extra headers for transports that speak HTTP.
    pub headers: HashMap<String, String>,
}

impl RequestContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an abort signal.
    #[must_use]
    pub fn with_abort(mut self, signal: AbortSignal) -> Self {
        self.abort = Some(signal);
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// The connection the client sends operations through.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a query.
    async fn query(
        &self,
        request: GraphQLRequest,
        context: RequestContext,
    ) -> SdkResult<GraphQLResponse>;

    /// Sends a mutation.
    async fn mutation(
        &self,
        request: GraphQLRequest,
        context: RequestContext,
    ) -> SdkResult<GraphQLResponse>;

    /// Opens a subscription.
    async fn subscription(
        &self,
        request: GraphQLRequest,
        context: RequestContext,
    ) -> SdkResult<ResponseStream>;
}

/// A stream of subscription results.
pub struct ResponseStream {
    receiver: mpsc::Receiver<SdkResult<GraphQLResponse>>,
    completed: bool,
}

impl ResponseStream {
    /// Creates a stream over the given channel receiver.
    pub fn new(receiver: mpsc::Receiver<SdkResult<GraphQLResponse>>) -> Self {
        Self {
            receiver,
            completed: false,
        }
    }

    /// Creates a stream and returns both the stream and its sender.
    pub fn channel(buffer: usize) -> (Self, ResponseSender) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(rx), ResponseSender { sender: tx })
    }

    /// Checks if the stream has completed.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Receives the next result. `None` once every sender is gone.
    pub async fn next(&mut self) -> Option<SdkResult<GraphQLResponse>> {
        if self.completed {
            return None;
        }

        let item = self.receiver.recv().await;
        if item.is_none() {
            self.completed = true;
        }
        item
    }
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

/// Sender half of a [`ResponseStream`].
#[derive(Clone)]
pub struct ResponseSender {
    sender: mpsc::Sender<SdkResult<GraphQLResponse>>,
}

impl ResponseSender {
    /// Sends a response.
    pub async fn send(&self, response: GraphQLResponse) -> SdkResult<()> {
        self.sender
            .send(Ok(response))
            .await
            .map_err(|_| SdkError::internal("subscription stream closed"))
    }

    /// Sends a transport failure.
    pub async fn fail(&self, error: SdkError) -> SdkResult<()> {
        self.sender
            .send(Err(error))
            .await
            .map_err(|_| SdkError::internal("subscription stream closed"))
    }

    /// Checks if the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Creates [`AbortSignal`]s and fires them.
#[derive(Debug, Clone)]
pub struct AbortController {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortController {
    /// Creates a controller that has not fired.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// A signal observing this controller.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Aborts every request holding a signal from this controller.
    pub fn abort(&self) {
        self.sender.send_replace(true);
    }

    /// Returns true once [`abort`](Self::abort) was called.
    pub fn is_aborted(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Observes an [`AbortController`].
#[derive(Debug, Clone)]
pub struct AbortSignal {
    receiver: watch::Receiver<bool>,
}

impl AbortSignal {
    /// Returns true if the controller has fired.
    pub fn is_aborted(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the controller fires.
    ///
    /// Never resolves if the controller is dropped without firing.
    pub async fn aborted(&self) {
        let mut receiver = self.receiver.clone();
        let closed = receiver.wait_for(|aborted| *aborted).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_request_from_compiled() {
        let mut variables = IndexMap::new();
        variables.insert("id".to_string(), json!("1"));
        let request = GraphQLRequest::from(CompiledOperation {
            query: "query($id: ID) {\n  user(id: $id) {\n    id\n  }\n}".into(),
            variables,
            operation_name: None,
        });

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "query": "query($id: ID) {\n  user(id: $id) {\n    id\n  }\n}",
                "variables": { "id": "1" }
            })
        );
    }

    #[test]
    fn test_response_deserialization() {
        let response: GraphQLResponse = serde_json::from_value(json!({
            "data": null,
            "errors": [{ "message": "denied", "extensions": { "code": "FORBIDDEN" } }]
        }))
        .unwrap();

        assert!(response.has_errors());
        assert_eq!(response.errors[0].code(), Some("FORBIDDEN"));
        assert_eq!(response.data, None);

        let response: GraphQLResponse = serde_json::from_value(json!({ "data": {} })).unwrap();
        assert!(!response.has_errors());
    }

    #[tokio::test]
    async fn test_response_stream() {
        let (mut stream, sender) = ResponseStream::channel(4);
        sender.send(GraphQLResponse::data(json!({ "n": 1 }))).await.unwrap();
        sender.fail(SdkError::network("reset")).await.unwrap();
        drop(sender);

        assert_eq!(stream.next().await.unwrap().unwrap().data, Some(json!({ "n": 1 })));
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
        assert!(stream.is_completed());
    }

    #[tokio::test]
    async fn test_abort_signal() {
        let controller = AbortController::new();
        let signal = controller.signal();
        assert!(!signal.is_aborted());

        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.aborted().await }
        });
        controller.abort();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(signal.is_aborted());
        assert!(controller.is_aborted());
    }

    #[tokio::test]
    async fn test_dropped_controller_never_fires() {
        let signal = AbortController::new().signal();
        let outcome = tokio::time::timeout(Duration::from_millis(20), signal.aborted()).await;
        assert!(outcome.is_err());
    }
}
