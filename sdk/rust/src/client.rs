//! The recordql client.
//!
//! A [`Client`] owns a transport, a record store and an operation builder.
//! Its methods build an operation synchronously and hand back a
//! [`Prepared`] runner; nothing is sent until the runner is executed.
//!
//! ```ignore
//! use recordql_sdk::{Client, ClientConfig, ModelDescriptor, SelectOptions};
//!
//! let client = Client::with_config(transport, ClientConfig::new().timeout(Duration::from_secs(5)));
//! let users = ModelDescriptor::new("user", "user", "users");
//!
//! let result = client.find_one(&users, "1", SelectOptions::new())?.execute().await;
//! if let Some(user) = result.data {
//!     println!("{}", user.to_json());
//! }
//! ```

use crate::builder::{
    FindManyOptions, OperationBuilder, PreparedOperation, SelectOptions, DEFAULT_LIVE_DIRECTIVE,
};
use crate::descriptor::{ActionDescriptor, GlobalActionDescriptor, ModelDescriptor};
use crate::error::{BuildResult, ErrorCode, SdkError, SdkResult};
use crate::runner::{
    ActionHandler, ConnectionHandler, FirstRecordHandler, GlobalActionHandler, Maybe, Prepared,
    RecordHandler,
};
use crate::transport::{GraphQLResponse, RequestContext, ResponseStream, Transport};
use recordql_runtime::{Hydrator, RecordStore};
use recordql_syntax::OperationKind;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout applied to every request. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Directive that marks live queries.
    pub live_directive: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            live_directive: DEFAULT_LIVE_DIRECTIVE.to_string(),
        }
    }
}

impl ClientConfig {
    /// Creates the default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disables the timeout.
    #[must_use]
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Sets the live query directive.
    #[must_use]
    pub fn live_directive(mut self, directive: impl Into<String>) -> Self {
        self.live_directive = directive.into();
        self
    }
}

/// The recordql client. Cheap to clone; clones share the transport and the
/// record store.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    store: Arc<RecordStore>,
    builder: OperationBuilder,
    config: ClientConfig,
}

impl Client {
    /// Creates a client with the default config.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    /// Creates a client with configuration.
    pub fn with_config(transport: impl Transport + 'static, config: ClientConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            store: Arc::new(RecordStore::new()),
            builder: OperationBuilder::new(config.live_directive.as_str()),
            config,
        }
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The record store shared by every operation of this client.
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// A hydrator over this client's store.
    pub fn hydrator(&self) -> Hydrator<'_> {
        Hydrator::new(&self.store)
    }

    /// The operation builder.
    pub fn builder(&self) -> &OperationBuilder {
        &self.builder
    }

    /// Reads one record by id. A missing record is a `NotFound` error.
    pub fn find_one(
        &self,
        model: &ModelDescriptor,
        id: &str,
        options: SelectOptions,
    ) -> BuildResult<Prepared<RecordHandler>> {
        let operation = self.builder.find_one(model, id, &options)?;
        let handler = RecordHandler::new(model.api_identifier.as_str(), format!("id={id}"));
        Ok(self.prepare(operation, handler))
    }

    /// Reads one record by id. A missing record is `None`.
    pub fn maybe_find_one(
        &self,
        model: &ModelDescriptor,
        id: &str,
        options: SelectOptions,
    ) -> BuildResult<Prepared<Maybe<RecordHandler>>> {
        self.find_one(model, id, options).map(Prepared::maybe)
    }

    /// Reads a page of records.
    pub fn find_many(
        &self,
        model: &ModelDescriptor,
        options: FindManyOptions,
    ) -> BuildResult<Prepared<ConnectionHandler>> {
        let operation = self.builder.find_many(model, &options)?;
        Ok(self.prepare(operation, ConnectionHandler::new(model.clone(), options)))
    }

    /// Reads the first matching record. No match is a `NotFound` error.
    pub fn find_first(
        &self,
        model: &ModelDescriptor,
        options: FindManyOptions,
    ) -> BuildResult<Prepared<FirstRecordHandler>> {
        let operation = self.builder.find_first(model, &options)?;
        let handler = FirstRecordHandler::new(model.api_identifier.as_str(), "first match");
        Ok(self.prepare(operation, handler))
    }

    /// Reads the first matching record, if any.
    pub fn maybe_find_first(
        &self,
        model: &ModelDescriptor,
        options: FindManyOptions,
    ) -> BuildResult<Prepared<Maybe<FirstRecordHandler>>> {
        self.find_first(model, options).map(Prepared::maybe)
    }

    /// Reads the record whose unique `field` equals `value`.
    ///
    /// No match is a `NotFound` error; several matches are `NonUniqueData`.
    pub fn find_by_field(
        &self,
        model: &ModelDescriptor,
        field: &str,
        value: impl Into<Value>,
        options: SelectOptions,
    ) -> BuildResult<Prepared<FirstRecordHandler>> {
        let value = value.into();
        let operation = self.builder.find_by_field(model, field, &value, &options)?;
        let handler = FirstRecordHandler::new(model.api_identifier.as_str(), format!("{field}={value}"))
            .unique();
        Ok(self.prepare(operation, handler))
    }

    /// Like [`find_by_field`](Self::find_by_field), but no match is `None`.
    pub fn maybe_find_by_field(
        &self,
        model: &ModelDescriptor,
        field: &str,
        value: impl Into<Value>,
        options: SelectOptions,
    ) -> BuildResult<Prepared<Maybe<FirstRecordHandler>>> {
        self.find_by_field(model, field, value, options)
            .map(Prepared::maybe)
    }

    /// Runs a model action, single or bulk.
    pub fn action(
        &self,
        action: &ActionDescriptor,
        variables: Value,
        options: SelectOptions,
    ) -> BuildResult<Prepared<ActionHandler>> {
        let operation = self.builder.action(action, variables, &options)?;
        Ok(self.prepare(operation, ActionHandler::new(action)))
    }

    /// Runs an action that is not bound to a model.
    pub fn global_action(
        &self,
        action: &GlobalActionDescriptor,
        variables: Value,
    ) -> BuildResult<Prepared<GlobalActionHandler>> {
        let operation = self.builder.global_action(action, variables)?;
        Ok(self.prepare(operation, GlobalActionHandler::new(action.operation_name.as_str())))
    }

    /// Wraps an already built operation in a runner.
    pub fn prepare<H>(&self, operation: PreparedOperation, handler: H) -> Prepared<H> {
        Prepared::new(self.clone(), operation, handler)
    }

    /// Sends an operation and waits for one response.
    ///
    /// Subscriptions resolve with their first result. The request is raced
    /// against the configured timeout and the context's abort signal.
    pub(crate) async fn dispatch(
        &self,
        operation: &PreparedOperation,
        context: RequestContext,
    ) -> SdkResult<GraphQLResponse> {
        let request = operation.request();
        let abort = context.abort.clone();
        debug!(
            operation = ?request.operation_name,
            kind = %operation.kind,
            variables = request.variables.len(),
            "dispatching operation"
        );

        let send = async {
            match operation.kind {
                OperationKind::Query => self.transport.query(request, context).await,
                OperationKind::Mutation => self.transport.mutation(request, context).await,
                OperationKind::Subscription => {
                    match self.transport.subscription(request, context).await {
                        Ok(mut stream) => stream.next().await.unwrap_or_else(|| {
                            Err(SdkError::new(
                                ErrorCode::NoData,
                                "subscription ended before producing a result",
                            ))
                        }),
                        Err(e) => Err(e),
                    }
                }
            }
        };
        let timed = async {
            match self.config.timeout {
                Some(limit) => tokio::time::timeout(limit, send)
                    .await
                    .unwrap_or_else(|_| Err(SdkError::timeout())),
                None => send.await,
            }
        };

        match abort {
            Some(signal) => tokio::select! {
                biased;
                () = signal.aborted() => Err(SdkError::aborted()),
                response = timed => response,
            },
            None => timed.await,
        }
    }

    /// Opens a subscription stream.
    pub(crate) async fn open_stream(
        &self,
        operation: &PreparedOperation,
        context: RequestContext,
    ) -> SdkResult<ResponseStream> {
        let request = operation.request();
        debug!(operation = ?request.operation_name, "opening subscription");
        self.transport.subscription(request, context).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new()
            .timeout(Duration::from_secs(5))
            .live_directive("@live(throttle: 100)");

        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.live_directive, "@live(throttle: 100)");
        assert_eq!(ClientConfig::new().no_timeout().timeout, None);
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.live_directive, DEFAULT_LIVE_DIRECTIVE);
    }
}
