//! Operation runners.
//!
//! A [`Prepared`] runner pairs a compiled operation with a
//! [`ResponseHandler`] that turns the response `data` into records. Running
//! it never returns `Err`: transport failures, GraphQL errors and record
//! errors all end up in the `error` slot of an [`OperationResult`], so a
//! caller can render partial success.
//!
//! Runners can be executed any number of times. Each execution is
//! independent; concurrent executions race and the last hydration wins.

use crate::builder::{FindManyOptions, PreparedOperation};
use crate::client::Client;
use crate::descriptor::{ActionDescriptor, ModelDescriptor};
use crate::error::{BuildError, BuildResult, ErrorCode, OperationError, SdkError};
use crate::transport::{GraphQLResponse, RequestContext, ResponseStream};
use recordql_runtime::{HydratedResult, Record, RecordError, RecordList};
use recordql_syntax::OperationKind;
use serde_json::Value;
use std::ops::Deref;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Code attached to an unsuccessful action that reported no errors.
pub const UNSUCCESSFUL_ACTION_CODE: &str = "GGT_UNKNOWN";

/// Reads an operation's response data.
pub trait ResponseHandler: Send + Sync {
    type Output: Send;

    /// Turns the response `data` into the runner's output.
    fn handle(
        &self,
        client: &Client,
        operation: &PreparedOperation,
        data: &Value,
    ) -> Result<Self::Output, OperationError>;
}

/// The outcome of one execution.
#[derive(Debug, Clone)]
pub struct OperationResult<T> {
    /// The hydrated data. `None` whenever `error` is set.
    pub data: Option<T>,
    pub error: Option<OperationError>,
    /// The response's `extensions`, when one arrived.
    pub extensions: Option<Value>,
}

impl<T> OperationResult<T> {
    fn success(data: T, extensions: Option<Value>) -> Self {
        Self {
            data: Some(data),
            error: None,
            extensions,
        }
    }

    fn failure(error: OperationError, extensions: Option<Value>) -> Self {
        Self {
            data: None,
            error: Some(error),
            extensions,
        }
    }

    /// Returns true if the operation succeeded.
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.data.is_some()
    }

    /// Converts into a `Result`.
    pub fn into_result(self) -> Result<T, OperationError> {
        match (self.data, self.error) {
            (_, Some(error)) => Err(error),
            (Some(data), None) => Ok(data),
            (None, None) => Err(SdkError::internal("operation produced no result").into()),
        }
    }
}

/// A built operation ready to run.
#[derive(Debug, Clone)]
pub struct Prepared<H> {
    client: Client,
    operation: PreparedOperation,
    handler: H,
}

impl<H> Prepared<H> {
    pub(crate) fn new(client: Client, operation: PreparedOperation, handler: H) -> Self {
        Self {
            client,
            operation,
            handler,
        }
    }

    /// The compiled operation.
    pub fn operation(&self) -> &PreparedOperation {
        &self.operation
    }

    /// Treats a missing record as `None` instead of an error.
    pub fn maybe(self) -> Prepared<Maybe<H>> {
        Prepared {
            client: self.client,
            operation: self.operation,
            handler: Maybe(self.handler),
        }
    }
}

impl<H: ResponseHandler> Prepared<H> {
    /// Runs the operation once.
    pub async fn execute(&self) -> OperationResult<H::Output> {
        self.execute_with(RequestContext::default()).await
    }

    /// Runs the operation once with request options.
    pub async fn execute_with(&self, context: RequestContext) -> OperationResult<H::Output> {
        match self.client.dispatch(&self.operation, context).await {
            Ok(response) => complete(&self.client, &self.operation, &self.handler, response),
            Err(error) => {
                warn!(operation = ?self.operation.compiled.operation_name, %error, "transport failed");
                OperationResult::failure(error.into(), None)
            }
        }
    }

    /// Subscribes to a live operation.
    ///
    /// Every item of the stream is hydrated through the client's store, so
    /// records handed out earlier update in place.
    pub async fn subscribe(self, context: RequestContext) -> Result<LiveStream<H>, OperationError> {
        if self.operation.kind != OperationKind::Subscription {
            return Err(SdkError::new(
                ErrorCode::UnsupportedOperation,
                "only live operations can be subscribed to",
            )
            .into());
        }

        let abort = context.abort.clone();
        let stream = self.client.open_stream(&self.operation, context).await?;
        Ok(LiveStream {
            prepared: self,
            stream,
            abort,
            closed: false,
        })
    }

    /// Wraps the runner in a state tracker.
    pub fn track(self) -> TrackedOperation<H>
    where
        H::Output: Clone + Sync,
    {
        TrackedOperation::new(self)
    }
}

fn complete<H: ResponseHandler>(
    client: &Client,
    operation: &PreparedOperation,
    handler: &H,
    response: GraphQLResponse,
) -> OperationResult<H::Output> {
    let GraphQLResponse {
        data,
        errors,
        extensions,
    } = response;

    if !errors.is_empty() {
        warn!(
            operation = ?operation.compiled.operation_name,
            count = errors.len(),
            "response carried GraphQL errors"
        );
        return OperationResult::failure(OperationError::GraphQL(errors), extensions);
    }
    let Some(data) = data else {
        let error = SdkError::new(ErrorCode::NoData, "response has no data");
        return OperationResult::failure(error.into(), extensions);
    };

    match handler.handle(client, operation, &data) {
        Ok(output) => {
            debug!(operation = ?operation.compiled.operation_name, "operation succeeded");
            OperationResult::success(output, extensions)
        }
        Err(error) => {
            debug!(operation = ?operation.compiled.operation_name, %error, "operation failed");
            OperationResult::failure(error, extensions)
        }
    }
}

/// A subscription whose items are hydrated records.
#[derive(Debug)]
pub struct LiveStream<H> {
    prepared: Prepared<H>,
    stream: ResponseStream,
    abort: Option<crate::transport::AbortSignal>,
    closed: bool,
}

impl<H: ResponseHandler> LiveStream<H> {
    /// Waits for the next result. `None` once the stream has ended.
    ///
    /// Aborting yields one `Aborted` error and ends the stream.
    pub async fn next(&mut self) -> Option<OperationResult<H::Output>> {
        if self.closed {
            return None;
        }

        let item = match &self.abort {
            Some(signal) => tokio::select! {
                biased;
                () = signal.aborted() => {
                    self.closed = true;
                    return Some(OperationResult::failure(SdkError::aborted().into(), None));
                }
                item = self.stream.next() => item,
            },
            None => self.stream.next().await,
        };

        let Some(item) = item else {
            self.closed = true;
            return None;
        };
        let Prepared {
            client,
            operation,
            handler,
        } = &self.prepared;
        Some(match item {
            Ok(response) => complete(client, operation, handler, response),
            Err(error) => OperationResult::failure(error.into(), None),
        })
    }
}

/// Lifecycle of a tracked operation.
#[derive(Debug, Clone)]
pub enum OperationState<T> {
    Idle,
    Pending,
    Success(T),
    Error(OperationError),
}

impl<T> OperationState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&OperationError> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }
}

/// A runner whose state can be observed.
///
/// Runs may overlap; the state reflects whichever run completed last.
pub struct TrackedOperation<H: ResponseHandler> {
    prepared: Prepared<H>,
    state: watch::Sender<OperationState<H::Output>>,
}

impl<H> TrackedOperation<H>
where
    H: ResponseHandler,
    H::Output: Clone + Sync,
{
    /// Creates a tracker in the `Idle` state.
    pub fn new(prepared: Prepared<H>) -> Self {
        let (state, _) = watch::channel(OperationState::Idle);
        Self { prepared, state }
    }

    /// Watches state changes.
    pub fn watch(&self) -> watch::Receiver<OperationState<H::Output>> {
        self.state.subscribe()
    }

    /// The current state.
    pub fn state(&self) -> OperationState<H::Output> {
        self.state.borrow().clone()
    }

    /// Runs the operation, moving through `Pending` to `Success` or `Error`.
    pub async fn run(&self, context: RequestContext) -> OperationResult<H::Output> {
        self.state.send_replace(OperationState::Pending);
        let result = self.prepared.execute_with(context).await;

        let next = match (&result.data, &result.error) {
            (_, Some(error)) => OperationState::Error(error.clone()),
            (Some(data), None) => OperationState::Success(data.clone()),
            (None, None) => OperationState::Idle,
        };
        self.state.send_replace(next);
        result
    }
}

/// Hydrates a single record at the operation root.
#[derive(Debug, Clone)]
pub struct RecordHandler {
    model: String,
    lookup: String,
}

impl RecordHandler {
    pub fn new(model: impl Into<String>, lookup: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            lookup: lookup.into(),
        }
    }
}

impl ResponseHandler for RecordHandler {
    type Output = Record;

    fn handle(
        &self,
        client: &Client,
        operation: &PreparedOperation,
        data: &Value,
    ) -> Result<Record, OperationError> {
        match operation.root(data) {
            None | Some(Value::Null) => Err(OperationError::NotFound {
                model: self.model.clone(),
                lookup: self.lookup.clone(),
            }),
            Some(raw) => Ok(client
                .hydrator()
                .hydrate(None, &self.model, raw, &operation.selection)?),
        }
    }
}

/// Turns `NotFound` into `Ok(None)`.
#[derive(Debug, Clone)]
pub struct Maybe<H>(pub H);

impl<H: ResponseHandler> ResponseHandler for Maybe<H> {
    type Output = Option<H::Output>;

    fn handle(
        &self,
        client: &Client,
        operation: &PreparedOperation,
        data: &Value,
    ) -> Result<Self::Output, OperationError> {
        match self.0.handle(client, operation, data) {
            Ok(output) => Ok(Some(output)),
            Err(OperationError::NotFound { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// Hydrates a connection into a [`Page`].
#[derive(Debug, Clone)]
pub struct ConnectionHandler {
    model: ModelDescriptor,
    options: FindManyOptions,
}

impl ConnectionHandler {
    pub fn new(model: ModelDescriptor, options: FindManyOptions) -> Self {
        Self { model, options }
    }
}

impl ResponseHandler for ConnectionHandler {
    type Output = Page;

    fn handle(
        &self,
        client: &Client,
        operation: &PreparedOperation,
        data: &Value,
    ) -> Result<Page, OperationError> {
        let records = match operation.root(data) {
            None | Some(Value::Null) => RecordList::default(),
            Some(raw) => client.hydrator().hydrate_connection(
                &self.model.api_identifier,
                raw,
                &operation.selection,
            )?,
        };
        Ok(Page {
            records,
            client: client.clone(),
            model: self.model.clone(),
            options: self.options.clone(),
        })
    }
}

/// Hydrates the first node of a connection.
#[derive(Debug, Clone)]
pub struct FirstRecordHandler {
    model: String,
    lookup: String,
    unique: bool,
}

impl FirstRecordHandler {
    pub fn new(model: impl Into<String>, lookup: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            lookup: lookup.into(),
            unique: false,
        }
    }

    /// Rejects responses with more than one node.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

impl ResponseHandler for FirstRecordHandler {
    type Output = Record;

    fn handle(
        &self,
        client: &Client,
        operation: &PreparedOperation,
        data: &Value,
    ) -> Result<Record, OperationError> {
        let records = match operation.root(data) {
            None | Some(Value::Null) => RecordList::default(),
            Some(raw) => {
                client
                    .hydrator()
                    .hydrate_connection(&self.model, raw, &operation.selection)?
            }
        };

        if self.unique && records.len() > 1 {
            return Err(OperationError::NonUniqueData {
                model: self.model.clone(),
                lookup: self.lookup.clone(),
                count: records.len(),
            });
        }
        records
            .into_iter()
            .next()
            .ok_or_else(|| OperationError::NotFound {
                model: self.model.clone(),
                lookup: self.lookup.clone(),
            })
    }
}

/// What a successful action returned.
#[derive(Debug, Clone)]
pub enum ActionData {
    /// The record a single action touched.
    Record(Record),
    /// The records a bulk action touched.
    Records(Vec<Record>),
    /// The custom result of an action with a return type.
    Returned(Value),
    /// The action returned nothing, e.g. a delete.
    Empty,
}

impl ActionData {
    /// The touched record, if exactly one is known.
    pub fn record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    /// The touched records.
    pub fn records(&self) -> &[Record] {
        match self {
            Self::Record(record) => std::slice::from_ref(record),
            Self::Records(records) => records,
            _ => &[],
        }
    }

    /// The custom result, if any.
    pub fn returned(&self) -> Option<&Value> {
        match self {
            Self::Returned(value) => Some(value),
            _ => None,
        }
    }
}

/// Reads a model action's result object.
#[derive(Debug, Clone)]
pub struct ActionHandler {
    model: String,
    record_field: String,
    is_bulk: bool,
    has_return_type: bool,
}

impl ActionHandler {
    pub fn new(action: &ActionDescriptor) -> Self {
        Self {
            model: action.model_api_identifier.clone(),
            record_field: action.model_selection_field.clone(),
            is_bulk: action.is_bulk,
            has_return_type: action.has_return_type,
        }
    }
}

impl ResponseHandler for ActionHandler {
    type Output = ActionData;

    fn handle(
        &self,
        client: &Client,
        operation: &PreparedOperation,
        data: &Value,
    ) -> Result<ActionData, OperationError> {
        let record_field = (!self.has_return_type).then_some(self.record_field.as_str());
        let hydrated = read_action_result(client, operation, &self.model, record_field, data)?;

        if self.has_return_type {
            return Ok(ActionData::Returned(hydrated.result.unwrap_or(Value::Null)));
        }
        let mut records = hydrated.records;
        Ok(match (self.is_bulk, records.len()) {
            (true, _) => ActionData::Records(records),
            (false, 0) => ActionData::Empty,
            (false, _) => ActionData::Record(records.swap_remove(0)),
        })
    }
}

/// Reads a global action's result object.
#[derive(Debug, Clone)]
pub struct GlobalActionHandler {
    operation_name: String,
}

impl GlobalActionHandler {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
        }
    }
}

impl ResponseHandler for GlobalActionHandler {
    type Output = Value;

    fn handle(
        &self,
        client: &Client,
        operation: &PreparedOperation,
        data: &Value,
    ) -> Result<Value, OperationError> {
        let hydrated = read_action_result(client, operation, &self.operation_name, None, data)?;
        Ok(hydrated.result.unwrap_or(Value::Null))
    }
}

fn read_action_result(
    client: &Client,
    operation: &PreparedOperation,
    model: &str,
    record_field: Option<&str>,
    data: &Value,
) -> Result<HydratedResult, OperationError> {
    let raw = operation.root(data).ok_or_else(|| {
        OperationError::from(SdkError::new(
            ErrorCode::InvalidResponse,
            format!("response is missing `{}`", operation.root_path.join(".")),
        ))
    })?;
    let hydrated = client
        .hydrator()
        .hydrate_result(model, raw, record_field, &operation.selection)?;

    if let Some(error) = &hydrated.error {
        return Err(OperationError::Record(error.clone()));
    }
    if !hydrated.success {
        return Err(OperationError::Record(RecordError::new(
            UNSUCCESSFUL_ACTION_CODE,
            "the action was not successful and reported no errors",
        )));
    }
    Ok(hydrated)
}

/// One page of a connection.
///
/// Dereferences to the [`RecordList`] it holds.
#[derive(Debug, Clone)]
pub struct Page {
    records: RecordList,
    client: Client,
    model: ModelDescriptor,
    options: FindManyOptions,
}

impl Page {
    /// The records of this page.
    pub fn records(&self) -> &RecordList {
        &self.records
    }

    pub fn into_records(self) -> RecordList {
        self.records
    }

    /// The options this page was read with.
    pub fn options(&self) -> &FindManyOptions {
        &self.options
    }

    /// Builds the read for the following page.
    pub fn next_page(&self) -> BuildResult<Prepared<ConnectionHandler>> {
        let cursor = self
            .records
            .page_info()
            .end_cursor
            .as_deref()
            .filter(|_| self.records.has_next_page())
            .ok_or(BuildError::PageUnavailable { direction: "next" })?;
        self.client
            .find_many(&self.model, self.options.next_page(cursor))
    }

    /// Builds the read for the preceding page.
    pub fn previous_page(&self) -> BuildResult<Prepared<ConnectionHandler>> {
        let cursor = self
            .records
            .page_info()
            .start_cursor
            .as_deref()
            .filter(|_| self.records.has_previous_page())
            .ok_or(BuildError::PageUnavailable {
                direction: "previous",
            })?;
        self.client
            .find_many(&self.model, self.options.previous_page(cursor))
    }
}

impl Deref for Page {
    type Target = RecordList;

    fn deref(&self) -> &RecordList {
        &self.records
    }
}
