//! Integration tests for recordql_sdk

use async_trait::async_trait;
use recordql_sdk::{
    AbortController, ActionData, ActionDescriptor, BuildError, Client, ClientConfig, ErrorCode,
    FieldSelection, FindManyOptions, GlobalActionDescriptor, GraphQLError, GraphQLRequest,
    GraphQLResponse, ModelDescriptor, OperationError, Record, RequestContext, ResponseSender,
    ResponseStream, SdkError, SdkResult, SelectOptions, Transport,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Replays scripted responses and records every request.
#[derive(Clone, Default)]
struct MockTransport {
    responses: Arc<Mutex<VecDeque<SdkResult<GraphQLResponse>>>>,
    streams: Arc<Mutex<VecDeque<ResponseStream>>>,
    requests: Arc<Mutex<Vec<GraphQLRequest>>>,
}

impl MockTransport {
    fn respond(&self, data: Value) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(GraphQLResponse::data(data)));
        self
    }

    fn respond_with(&self, response: SdkResult<GraphQLResponse>) -> &Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    fn stream(&self) -> ResponseSender {
        let (stream, sender) = ResponseStream::channel(8);
        self.streams.lock().unwrap().push_back(stream);
        sender
    }

    fn requests(&self) -> Vec<GraphQLRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: GraphQLRequest) -> SdkResult<GraphQLResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SdkError::internal("no scripted response")))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn query(&self, request: GraphQLRequest, _: RequestContext) -> SdkResult<GraphQLResponse> {
        self.next(request)
    }

    async fn mutation(
        &self,
        request: GraphQLRequest,
        _: RequestContext,
    ) -> SdkResult<GraphQLResponse> {
        self.next(request)
    }

    async fn subscription(
        &self,
        request: GraphQLRequest,
        _: RequestContext,
    ) -> SdkResult<ResponseStream> {
        self.requests.lock().unwrap().push(request);
        self.streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SdkError::internal("no scripted stream"))
    }
}

/// Never answers.
struct Hanging;

#[async_trait]
impl Transport for Hanging {
    async fn query(&self, _: GraphQLRequest, _: RequestContext) -> SdkResult<GraphQLResponse> {
        std::future::pending().await
    }

    async fn mutation(&self, _: GraphQLRequest, _: RequestContext) -> SdkResult<GraphQLResponse> {
        std::future::pending().await
    }

    async fn subscription(&self, _: GraphQLRequest, _: RequestContext) -> SdkResult<ResponseStream> {
        std::future::pending().await
    }
}

/// Answers once released.
struct Gated {
    release: Arc<Notify>,
    data: Value,
}

#[async_trait]
impl Transport for Gated {
    async fn query(&self, _: GraphQLRequest, _: RequestContext) -> SdkResult<GraphQLResponse> {
        self.release.notified().await;
        Ok(GraphQLResponse::data(self.data.clone()))
    }

    async fn mutation(&self, r: GraphQLRequest, c: RequestContext) -> SdkResult<GraphQLResponse> {
        self.query(r, c).await
    }

    async fn subscription(&self, _: GraphQLRequest, _: RequestContext) -> SdkResult<ResponseStream> {
        Err(SdkError::new(ErrorCode::UnsupportedOperation, "no subscriptions"))
    }
}

fn users() -> ModelDescriptor {
    ModelDescriptor::new("user", "user", "users")
        .with_default_selection(FieldSelection::new().field("id").field("name"))
}

/// Routes builder and client logs to the test output. Set `RUST_LOG=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn update_user() -> ActionDescriptor {
    ActionDescriptor::new("updateUser", "user", "user")
        .variable("id", "GadgetID!")
        .variable("user", "UpdateUserInput")
        .accepts_model_input()
        .create_or_update()
        .with_default_selection(FieldSelection::new().field("id").field("name"))
}

/// Compile, send and hydrate a `{ id name }` read.
#[tokio::test]
async fn test_find_one_round_trip() {
    init_tracing();
    let transport = MockTransport::default();
    transport.respond(json!({ "user": { "id": "1", "name": "Bob" } }));
    let client = Client::new(transport.clone());

    let result = client
        .find_one(&users(), "1", SelectOptions::new())
        .unwrap()
        .execute()
        .await;

    let record = result.data.unwrap();
    assert!(result.error.is_none());
    assert_eq!(record.to_json(), json!({ "id": "1", "name": "Bob" }));
    assert!(record.pending_fields().is_empty());

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].operation_name.as_deref(), Some("user"));
    assert_eq!(
        serde_json::to_value(&requests[0].variables).unwrap(),
        json!({ "id": "1" })
    );
}

/// Reads and actions on the same id share one record.
#[tokio::test]
async fn test_records_are_shared_across_operations() {
    let transport = MockTransport::default();
    transport
        .respond(json!({ "user": { "id": "1", "name": "Bob" } }))
        .respond(json!({
            "updateUser": {
                "success": true,
                "errors": null,
                "user": { "id": "1", "name": "Robert" }
            }
        }));
    let client = Client::new(transport);

    let bob = client
        .find_one(&users(), "1", SelectOptions::new())
        .unwrap()
        .execute()
        .await
        .into_result()
        .unwrap();

    let updated = client
        .action(&update_user(), json!({ "id": "1", "name": "Robert" }), SelectOptions::new())
        .unwrap()
        .execute()
        .await
        .into_result()
        .unwrap();

    assert!(Record::ptr_eq(updated.record().unwrap(), &bob));
    assert_eq!(bob.get("name"), Some(json!("Robert")));
    assert!(bob.error().is_none());
}

/// Field errors in an action result fail the action but still reach the record.
#[tokio::test]
async fn test_action_with_record_errors() {
    let transport = MockTransport::default();
    transport.respond(json!({
        "updateUser": {
            "success": false,
            "errors": [{
                "code": "GGT_INVALID_RECORD",
                "message": "name is required",
                "validationErrors": [{ "apiIdentifier": "name", "message": "is required" }]
            }],
            "user": { "id": "1", "name": "" }
        }
    }));
    let client = Client::new(transport.clone());

    let result = client
        .action(&update_user(), json!({ "id": "1", "name": "" }), SelectOptions::new())
        .unwrap()
        .execute()
        .await;

    assert!(result.data.is_none());
    let error = result.error.unwrap();
    assert!(error.ran());
    assert!(error.is_partial_failure());
    let record_error = error.record_error().unwrap();
    assert!(record_error.is_invalid_record());
    assert_eq!(record_error.invalid_fields(), ["name"]);

    let cached = client.store().get("user", "1");
    assert!(cached.is_none() || cached.unwrap().error().is_some());
    assert_eq!(
        serde_json::to_value(&transport.requests()[0].variables).unwrap(),
        json!({ "id": "1", "user": { "name": "" } })
    );
}

#[tokio::test]
async fn test_top_level_graphql_errors() {
    let transport = MockTransport::default();
    transport.respond_with(Ok(GraphQLResponse::errors(vec![GraphQLError::new(
        "Cannot query field \"nope\"",
    )])));
    let client = Client::new(transport);

    let result = client
        .find_one(&users(), "1", SelectOptions::new())
        .unwrap()
        .execute()
        .await;

    match result.error {
        Some(OperationError::GraphQL(errors)) => assert_eq!(errors.len(), 1),
        other => panic!("expected GraphQL errors, got {other:?}"),
    }
}

#[tokio::test]
async fn test_transport_failure_means_nothing_ran() {
    let transport = MockTransport::default();
    transport.respond_with(Err(SdkError::network("connection reset")));
    let client = Client::new(transport);

    let error = client
        .find_many(&users(), FindManyOptions::new())
        .unwrap()
        .execute()
        .await
        .error
        .unwrap();

    assert!(!error.ran());
    assert!(matches!(
        error,
        OperationError::Transport(SdkError { code: ErrorCode::NetworkError, .. })
    ));
}

/// Wire-level codes reported by a transport reach the caller unchanged.
#[tokio::test]
async fn test_transport_reported_codes() {
    let transport = MockTransport::default();
    transport
        .respond_with(Err(SdkError::new(ErrorCode::TooManyRequests, "slow down")
            .with_extension("retryAfter", 3)))
        .respond_with(Err(SdkError::new(ErrorCode::Unauthorized, "bad token")));
    let client = Client::new(transport);

    let first = client
        .find_one(&users(), "1", SelectOptions::new())
        .unwrap()
        .execute()
        .await;
    match first.error {
        Some(OperationError::Transport(error)) => {
            assert!(error.is_retryable());
            assert_eq!(error.extensions.unwrap()["retryAfter"], 3);
        }
        other => panic!("expected a transport error, got {other:?}"),
    }

    let second = client
        .find_one(&users(), "1", SelectOptions::new())
        .unwrap()
        .execute()
        .await;
    match second.error {
        Some(OperationError::Transport(error)) => {
            assert!(error.is_client_error());
            assert!(!error.is_retryable());
        }
        other => panic!("expected a transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_abort_cancels_pending_request() {
    let client = Client::with_config(Hanging, ClientConfig::new().no_timeout());
    let controller = AbortController::new();
    let prepared = client.find_one(&users(), "1", SelectOptions::new()).unwrap();

    let (result, ()) = tokio::join!(
        prepared.execute_with(RequestContext::new().with_abort(controller.signal())),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            controller.abort();
        }
    );

    let error = result.error.unwrap();
    assert!(!error.ran());
    assert!(matches!(error, OperationError::Transport(ref e) if e.is_aborted()));
}

#[tokio::test]
async fn test_timeout() {
    let client = Client::with_config(Hanging, ClientConfig::new().timeout(Duration::from_millis(10)));

    let result = client
        .find_one(&users(), "1", SelectOptions::new())
        .unwrap()
        .execute()
        .await;

    assert!(matches!(
        result.error,
        Some(OperationError::Transport(SdkError { code: ErrorCode::Timeout, .. }))
    ));
}

#[tokio::test]
async fn test_pagination() {
    let transport = MockTransport::default();
    transport
        .respond(json!({
            "users": {
                "pageInfo": {
                    "hasNextPage": true,
                    "hasPreviousPage": false,
                    "startCursor": "a",
                    "endCursor": "b"
                },
                "edges": [
                    { "cursor": "a", "node": { "id": "1", "name": "Bob" } },
                    { "cursor": "b", "node": { "id": "2", "name": "Alice" } }
                ]
            }
        }))
        .respond(json!({
            "users": {
                "pageInfo": {
                    "hasNextPage": false,
                    "hasPreviousPage": true,
                    "startCursor": "c",
                    "endCursor": "c"
                },
                "edges": [{ "cursor": "c", "node": { "id": "3", "name": "Eve" } }]
            }
        }));
    let client = Client::new(transport.clone());

    let first = client
        .find_many(&users(), FindManyOptions::new().first(2))
        .unwrap()
        .execute()
        .await
        .into_result()
        .unwrap();
    assert_eq!(first.len(), 2);
    assert!(first.has_next_page());
    assert!(matches!(
        first.previous_page(),
        Err(BuildError::PageUnavailable { direction: "previous" })
    ));

    let second = first
        .next_page()
        .unwrap()
        .execute()
        .await
        .into_result()
        .unwrap();
    assert_eq!(second.first().unwrap().get("name"), Some(json!("Eve")));
    assert!(second.next_page().is_err());
    assert!(second.previous_page().is_ok());

    assert_eq!(
        serde_json::to_value(&transport.requests()[1].variables).unwrap(),
        json!({ "after": "b", "first": 2 })
    );
}

#[tokio::test]
async fn test_find_first_and_maybe() {
    let transport = MockTransport::default();
    transport
        .respond(json!({ "users": { "edges": [] } }))
        .respond(json!({ "users": { "edges": [] } }));
    let client = Client::new(transport.clone());

    let error = client
        .find_first(&users(), FindManyOptions::new())
        .unwrap()
        .execute()
        .await
        .error
        .unwrap();
    assert!(error.is_not_found());

    let found = client
        .maybe_find_first(&users(), FindManyOptions::new())
        .unwrap()
        .execute()
        .await
        .into_result()
        .unwrap();
    assert!(found.is_none());
    assert_eq!(transport.requests()[0].variables["first"], json!(1));
}

/// Live results update the record handed out by the first result.
#[tokio::test]
async fn test_live_query_updates_in_place() {
    let transport = MockTransport::default();
    let sender = transport.stream();
    let client = Client::new(transport.clone());

    let mut live = client
        .find_one(&users(), "1", SelectOptions::new().live())
        .unwrap()
        .subscribe(RequestContext::new())
        .await
        .unwrap();
    assert!(transport.requests()[0].query.starts_with("subscription user($id: GadgetID!) @live {"));

    sender
        .send(GraphQLResponse::data(json!({ "user": { "id": "1", "name": "Bob" } })))
        .await
        .unwrap();
    let first = live.next().await.unwrap().into_result().unwrap();

    sender
        .send(GraphQLResponse::data(json!({ "user": { "id": "1", "name": "Robert" } })))
        .await
        .unwrap();
    let second = live.next().await.unwrap().into_result().unwrap();

    assert!(Record::ptr_eq(&first, &second));
    assert_eq!(first.get("name"), Some(json!("Robert")));

    drop(sender);
    assert!(live.next().await.is_none());
}

#[tokio::test]
async fn test_live_stream_abort() {
    let transport = MockTransport::default();
    let _sender = transport.stream();
    let client = Client::new(transport);
    let controller = AbortController::new();

    let mut live = client
        .find_many(&users(), FindManyOptions::new().live())
        .unwrap()
        .subscribe(RequestContext::new().with_abort(controller.signal()))
        .await
        .unwrap();
    controller.abort();

    let aborted = live.next().await.unwrap();
    assert!(matches!(aborted.error, Some(OperationError::Transport(ref e)) if e.is_aborted()));
    assert!(live.next().await.is_none());
}

#[tokio::test]
async fn test_variable_mismatch_is_raised_before_dispatch() {
    init_tracing();
    let transport = MockTransport::default();
    let client = Client::new(transport.clone());
    let action = update_user().ambiguous_identifier();

    let err = client
        .action(&action, json!({ "id": "1", "name": "Bob" }), SelectOptions::new())
        .unwrap_err();

    assert!(matches!(err, BuildError::VariableMismatch { ref unexpected, .. } if unexpected == &["name"]));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_bulk_and_global_actions() {
    let transport = MockTransport::default();
    transport
        .respond(json!({
            "bulkDeleteUsers": { "success": true, "errors": null, "users": [{ "id": "1" }, { "id": "2" }] }
        }))
        .respond(json!({ "flipAll": { "success": true, "errors": null, "result": { "flipped": 3 } } }));
    let client = Client::new(transport);

    let bulk = ActionDescriptor::new("bulkDeleteUsers", "user", "users")
        .variable("ids", "[GadgetID!]!")
        .bulk();
    let data = client
        .action(&bulk, json!(["1", "2"]), SelectOptions::new())
        .unwrap()
        .execute()
        .await
        .into_result()
        .unwrap();
    assert!(matches!(data, ActionData::Records(ref records) if records.len() == 2));

    let flip = GlobalActionDescriptor::new("flipAll");
    let returned = client
        .global_action(&flip, Value::Null)
        .unwrap()
        .execute()
        .await
        .into_result()
        .unwrap();
    assert_eq!(returned, json!({ "flipped": 3 }));
}

#[tokio::test]
async fn test_tracked_operation_states() {
    let release = Arc::new(Notify::new());
    let client = Client::new(Gated {
        release: release.clone(),
        data: json!({ "user": { "id": "1", "name": "Bob" } }),
    });
    let tracked = client
        .find_one(&users(), "1", SelectOptions::new())
        .unwrap()
        .track();
    let mut watcher = tracked.watch();

    let (result, ()) = tokio::join!(tracked.run(RequestContext::new()), async {
        watcher.changed().await.unwrap();
        assert!(watcher.borrow_and_update().is_pending());
        release.notify_one();
    });

    assert!(result.is_ok());
    let state = tracked.state();
    assert_eq!(state.data().unwrap().get("name"), Some(json!("Bob")));
}

#[test]
fn test_clients_do_not_share_stores() {
    let a = Client::new(MockTransport::default());
    let b = Client::new(MockTransport::default());
    let record = a
        .hydrator()
        .hydrate(None, "user", &json!({ "id": "1" }), &FieldSelection::new().field("id"))
        .unwrap();

    assert!(Record::ptr_eq(&a.store().get("user", "1").unwrap(), &record));
    assert!(b.store().get("user", "1").is_none());
}
