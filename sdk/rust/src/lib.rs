//! recordql SDK
//!
//! This crate provides the user-facing client: operation builders driven by
//! generated model and action descriptors, runners that send operations
//! through a pluggable transport, and hydration of the responses into
//! identity-preserving records.
//!
//! - `descriptor`: Model and action descriptors
//! - `builder`: Descriptor to compiled operation
//! - `client`: The client and its configuration
//! - `runner`: Execution, result handling, live streams and state tracking
//! - `transport`: The transport seam and abort signals
//! - `error`: Build, transport and operation errors
//!
//! # Example
//!
//! ```ignore
//! use recordql_sdk::{ActionDescriptor, Client, SelectOptions};
//! use serde_json::json;
//!
//! let client = Client::new(transport);
//! let update = ActionDescriptor::new("updateUser", "user", "user")
//!     .variable("id", "GadgetID!")
//!     .variable("user", "UpdateUserInput")
//!     .accepts_model_input();
//!
//! // Flat input is wrapped as `{ id, user: { name } }`.
//! let result = client
//!     .action(&update, json!({ "id": "1", "name": "Bob" }), SelectOptions::new())?
//!     .execute()
//!     .await;
//!
//! match result.error {
//!     None => println!("updated {:?}", result.data),
//!     Some(error) if error.ran() => println!("ran but failed: {error}"),
//!     Some(error) => println!("nothing ran: {error}"),
//! }
//! ```

pub mod builder;
pub mod client;
pub mod descriptor;
pub mod error;
pub mod runner;
pub mod transport;

pub use builder::{FindManyOptions, OperationBuilder, PreparedOperation, SelectOptions};
pub use client::{Client, ClientConfig};
pub use descriptor::{ActionDescriptor, GlobalActionDescriptor, ModelDescriptor};
pub use error::{BuildError, BuildResult, ErrorCode, OperationError, SdkError, SdkResult};
pub use runner::{
    ActionData, LiveStream, OperationResult, OperationState, Page, Prepared, ResponseHandler,
    TrackedOperation,
};
pub use transport::{
    AbortController, AbortSignal, GraphQLError, GraphQLRequest, GraphQLResponse, RequestContext,
    ResponseSender, ResponseStream, Transport,
};

pub use recordql_runtime::{PageInfo, Record, RecordError, RecordList, RecordStore};
pub use recordql_syntax::{FieldCall, FieldSelection, Variable};
