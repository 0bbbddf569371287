//! Message envelopes and responses.
//!
//! The pipeline moves a single type-erased [`Message`] around, shared as
//! `Arc<Message>` so that no handler can mutate what it receives. Typed
//! builders ([`Command`], [`GetQuery`], [`FindQuery`]) convert into it through
//! [`IntoMessage`], and the matching response types deserialize out of the
//! JSON value a handler produces.
//!
//! ```rust,ignore
//! let query = GetQuery::<_, User>::new("GetUser", json!({ "id": 7 }))
//!     .with_correlation_id("corr-1");
//! let response = api.get(query).await?;
//! ```

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DispatchResult;

// ============================================================================
// Header and envelope
// ============================================================================

/// Identity fields carried by every message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeader {
    /// Dispatch key.
    pub message_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl MessageHeader {
    /// Creates a header with only a message name.
    pub fn new(message_name: impl Into<String>) -> Self {
        Self {
            message_name: message_name.into(),
            ..Default::default()
        }
    }
}

/// The kind of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    /// A request to change state.
    Command,
    /// A query for a single result.
    GetQuery,
    /// A query for a page of results.
    FindQuery,
    /// A plain named message.
    #[default]
    Message,
}

/// A named, immutable message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(flatten)]
    header: MessageHeader,
    #[serde(default)]
    kind: MessageKind,
    #[serde(default)]
    body: Value,
}

impl Message {
    /// Creates a plain message with an empty body.
    pub fn new(message_name: impl Into<String>) -> Self {
        Self {
            header: MessageHeader::new(message_name),
            kind: MessageKind::Message,
            body: Value::Null,
        }
    }

    /// Creates a message from its parts.
    pub fn from_parts(header: MessageHeader, kind: MessageKind, body: Value) -> Self {
        Self { header, kind, body }
    }

    /// Replaces the body (builder pattern).
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn name(&self) -> &str {
        &self.header.message_name
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn message_id(&self) -> Option<&str> {
        self.header.message_id.as_deref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.header.request_id.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.header.correlation_id.as_deref()
    }

    pub fn source_id(&self) -> Option<&str> {
        self.header.source_id.as_deref()
    }

    /// Deserializes the body into `T`.
    pub fn decode_body<T: DeserializeOwned>(&self) -> DispatchResult<T> {
        Ok(T::deserialize(&self.body)?)
    }
}

/// Builder methods shared by every typed message.
macro_rules! header_builders {
    () => {
        /// Sets the message id.
        pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
            self.header.message_id = Some(id.into());
            self
        }

        /// Sets the request id.
        pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
            self.header.request_id = Some(id.into());
            self
        }

        /// Sets the correlation id.
        pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
            self.header.correlation_id = Some(id.into());
            self
        }

        /// Sets the source id.
        pub fn with_source_id(mut self, id: impl Into<String>) -> Self {
            self.header.source_id = Some(id.into());
            self
        }
    };
}

impl Message {
    header_builders!();
}

/// Conversion into the type-erased envelope.
pub trait IntoMessage {
    fn into_message(self) -> DispatchResult<Message>;
}

impl IntoMessage for Message {
    fn into_message(self) -> DispatchResult<Message> {
        Ok(self)
    }
}

// ============================================================================
// Typed messages
// ============================================================================

/// A command carrying a payload.
#[derive(Debug, Clone)]
pub struct Command<P> {
    header: MessageHeader,
    pub payload: P,
}

impl<P: Serialize> Command<P> {
    pub fn new(message_name: impl Into<String>, payload: P) -> Self {
        Self {
            header: MessageHeader::new(message_name),
            payload,
        }
    }

    header_builders!();
}

impl<P: Serialize> IntoMessage for Command<P> {
    fn into_message(self) -> DispatchResult<Message> {
        let body = serde_json::to_value(self.payload)?;
        Ok(Message::from_parts(self.header, MessageKind::Command, body))
    }
}

/// A query expecting a single result of type `R`.
#[derive(Debug, Clone)]
pub struct GetQuery<C, R> {
    header: MessageHeader,
    pub criteria: C,
    _result: PhantomData<fn() -> R>,
}

impl<C: Serialize, R> GetQuery<C, R> {
    pub fn new(message_name: impl Into<String>, criteria: C) -> Self {
        Self {
            header: MessageHeader::new(message_name),
            criteria,
            _result: PhantomData,
        }
    }

    header_builders!();
}

impl<C: Serialize, R> IntoMessage for GetQuery<C, R> {
    fn into_message(self) -> DispatchResult<Message> {
        let body = serde_json::to_value(self.criteria)?;
        Ok(Message::from_parts(self.header, MessageKind::GetQuery, body))
    }
}

/// A query expecting a page of results of type `R`.
///
/// `offset` and `limit` are paging hints; when set they are added to the body
/// next to the serialized criteria.
#[derive(Debug, Clone)]
pub struct FindQuery<C, R> {
    header: MessageHeader,
    pub criteria: C,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    _result: PhantomData<fn() -> R>,
}

impl<C: Serialize, R> FindQuery<C, R> {
    pub fn new(message_name: impl Into<String>, criteria: C) -> Self {
        Self {
            header: MessageHeader::new(message_name),
            criteria,
            offset: None,
            limit: None,
            _result: PhantomData,
        }
    }

    /// Sets the paging window.
    pub fn page(mut self, offset: u64, limit: u64) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    header_builders!();
}

impl<C: Serialize, R> IntoMessage for FindQuery<C, R> {
    fn into_message(self) -> DispatchResult<Message> {
        let mut body = Map::new();
        body.insert("criteria".into(), serde_json::to_value(self.criteria)?);
        if let Some(offset) = self.offset {
            body.insert("offset".into(), offset.into());
        }
        if let Some(limit) = self.limit {
            body.insert("limit".into(), limit.into());
        }
        Ok(Message::from_parts(
            self.header,
            MessageKind::FindQuery,
            Value::Object(body),
        ))
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Response to a command. Handlers may attach arbitrary details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Response to a [`GetQuery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetQueryResponse<R> {
    pub result: R,
}

impl<R> GetQueryResponse<R> {
    pub fn new(result: R) -> Self {
        Self { result }
    }
}

/// Response to a [`FindQuery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindQueryResponse<R> {
    pub results: Vec<R>,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub has_more: bool,
}

impl<R> FindQueryResponse<R> {
    pub fn new(results: Vec<R>, offset: u64, has_more: bool) -> Self {
        Self {
            results,
            offset,
            has_more,
        }
    }
}

/// Serializes a response for returning from a handler.
pub fn respond<T: Serialize>(response: T) -> DispatchResult<Value> {
    Ok(serde_json::to_value(response)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_serializes_flat_camel_case() {
        let msg = Message::new("Ping")
            .with_correlation_id("corr")
            .with_body(json!({"n": 1}));

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["messageName"], "Ping");
        assert_eq!(value["correlationId"], "corr");
        assert_eq!(value["kind"], "message");
        assert!(value.get("messageId").is_none());
    }

    #[test]
    fn message_deserializes_with_only_a_name() {
        let msg: Message = serde_json::from_value(json!({"messageName": "Ping"})).unwrap();
        assert_eq!(msg.name(), "Ping");
        assert_eq!(msg.kind(), MessageKind::Message);
        assert!(msg.body().is_null());
    }

    #[test]
    fn find_query_puts_paging_next_to_criteria() {
        let msg = FindQuery::<_, String>::new("FindUsers", json!({"active": true}))
            .page(20, 10)
            .into_message()
            .unwrap();

        assert_eq!(msg.kind(), MessageKind::FindQuery);
        assert_eq!(msg.body()["criteria"]["active"], true);
        assert_eq!(msg.body()["offset"], 20);
        assert_eq!(msg.body()["limit"], 10);
    }

    #[test]
    fn command_keeps_header_fields() {
        let msg = Command::new("CreateUser", json!({"name": "ada"}))
            .with_message_id("m-1")
            .with_source_id("admin-ui")
            .into_message()
            .unwrap();

        assert_eq!(msg.kind(), MessageKind::Command);
        assert_eq!(msg.message_id(), Some("m-1"));
        assert_eq!(msg.source_id(), Some("admin-ui"));
        assert_eq!(msg.body()["name"], "ada");
    }

    #[test]
    fn find_response_reads_camel_case() {
        let resp: FindQueryResponse<u32> =
            serde_json::from_value(json!({"results": [1, 2], "offset": 4, "hasMore": true}))
                .unwrap();
        assert_eq!(resp, FindQueryResponse::new(vec![1, 2], 4, true));
    }
}
