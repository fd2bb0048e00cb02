use crate::core::saga::short_type_name;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The consumption scope of one inbound message.
///
/// Carries the message, its envelope metadata and the cancellation signal of
/// the pipeline that delivered it. Clones share both the message and the
/// token, so cancelling any clone cancels the whole scope.
pub struct ConsumeContext<M> {
    message: Arc<M>,
    message_id: Uuid,
    correlation_id: Option<Uuid>,
    conversation_id: Option<Uuid>,
    message_type: &'static str,
    sent_time: DateTime<Utc>,
    headers: HashMap<String, String>,
    cancellation: CancellationToken,
}

impl<M> ConsumeContext<M> {
    pub fn new(message: M) -> Self {
        Self {
            message: Arc::new(message),
            message_id: Uuid::new_v4(),
            correlation_id: None,
            conversation_id: None,
            message_type: short_type_name(std::any::type_name::<M>()),
            sent_time: Utc::now(),
            headers: HashMap::new(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_message_id(mut self, message_id: Uuid) -> Self {
        self.message_id = message_id;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_conversation_id(mut self, conversation_id: Uuid) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    pub fn with_sent_time(mut self, sent_time: DateTime<Utc>) -> Self {
        self.sent_time = sent_time;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Binds the scope to an existing token, typically a child of the
    /// consumer's shutdown token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Derives a context for another message in the same causal chain.
    ///
    /// Correlation, conversation and cancellation carry over; the new message
    /// gets its own id and sent time.
    pub fn forward<T>(&self, message: T) -> ConsumeContext<T> {
        let mut next = ConsumeContext::new(message).with_cancellation(self.cancellation.clone());
        next.correlation_id = self.correlation_id;
        next.conversation_id = self.conversation_id.or(Some(self.message_id));
        next.headers = self.headers.clone();
        next
    }

    pub fn message(&self) -> &M {
        &self.message
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn correlation_id(&self) -> Option<Uuid> {
        self.correlation_id
    }

    pub fn conversation_id(&self) -> Option<Uuid> {
        self.conversation_id
    }

    pub fn message_type(&self) -> &'static str {
        self.message_type
    }

    pub fn sent_time(&self) -> DateTime<Utc> {
        self.sent_time
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl<M> Clone for ConsumeContext<M> {
    fn clone(&self) -> Self {
        Self {
            message: self.message.clone(),
            message_id: self.message_id,
            correlation_id: self.correlation_id,
            conversation_id: self.conversation_id,
            message_type: self.message_type,
            sent_time: self.sent_time,
            headers: self.headers.clone(),
            cancellation: self.cancellation.clone(),
        }
    }
}

impl<M: fmt::Debug> fmt::Debug for ConsumeContext<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumeContext")
            .field("message_type", &self.message_type)
            .field("message_id", &self.message_id)
            .field("correlation_id", &self.correlation_id)
            .field("message", &self.message)
            .finish()
    }
}
