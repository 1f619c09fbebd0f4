//! Notifications about registrations and transfers.
//!
//! Producers hold an [`Emitter`], the consuming side drains the paired
//! receiver, usually through [`EventsHandler::run`]. Emission never fails the
//! producing operation.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    TokenTransfer,
    TokenMint,
    CustodialRegistration,
}

impl EventTag {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TokenTransfer => "TOKEN_TRANSFER",
            Self::TokenMint => "TOKEN_MINT",
            Self::CustodialRegistration => "CUSTODIAL_REGISTRATION",
        }
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCustodialRegistration {
    pub account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTokenTransfer {
    pub to: String,
    pub value: u64,
    pub voucher_address: String,
    pub tx_hash: String,
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTokenMint {
    pub to: String,
    pub value: u64,
    pub tx_hash: String,
    pub voucher_address: String,
}

/// A tagged event and the entity it concerns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "item", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Msg {
    TokenTransfer(EventTokenTransfer),
    TokenMint(EventTokenMint),
    CustodialRegistration(EventCustodialRegistration),
}

impl Msg {
    pub fn tag(&self) -> EventTag {
        match self {
            Self::TokenTransfer(_) => EventTag::TokenTransfer,
            Self::TokenMint(_) => EventTag::TokenMint,
            Self::CustodialRegistration(_) => EventTag::CustodialRegistration,
        }
    }
}

/// Sending half of an event channel
#[derive(Debug, Clone)]
pub struct Emitter {
    tx: mpsc::UnboundedSender<Msg>,
}

impl Emitter {
    /// Creates an emitter together with the receiver it feeds
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Msg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn new(tx: mpsc::UnboundedSender<Msg>) -> Self {
        Self { tx }
    }

    /// Hands the message to the receiver. Delivery failures are logged and dropped.
    pub fn emit(&self, msg: Msg) {
        let tag = msg.tag();
        if let Err(err) = self.tx.send(msg) {
            tracing::error!(tag = %tag, msg = ?err.0, "event receiver closed, dropping event");
        } else {
            tracing::trace!(tag = %tag, "event emitted");
        }
    }
}

type HandlerFn = Box<dyn Fn(&Msg) -> Result<(), Error> + Send + Sync>;

/// Dispatches events to the handler registered for their tag
#[derive(Default)]
pub struct EventsHandler {
    handlers: HashMap<EventTag, HandlerFn>,
}

impl EventsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to register the handler for a tag, replacing any previous one
    #[must_use]
    pub fn with_handler<F>(mut self, tag: EventTag, handler: F) -> Self
    where
        F: Fn(&Msg) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.handlers.insert(tag, Box::new(handler));
        self
    }

    /// Runs the handler registered for the message's tag
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnhandledEvent`] if no handler is registered for the tag,
    /// otherwise whatever the handler returns.
    pub fn handle(&self, msg: &Msg) -> Result<(), Error> {
        let tag = msg.tag();
        let handler = self
            .handlers
            .get(&tag)
            .ok_or_else(|| Error::UnhandledEvent(tag.to_string()))?;
        handler(msg)
    }

    /// Drains `rx` until every emitter is dropped. Returns the number of
    /// events handled successfully.
    pub async fn run(&self, mut rx: mpsc::UnboundedReceiver<Msg>) -> usize {
        let mut handled = 0;
        while let Some(msg) = rx.recv().await {
            match self.handle(&msg) {
                Ok(()) => handled += 1,
                Err(err) => tracing::warn!(tag = %msg.tag(), error = %err, "event handler failed"),
            }
        }
        handled
    }
}

impl fmt::Debug for EventsHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventsHandler")
            .field("tags", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
