//! # Sarafu API Client Library
//!
//! Client-side access to the custodial account, voucher, pool, alias and SMS
//! services, plus a development emulator that stands in for them.
//!
//! ## Modules
//!
//! - [`service`] - The [`AccountService`] and [`SmsService`] traits
//! - [`remote`] - HTTP implementation of the service traits
//! - [`dev`] - In-memory emulator with optional key-value persistence
//! - [`store`] - Key-value persistence adapter used by the emulator
//! - [`event`] - Registration, mint and transfer notifications
//! - [`model`] - Request and response types shared by every implementation
//! - [`config`] - Environment-driven configuration
//!
//! ## Emulator Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sarafu_api::{AccountService, DevAccountService, MemoryStore};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), sarafu_api::Error> {
//! let store = Arc::new(MemoryStore::new());
//! let svc = DevAccountService::builder()
//!     .with_store(store.clone())
//!     .with_auto_voucher("SRF", 100)
//!     .build()?;
//!
//! let alice = svc.create_account().await?;
//! // the first account is the faucet, so bob's 100 SRF come out of alice's
//! let bob = svc.create_account().await?;
//! let holdings = svc.fetch_vouchers(&bob.public_key).await?;
//! svc.token_transfer("40", &bob.public_key, &alice.public_key, &holdings[0].contract_address)
//!     .await?;
//!
//! // state survives a restart against the same store
//! let reloaded = DevAccountService::builder().with_store(store).build()?;
//! assert_eq!(reloaded.fetch_transactions(&bob.public_key).await?.len(), 2);
//! assert_eq!(reloaded.check_balance(&alice.public_key).await?.balance, "40");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dev;
pub mod error;
pub mod event;
pub mod model;
pub mod remote;
pub mod service;
pub mod store;

pub use config::{ApiConfig, DevConfig, RetryConfig};
pub use dev::{DevAccountService, DevAccountServiceBuilder, LoadPolicy};
pub use error::Error;
pub use event::{Emitter, EventTag, EventsHandler, Msg};
pub use remote::HttpAccountService;
pub use service::{AccountService, SmsService};
pub use store::{KeyValueStore, MemoryStore};
#[cfg(feature = "sled")]
pub use store::SledStore;
