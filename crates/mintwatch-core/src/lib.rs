//! mintwatch-core — domain types and pure pipeline stages.
//!
//! # Overview
//!
//! mintwatch follows a Solana program's transaction stream and tells each
//! subscriber about the next newly initialized token mint, once. This crate
//! holds the pieces that do not touch the network:
//!
//! - [`LogEventExtractor`] — frame → optional [`TokenEvent`]
//! - [`DedupCache`] — TTL set shared by every connection
//! - [`JsonRpcRequest`] / [`JsonRpcResponse`] — wire types
//! - [`StreamError`], [`EnrichmentError`], [`DeliveryError`] — error taxonomy
//! - [`Subscription`], [`TokenInfo`] and friends — domain types

pub mod dedup;
pub mod error;
pub mod extractor;
pub mod request;
pub mod types;

pub use dedup::{DedupCache, DEFAULT_DEDUP_TTL};
pub use error::{DeliveryError, EnrichmentError, StreamError};
pub use extractor::{ExtractorConfig, LogEventExtractor, MINT_INIT_SIGNAL};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use types::{
    Socials, SubscriberId, Subscription, SubscriptionId, SubscriptionState, TokenEvent,
    TokenInfo, PUMP_FUN_PROGRAM,
};
