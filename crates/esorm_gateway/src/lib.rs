//! # esorm Gateway
//!
//! Wire-level access to the document store backing esorm.
//!
//! This crate provides:
//! - Backend configuration ([`EsConfig`]) with key/callback registration
//! - A [`Transport`] abstraction and a blocking [`HttpTransport`]
//! - The [`Gateway`]: index and template provisioning, single-document
//!   CRUD, by-query operations, bulk requests, count and filtered search
//! - Filter DSL translation ([`FilterTerm`], [`build_filter`])
//! - NDJSON bulk bodies ([`BulkBody`])
//!
//! ## Error normalization
//!
//! Every operation returns a [`GatewayResult`]. Network failures and
//! undecodable success bodies are transport errors; non-success statuses are
//! normalized into a [`BackendError`] carrying the backend's error type and
//! reason. A 404 for a missing index or document is never an error for the
//! read paths: search returns no hits, count returns zero and `get_doc`
//! returns `None`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bulk;
mod config;
mod error;
mod filter;
mod gateway;
mod http;
mod transport;
mod wire;

pub use bulk::BulkBody;
pub use config::{EsConfig, CONFIG_KEYS};
pub use error::{BackendError, GatewayError, GatewayResult, ALREADY_EXISTS};
pub use filter::{build_filter, first_lower, parse_key, FilterTerm, Operator};
pub use gateway::Gateway;
pub use http::HttpTransport;
pub use transport::{ContentType, Method, Request, Response, Transport};
pub use wire::{
    filter_query, BulkItem, BulkResponse, DocResponse, Property, Script, SearchQuery,
    SearchResponse, SortField, SortOrder, DEFAULT_DATE_FORMAT,
};
