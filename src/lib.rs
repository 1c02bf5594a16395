//! Per-phase latency measurement for HTTP requests.
//!
//! A [`StatRecorder`] bound to a [`TraceContext`] with [`with_http_stat`]
//! stamps the lifecycle hooks fired by [`Client`] into an [`HttpStat`],
//! which turns them into DNS lookup, TCP connection, TLS handshake, server
//! processing and content transfer durations.
#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate tracing;

pub mod app;
pub mod cli;
pub mod http;
pub mod response;
pub mod stat;
pub mod tls;
pub mod trace;

pub use crate::http::client::{Client, ClientBuilder};
pub use crate::http::connector::{Connect, PlainConnector, TracedConnector};
pub use crate::stat::{HttpStat, Metric, Timings};
pub use crate::trace::{with_http_stat, ClientTrace, GotConnInfo, StatRecorder, TraceContext};
