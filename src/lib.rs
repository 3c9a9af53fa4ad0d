// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A stateful local fake of the X (Twitter) v2 REST API.
//!
//! Point any v2 client at this process and it receives responses that are
//! byte-shape-compatible with production: the same JSON envelopes, the
//! same error taxonomy, the same `x-rate-limit-*` headers, the same
//! authentication failure modes, and real stateful side effects — a
//! created tweet shows up in subsequent lookups, a follow changes both
//! users' relationship graphs, a streaming rule changes what the filtered
//! stream emits.
//!
//! The per-request pipeline composes, in order: a spec-driven router over
//! an OpenAPI document ([`spec`]), a credential-scoped sliding-window rate
//! limiter ([`limit`]), an authentication classifier ([`auth`]), a
//! document-driven validator ([`validate`]), the in-memory domain store
//! ([`store`]) or the streaming runtime ([`stream`]), and a response
//! shaper ([`shape`]) that applies field selections and expansions. The
//! [`dispatch::Server`] record owns all of it; [`run`] binds the listener.
//!
//! ```rust,no_run
//! # #[tokio::main]
//! # async fn main() -> mockingbird::error::Result<()> {
//! use std::sync::Arc;
//! use mockingbird::{Config, Server};
//!
//! let server = Arc::new(Server::new(Config::default())?);
//! mockingbird::run(server).await
//! # }
//! ```
//!
//! No credential is ever verified. The `Authorization` header is
//! classified and fingerprinted, and the literal token `test` acts as the
//! seeded default account with id `"0"`.

pub mod auth;
pub mod canned;
pub mod common;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod generate;
pub mod handler;
pub mod limit;
pub mod links;
pub mod query;
pub mod shape;
pub mod spec;
pub mod store;
pub mod stream;
pub mod validate;

pub use crate::config::Config;
pub use crate::dispatch::Server;
pub use crate::error::Error;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};

/// Binds the listener and serves until the process is stopped.
pub async fn run(server: Arc<Server>) -> error::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], server.config.port));
    let make = make_service_fn(move |_conn| {
        let server = Arc::clone(&server);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let server = Arc::clone(&server);
                async move { Ok::<_, Infallible>(server.handle(req).await) }
            }))
        }
    });

    tracing::info!(%addr, "serving the v2 fake");
    hyper::Server::bind(&addr)
        .serve(make)
        .await
        .map_err(Error::from)?;
    Ok(())
}
