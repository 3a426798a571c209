// SPDX-License-Identifier: MIT
//!
//! Authentication, session-routing, and abuse-resistance fabric for the
//! multi-session agent runtime's web front end. This file only wires the
//! module tree together so integration tests under `tests/` can drive the
//! assembled router.

pub mod auth;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod http;
pub mod ipset;
pub mod lifecycle;
pub mod net;
pub mod proxy;
pub mod ratelimit;
pub mod router;
pub mod routes;

pub use error::AppError;
pub use router::{AppState, build as build_router};
