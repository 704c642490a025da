//! HTTP gateway to the Botly backend.
//!
//! `ApiGateway` is the only component that talks to the network. It attaches
//! the stored bearer token, encodes JSON and multipart bodies, and reports
//! every failure as an `ApiError`. Endpoint wrappers live in `auth` and
//! `chatbots` as methods on the gateway.

pub mod auth;
pub mod chatbots;
pub mod error;
pub mod gateway;

pub use auth::TokenResponse;
pub use error::ApiError;
pub use gateway::{ApiGateway, FormFields, FormValue, GatewayOptions, RequestBody, DEFAULT_BASE_URL};
