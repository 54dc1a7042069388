//! soothe-api: authenticated HTTP client for the soothe marketplace apps.
//!
//! The client keeps itself authenticated: requests carry the current access
//! token, and an authorization failure triggers a single credential renewal
//! shared by every request that fails in the same window, replayed in
//! arrival order once the new token is in hand.
//!
//! ## Core Types
//!
//! - [`AuthenticatedClient`] - request entry point with transparent renewal
//! - [`CredentialStore`] - observable access/refresh token pair
//! - [`Session`] - login, logout, push-token registration
//! - [`HttpTransport`] - transport seam (production: [`ReqwestTransport`])
//! - [`ApiError`] - fixed error taxonomy surfaced to callers

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod refresh;
pub mod session;
pub mod transport;

pub use client::AuthenticatedClient;
pub use config::ApiConfig;
pub use credentials::{CredentialPair, CredentialStore, TokenGrant};
pub use error::{ApiError, Result};
pub use refresh::RefreshCoordinator;
pub use session::{DeviceInfo, Session};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport, TransportError};

pub use reqwest::{Method, StatusCode};
