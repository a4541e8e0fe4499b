//! Per-user OAuth2 credential lifecycle: durable token storage, validity and
//! refresh, interactive consent, and the session handle handed to the Gmail
//! resource clients.

mod authenticator;
pub mod consent;
pub mod provider;
pub mod store;

pub use authenticator::{Authenticator, Session};
pub use consent::{BrowserConsent, ConsentFlow, ConsentGrant};
pub use provider::{ClientSecret, GoogleOAuth, TokenEndpoint};
