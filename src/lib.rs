//! Single-endpoint email dispatch gate.
//!
//! A request carries a subject, a body, an optional recipient and a shared
//! secret. Fields are sanitized, the secret is checked, the recipient is
//! resolved against the override policy and the message is handed to the
//! configured outbound transport.

pub mod config;
pub mod email;
pub mod gate;
pub mod logger;
pub mod response;
pub mod routes;
pub mod sanitize;
