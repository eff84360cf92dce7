//! Document session management.
//!
//! This module keeps the extracted text of each uploaded document in memory
//! for a fixed analysis window. Sessions are identified by an unguessable
//! hex token which doubles as the capability to read or delete them.
//!
//! # Architecture
//!
//! - [`Session`]: Immutable record of one uploaded document
//! - [`SessionStore`]: Thread-safe store with lazy and periodic expiry
//!
//! # Example
//!
//! ```rust
//! use private_doc_analyzer::session::SessionStore;
//!
//! let store = SessionStore::new();
//! let session = store.create("doc.txt", "hello world").unwrap();
//!
//! let fetched = store.get(session.id()).unwrap();
//! assert_eq!(fetched.content(), "hello world");
//! ```

mod store;

pub use store::{
    DEFAULT_SESSION_TTL, DEFAULT_SWEEP_INTERVAL, SESSION_ID_BYTES, Session, SessionError,
    SessionStore,
};
