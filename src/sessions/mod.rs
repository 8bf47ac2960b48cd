//! Session lifecycle, storage of live sessions, and the operations exposed
//! to clients.

pub mod lifecycle;
pub mod repository;
pub mod service;

pub use lifecycle::{Evidence, Operation};
pub use repository::SessionRepository;
pub use service::SessionService;
