//! Client-side chat sync: polls the chat API and keeps a local view
//! consistent with the server, including optimistic sends.

pub mod error;
pub mod http;
pub mod poller;
pub mod reconcile;
pub mod transport;
pub mod view;

pub use error::{SyncError, TransportError};
pub use http::HttpTransport;
pub use poller::{SyncConfig, SyncPoller};
pub use transport::ChatTransport;
pub use view::{ChatView, PendingMessage, PendingStatus, PollState};
