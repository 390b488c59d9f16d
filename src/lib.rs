//! Client core for collaborative scientific visualization.
//!
//! Bytes from the server go through the [`protocol::Router`], which decodes
//! them into typed [`protocol::Message`]s and hands each one to its
//! listeners; the [`session::Session`] listener applies them to the
//! [`dataset::DatasetStore`]. The [`transport::Transport`] owns the socket,
//! feeds the router and sends [`protocol::Command`]s back.

pub mod config;
pub mod dataset;
pub mod dtype;
pub mod error;
pub mod gradient;
pub mod listeners;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod transfer_function;
pub mod transport;

pub use config::{ClientConfig, ServerConfig};
pub use dataset::{Dataset, DatasetKind, DatasetStore, SubDataset, SubDatasetKey};
pub use dtype::{FieldFormat, Value, ValueKind};
pub use error::{Error, Result};
pub use gradient::Gradient;
pub use protocol::{Command, Message, MessageListener, MessageType, Router};
pub use session::{Session, SessionState};
pub use transfer_function::{ColorMode, TransferFunction};
pub use transport::{ConnectionStatus, StatusListener, Transport};
