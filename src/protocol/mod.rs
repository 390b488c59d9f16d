//! Wire protocol: resumable decoding of server messages and encoding of
//! client commands. Everything on the wire is big-endian.

pub mod command;
pub mod decoder;
pub mod kinds;
pub mod message;
pub mod router;
pub mod tf;

pub use command::{Command, CommandType, HeadsetUpdate};
pub use decoder::{Decoded, PrimitiveDecoder};
pub use message::{Descriptor, FieldSequence, Message, MessageType};
pub use router::{MessageListener, Router};
pub use tf::{TfDataset, TfKind, TfPayload, TfProperty};
