pub mod chain;
pub mod error;
pub mod object;
pub mod position;
pub mod types;
pub mod varint;

pub use chain::Chain;
pub use error::{Error, Result};
pub use object::ObjectStatus;
pub use position::RecordPosition;
pub use types::{ChunkType, CompressionType};
