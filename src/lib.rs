//! `sable` — an embedded, transactional property-graph storage engine.
//!
//! Multi-version concurrency control with per-record version chains gives
//! every transaction a consistent snapshot of a labeled-property graph;
//! a delta-based write-ahead log and hashed snapshots make committed state
//! durable; label and label-property indexes stay consistent with MVCC
//! visibility and can be built online.

pub mod config;
pub mod durability;
pub mod error;
pub mod ids;
pub mod index;
pub mod model;
pub mod mvcc;
pub mod storage;
pub mod tx;

pub use crate::config::Config;
pub use crate::error::{Result, StorageError};
pub use crate::ids::{EdgeTypeId, Gid, LabelId, PropertyId};
pub use crate::index::{Bound, IndexKey};
pub use crate::model::{Edge, EdgeEntry, PropertyValue, Vertex};
pub use crate::mvcc::View;
pub use crate::storage::{Accessor, EdgeAccessor, Storage, VertexAccessor};
pub use crate::tx::{CmdId, TxId};
