//! One serializable, self-describing mutation entry of the write-ahead log.

use crate::error::{Result, StorageError};
use crate::ids::Gid;
use crate::model::PropertyValue;
use crate::mvcc::View;
use crate::storage::Accessor;
use crate::tx::TxId;

use super::encoding::{
    read_gid, read_string, read_u64, read_u8, read_value, write_gid, write_string, write_u64,
    write_u8, write_value, ByteSource,
};

const TAG_TX_BEGIN: u8 = 0x01;
const TAG_TX_COMMIT: u8 = 0x02;
const TAG_TX_ABORT: u8 = 0x03;
const TAG_CREATE_VERTEX: u8 = 0x10;
const TAG_REMOVE_VERTEX: u8 = 0x11;
const TAG_CREATE_EDGE: u8 = 0x12;
const TAG_REMOVE_EDGE: u8 = 0x13;
const TAG_ADD_LABEL: u8 = 0x14;
const TAG_REMOVE_LABEL: u8 = 0x15;
const TAG_SET_PROPERTY: u8 = 0x16;
const TAG_BUILD_INDEX: u8 = 0x20;

/// Label, edge-type and property names travel in deltas by name, not by
/// process-local id, so replay re-interns them.
#[derive(Debug, Clone, PartialEq)]
pub enum StateDelta {
    TxBegin {
        tx: TxId,
    },
    TxCommit {
        tx: TxId,
    },
    TxAbort {
        tx: TxId,
    },
    CreateVertex {
        tx: TxId,
        gid: Gid,
    },
    RemoveVertex {
        tx: TxId,
        gid: Gid,
    },
    CreateEdge {
        tx: TxId,
        gid: Gid,
        from: Gid,
        to: Gid,
        edge_type: String,
    },
    RemoveEdge {
        tx: TxId,
        gid: Gid,
    },
    AddLabel {
        tx: TxId,
        gid: Gid,
        label: String,
    },
    RemoveLabel {
        tx: TxId,
        gid: Gid,
        label: String,
    },
    SetProperty {
        tx: TxId,
        gid: Gid,
        on_edge: bool,
        property: String,
        value: PropertyValue,
    },
    BuildIndex {
        tx: TxId,
        label: String,
        property: String,
    },
}

impl StateDelta {
    pub fn tx(&self) -> TxId {
        match self {
            StateDelta::TxBegin { tx }
            | StateDelta::TxCommit { tx }
            | StateDelta::TxAbort { tx }
            | StateDelta::CreateVertex { tx, .. }
            | StateDelta::RemoveVertex { tx, .. }
            | StateDelta::CreateEdge { tx, .. }
            | StateDelta::RemoveEdge { tx, .. }
            | StateDelta::AddLabel { tx, .. }
            | StateDelta::RemoveLabel { tx, .. }
            | StateDelta::SetProperty { tx, .. }
            | StateDelta::BuildIndex { tx, .. } => *tx,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            StateDelta::TxBegin { tx } => {
                write_u8(out, TAG_TX_BEGIN);
                write_u64(out, *tx);
            }
            StateDelta::TxCommit { tx } => {
                write_u8(out, TAG_TX_COMMIT);
                write_u64(out, *tx);
            }
            StateDelta::TxAbort { tx } => {
                write_u8(out, TAG_TX_ABORT);
                write_u64(out, *tx);
            }
            StateDelta::CreateVertex { tx, gid } => {
                write_u8(out, TAG_CREATE_VERTEX);
                write_u64(out, *tx);
                write_gid(out, *gid);
            }
            StateDelta::RemoveVertex { tx, gid } => {
                write_u8(out, TAG_REMOVE_VERTEX);
                write_u64(out, *tx);
                write_gid(out, *gid);
            }
            StateDelta::CreateEdge {
                tx,
                gid,
                from,
                to,
                edge_type,
            } => {
                write_u8(out, TAG_CREATE_EDGE);
                write_u64(out, *tx);
                write_gid(out, *gid);
                write_gid(out, *from);
                write_gid(out, *to);
                write_string(out, edge_type);
            }
            StateDelta::RemoveEdge { tx, gid } => {
                write_u8(out, TAG_REMOVE_EDGE);
                write_u64(out, *tx);
                write_gid(out, *gid);
            }
            StateDelta::AddLabel { tx, gid, label } => {
                write_u8(out, TAG_ADD_LABEL);
                write_u64(out, *tx);
                write_gid(out, *gid);
                write_string(out, label);
            }
            StateDelta::RemoveLabel { tx, gid, label } => {
                write_u8(out, TAG_REMOVE_LABEL);
                write_u64(out, *tx);
                write_gid(out, *gid);
                write_string(out, label);
            }
            StateDelta::SetProperty {
                tx,
                gid,
                on_edge,
                property,
                value,
            } => {
                write_u8(out, TAG_SET_PROPERTY);
                write_u64(out, *tx);
                write_gid(out, *gid);
                write_u8(out, u8::from(*on_edge));
                write_string(out, property);
                write_value(out, value);
            }
            StateDelta::BuildIndex {
                tx,
                label,
                property,
            } => {
                write_u8(out, TAG_BUILD_INDEX);
                write_u64(out, *tx);
                write_string(out, label);
                write_string(out, property);
            }
        }
    }

    pub fn decode(src: &mut impl ByteSource) -> Result<Self> {
        let tag = read_u8(src)?;
        let tx = read_u64(src)?;
        match tag {
            TAG_TX_BEGIN => Ok(StateDelta::TxBegin { tx }),
            TAG_TX_COMMIT => Ok(StateDelta::TxCommit { tx }),
            TAG_TX_ABORT => Ok(StateDelta::TxAbort { tx }),
            TAG_CREATE_VERTEX => Ok(StateDelta::CreateVertex {
                tx,
                gid: read_gid(src)?,
            }),
            TAG_REMOVE_VERTEX => Ok(StateDelta::RemoveVertex {
                tx,
                gid: read_gid(src)?,
            }),
            TAG_CREATE_EDGE => Ok(StateDelta::CreateEdge {
                tx,
                gid: read_gid(src)?,
                from: read_gid(src)?,
                to: read_gid(src)?,
                edge_type: read_string(src)?,
            }),
            TAG_REMOVE_EDGE => Ok(StateDelta::RemoveEdge {
                tx,
                gid: read_gid(src)?,
            }),
            TAG_ADD_LABEL => Ok(StateDelta::AddLabel {
                tx,
                gid: read_gid(src)?,
                label: read_string(src)?,
            }),
            TAG_REMOVE_LABEL => Ok(StateDelta::RemoveLabel {
                tx,
                gid: read_gid(src)?,
                label: read_string(src)?,
            }),
            TAG_SET_PROPERTY => Ok(StateDelta::SetProperty {
                tx,
                gid: read_gid(src)?,
                on_edge: read_u8(src)? != 0,
                property: read_string(src)?,
                value: read_value(src)?,
            }),
            TAG_BUILD_INDEX => Ok(StateDelta::BuildIndex {
                tx,
                label: read_string(src)?,
                property: read_string(src)?,
            }),
            tag => Err(StorageError::Durability(format!(
                "unknown delta tag {tag:#04x}"
            ))),
        }
    }

    /// Replays one data delta through the owning transaction's accessor.
    /// Lifecycle and `BuildIndex` deltas are dispatched by the replay loop
    /// itself and never reach this method.
    pub fn apply(&self, accessor: &Accessor<'_>) -> Result<()> {
        match self {
            StateDelta::CreateVertex { gid, .. } => {
                accessor.insert_vertex(Some(*gid))?;
            }
            StateDelta::RemoveVertex { gid, .. } => {
                let vertex = accessor
                    .find_vertex(*gid, View::New)
                    .ok_or_else(|| StorageError::Durability("vertex to remove not found".into()))?;
                accessor.remove_vertex(&vertex)?;
            }
            StateDelta::CreateEdge {
                gid,
                from,
                to,
                edge_type,
                ..
            } => {
                let from = accessor
                    .find_vertex(*from, View::New)
                    .ok_or_else(|| StorageError::Durability("edge source not found".into()))?;
                let to = accessor
                    .find_vertex(*to, View::New)
                    .ok_or_else(|| StorageError::Durability("edge target not found".into()))?;
                accessor.insert_edge(&from, &to, accessor.edge_type(edge_type), Some(*gid))?;
            }
            StateDelta::RemoveEdge { gid, .. } => {
                if let Some(edge) = accessor.find_edge(*gid, View::New) {
                    accessor.remove_edge(&edge, true, true)?;
                }
            }
            StateDelta::AddLabel { gid, label, .. } => {
                let vertex = accessor
                    .find_vertex(*gid, View::New)
                    .ok_or_else(|| StorageError::Durability("labeled vertex not found".into()))?;
                vertex.add_label(accessor.label(label))?;
            }
            StateDelta::RemoveLabel { gid, label, .. } => {
                let vertex = accessor
                    .find_vertex(*gid, View::New)
                    .ok_or_else(|| StorageError::Durability("labeled vertex not found".into()))?;
                vertex.remove_label(accessor.label(label))?;
            }
            StateDelta::SetProperty {
                gid,
                on_edge,
                property,
                value,
                ..
            } => {
                if *on_edge {
                    let edge = accessor
                        .find_edge(*gid, View::New)
                        .ok_or_else(|| StorageError::Durability("edge not found".into()))?;
                    edge.set_property(accessor.property(property), value.clone())?;
                } else {
                    let vertex = accessor
                        .find_vertex(*gid, View::New)
                        .ok_or_else(|| StorageError::Durability("vertex not found".into()))?;
                    vertex.set_property(accessor.property(property), value.clone())?;
                }
            }
            StateDelta::TxBegin { .. }
            | StateDelta::TxCommit { .. }
            | StateDelta::TxAbort { .. }
            | StateDelta::BuildIndex { .. } => {
                unreachable!("lifecycle deltas are dispatched by the replay loop")
            }
        }
        Ok(())
    }
}
