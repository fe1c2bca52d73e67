//! Binary tree snapshots.
//!
//! A snapshot is a framed byte stream: a fixed header carrying a magic
//! number, format version, branching factor, node count, and a CRC32 of the
//! body, followed by one record per node in breadth-first order. Key and
//! value payloads are produced and consumed by caller-supplied codecs — the
//! tree defines the framing, never the payload bytes.
//!
//! Node record layout (all integers little-endian):
//!
//! ```text
//! id: u64 | parent_id: u64 | leaf_flag: u8 | key_count: u32 | next_leaf_id: u64
//! keys:     key_count × (len: u32 | bytes)
//! leaf:     key_count × (len: u32 | bytes)        -- value payloads
//! internal: (key_count + 1) × child_id: u64
//! ```
//!
//! `u64::MAX` stands in for "no node" in parent and next links.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use parking_lot::RwLock;

use crate::compare::KeyComparator;
use crate::node::{InternalNode, LeafNode, Node, NodeRef, Record};
use crate::tree::BPlusTree;

/// Identifies a leafline snapshot stream ("LFSN").
pub const SNAPSHOT_MAGIC: u32 = 0x4C46_534E;

/// Current format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Sentinel id for absent parent/next links.
const NO_NODE: u64 = u64::MAX;

/// Header size: magic + version + order + node count + checksum.
const HEADER_LEN: usize = 4 + 2 + 4 + 8 + 4;

// ============================================================================
//  Errors
// ============================================================================

/// Failures while writing or reading a snapshot.
#[derive(Debug)]
pub enum SnapshotError {
    /// Underlying writer failed.
    Io(io::Error),
    /// The stream does not start with [`SNAPSHOT_MAGIC`].
    BadMagic(u32),
    /// The stream's version is not supported by this build.
    UnsupportedVersion(u16),
    /// The body checksum does not match the header.
    ChecksumMismatch { stored: u32, computed: u32 },
    /// The stream ended mid-record.
    Truncated,
    /// Structurally invalid content; the detail names the first problem.
    Corrupt(&'static str),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "snapshot io error: {err}"),
            Self::BadMagic(got) => write!(f, "bad snapshot magic {got:#010x}"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported snapshot version {v}"),
            Self::ChecksumMismatch { stored, computed } => {
                write!(f, "checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")
            }
            Self::Truncated => write!(f, "snapshot stream truncated"),
            Self::Corrupt(what) => write!(f, "corrupt snapshot: {what}"),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SnapshotError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// What a completed snapshot write covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotSummary {
    /// Nodes serialized.
    pub nodes: u64,
    /// Total bytes written, header included.
    pub bytes: usize,
}

// ============================================================================
//  Writing
// ============================================================================

/// Serialize `tree` into `writer`.
///
/// The walk read-locks one node at a time; take the same quiescence care as
/// with [`BPlusTree::verify`] — a snapshot raced by writers is internally
/// framed correctly but may mix states from different moments.
///
/// # Errors
///
/// [`SnapshotError::Io`] from the writer; [`SnapshotError::Corrupt`] if the
/// tree's links are inconsistent.
pub fn write_snapshot<K, V, C, W, EK, EV>(
    tree: &BPlusTree<K, V, C>,
    writer: &mut W,
    mut encode_key: EK,
    mut encode_value: EV,
) -> Result<SnapshotSummary, SnapshotError>
where
    C: KeyComparator<K>,
    W: Write,
    EK: FnMut(&K, &mut BytesMut),
    EV: FnMut(&V, &mut BytesMut),
{
    // Breadth-first id assignment; ids double as record order.
    let root = tree.root_handle();
    let mut nodes: Vec<NodeRef<K, V>> = vec![Arc::clone(&root)];
    let mut parents: Vec<u64> = vec![NO_NODE];
    let mut ids: HashMap<usize, u64> = HashMap::new();
    ids.insert(Arc::as_ptr(&root) as usize, 0);

    let mut cursor = 0usize;
    while cursor < nodes.len() {
        let node = Arc::clone(&nodes[cursor]);
        let guard = node.read();
        if let Node::Internal(internal) = &*guard {
            for child in &internal.children {
                ids.insert(Arc::as_ptr(child) as usize, nodes.len() as u64);
                parents.push(cursor as u64);
                nodes.push(Arc::clone(child));
            }
        }
        cursor += 1;
    }

    let id_of = |ids: &HashMap<usize, u64>, node: &NodeRef<K, V>| -> Result<u64, SnapshotError> {
        ids.get(&(Arc::as_ptr(node) as usize))
            .copied()
            .ok_or(SnapshotError::Corrupt("link to a node outside the tree"))
    };

    let mut body = BytesMut::new();
    let mut scratch = BytesMut::new();
    for (idx, node) in nodes.iter().enumerate() {
        let guard = node.read();
        body.put_u64_le(idx as u64);
        body.put_u64_le(parents[idx]);
        match &*guard {
            Node::Leaf(leaf) => {
                body.put_u8(1);
                body.put_u32_le(leaf.keys.len() as u32);
                let next_id = match &leaf.next {
                    Some(next) => id_of(&ids, next)?,
                    None => NO_NODE,
                };
                body.put_u64_le(next_id);
                for key in &leaf.keys {
                    put_blob(&mut body, &mut scratch, |buf| encode_key(key, buf));
                }
                for record in &leaf.records {
                    put_blob(&mut body, &mut scratch, |buf| encode_value(record.value(), buf));
                }
            }

            Node::Internal(internal) => {
                body.put_u8(0);
                body.put_u32_le(internal.keys.len() as u32);
                body.put_u64_le(NO_NODE);
                for key in &internal.keys {
                    put_blob(&mut body, &mut scratch, |buf| encode_key(key, buf));
                }
                for child in &internal.children {
                    body.put_u64_le(id_of(&ids, child)?);
                }
            }
        }
    }

    let checksum = crc32fast::hash(&body);
    let mut header = BytesMut::with_capacity(HEADER_LEN);
    header.put_u32_le(SNAPSHOT_MAGIC);
    header.put_u16_le(SNAPSHOT_VERSION);
    header.put_u32_le(tree.order() as u32);
    header.put_u64_le(nodes.len() as u64);
    header.put_u32_le(checksum);

    writer.write_all(&header)?;
    writer.write_all(&body)?;
    Ok(SnapshotSummary {
        nodes: nodes.len() as u64,
        bytes: header.len() + body.len(),
    })
}

/// Length-prefix one caller-encoded payload into `body`.
fn put_blob<F: FnOnce(&mut BytesMut)>(body: &mut BytesMut, scratch: &mut BytesMut, encode: F) {
    scratch.clear();
    encode(scratch);
    body.put_u32_le(scratch.len() as u32);
    body.extend_from_slice(scratch);
}

// ============================================================================
//  Reading
// ============================================================================

/// Owned node content parsed out of the stream, links still by id.
enum RawNode<K, V> {
    Leaf {
        keys: Vec<K>,
        values: Vec<V>,
        next: u64,
    },
    Internal {
        keys: Vec<K>,
        children: Vec<u64>,
    },
}

/// Rebuild a tree from snapshot `data`.
///
/// The codecs mirror the ones given to [`write_snapshot`]; a codec
/// returning `None` surfaces as [`SnapshotError::Corrupt`]. The checksum is
/// verified before any payload is decoded.
///
/// # Errors
///
/// Any [`SnapshotError`] describing the first problem found.
pub fn read_snapshot<K, V, C, DK, DV>(
    data: &[u8],
    comparator: C,
    mut decode_key: DK,
    mut decode_value: DV,
) -> Result<BPlusTree<K, V, C>, SnapshotError>
where
    C: KeyComparator<K>,
    DK: FnMut(&[u8]) -> Option<K>,
    DV: FnMut(&[u8]) -> Option<V>,
{
    if data.len() < HEADER_LEN {
        return Err(SnapshotError::Truncated);
    }
    let (mut header, body) = data.split_at(HEADER_LEN);

    let magic = header.get_u32_le();
    if magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::BadMagic(magic));
    }
    let version = header.get_u16_le();
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }
    let order = header.get_u32_le() as usize;
    let node_count = header.get_u64_le();
    let stored = header.get_u32_le();

    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(SnapshotError::ChecksumMismatch { stored, computed });
    }
    if node_count == 0 {
        return Err(SnapshotError::Corrupt("empty node table"));
    }

    let mut buf = body;
    let mut raws: Vec<RawNode<K, V>> = Vec::new();
    for expected_id in 0..node_count {
        let id = take_u64(&mut buf)?;
        if id != expected_id {
            return Err(SnapshotError::Corrupt("node ids out of sequence"));
        }
        let _parent = take_u64(&mut buf)?;
        let leaf_flag = take_u8(&mut buf)?;
        let key_count = take_u32(&mut buf)? as usize;
        let next = take_u64(&mut buf)?;

        let mut keys = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            let payload = take_blob(&mut buf)?;
            keys.push(decode_key(payload).ok_or(SnapshotError::Corrupt("key payload"))?);
        }

        match leaf_flag {
            1 => {
                let mut values = Vec::with_capacity(key_count);
                for _ in 0..key_count {
                    let payload = take_blob(&mut buf)?;
                    values.push(decode_value(payload).ok_or(SnapshotError::Corrupt("value payload"))?);
                }
                raws.push(RawNode::Leaf { keys, values, next });
            }
            0 => {
                let mut children = Vec::with_capacity(key_count + 1);
                for _ in 0..=key_count {
                    children.push(take_u64(&mut buf)?);
                }
                raws.push(RawNode::Internal { keys, children });
            }
            _ => return Err(SnapshotError::Corrupt("unknown node kind")),
        }
    }
    if buf.has_remaining() {
        return Err(SnapshotError::Corrupt("trailing bytes after node table"));
    }

    // Shells first so links can point forward or backward, then fill.
    let shells: Vec<NodeRef<K, V>> = raws
        .iter()
        .map(|raw| match raw {
            RawNode::Leaf { .. } => Arc::new(RwLock::new(Node::Leaf(LeafNode::new(order)))),
            RawNode::Internal { .. } => Arc::new(RwLock::new(Node::Internal(InternalNode {
                keys: Vec::new(),
                children: Vec::new(),
            }))),
        })
        .collect();

    let resolve = |id: u64| -> Result<NodeRef<K, V>, SnapshotError> {
        shells
            .get(id as usize)
            .cloned()
            .ok_or(SnapshotError::Corrupt("link to a missing node id"))
    };

    let mut entries = 0usize;
    for (shell, raw) in shells.iter().zip(raws) {
        let mut guard = shell.write();
        match raw {
            RawNode::Leaf { keys, values, next } => {
                let leaf = guard.expect_leaf_mut();
                entries += keys.len();
                leaf.keys = keys;
                leaf.records = values.into_iter().map(Record::new).collect();
                leaf.next = if next == NO_NODE {
                    None
                } else {
                    Some(resolve(next)?)
                };
            }
            RawNode::Internal { keys, children } => {
                let internal = guard.expect_internal_mut();
                internal.keys = keys;
                internal.children = children
                    .into_iter()
                    .map(resolve)
                    .collect::<Result<_, _>>()?;
            }
        }
    }

    BPlusTree::from_parts(order, comparator, Arc::clone(&shells[0]), entries)
        .map_err(|_| SnapshotError::Corrupt("branching factor below minimum"))
}

// Bounds-checked primitive reads; `bytes::Buf` alone would panic short.

fn take_u8(buf: &mut &[u8]) -> Result<u8, SnapshotError> {
    if buf.remaining() < 1 {
        return Err(SnapshotError::Truncated);
    }
    Ok(buf.get_u8())
}

fn take_u32(buf: &mut &[u8]) -> Result<u32, SnapshotError> {
    if buf.remaining() < 4 {
        return Err(SnapshotError::Truncated);
    }
    Ok(buf.get_u32_le())
}

fn take_u64(buf: &mut &[u8]) -> Result<u64, SnapshotError> {
    if buf.remaining() < 8 {
        return Err(SnapshotError::Truncated);
    }
    Ok(buf.get_u64_le())
}

fn take_blob<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], SnapshotError> {
    let len = take_u32(buf)? as usize;
    if buf.len() < len {
        return Err(SnapshotError::Truncated);
    }
    let (payload, rest) = buf.split_at(len);
    *buf = rest;
    Ok(payload)
}
