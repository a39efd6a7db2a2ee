//! Index file persistence and integrity checking.
//!
//! This module provides:
//! - Pre-order serialization of the node arena behind a fixed header
//! - Validating deserialization that rejects any structural inconsistency
//! - Atomic replacement of the index file (temp file + rename)
//! - Integrity checking of a loaded tree against its record store
//!
//! The index file is always big-endian, independent of the record store's
//! byte order.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::bounding_box::BoundingBox;
use crate::codec::{ByteOrder, EndianReader, EndianWriter};

use super::qtree_constants::{ALL_CHILDREN, ENTRY_SIZE, HEADER_SIZE, MAX_NODES, NODE_FIXED_SIZE};
use super::qtree_node::{NodeArena, QuadTreeNode, Quadrant};
use super::qtree_types::{
    FileHeader, IndexEntry, NodeId, RecordRef, SpatialError, SpatialResult,
};
use super::record_store::RecordStore;

/// Byte order of every multi-byte value in the index file
pub const INDEX_BYTE_ORDER: ByteOrder = ByteOrder::Big;

// ============================================================================
// Serialization
// ============================================================================

/// Writes the header and the pre-order node stream to `writer`.
pub fn serialize_tree<W: Write>(writer: W, header: &FileHeader, arena: &NodeArena) -> SpatialResult<W> {
    let mut w = EndianWriter::new(writer, INDEX_BYTE_ORDER);
    w.write_bytes(&header.magic)?;
    w.write_u16(header.version)?;
    w.write_u32(header.max_depth)?;
    w.write_u32(header.split_threshold)?;

    for id in arena.preorder() {
        write_node(&mut w, arena.node(id))?;
    }
    w.flush()?;
    Ok(w.into_inner())
}

fn write_node<W: Write>(w: &mut EndianWriter<W>, node: &QuadTreeNode) -> SpatialResult<()> {
    write_bbox(w, &node.bounds)?;
    w.write_u32(node.depth)?;
    w.write_u8(if node.children.is_some() { ALL_CHILDREN } else { 0 })?;
    w.write_u32(node.entries.len() as u32)?;
    for entry in &node.entries {
        w.write_u64(entry.record.offset)?;
        w.write_u32(entry.record.length)?;
        write_bbox(w, &entry.bbox)?;
    }
    Ok(())
}

fn write_bbox<W: Write>(w: &mut EndianWriter<W>, bbox: &BoundingBox) -> SpatialResult<()> {
    w.write_f64(bbox.min_x)?;
    w.write_f64(bbox.min_y)?;
    w.write_f64(bbox.max_x)?;
    w.write_f64(bbox.max_y)
}

/// Serializes into memory.
pub fn serialize_to_vec(header: &FileHeader, arena: &NodeArena) -> SpatialResult<Vec<u8>> {
    let capacity = HEADER_SIZE
        + arena.len() * NODE_FIXED_SIZE
        + arena.entry_count() as usize * ENTRY_SIZE;
    serialize_tree(Vec::with_capacity(capacity), header, arena)
}

// ============================================================================
// Deserialization
// ============================================================================

/// Reads a whole index from `reader`.
///
/// Any structural problem, including a truncated stream, is reported as
/// [`SpatialError::IndexCorrupt`]. I/O failures propagate as `Io`.
pub fn deserialize_tree<R: Read>(reader: R) -> SpatialResult<(FileHeader, NodeArena)> {
    let mut r = EndianReader::new(reader, INDEX_BYTE_ORDER);
    let header = read_header(&mut r)?;
    header.validate()?;

    let mut nodes = Vec::new();
    let root = NodeFrame {
        expected_bounds: None,
        depth: 0,
        path: "root".to_string(),
    };
    read_subtree(&mut r, &header, &mut nodes, root)?;

    let end = r.position();
    if !in_path(r.is_at_end(), "root", end)? {
        return Err(SpatialError::corrupt(end, "root", "trailing bytes after node stream"));
    }
    Ok((header, NodeArena::from_nodes(nodes)))
}

/// Reads an index from a byte slice.
pub fn deserialize_from_slice(bytes: &[u8]) -> SpatialResult<(FileHeader, NodeArena)> {
    deserialize_tree(bytes)
}

fn read_header<R: Read>(r: &mut EndianReader<R>) -> SpatialResult<FileHeader> {
    let mut magic = [0u8; 4];
    in_path(r.read_exact_into(&mut magic), "header", 0)?;
    Ok(FileHeader {
        magic,
        version: in_path(r.read_u16(), "header", 4)?,
        max_depth: in_path(r.read_u32(), "header", 6)?,
        split_threshold: in_path(r.read_u32(), "header", 10)?,
    })
}

/// What the parent knows about the node about to be read
struct NodeFrame {
    expected_bounds: Option<BoundingBox>,
    depth: u32,
    path: String,
}

fn read_subtree<R: Read>(
    r: &mut EndianReader<R>,
    header: &FileHeader,
    nodes: &mut Vec<QuadTreeNode>,
    frame: NodeFrame,
) -> SpatialResult<NodeId> {
    let path = frame.path.as_str();
    let offset = r.position();

    if nodes.len() >= MAX_NODES {
        return Err(SpatialError::corrupt(offset, path, "too many nodes"));
    }

    let bounds = in_path(read_bbox(r), path, offset)?;
    let depth = in_path(r.read_u32(), path, offset)?;
    let flags = in_path(r.read_u8(), path, offset)?;
    let entry_count = in_path(r.read_u32(), path, offset)?;

    if !bounds.is_valid() {
        return Err(SpatialError::corrupt(offset, path, format!("invalid node bounds {}", bounds)));
    }
    if let Some(expected) = frame.expected_bounds {
        if bounds != expected {
            return Err(SpatialError::corrupt(
                offset,
                path,
                format!("node bounds {} do not match quadrant {}", bounds, expected),
            ));
        }
    }
    if depth != frame.depth {
        return Err(SpatialError::corrupt(
            offset,
            path,
            format!("depth {} where {} was expected", depth, frame.depth),
        ));
    }
    if depth > header.max_depth {
        return Err(SpatialError::corrupt(
            offset,
            path,
            format!("depth {} exceeds max depth {}", depth, header.max_depth),
        ));
    }
    let has_children = match flags {
        0 => false,
        ALL_CHILDREN => true,
        other => {
            return Err(SpatialError::corrupt(
                offset,
                path,
                format!("invalid child presence flags {:#04x}", other),
            ))
        }
    };
    if has_children && depth >= header.max_depth {
        return Err(SpatialError::corrupt(offset, path, "children below max depth"));
    }

    let mut entries = Vec::with_capacity((entry_count as usize).min(4096));
    for _ in 0..entry_count {
        let entry_offset = r.position();
        let record = RecordRef::new(
            in_path(r.read_u64(), path, entry_offset)?,
            in_path(r.read_u32(), path, entry_offset)?,
        );
        let bbox = in_path(read_bbox(r), path, entry_offset)?;
        // only the root may hold entries that stick out of its bounds
        let fits = match frame.expected_bounds {
            None => bounds.overlaps(&bbox),
            Some(_) => bounds.contains(&bbox),
        };
        if !bbox.is_valid() || !fits {
            return Err(SpatialError::corrupt(
                entry_offset,
                path,
                format!("entry {} does not fit node bounds {}", bbox, bounds),
            ));
        }
        entries.push(IndexEntry { bbox, record });
    }

    let id = NodeId(nodes.len() as u32);
    nodes.push(QuadTreeNode {
        bounds,
        depth,
        children: None,
        entries,
    });

    if has_children {
        let mut children = [NodeId::ROOT; 4];
        for ((slot, quadrant), expected) in children
            .iter_mut()
            .zip(Quadrant::ALL)
            .zip(bounds.quadrants())
        {
            *slot = read_subtree(
                r,
                header,
                nodes,
                NodeFrame {
                    expected_bounds: Some(expected),
                    depth: depth + 1,
                    path: format!("{}/{}", path, quadrant.label()),
                },
            )?;
        }
        nodes[id.index()].children = Some(children);
    }
    Ok(id)
}

fn read_bbox<R: Read>(r: &mut EndianReader<R>) -> SpatialResult<BoundingBox> {
    Ok(BoundingBox::new(r.read_f64()?, r.read_f64()?, r.read_f64()?, r.read_f64()?))
}

/// Turns a short read into a corruption error located at `path`.
fn in_path<T>(result: SpatialResult<T>, path: &str, node_offset: u64) -> SpatialResult<T> {
    result.map_err(|e| match e {
        SpatialError::TruncatedRecord { offset, .. } => SpatialError::corrupt(
            offset,
            path,
            format!("unexpected end of file (node at byte {})", node_offset),
        ),
        other => other,
    })
}

// ============================================================================
// Files
// ============================================================================

/// Loads and validates an index file.
pub fn read_index_file(path: &Path) -> SpatialResult<(FileHeader, NodeArena)> {
    let file = File::open(path)?;
    deserialize_tree(BufReader::new(file))
}

/// Writes an index file atomically.
///
/// The tree is written to a temporary file in the destination directory,
/// flushed (and synced when `sync` is set), then renamed over `path`. A crash
/// at any point leaves the previous file untouched.
pub fn write_index_file(
    path: &Path,
    header: &FileHeader,
    arena: &NodeArena,
    sync: bool,
) -> SpatialResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let temp = tempfile::NamedTempFile::new_in(dir)?;
    let writer = serialize_tree(BufWriter::new(temp), header, arena)?;
    let temp = writer.into_inner().map_err(|e| e.into_error())?;
    if sync {
        temp.as_file().sync_all()?;
    }
    temp.persist(path).map_err(|e| SpatialError::Io(e.error))?;

    #[cfg(unix)]
    if sync {
        File::open(dir)?.sync_all()?;
    }

    log::info!(
        "Persisted index {} ({} nodes, {} entries)",
        path.display(),
        arena.len(),
        arena.entry_count()
    );
    Ok(())
}

// ============================================================================
// Integrity Checking
// ============================================================================

/// Result of integrity check operation
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    /// Total nodes checked
    pub nodes_checked: u64,
    /// Total entries checked
    pub entries_checked: u64,
    /// Entries a child fully contains but that were left at the parent
    pub misplaced_entries: Vec<(String, RecordRef)>,
    /// Entries pointing past the end of the record store or at a frame of another length
    pub dangling_refs: Vec<RecordRef>,
    /// Summary of findings
    pub is_valid: bool,
    /// Detailed error messages
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn new() -> Self {
        Self {
            nodes_checked: 0,
            entries_checked: 0,
            misplaced_entries: Vec::new(),
            dangling_refs: Vec::new(),
            is_valid: true,
            errors: Vec::new(),
        }
    }
}

impl Default for IntegrityReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Walks the whole tree and checks it against its invariants and, when a
/// store is given, that every reference lands inside it.
///
/// With `verify_records` set, the length prefix of every referenced frame is
/// read back and compared with the reference.
pub fn check_tree(
    arena: &NodeArena,
    store: Option<&RecordStore>,
    verify_records: bool,
) -> SpatialResult<IntegrityReport> {
    let mut report = IntegrityReport::new();
    let store_len = store.map(|s| s.len_bytes()).transpose()?;

    for (id, path) in arena.preorder_with_paths() {
        let node = arena.node(id);
        report.nodes_checked += 1;

        for entry in &node.entries {
            report.entries_checked += 1;

            let in_bounds = if id == NodeId::ROOT {
                node.bounds.overlaps(&entry.bbox)
            } else {
                node.bounds.contains(&entry.bbox)
            };
            if !in_bounds {
                report.errors.push(format!("{}: {} outside node bounds", path, entry.bbox));
            }

            if let Some(children) = node.children {
                if children
                    .iter()
                    .any(|child| arena.node(*child).bounds.contains(&entry.bbox))
                {
                    report.misplaced_entries.push((path.clone(), entry.record));
                    report.errors.push(format!(
                        "{}: {} fits a child but is stored at the parent",
                        path, entry.bbox
                    ));
                }
            }

            if let (Some(store), Some(len)) = (store, store_len) {
                let dangling = if entry.record.end_offset().map_or(true, |end| end > len) {
                    true
                } else if verify_records {
                    store.read_length_prefix(entry.record.offset)? != entry.record.length
                } else {
                    false
                };
                if dangling {
                    report.dangling_refs.push(entry.record);
                    report.errors.push(format!(
                        "{}: record at offset {} (length {}) not found in store",
                        path, entry.record.offset, entry.record.length
                    ));
                }
            }
        }
    }

    report.is_valid = report.errors.is_empty();
    if !report.is_valid {
        log::warn!("Integrity check found {} problems", report.errors.len());
    }
    Ok(report)
}
