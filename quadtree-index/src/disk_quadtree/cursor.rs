//! Lazy search cursor over a loaded quad-tree.
//!
//! A cursor walks the tree depth-first with an explicit stack and buffers the
//! matches of the node it is visiting. Records are only read from the store
//! when the caller asks for them through [`SearchCursor::next_record`] or
//! [`SearchCursor::read`].

use std::collections::VecDeque;
use std::sync::Arc;

use crate::bounding_box::BoundingBox;

use super::qtree_impl::QuadTreeIndex;
use super::qtree_types::{NodeId, RecordRef, SpatialError, SpatialResult};
use super::record_store::RecordStore;

/// How an entry's box is matched against the query box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// Boxes overlap, touching edges included
    #[default]
    Intersects,
    /// The entry box lies completely inside the query box
    Within,
}

impl QueryMode {
    #[inline]
    fn matches(self, query: &BoundingBox, entry: &BoundingBox) -> bool {
        match self {
            QueryMode::Intersects => query.overlaps(entry),
            QueryMode::Within => query.contains(entry),
        }
    }
}

/// Lifecycle of a [`SearchCursor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Created, not opened yet
    Ready,
    /// Traversing
    Open,
    /// Exhausted or closed by the caller
    Closed,
    /// A record read failed; the cursor cannot continue
    Failed,
}

/// Pull-based search over a [`QuadTreeIndex`].
///
/// Results come out in traversal order: pre-order over the nodes (children in
/// NW, NE, SW, SE order), insertion order within a node. Every matching entry
/// is returned exactly once.
pub struct SearchCursor {
    index: QuadTreeIndex,
    store: Option<Arc<RecordStore>>,
    state: CursorState,
    mode: QueryMode,
    query: BoundingBox,
    stack: Vec<NodeId>,
    pending: VecDeque<RecordRef>,
    failure: Option<String>,
    // set once the iterator adapter has handed out an error
    iter_done: bool,
}

impl SearchCursor {
    pub fn new(index: &QuadTreeIndex) -> Self {
        Self {
            index: index.clone(),
            store: None,
            state: CursorState::Ready,
            mode: QueryMode::default(),
            query: BoundingBox::default(),
            stack: Vec::new(),
            pending: VecDeque::new(),
            failure: None,
            iter_done: false,
        }
    }

    /// Start an `Intersects` search.
    pub fn open(&mut self, query: BoundingBox) -> SpatialResult<()> {
        self.open_with_mode(query, QueryMode::Intersects)
    }

    /// Start a search. A cursor can be opened once.
    pub fn open_with_mode(&mut self, query: BoundingBox, mode: QueryMode) -> SpatialResult<()> {
        if self.state != CursorState::Ready {
            return Err(SpatialError::InvalidState(format!(
                "cursor cannot be opened in state {:?}",
                self.state
            )));
        }
        if !query.is_valid() {
            return Err(SpatialError::InvalidArgument(format!(
                "invalid query box {}",
                query
            )));
        }

        self.query = query;
        self.mode = mode;
        self.stack.push(NodeId::ROOT);
        self.store = Some(self.index.register_cursor());
        self.state = CursorState::Open;
        log::debug!("Opened {:?} cursor for {}", mode, query);
        Ok(())
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn query(&self) -> BoundingBox {
        self.query
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    /// Next matching reference, or `None` once the search is exhausted.
    ///
    /// Exhaustion closes the cursor. A failed cursor keeps reporting
    /// `InvalidState` so a failure is never mistaken for the end.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> SpatialResult<Option<RecordRef>> {
        match self.state {
            CursorState::Ready => Err(SpatialError::InvalidState(
                "cursor has not been opened".into(),
            )),
            CursorState::Closed => Ok(None),
            CursorState::Failed => Err(self.failed_error()),
            CursorState::Open => match self.advance() {
                Some(record) => Ok(Some(record)),
                None => {
                    self.close();
                    Ok(None)
                }
            },
        }
    }

    /// Next match together with its payload read from the record store.
    pub fn next_record(&mut self) -> SpatialResult<Option<(RecordRef, Vec<u8>)>> {
        let record = match self.next()? {
            Some(record) => record,
            None => return Ok(None),
        };
        match self.read(record) {
            Ok(payload) => Ok(Some((record, payload))),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Read the payload of a reference through this cursor's store handle.
    pub fn read(&self, record: RecordRef) -> SpatialResult<Vec<u8>> {
        match (&self.state, &self.store) {
            (CursorState::Open, Some(store)) => store.read(record),
            (CursorState::Failed, _) => Err(self.failed_error()),
            (state, _) => Err(SpatialError::InvalidState(format!(
                "cannot read through a cursor in state {:?}",
                state
            ))),
        }
    }

    /// Release the traversal and the store handle. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.stack.clear();
        self.pending.clear();
        self.release();
        if self.state != CursorState::Failed {
            self.state = CursorState::Closed;
        }
    }

    /// Pops nodes until at least one match is buffered or the tree is done.
    fn advance(&mut self) -> Option<RecordRef> {
        let arena = self.index.arena();
        while self.pending.is_empty() {
            let id = self.stack.pop()?;
            let node = arena.node(id);

            // Root entries may reach past the root bounds; below the root
            // every entry lies inside its node.
            if id != NodeId::ROOT && !node.bounds.overlaps(&self.query) {
                continue;
            }

            self.pending.extend(
                node.entries
                    .iter()
                    .filter(|entry| self.mode.matches(&self.query, &entry.bbox))
                    .map(|entry| entry.record),
            );
            if let Some(children) = node.children {
                self.stack.extend(children.iter().rev());
            }
        }
        self.pending.pop_front()
    }

    fn fail(&mut self, error: &SpatialError) {
        log::debug!("Cursor for {} failed: {}", self.query, error);
        self.failure = Some(error.to_string());
        self.state = CursorState::Failed;
        self.stack.clear();
        self.pending.clear();
        self.release();
    }

    fn release(&mut self) {
        if self.store.take().is_some() {
            self.index.release_cursor();
            log::debug!("Closed cursor for {}", self.query);
        }
    }

    fn failed_error(&self) -> SpatialError {
        SpatialError::InvalidState(format!(
            "cursor failed: {}",
            self.failure.as_deref().unwrap_or("unknown error")
        ))
    }
}

impl Iterator for SearchCursor {
    type Item = SpatialResult<RecordRef>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.iter_done {
            return None;
        }
        match SearchCursor::next(self) {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.iter_done = true;
                Some(Err(e))
            }
        }
    }
}

impl Drop for SearchCursor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SearchCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchCursor")
            .field("state", &self.state)
            .field("mode", &self.mode)
            .field("query", &self.query)
            .field("pending", &self.pending.len())
            .finish()
    }
}
