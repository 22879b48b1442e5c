//! Compact, pointer-free view of events inside a backing buffer.
//!
//! An [`EvioNode`] describes one structure purely by byte positions into a
//! shared [`ByteBuffer`]; it owns none of the bytes. A [`CompactEvent`]
//! holds the event-root node plus the flat `all_nodes` list filled by
//! [`scan`](CompactEvent::scan), which allocates one node per descendant
//! structure. Scanning is idempotent: a re-scan first discards the previous
//! node list.
//!
//! Structural edits ([`remove_structure`](CompactEvent::remove_structure),
//! [`add_structure`](CompactEvent::add_structure)) patch ancestor length
//! words directly in the buffer, shift trailing bytes, and keep the node
//! list consistent, so a fresh re-parse of the buffer always agrees with the
//! maintained list. Edits on the same event must be externally serialized;
//! they mutate the backing buffer and the shared node list.

use crate::buffer::ByteBuffer;
use crate::data_types::DataType;
use crate::header::{StructureHeader, StructureKind};
use crate::EvioError;

/// Index of a node within its event's `all_nodes` list.
pub type CompactNodeId = usize;

/// Descriptor of one structure inside a backing buffer.
#[derive(Debug, Clone)]
pub struct EvioNode {
    /// Byte position of the structure's header.
    pub pos: usize,
    /// Byte position of the structure's payload.
    pub data_pos: usize,
    /// On-disk length word (total words minus one).
    pub len: u32,
    /// Payload length in words.
    pub data_len: u32,
    pub tag: u16,
    pub num: u8,
    pub pad: u8,
    pub kind: StructureKind,
    pub data_type: DataType,
    /// Byte position of the record this event came from.
    pub record_pos: usize,
    /// Index in the event's node list.
    pub place: usize,
    pub obsolete: bool,
    pub scanned: bool,
    parent: Option<CompactNodeId>,
    children: Vec<CompactNodeId>,
}

impl EvioNode {
    fn from_header(header: &StructureHeader, pos: usize, record_pos: usize) -> Self {
        EvioNode {
            pos,
            data_pos: pos + header.kind.header_words() as usize * 4,
            len: header.length,
            data_len: header.data_words(),
            tag: header.tag,
            num: header.num,
            pad: header.pad,
            kind: header.kind,
            data_type: header.data_type,
            record_pos,
            place: 0,
            obsolete: false,
            scanned: false,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Total size in bytes, header included.
    pub fn total_bytes(&self) -> usize {
        (self.len as usize + 1) * 4
    }

    /// End of the structure in the buffer.
    pub fn end_pos(&self) -> usize {
        self.pos + self.total_bytes()
    }

    pub fn is_container(&self) -> bool {
        self.data_type.is_container()
    }

    pub fn parent(&self) -> Option<CompactNodeId> {
        self.parent
    }

    pub fn children(&self) -> &[CompactNodeId] {
        &self.children
    }
}

/// One event addressed inside a backing buffer, with its scanned node list.
#[derive(Debug)]
pub struct CompactEvent {
    buffer: ByteBuffer,
    nodes: Vec<EvioNode>,
}

impl CompactEvent {
    /// Read the bank header at `event_pos` and build the event-root node.
    ///
    /// `buf` is shared, not copied; its byte order must already match the
    /// data (see [`RecordHeader::decode`](crate::record_header::RecordHeader)).
    /// `place` records the event's index within its record.
    pub fn extract_event(
        buf: &ByteBuffer,
        record_pos: usize,
        event_pos: usize,
        place: usize,
    ) -> Result<Self, EvioError> {
        let header = StructureHeader::decode(buf, event_pos, StructureKind::Bank)?;
        let total = header.total_words() as usize * 4;
        if event_pos + total > buf.limit() {
            return Err(EvioError::InvalidLength(format!(
                "event of {} bytes at {} exceeds buffer limit {}",
                total,
                event_pos,
                buf.limit()
            )));
        }
        let mut root = EvioNode::from_header(&header, event_pos, record_pos);
        root.place = place;
        Ok(CompactEvent {
            buffer: buf.duplicate(),
            nodes: vec![root],
        })
    }

    /// The shared backing buffer.
    pub fn buffer(&self) -> &ByteBuffer {
        &self.buffer
    }

    pub fn root(&self) -> &EvioNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: CompactNodeId) -> &EvioNode {
        &self.nodes[id]
    }

    /// All scanned nodes, event root first, in scan order.
    pub fn all_nodes(&self) -> &[EvioNode] {
        &self.nodes
    }

    /// Zero-copy view of a node's bytes (header included). The view shares
    /// storage with the backing buffer.
    pub fn view(&self, id: CompactNodeId) -> Result<ByteBuffer, EvioError> {
        let node = &self.nodes[id];
        let mut view = self.buffer.duplicate();
        view.set_limit(node.end_pos())?;
        view.set_position(node.pos)?;
        Ok(view.slice())
    }

    /// Zero-copy view of a node's payload bytes, pad included.
    pub fn data_view(&self, id: CompactNodeId) -> Result<ByteBuffer, EvioError> {
        let node = &self.nodes[id];
        let mut view = self.buffer.duplicate();
        view.set_limit(node.data_pos + node.data_len as usize * 4)?;
        view.set_position(node.data_pos)?;
        Ok(view.slice())
    }

    /// Walk the event, allocating one node per descendant structure.
    ///
    /// Idempotent: any previous scan result is discarded first.
    pub fn scan(&mut self) -> Result<(), EvioError> {
        self.nodes.truncate(1);
        let root = &mut self.nodes[0];
        root.children.clear();
        root.scanned = true;
        self.scan_children(0)?;
        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.place = i;
        }
        Ok(())
    }

    fn scan_children(&mut self, parent: CompactNodeId) -> Result<(), EvioError> {
        let (data_pos, data_end, child_kind, record_pos) = {
            let p = &self.nodes[parent];
            let kind = match StructureKind::from_container_type(p.data_type) {
                Some(k) => k,
                None => return Ok(()),
            };
            (
                p.data_pos,
                p.data_pos + p.data_len as usize * 4,
                kind,
                p.record_pos,
            )
        };

        let mut offset = data_pos;
        while offset < data_end {
            let header = StructureHeader::decode(&self.buffer, offset, child_kind)?;
            let total = header.total_words() as usize * 4;
            if offset + total > data_end {
                return Err(EvioError::InvalidLength(format!(
                    "child of {} bytes at {} overruns container ending at {}",
                    total, offset, data_end
                )));
            }
            let mut node = EvioNode::from_header(&header, offset, record_pos);
            node.parent = Some(parent);
            node.scanned = true;
            let id = self.nodes.len();
            self.nodes.push(node);
            self.nodes[parent].children.push(id);
            self.scan_children(id)?;
            offset += total;
        }
        Ok(())
    }

    fn scanned(&self) -> bool {
        self.nodes[0].scanned
    }

    /// Nodes matching `tag` (and `num`, when given), in scan order.
    /// Scans first if needed.
    pub fn search(
        &mut self,
        tag: u16,
        num: Option<u8>,
    ) -> Result<Vec<CompactNodeId>, EvioError> {
        if !self.scanned() {
            self.scan()?;
        }
        Ok(self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| {
                !n.obsolete && n.tag == tag && num.map_or(true, |num| n.num == num)
            })
            .map(|(i, _)| i)
            .collect())
    }

    // ── Typed payload reads ─────────────────────────────────────────

    /// Decode a leaf node's payload as u32 values.
    pub fn u32_data(&self, id: CompactNodeId) -> Result<Vec<u32>, EvioError> {
        let node = &self.nodes[id];
        let view = self.data_view(id)?;
        let valid = node.data_len as usize * 4 - node.pad as usize;
        let mut out = Vec::with_capacity(valid / 4);
        for at in (0..valid).step_by(4) {
            out.push(view.get_u32_at(at)?);
        }
        Ok(out)
    }

    /// Decode a leaf node's payload as i32 values.
    pub fn i32_data(&self, id: CompactNodeId) -> Result<Vec<i32>, EvioError> {
        Ok(self.u32_data(id)?.into_iter().map(|v| v as i32).collect())
    }

    /// Decode a leaf node's payload as f32 values.
    pub fn f32_data(&self, id: CompactNodeId) -> Result<Vec<f32>, EvioError> {
        let view = self.data_view(id)?;
        let node = &self.nodes[id];
        let valid = node.data_len as usize * 4 - node.pad as usize;
        let mut out = Vec::with_capacity(valid / 4);
        for at in (0..valid).step_by(4) {
            out.push(view.get_f32_at(at)?);
        }
        Ok(out)
    }

    /// Decode a leaf node's payload as f64 values.
    pub fn f64_data(&self, id: CompactNodeId) -> Result<Vec<f64>, EvioError> {
        let view = self.data_view(id)?;
        let node = &self.nodes[id];
        let valid = node.data_len as usize * 4 - node.pad as usize;
        let mut out = Vec::with_capacity(valid / 8);
        for at in (0..valid).step_by(8) {
            out.push(view.get_f64_at(at)?);
        }
        Ok(out)
    }

    /// Decode a leaf node's payload as i16 values (pad removed).
    pub fn i16_data(&self, id: CompactNodeId) -> Result<Vec<i16>, EvioError> {
        let view = self.data_view(id)?;
        let node = &self.nodes[id];
        let valid = node.data_len as usize * 4 - node.pad as usize;
        let mut out = Vec::with_capacity(valid / 2);
        for at in (0..valid).step_by(2) {
            out.push(view.get_i16_at(at)?);
        }
        Ok(out)
    }

    /// Decode a string-array leaf into strings.
    pub fn string_data(&self, id: CompactNodeId) -> Result<Vec<String>, EvioError> {
        let node = &self.nodes[id];
        let bytes = self
            .buffer
            .vec_at(node.data_pos, node.data_len as usize * 4)?;
        crate::util::unpack_strings(&bytes)
    }

    // ── Structural edits ────────────────────────────────────────────

    /// Remove a structure from the event: the node and all its descendants
    /// become obsolete and leave the node list, every ancestor's length word
    /// is patched in the buffer, and trailing bytes shift down.
    ///
    /// Returns the edited buffer (the same shared storage).
    pub fn remove_structure(&mut self, id: CompactNodeId) -> Result<ByteBuffer, EvioError> {
        if !self.scanned() {
            self.scan()?;
        }
        if id == 0 {
            return Err(EvioError::InvalidStructure(
                "cannot remove the event itself".into(),
            ));
        }
        if id >= self.nodes.len() || self.nodes[id].obsolete {
            return Err(EvioError::InvalidStructure(format!(
                "no such node {}",
                id
            )));
        }

        let removed_pos = self.nodes[id].pos;
        let removed_end = self.nodes[id].end_pos();
        let delta_bytes = self.nodes[id].total_bytes();
        let delta_words = (delta_bytes / 4) as u32;

        // mark the subtree obsolete
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            self.nodes[n].obsolete = true;
            stack.extend(self.nodes[n].children.iter().copied());
        }

        // patch ancestor length words in the buffer and in the nodes
        let mut ancestor = self.nodes[id].parent;
        while let Some(a) = ancestor {
            self.patch_length(a, -(delta_words as i64))?;
            ancestor = self.nodes[a].parent;
        }

        // shift everything after the removed region down
        let limit = self.buffer.limit();
        let tail = self.buffer.vec_at(removed_end, limit - removed_end)?;
        self.buffer.put_bytes_at(removed_pos, &tail)?;
        // zero what is now past the end so stale bytes never resurface
        let zeros = vec![0u8; delta_bytes];
        self.buffer.put_bytes_at(limit - delta_bytes, &zeros)?;
        self.buffer.set_limit(limit - delta_bytes)?;

        // shift positions of nodes after the removed region
        for node in self.nodes.iter_mut() {
            if node.pos >= removed_end {
                node.pos -= delta_bytes;
                node.data_pos -= delta_bytes;
            }
        }

        // drop obsolete nodes, remapping ids
        self.compact_nodes();
        Ok(self.buffer.duplicate())
    }

    /// Append a serialized structure (already in the buffer's byte order) to
    /// the end of the event's data, growing the backing buffer if needed.
    /// Only the newly added subtree is scanned.
    ///
    /// Returns the edited buffer.
    pub fn add_structure(&mut self, raw: &[u8]) -> Result<ByteBuffer, EvioError> {
        if !self.scanned() {
            self.scan()?;
        }
        if raw.len() < 8 || raw.len() % 4 != 0 {
            return Err(EvioError::InvalidStructure(format!(
                "added structure of {} bytes is not a whole bank",
                raw.len()
            )));
        }
        let child_kind = StructureKind::from_container_type(self.nodes[0].data_type)
            .ok_or_else(|| {
                EvioError::InvalidStructure("event does not hold structures".into())
            })?;

        // validate the raw bytes as one complete structure
        let raw_buf = ByteBuffer::from_slice(raw).with_order(self.buffer.order());
        let header = StructureHeader::decode(&raw_buf, 0, child_kind)?;
        if header.total_words() as usize * 4 != raw.len() {
            return Err(EvioError::InvalidLength(format!(
                "structure claims {} words but {} bytes were given",
                header.total_words(),
                raw.len()
            )));
        }

        let insert_at = self.nodes[0].end_pos();
        let delta_bytes = raw.len();
        let delta_words = (delta_bytes / 4) as u32;
        let old_limit = self.buffer.limit();

        if old_limit + delta_bytes > self.buffer.capacity() {
            self.buffer.expand(old_limit + delta_bytes);
        }
        self.buffer.set_limit(old_limit + delta_bytes)?;

        // shift anything after the event up, then splice the new bytes in
        if old_limit > insert_at {
            let tail = self.buffer.vec_at(insert_at, old_limit - insert_at)?;
            self.buffer.put_bytes_at(insert_at + delta_bytes, &tail)?;
        }
        self.buffer.put_bytes_at(insert_at, raw)?;

        // the event root is the only ancestor of a top-level child
        self.patch_length(0, delta_words as i64)?;

        // scan only the new subtree
        let mut node = EvioNode::from_header(&header, insert_at, self.nodes[0].record_pos);
        node.parent = Some(0);
        node.scanned = true;
        let id = self.nodes.len();
        self.nodes.push(node);
        self.nodes[0].children.push(id);
        self.scan_children(id)?;
        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.place = i;
        }
        Ok(self.buffer.duplicate())
    }

    /// Apply a word delta to a node's length field, both in the buffer and
    /// in the node.
    fn patch_length(&mut self, id: CompactNodeId, delta_words: i64) -> Result<(), EvioError> {
        let (pos, kind, len) = {
            let n = &self.nodes[id];
            (n.pos, n.kind, n.len)
        };
        let new_len = (len as i64 + delta_words) as u32;
        match kind {
            StructureKind::Bank => {
                self.buffer.put_u32_at(pos, new_len)?;
            }
            StructureKind::Segment | StructureKind::TagSegment => {
                let word = self.buffer.get_u32_at(pos)?;
                self.buffer
                    .put_u32_at(pos, (word & 0xffff_0000) | (new_len & 0xffff))?;
            }
        }
        let node = &mut self.nodes[id];
        node.len = new_len;
        node.data_len = (node.data_len as i64 + delta_words) as u32;
        Ok(())
    }

    /// Drop obsolete nodes and remap parent/child ids.
    fn compact_nodes(&mut self) {
        let mut remap = vec![usize::MAX; self.nodes.len()];
        let mut next = 0usize;
        for (i, node) in self.nodes.iter().enumerate() {
            if !node.obsolete {
                remap[i] = next;
                next += 1;
            }
        }
        let mut kept: Vec<EvioNode> = Vec::with_capacity(next);
        for (i, node) in std::mem::take(&mut self.nodes).into_iter().enumerate() {
            if remap[i] == usize::MAX {
                continue;
            }
            let mut node = node;
            node.parent = node.parent.map(|p| remap[p]);
            node.children = node
                .children
                .iter()
                .filter(|&&c| remap[c] != usize::MAX)
                .map(|&c| remap[c])
                .collect();
            node.place = remap[i];
            kept.push(node);
        }
        self.nodes = kept;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Endian;
    use crate::structure::EvioTree;

    /// Top-level bank (tag 1) with 5 uint32 children tagged 1..=5.
    fn five_child_event() -> Vec<u8> {
        let mut tree = EvioTree::new();
        let root = tree.add_bank(1, DataType::Bank, 1);
        for tag in 1..=5u16 {
            let child = tree.add_bank(tag, DataType::Uint32, tag as u8);
            tree.set_u32_data(child, &[tag as u32, tag as u32 + 100])
                .unwrap();
            tree.add_child(root, child).unwrap();
        }
        tree.to_bytes(root, Endian::Big).unwrap()
    }

    fn new_child_bytes(tag: u16) -> Vec<u8> {
        let mut tree = EvioTree::new();
        let bank = tree.add_bank(tag, DataType::Uint32, 9);
        tree.set_u32_data(bank, &[777]).unwrap();
        tree.to_bytes(bank, Endian::Big).unwrap()
    }

    #[test]
    fn test_extract_event_fills_root() {
        let bytes = five_child_event();
        let buf = ByteBuffer::wrap(bytes);
        let event = CompactEvent::extract_event(&buf, 0, 0, 0).unwrap();
        let root = event.root();
        assert_eq!(root.pos, 0);
        assert_eq!(root.data_pos, 8);
        assert_eq!(root.tag, 1);
        assert_eq!(root.num, 1);
        assert!(root.is_container());
        // 5 children x (2 header + 2 data words) + 1 = 21
        assert_eq!(root.len, 21);
    }

    #[test]
    fn test_scan_allocates_descendants() {
        let buf = ByteBuffer::wrap(five_child_event());
        let mut event = CompactEvent::extract_event(&buf, 0, 0, 0).unwrap();
        event.scan().unwrap();
        assert_eq!(event.all_nodes().len(), 6);
        assert_eq!(event.root().children().len(), 5);
        for (i, &child) in event.root().children().iter().enumerate() {
            let node = event.node(child);
            assert_eq!(node.tag, i as u16 + 1);
            assert_eq!(node.parent(), Some(0));
            assert_eq!(node.data_len, 2);
        }
    }

    #[test]
    fn test_scan_is_idempotent() {
        let buf = ByteBuffer::wrap(five_child_event());
        let mut event = CompactEvent::extract_event(&buf, 0, 0, 0).unwrap();
        event.scan().unwrap();
        event.scan().unwrap();
        assert_eq!(event.all_nodes().len(), 6);
        assert_eq!(event.root().children().len(), 5);
    }

    #[test]
    fn test_view_is_zero_copy() {
        let bytes = five_child_event();
        let buf = ByteBuffer::wrap(bytes);
        let mut event = CompactEvent::extract_event(&buf, 0, 0, 0).unwrap();
        event.scan().unwrap();

        let child = event.root().children()[0];
        let view = event.view(child).unwrap();
        assert!(view.shares_storage(&buf));
        assert_eq!(view.capacity(), 16);
        // header word 0 of the child: length 3
        assert_eq!(view.get_u32_at(0).unwrap(), 3);

        let data = event.data_view(child).unwrap();
        assert_eq!(data.get_u32_at(0).unwrap(), 1);
        assert_eq!(data.get_u32_at(4).unwrap(), 101);
    }

    #[test]
    fn test_typed_payload_reads() {
        let buf = ByteBuffer::wrap(five_child_event());
        let mut event = CompactEvent::extract_event(&buf, 0, 0, 0).unwrap();
        event.scan().unwrap();

        let child = event.root().children()[2];
        assert_eq!(event.u32_data(child).unwrap(), vec![3, 103]);
        assert_eq!(event.i32_data(child).unwrap(), vec![3, 103]);

        let mut tree = EvioTree::new();
        let root = tree.add_bank(1, DataType::Bank, 0);
        let text = tree.add_bank(2, DataType::CharStar8, 0);
        tree.set_string_data(text, &["raw".to_string()]).unwrap();
        let shorts = tree.add_bank(3, DataType::Short16, 0);
        tree.set_i16_data(shorts, &[5, -6, 7]).unwrap();
        tree.add_child(root, text).unwrap();
        tree.add_child(root, shorts).unwrap();
        let buf = ByteBuffer::wrap(tree.to_bytes(root, Endian::Big).unwrap());
        let mut event = CompactEvent::extract_event(&buf, 0, 0, 0).unwrap();
        event.scan().unwrap();

        let text_id = event.search(2, None).unwrap()[0];
        assert_eq!(event.string_data(text_id).unwrap(), vec!["raw".to_string()]);
        let shorts_id = event.search(3, None).unwrap()[0];
        assert_eq!(event.i16_data(shorts_id).unwrap(), vec![5, -6, 7]);
    }

    #[test]
    fn test_search_by_tag_and_num() {
        let buf = ByteBuffer::wrap(five_child_event());
        let mut event = CompactEvent::extract_event(&buf, 0, 0, 0).unwrap();

        let hits = event.search(3, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(event.node(hits[0]).tag, 3);

        let hits = event.search(3, Some(3)).unwrap();
        assert_eq!(hits.len(), 1);
        let hits = event.search(3, Some(9)).unwrap();
        assert!(hits.is_empty());

        // tag 1 matches the event root and child 1
        let hits = event.search(1, None).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_remove_then_add_structure() {
        // S4: remove child 4, add a new bank, re-check the node list and
        // the exact byte layout
        let original = five_child_event();
        let buf = ByteBuffer::wrap(original.clone());
        let mut event = CompactEvent::extract_event(&buf, 0, 0, 0).unwrap();
        event.scan().unwrap();

        let child4 = event.root().children()[3];
        assert_eq!(event.node(child4).tag, 4);
        event.remove_structure(child4).unwrap();

        assert_eq!(event.all_nodes().len(), 5);
        assert_eq!(event.root().children().len(), 4);
        assert_eq!(event.root().len, 21 - 4);

        let added = new_child_bytes(77);
        event.add_structure(&added).unwrap();

        assert_eq!(event.all_nodes().len(), 6);
        let children = event.root().children().to_vec();
        assert_eq!(children.len(), 5);
        let tags: Vec<u16> = children.iter().map(|&c| event.node(c).tag).collect();
        assert_eq!(tags, vec![1, 2, 3, 5, 77]);

        // length word: -4 words for the removed child, +3 for the added one
        assert_eq!(event.root().len, 21 - 4 + 3);
        assert_eq!(event.buffer().get_u32_at(0).unwrap(), 20);

        // expected bytes: header with patched length, children 1,2,3,5, new
        let mut expected = Vec::new();
        expected.extend_from_slice(&original[..8]);
        expected.extend_from_slice(&original[8..8 + 3 * 16]); // children 1-3
        expected.extend_from_slice(&original[8 + 4 * 16..]); // child 5
        expected.extend_from_slice(&added);
        // patch the root length word in the expectation
        expected[0..4].copy_from_slice(&20u32.to_be_bytes());

        let edited = event.buffer();
        let got = edited.vec_at(0, edited.limit()).unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_edits_agree_with_reparse() {
        // P5: after edits, a fresh parse matches the maintained node list
        let buf = ByteBuffer::wrap(five_child_event());
        let mut event = CompactEvent::extract_event(&buf, 0, 0, 0).unwrap();
        event.scan().unwrap();

        let child2 = event.root().children()[1];
        event.remove_structure(child2).unwrap();
        event.add_structure(&new_child_bytes(42)).unwrap();

        let edited = event.buffer();
        let bytes = edited.vec_at(0, edited.limit()).unwrap();
        let fresh_buf = ByteBuffer::wrap(bytes);
        let mut fresh = CompactEvent::extract_event(&fresh_buf, 0, 0, 0).unwrap();
        fresh.scan().unwrap();

        assert_eq!(fresh.all_nodes().len(), event.all_nodes().len());
        for (a, b) in fresh.all_nodes().iter().zip(event.all_nodes()) {
            assert_eq!(a.pos, b.pos);
            assert_eq!(a.data_pos, b.data_pos);
            assert_eq!(a.len, b.len);
            assert_eq!(a.tag, b.tag);
            assert_eq!(a.num, b.num);
            assert_eq!(a.data_type.code(), b.data_type.code());
        }
    }

    #[test]
    fn test_remove_nested_structure_patches_all_ancestors() {
        // bank > bank > two uint32 banks; remove a grandchild
        let mut tree = EvioTree::new();
        let root = tree.add_bank(1, DataType::Bank, 0);
        let mid = tree.add_bank(2, DataType::Bank, 0);
        let a = tree.add_bank(3, DataType::Uint32, 0);
        tree.set_u32_data(a, &[1]).unwrap();
        let b = tree.add_bank(4, DataType::Uint32, 0);
        tree.set_u32_data(b, &[2, 3]).unwrap();
        tree.add_child(root, mid).unwrap();
        tree.add_child(mid, a).unwrap();
        tree.add_child(mid, b).unwrap();
        let bytes = tree.to_bytes(root, Endian::Big).unwrap();

        let buf = ByteBuffer::wrap(bytes);
        let mut event = CompactEvent::extract_event(&buf, 0, 0, 0).unwrap();
        event.scan().unwrap();

        let grandchild = event
            .search(3, None)
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        let root_len = event.root().len;
        let mid_id = event.node(grandchild).parent().unwrap();
        let mid_len = event.node(mid_id).len;

        event.remove_structure(grandchild).unwrap();

        assert_eq!(event.root().len, root_len - 3);
        assert_eq!(event.node(mid_id).len, mid_len - 3);
        assert_eq!(event.buffer().get_u32_at(0).unwrap(), root_len - 3);
        assert_eq!(event.buffer().get_u32_at(8).unwrap(), mid_len - 3);
    }

    #[test]
    fn test_remove_root_rejected() {
        let buf = ByteBuffer::wrap(five_child_event());
        let mut event = CompactEvent::extract_event(&buf, 0, 0, 0).unwrap();
        assert!(event.remove_structure(0).is_err());
    }

    #[test]
    fn test_add_structure_grows_buffer() {
        let bytes = five_child_event();
        let len = bytes.len();
        let buf = ByteBuffer::wrap(bytes);
        let mut event = CompactEvent::extract_event(&buf, 0, 0, 0).unwrap();

        let added = new_child_bytes(8);
        event.add_structure(&added).unwrap();
        assert_eq!(event.buffer().limit(), len + added.len());
    }

    #[test]
    fn test_add_structure_validates_length() {
        let buf = ByteBuffer::wrap(five_child_event());
        let mut event = CompactEvent::extract_event(&buf, 0, 0, 0).unwrap();
        // claims 3 words but supplies 4
        let mut bad = new_child_bytes(9);
        bad.extend_from_slice(&[0, 0, 0, 0]);
        assert!(event.add_structure(&bad).is_err());
        assert!(event.add_structure(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_little_endian_event_edits() {
        let mut tree = EvioTree::new();
        let root = tree.add_bank(1, DataType::Bank, 0);
        let child = tree.add_bank(2, DataType::Uint32, 0);
        tree.set_u32_data(child, &[5]).unwrap();
        tree.add_child(root, child).unwrap();
        let bytes = tree.to_bytes(root, Endian::Little).unwrap();

        let buf = ByteBuffer::wrap(bytes).with_order(Endian::Little);
        let mut event = CompactEvent::extract_event(&buf, 0, 0, 0).unwrap();
        event.scan().unwrap();
        assert_eq!(event.all_nodes().len(), 2);

        let mut add_tree = EvioTree::new();
        let nb = add_tree.add_bank(7, DataType::Uint32, 0);
        add_tree.set_u32_data(nb, &[9]).unwrap();
        let raw = add_tree.to_bytes(nb, Endian::Little).unwrap();
        event.add_structure(&raw).unwrap();

        assert_eq!(event.root().children().len(), 2);
        // root grew from 4 to 7 words past the length word
        assert_eq!(event.buffer().get_u32_at(0).unwrap(), 7);
    }
}
