//! Circular doubly-linked lists over a flat link table.
//!
//! Every list in the wheel — the 1024 buckets, the to-do list, and each
//! pending callout — is a node in one shared table of `{prev, next}` links.
//! Sentinel nodes (allocated first, one per list head) and entry nodes share
//! the same index space, so a node's neighbor may be either without any
//! special casing. All structural operations are O(1), including splicing an
//! entire list onto another.
//!
//! Detached nodes carry poisoned links. Operations `debug_assert!` that the
//! nodes they touch are in the expected state, catching double-insert and
//! double-remove bugs in debug builds at no release cost.

/// Link value marking a node that is not on any list.
const POISON: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct Link {
    prev: u32,
    next: u32,
}

/// Flat table of circular-list links indexed by node id.
///
/// Node ids `0..sentinel_count` are list heads, created self-referential
/// (empty). Further nodes are added with [`LinkTable::add_node`] and start
/// detached.
#[derive(Debug)]
pub(crate) struct LinkTable {
    links: Vec<Link>,
}

impl LinkTable {
    /// Creates a table whose first `sentinel_count` nodes are empty list
    /// heads.
    pub(crate) fn with_sentinels(sentinel_count: usize) -> Self {
        let links = (0..sentinel_count)
            .map(|i| {
                let i = i as u32;
                Link { prev: i, next: i }
            })
            .collect();
        Self { links }
    }

    /// Appends a new detached node to the table and returns its id.
    pub(crate) fn add_node(&mut self) -> u32 {
        let id = u32::try_from(self.links.len()).expect("link table overflow");
        self.links.push(Link {
            prev: POISON,
            next: POISON,
        });
        id
    }

    /// Number of nodes in the table (sentinels included).
    pub(crate) fn node_count(&self) -> usize {
        self.links.len()
    }

    /// True if `node` is not linked into any list.
    pub(crate) fn is_detached(&self, node: u32) -> bool {
        self.links[node as usize].prev == POISON
    }

    /// Links `elem` as the new tail of the list headed by `head`.
    ///
    /// `elem` must be detached.
    pub(crate) fn insert_tail(&mut self, elem: u32, head: u32) {
        debug_assert_ne!(elem, head, "cannot insert a sentinel into a list");
        debug_assert!(
            self.is_detached(elem),
            "insert of already-linked node {elem}"
        );
        let tail = self.links[head as usize].prev;
        self.links[elem as usize] = Link {
            prev: tail,
            next: head,
        };
        self.links[tail as usize].next = elem;
        self.links[head as usize].prev = elem;
    }

    /// Unlinks `elem` from whatever list it is on and poisons its links.
    ///
    /// `elem` must be linked.
    pub(crate) fn remove(&mut self, elem: u32) {
        let Link { prev, next } = self.links[elem as usize];
        debug_assert_ne!(prev, POISON, "remove of detached node {elem}");
        debug_assert_eq!(
            self.links[prev as usize].next, elem,
            "link table corrupted at node {elem}"
        );
        debug_assert_eq!(
            self.links[next as usize].prev, elem,
            "link table corrupted at node {elem}"
        );
        self.links[prev as usize].next = next;
        self.links[next as usize].prev = prev;
        self.links[elem as usize] = Link {
            prev: POISON,
            next: POISON,
        };
    }

    /// Splices every element of the list headed by `src` onto the end of the
    /// list headed by `dst`, leaving `src` empty. No-op if `src` is empty.
    pub(crate) fn append(&mut self, dst: u32, src: u32) {
        debug_assert_ne!(dst, src, "cannot splice a list onto itself");
        if self.is_empty(src) {
            return;
        }
        let src_first = self.links[src as usize].next;
        let src_last = self.links[src as usize].prev;
        let dst_last = self.links[dst as usize].prev;

        self.links[dst_last as usize].next = src_first;
        self.links[src_first as usize].prev = dst_last;
        self.links[src_last as usize].next = dst;
        self.links[dst as usize].prev = src_last;

        self.links[src as usize] = Link {
            prev: src,
            next: src,
        };
    }

    /// Returns the first element of the list headed by `head`, or `None` if
    /// the list is empty.
    pub(crate) fn first(&self, head: u32) -> Option<u32> {
        let next = self.links[head as usize].next;
        (next != head).then_some(next)
    }

    /// True iff the list headed by `head` has no elements.
    pub(crate) fn is_empty(&self, head: u32) -> bool {
        self.links[head as usize].next == head
    }

    /// Iterates the elements of the list headed by `head` in order.
    pub(crate) fn iter(&self, head: u32) -> ListIter<'_> {
        ListIter {
            table: self,
            head,
            cursor: self.links[head as usize].next,
        }
    }

    /// Checks the structural invariant of the list headed by `head`: every
    /// node's neighbors point back at it. Test support.
    #[cfg(test)]
    fn assert_well_formed(&self, head: u32) {
        let mut node = head;
        loop {
            let next = self.links[node as usize].next;
            assert_eq!(self.links[next as usize].prev, node);
            node = next;
            if node == head {
                break;
            }
        }
    }
}

/// Iterator over the elements of one circular list.
pub(crate) struct ListIter<'a> {
    table: &'a LinkTable,
    head: u32,
    cursor: u32,
}

impl Iterator for ListIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.cursor == self.head {
            return None;
        }
        let node = self.cursor;
        self.cursor = self.table.links[node as usize].next;
        Some(node)
    }
}
