//! Header pages.

use crate::common::PageId;

use super::page_header::{read_u32, write_u32, PageHeader};

const OFFSET_NEXT: usize = PageHeader::SIZE;
const OFFSET_PAYLOAD: usize = OFFSET_NEXT + 4;

/// Free/used page directory page. The tree never reads one; the payload is
/// kept byte-for-byte so a file written by another tool round-trips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPage {
    id: PageId,
    next: Option<PageId>,
    payload: Vec<u8>,
}

impl HeaderPage {
    pub fn new(id: PageId, page_size: usize) -> Self {
        Self {
            id,
            next: None,
            payload: vec![0; page_size.saturating_sub(OFFSET_PAYLOAD)],
        }
    }

    #[inline]
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Next header page in the chain.
    #[inline]
    pub fn next(&self) -> Option<PageId> {
        self.next
    }

    pub fn set_next(&mut self, next: Option<PageId>) {
        self.next = next;
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub(crate) fn decode(id: PageId, data: &[u8]) -> Self {
        Self {
            id,
            next: PageId::from_link(id.file_id, read_u32(data, OFFSET_NEXT), id.category),
            payload: data[OFFSET_PAYLOAD..].to_vec(),
        }
    }

    pub(crate) fn encode_body(&self, data: &mut [u8]) {
        write_u32(data, OFFSET_NEXT, self.next.map_or(0, |p| p.page_no));
        data[OFFSET_PAYLOAD..].copy_from_slice(&self.payload);
    }
}
