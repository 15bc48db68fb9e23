//! TVM cells and bag-of-cells (BOC) serialization
//!
//! Only ordinary cells are supported; that covers message bodies and the
//! address slices returned by get-methods.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

use super::address::Address;

pub const MAX_CELL_BITS: usize = 1023;
pub const MAX_CELL_REFS: usize = 4;

const BOC_MAGIC: [u8; 4] = [0xb5, 0xee, 0x9c, 0x72];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CellError {
    #[error("cell overflow: {0} bits exceed capacity")]
    Overflow(usize),

    #[error("cell cannot hold more than {MAX_CELL_REFS} references")]
    TooManyRefs,

    #[error("value {value} does not fit into {bits} bits")]
    ValueTooLarge { value: u64, bits: usize },

    #[error("not enough data: wanted {wanted} bits, {left} left")]
    Underflow { wanted: usize, left: usize },

    #[error("malformed address: {0}")]
    BadAddress(String),

    #[error("malformed BOC: {0}")]
    BadBoc(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
}

impl Cell {
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Raw data bytes; bits past `bit_len` are zero
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn refs(&self) -> &[Arc<Cell>] {
        &self.refs
    }

    pub fn parser(&self) -> CellSlice<'_> {
        CellSlice { cell: self, pos: 0 }
    }

    fn descriptors(&self) -> [u8; 2] {
        let d1 = self.refs.len() as u8;
        let d2 = (self.bit_len / 8 + (self.bit_len + 7) / 8) as u8;
        [d1, d2]
    }

    /// Data padded with the completion tag when not byte aligned
    fn padded_data(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        if self.bit_len % 8 != 0 {
            let last = out.len() - 1;
            out[last] |= 0x80 >> (self.bit_len % 8);
        }
        out
    }

    pub fn depth(&self) -> u16 {
        self.refs
            .iter()
            .map(|r| r.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Representation hash of an ordinary cell
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.descriptors());
        hasher.update(self.padded_data());
        for r in &self.refs {
            hasher.update(r.depth().to_be_bytes());
        }
        for r in &self.refs {
            hasher.update(r.hash());
        }
        hasher.finalize().into()
    }

    /// Serialize this cell tree as a BOC without index or CRC
    pub fn to_boc(&self) -> Vec<u8> {
        let mut order: Vec<(&Cell, Vec<usize>)> = Vec::new();
        collect_preorder(self, &mut order);

        let size_bytes = bytes_needed(order.len() as u64);
        let mut cells_blob = Vec::new();
        for (cell, children) in &order {
            cells_blob.extend_from_slice(&cell.descriptors());
            cells_blob.extend_from_slice(&cell.padded_data());
            for &child in children {
                push_be(&mut cells_blob, child as u64, size_bytes);
            }
        }
        let off_bytes = bytes_needed(cells_blob.len() as u64);

        let mut out = Vec::with_capacity(cells_blob.len() + 16);
        out.extend_from_slice(&BOC_MAGIC);
        out.push(size_bytes as u8);
        out.push(off_bytes as u8);
        push_be(&mut out, order.len() as u64, size_bytes);
        push_be(&mut out, 1, size_bytes);
        push_be(&mut out, 0, size_bytes);
        push_be(&mut out, cells_blob.len() as u64, off_bytes);
        push_be(&mut out, 0, size_bytes);
        out.extend_from_slice(&cells_blob);
        out
    }

    /// Parse a single-root BOC
    pub fn from_boc(bytes: &[u8]) -> Result<Arc<Cell>, CellError> {
        let mut r = ByteReader { bytes, pos: 0 };
        if r.take(4)? != BOC_MAGIC {
            return Err(CellError::BadBoc("unknown magic".to_string()));
        }

        let flags = r.byte()?;
        let has_idx = flags & 0x80 != 0;
        let has_crc = flags & 0x40 != 0;
        let size = (flags & 0x07) as usize;
        let off_bytes = r.byte()? as usize;
        if size == 0 || size > 4 || off_bytes == 0 || off_bytes > 8 {
            return Err(CellError::BadBoc("invalid size fields".to_string()));
        }

        let cell_count = r.uint(size)? as usize;
        let root_count = r.uint(size)? as usize;
        let _absent = r.uint(size)?;
        let total_size = r.uint(off_bytes)? as usize;
        if root_count != 1 {
            return Err(CellError::BadBoc(format!(
                "expected one root, got {}",
                root_count
            )));
        }
        let root_idx = r.uint(size)? as usize;
        if has_idx {
            let index_len = cell_count
                .checked_mul(off_bytes)
                .ok_or_else(|| CellError::BadBoc("index size overflow".to_string()))?;
            r.take(index_len)?;
        }

        let blob = r.take(total_size)?;
        if has_crc {
            // CRC32-C not verified
            r.take(4)?;
        }

        // Every serialized cell takes at least its two descriptor bytes
        if cell_count == 0 || cell_count > blob.len() / 2 {
            return Err(CellError::BadBoc(format!(
                "{} cells cannot fit in {} bytes",
                cell_count,
                blob.len()
            )));
        }
        if root_idx >= cell_count {
            return Err(CellError::BadBoc(format!(
                "root index {} out of range",
                root_idx
            )));
        }

        let mut raw = Vec::with_capacity(cell_count);
        let mut br = ByteReader {
            bytes: blob,
            pos: 0,
        };
        for _ in 0..cell_count {
            let d1 = br.byte()?;
            let d2 = br.byte()?;
            if d1 & 0x08 != 0 {
                return Err(CellError::BadBoc("exotic cells unsupported".to_string()));
            }
            let ref_count = (d1 & 0x07) as usize;
            if ref_count > MAX_CELL_REFS {
                return Err(CellError::TooManyRefs);
            }
            let data_len = (d2 as usize + 1) / 2;
            let mut data = br.take(data_len)?.to_vec();
            let bit_len = if d2 % 2 == 0 {
                data_len * 8
            } else {
                let last = data.last().copied().unwrap_or(0);
                if last == 0 {
                    return Err(CellError::BadBoc("missing completion tag".to_string()));
                }
                let trailing = last.trailing_zeros() as usize;
                let idx = data.len() - 1;
                data[idx] &= !(1u8 << trailing);
                data_len * 8 - trailing - 1
            };
            let mut refs = Vec::with_capacity(ref_count);
            for _ in 0..ref_count {
                refs.push(br.uint(size)? as usize);
            }
            raw.push((data, bit_len, refs));
        }

        let mut built: Vec<Option<Arc<Cell>>> = vec![None; cell_count];
        for i in (0..cell_count).rev() {
            let (data, bit_len, ref_idx) = &raw[i];
            let mut refs = Vec::with_capacity(ref_idx.len());
            for &j in ref_idx {
                let child = built
                    .get(j)
                    .and_then(|c| c.clone())
                    .filter(|_| j > i)
                    .ok_or_else(|| CellError::BadBoc(format!("bad reference {} -> {}", i, j)))?;
                refs.push(child);
            }
            built[i] = Some(Arc::new(Cell {
                data: data.clone(),
                bit_len: *bit_len,
                refs,
            }));
        }

        built
            .get(root_idx)
            .and_then(|c| c.clone())
            .ok_or_else(|| CellError::BadBoc(format!("root index {} out of range", root_idx)))
    }
}

fn collect_preorder<'a>(cell: &'a Cell, out: &mut Vec<(&'a Cell, Vec<usize>)>) -> usize {
    let idx = out.len();
    out.push((cell, Vec::new()));
    let children: Vec<usize> = cell
        .refs
        .iter()
        .map(|r| collect_preorder(r, out))
        .collect();
    out[idx].1 = children;
    idx
}

fn bytes_needed(value: u64) -> usize {
    let mut n = 1;
    while n < 8 && value >> (8 * n) != 0 {
        n += 1;
    }
    n
}

fn push_be(out: &mut Vec<u8>, value: u64, width: usize) {
    out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CellError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| CellError::BadBoc("unexpected end of data".to_string()))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn byte(&mut self) -> Result<u8, CellError> {
        Ok(self.take(1)?[0])
    }

    fn uint(&mut self, width: usize) -> Result<u64, CellError> {
        Ok(self
            .take(width)?
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }
}

/// Append-only builder for a single cell
#[derive(Debug, Default)]
pub struct CellBuilder {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
}

impl CellBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self, CellError> {
        if self.bit_len + 1 > MAX_CELL_BITS {
            return Err(CellError::Overflow(self.bit_len + 1));
        }
        if self.bit_len % 8 == 0 {
            self.data.push(0);
        }
        if bit {
            let idx = self.bit_len / 8;
            self.data[idx] |= 0x80 >> (self.bit_len % 8);
        }
        self.bit_len += 1;
        Ok(self)
    }

    /// Store `value` as a big-endian unsigned integer of `bits` width
    pub fn store_uint(&mut self, value: u64, bits: usize) -> Result<&mut Self, CellError> {
        if bits > 64 || (bits < 64 && value >> bits != 0) {
            return Err(CellError::ValueTooLarge { value, bits });
        }
        if self.bit_len + bits > MAX_CELL_BITS {
            return Err(CellError::Overflow(self.bit_len + bits));
        }
        for i in (0..bits).rev() {
            self.store_bit((value >> i) & 1 == 1)?;
        }
        Ok(self)
    }

    /// `addr_std$10 anycast:nothing workchain_id:int8 address:bits256`
    pub fn store_address(&mut self, address: &Address) -> Result<&mut Self, CellError> {
        self.store_uint(0b100, 3)?;
        self.store_uint(address.workchain as u8 as u64, 8)?;
        for &b in address.hash.iter() {
            self.store_uint(b as u64, 8)?;
        }
        Ok(self)
    }

    pub fn store_ref(&mut self, cell: Arc<Cell>) -> Result<&mut Self, CellError> {
        if self.refs.len() >= MAX_CELL_REFS {
            return Err(CellError::TooManyRefs);
        }
        self.refs.push(cell);
        Ok(self)
    }

    pub fn end_cell(self) -> Cell {
        Cell {
            data: self.data,
            bit_len: self.bit_len,
            refs: self.refs,
        }
    }
}

/// Sequential reader over a cell's bits
#[derive(Debug, Clone)]
pub struct CellSlice<'a> {
    cell: &'a Cell,
    pos: usize,
}

impl<'a> CellSlice<'a> {
    pub fn remaining_bits(&self) -> usize {
        self.cell.bit_len - self.pos
    }

    pub fn load_bit(&mut self) -> Result<bool, CellError> {
        if self.remaining_bits() == 0 {
            return Err(CellError::Underflow { wanted: 1, left: 0 });
        }
        let byte = self.cell.data[self.pos / 8];
        let bit = byte & (0x80 >> (self.pos % 8)) != 0;
        self.pos += 1;
        Ok(bit)
    }

    pub fn load_uint(&mut self, bits: usize) -> Result<u64, CellError> {
        if bits > 64 {
            return Err(CellError::ValueTooLarge { value: 0, bits });
        }
        if self.remaining_bits() < bits {
            return Err(CellError::Underflow {
                wanted: bits,
                left: self.remaining_bits(),
            });
        }
        let mut value = 0u64;
        for _ in 0..bits {
            value = (value << 1) | self.load_bit()? as u64;
        }
        Ok(value)
    }

    pub fn load_address(&mut self) -> Result<Address, CellError> {
        match self.load_uint(2)? {
            0b10 => {}
            0b00 => return Err(CellError::BadAddress("addr_none".to_string())),
            tag => {
                return Err(CellError::BadAddress(format!(
                    "unsupported address tag {:02b}",
                    tag
                )))
            }
        }
        if self.load_bit()? {
            return Err(CellError::BadAddress("anycast unsupported".to_string()));
        }
        let workchain = self.load_uint(8)? as u8 as i8;
        let mut hash = [0u8; 32];
        for b in hash.iter_mut() {
            *b = self.load_uint(8)? as u8;
        }
        Ok(Address::new(workchain, hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_address() -> Address {
        "EQB_C3Jt6Dvgv5hp2B0Beg39BxMPzh9A0aqooq117iSQn3XE"
            .parse()
            .unwrap()
    }

    #[test]
    fn store_uint_packs_big_endian() {
        let mut b = CellBuilder::new();
        b.store_uint(1002, 32).unwrap().store_uint(0, 8).unwrap();
        let cell = b.end_cell();
        assert_eq!(cell.bit_len(), 40);
        assert_eq!(cell.data(), &[0x00, 0x00, 0x03, 0xea, 0x00]);
    }

    #[test]
    fn store_uint_rejects_oversized_values() {
        let mut b = CellBuilder::new();
        assert_eq!(
            b.store_uint(256, 8).unwrap_err(),
            CellError::ValueTooLarge {
                value: 256,
                bits: 8
            }
        );
        assert!(b.store_uint(u64::MAX, 64).is_ok());
    }

    #[test]
    fn builder_enforces_capacity() {
        let mut b = CellBuilder::new();
        for _ in 0..15 {
            b.store_uint(0, 64).unwrap();
        }
        assert_eq!(b.bit_len(), 960);
        assert!(b.store_uint(0, 63).is_ok());
        assert_eq!(b.store_bit(true).unwrap_err(), CellError::Overflow(1024));
    }

    #[test]
    fn unaligned_cell_boc_uses_completion_tag() {
        let mut b = CellBuilder::new();
        b.store_uint(0b101, 3).unwrap();
        let cell = b.end_cell();
        let boc = cell.to_boc();
        // magic, flags, off, cells, roots, absent, size, root, d1, d2, data
        assert_eq!(
            boc,
            vec![0xb5, 0xee, 0x9c, 0x72, 0x01, 0x01, 0x01, 0x01, 0x00, 0x03, 0x00, 0x00, 0x01, 0xb0]
        );
        let parsed = Cell::from_boc(&boc).unwrap();
        assert_eq!(parsed.bit_len(), 3);
        assert_eq!(parsed.parser().load_uint(3).unwrap(), 0b101);
    }

    #[test]
    fn oversized_cell_count_is_rejected_before_allocation() {
        let boc = [
            0xb5, 0xee, 0x9c, 0x72, // magic
            0x04, 0x01, // 4-byte sizes, 1-byte offsets
            0xff, 0xff, 0xff, 0xff, // cells
            0x00, 0x00, 0x00, 0x01, // roots
            0x00, 0x00, 0x00, 0x00, // absent
            0x00, // total size
            0x00, 0x00, 0x00, 0x00, // root index
        ];
        assert!(matches!(Cell::from_boc(&boc), Err(CellError::BadBoc(_))));
    }

    #[test]
    fn cell_count_larger_than_payload_is_rejected() {
        // claims two cells but carries one
        let boc = [
            0xb5, 0xee, 0x9c, 0x72, 0x01, 0x01, 0x02, 0x01, 0x00, 0x03, 0x00, 0x00, 0x01, 0xb0,
        ];
        assert!(matches!(Cell::from_boc(&boc), Err(CellError::BadBoc(_))));
    }

    #[test]
    fn root_index_outside_cells_is_rejected() {
        let boc = [
            0xb5, 0xee, 0x9c, 0x72, 0x01, 0x01, 0x01, 0x01, 0x00, 0x03, 0x05, 0x00, 0x01, 0xb0,
        ];
        assert!(matches!(Cell::from_boc(&boc), Err(CellError::BadBoc(_))));
    }

    #[test]
    fn address_survives_boc_transport() {
        let addr = sample_address();
        let mut b = CellBuilder::new();
        b.store_address(&addr).unwrap();
        let cell = b.end_cell();
        assert_eq!(cell.bit_len(), 267);

        let parsed = Cell::from_boc(&cell.to_boc()).unwrap();
        assert_eq!(parsed.parser().load_address().unwrap(), addr);
    }

    #[test]
    fn nested_refs_roundtrip_and_hash_is_stable() {
        let mut leaf = CellBuilder::new();
        leaf.store_uint(7, 8).unwrap();
        let leaf = Arc::new(leaf.end_cell());

        let mut root = CellBuilder::new();
        root.store_uint(1, 1).unwrap();
        root.store_ref(leaf.clone()).unwrap();
        let root = root.end_cell();
        assert_eq!(root.depth(), 1);

        let parsed = Cell::from_boc(&root.to_boc()).unwrap();
        assert_eq!(parsed.refs().len(), 1);
        assert_eq!(parsed.refs()[0].parser().load_uint(8).unwrap(), 7);
        assert_eq!(parsed.hash(), root.hash());
        assert_ne!(leaf.hash(), root.hash());
    }

    #[test]
    fn empty_cell_hash_matches_known_value() {
        let cell = CellBuilder::new().end_cell();
        assert_eq!(
            hex::encode(cell.hash()),
            "96a296d224f285c67bee93c30f8a309157f0daa35dc5b87e410b78630a09cfc7"
        );
    }

    #[test]
    fn load_address_rejects_addr_none() {
        let mut b = CellBuilder::new();
        b.store_uint(0, 2).unwrap();
        let cell = b.end_cell();
        assert!(matches!(
            cell.parser().load_address(),
            Err(CellError::BadAddress(_))
        ));
    }

    #[test]
    fn truncated_boc_is_rejected() {
        let mut b = CellBuilder::new();
        b.store_uint(0xdead_beef, 32).unwrap();
        let boc = b.end_cell().to_boc();
        assert!(Cell::from_boc(&boc[..boc.len() - 2]).is_err());
        assert!(Cell::from_boc(&[0, 1, 2, 3]).is_err());
    }
}
