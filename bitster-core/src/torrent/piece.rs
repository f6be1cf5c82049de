//! Piece assembly and verification.
//!
//! A [`Piece`] owns one chunk of the torrent, tracks which of its blocks have
//! arrived and which have been handed out as requests, and checks the
//! assembled bytes against the SHA-1 hash from the metainfo. Pieces order by
//! availability so a scheduler can pick the rarest first.

use std::cmp::Ordering;

use sha1::{Digest, Sha1};

/// Standard 16 KiB BitTorrent block size.
pub const DEFAULT_BLOCK_SIZE: u32 = 16_384;

/// Largest block we will serve to a peer in a single request.
pub const MAX_BLOCK_REQUEST: u32 = 128 * 1024;

/// Errors raised by piece assembly and block serving.
///
/// Everything except [`PieceError::NotFinished`] is an invalid argument
/// supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PieceError {
    #[error("Invalid piece geometry: size={size}, block_size={block_size}")]
    InvalidGeometry { size: u64, block_size: u32 },

    #[error("Offset {offset} is not aligned to {block_size}-byte blocks")]
    Misaligned { offset: u32, block_size: u32 },

    #[error("Range {offset}+{length} exceeds piece size {size}")]
    OutOfBounds { offset: u32, length: u64, size: u32 },

    #[error("Block {block} of piece {piece} was already downloaded")]
    AlreadyCompleted { piece: u32, block: u32 },

    #[error("Block {block} must be {expected} bytes, got {actual}")]
    LengthMismatch {
        block: u32,
        expected: u32,
        actual: usize,
    },

    #[error("Requested block length must be non-zero")]
    EmptyRequest,

    #[error("Requested {length} bytes exceeds the {max}-byte serving limit")]
    RequestTooLarge { length: u32, max: u32 },

    #[error("Piece {piece} is not finished")]
    NotFinished { piece: u32 },
}

impl PieceError {
    /// True for errors caused by malformed caller input.
    pub fn is_invalid_argument(&self) -> bool {
        !matches!(self, PieceError::NotFinished { .. })
    }
}

/// One hash-verified chunk of a torrent, assembled from blocks.
#[derive(Debug, Clone)]
pub struct Piece {
    number: u32,
    size: u32,
    block_size: u32,
    data: Vec<u8>,
    expected_hash: [u8; 20],
    completed: Vec<bool>,
    requested: Vec<bool>,
    availability: u32,
}

impl Piece {
    /// Creates an empty piece waiting for `size` bytes of block data.
    ///
    /// # Errors
    ///
    /// - `PieceError::InvalidGeometry` - If `size` or `block_size` is zero, or
    ///   `block_size` exceeds `size`
    pub fn new(
        number: u32,
        expected_hash: [u8; 20],
        block_size: u32,
        size: u32,
    ) -> Result<Self, PieceError> {
        let blocks = block_count(u64::from(size), block_size)?;
        Ok(Self {
            number,
            size,
            block_size,
            data: vec![0u8; size as usize],
            expected_hash,
            completed: vec![false; blocks],
            requested: vec![false; blocks],
            availability: 0,
        })
    }

    /// Creates a piece from data we already have, e.g. for seeding.
    ///
    /// Every block is marked both completed and requested, so the piece never
    /// hands out work through [`Piece::next`].
    ///
    /// # Errors
    ///
    /// - `PieceError::InvalidGeometry` - If `data` is empty or longer than
    ///   `u32::MAX`, or `block_size` is zero or exceeds the data length
    pub fn from_data(
        number: u32,
        expected_hash: [u8; 20],
        block_size: u32,
        data: Vec<u8>,
    ) -> Result<Self, PieceError> {
        let blocks = block_count(data.len() as u64, block_size)?;
        let size = u32::try_from(data.len()).map_err(|_| PieceError::InvalidGeometry {
            size: data.len() as u64,
            block_size,
        })?;

        Ok(Self {
            number,
            size,
            block_size,
            data,
            expected_hash,
            completed: vec![true; blocks],
            requested: vec![true; blocks],
            availability: 0,
        })
    }

    /// Copies a received block into the piece.
    ///
    /// # Errors
    ///
    /// - `PieceError::Misaligned` - If `offset` is not a multiple of the block size
    /// - `PieceError::OutOfBounds` - If the block runs past the end of the piece
    /// - `PieceError::AlreadyCompleted` - If this block was already added
    /// - `PieceError::LengthMismatch` - If the block is not exactly
    ///   [`Piece::size_of`] bytes long
    pub fn add_block(&mut self, offset: u32, block: &[u8]) -> Result<(), PieceError> {
        if offset % self.block_size != 0 {
            tracing::error!(
                "piece {}: block offset {} not aligned to {}",
                self.number,
                offset,
                self.block_size
            );
            return Err(PieceError::Misaligned {
                offset,
                block_size: self.block_size,
            });
        }

        if offset >= self.size || u64::from(offset) + block.len() as u64 > u64::from(self.size) {
            tracing::error!(
                "piece {}: block {}+{} overflows {} bytes",
                self.number,
                offset,
                block.len(),
                self.size
            );
            return Err(PieceError::OutOfBounds {
                offset,
                length: block.len() as u64,
                size: self.size,
            });
        }

        let index = offset / self.block_size;
        if self.completed[index as usize] {
            tracing::error!("piece {}: block {} already downloaded", self.number, index);
            return Err(PieceError::AlreadyCompleted {
                piece: self.number,
                block: index,
            });
        }

        let expected = self.block_len(index);
        if block.len() != expected as usize {
            tracing::error!(
                "piece {}: block {} is {} bytes, expected {}",
                self.number,
                index,
                block.len(),
                expected
            );
            return Err(PieceError::LengthMismatch {
                block: index,
                expected,
                actual: block.len(),
            });
        }

        let start = offset as usize;
        self.data[start..start + block.len()].copy_from_slice(block);
        self.completed[index as usize] = true;
        Ok(())
    }

    /// Returns a copy of `length` bytes starting at `offset`, for serving peers.
    ///
    /// Works on unfinished pieces too; callers decide whether serving partial
    /// data is acceptable.
    ///
    /// # Errors
    ///
    /// - `PieceError::OutOfBounds` - If `offset` or the end of the range is past the piece
    /// - `PieceError::EmptyRequest` - If `length` is zero
    /// - `PieceError::RequestTooLarge` - If `length` exceeds [`MAX_BLOCK_REQUEST`]
    pub fn block(&self, offset: u32, length: u32) -> Result<Vec<u8>, PieceError> {
        if offset >= self.size {
            return Err(PieceError::OutOfBounds {
                offset,
                length: u64::from(length),
                size: self.size,
            });
        }
        if length == 0 {
            return Err(PieceError::EmptyRequest);
        }
        if u64::from(offset) + u64::from(length) > u64::from(self.size) {
            return Err(PieceError::OutOfBounds {
                offset,
                length: u64::from(length),
                size: self.size,
            });
        }
        if length > MAX_BLOCK_REQUEST {
            return Err(PieceError::RequestTooLarge {
                length,
                max: MAX_BLOCK_REQUEST,
            });
        }

        let start = offset as usize;
        Ok(self.data[start..start + length as usize].to_vec())
    }

    /// True once every block has been added.
    pub fn is_finished(&self) -> bool {
        self.completed.iter().all(|&done| done)
    }

    /// True once every block has been handed out as a request.
    pub fn is_requested(&self) -> bool {
        self.requested.iter().all(|&claimed| claimed)
    }

    /// Returns the assembled piece.
    ///
    /// # Errors
    ///
    /// - `PieceError::NotFinished` - If any block is still missing
    pub fn data(&self) -> Result<&[u8], PieceError> {
        if !self.is_finished() {
            return Err(PieceError::NotFinished { piece: self.number });
        }
        Ok(&self.data)
    }

    /// Claims the lowest-indexed block that has not been requested yet.
    ///
    /// Returns `None` once every block is claimed. Claiming is a scan followed
    /// by a write, so concurrent schedulers must share a piece behind a lock.
    pub fn next(&mut self) -> Option<u32> {
        let index = self.requested.iter().position(|&claimed| !claimed)?;
        self.requested[index] = true;
        Some(index as u32)
    }

    /// Releases the claim on the block at `offset` so it can be requested again.
    ///
    /// Called when the peer holding the request disconnects or rejects it.
    /// A block that has already arrived stays claimed.
    ///
    /// # Errors
    ///
    /// - `PieceError::Misaligned` - If `offset` is not a multiple of the block size
    /// - `PieceError::OutOfBounds` - If `offset` is past the end of the piece
    pub fn block_fail(&mut self, offset: u32) -> Result<(), PieceError> {
        if offset % self.block_size != 0 {
            return Err(PieceError::Misaligned {
                offset,
                block_size: self.block_size,
            });
        }
        if offset >= self.size {
            return Err(PieceError::OutOfBounds {
                offset,
                length: 0,
                size: self.size,
            });
        }

        let index = (offset / self.block_size) as usize;
        if !self.completed[index] {
            self.requested[index] = false;
        }
        Ok(())
    }

    /// Exact length of block `index`; the final block may be shorter.
    pub fn size_of(&self, index: u32) -> Option<u32> {
        if index as usize >= self.completed.len() {
            return None;
        }
        Some(self.block_len(index))
    }

    /// Recomputes the SHA-1 of the buffer and compares it to the expected hash.
    ///
    /// Only meaningful once the piece is finished.
    pub fn is_valid(&self) -> bool {
        let mut hasher = Sha1::new();
        hasher.update(&self.data);
        let computed_hash = hasher.finalize();
        computed_hash.as_slice() == self.expected_hash.as_slice()
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn block_count(&self) -> usize {
        self.completed.len()
    }

    /// Number of known peers holding this piece.
    pub fn availability(&self) -> u32 {
        self.availability
    }

    pub fn inc_available(&mut self) {
        self.availability = self.availability.saturating_add(1);
    }

    pub fn dec_available(&mut self) {
        self.availability = self.availability.saturating_sub(1);
    }

    fn block_len(&self, index: u32) -> u32 {
        let start = u64::from(index) * u64::from(self.block_size);
        (u64::from(self.size) - start).min(u64::from(self.block_size)) as u32
    }
}

fn block_count(size: u64, block_size: u32) -> Result<usize, PieceError> {
    if size == 0 || block_size == 0 || u64::from(block_size) > size || size > u64::from(u32::MAX) {
        return Err(PieceError::InvalidGeometry { size, block_size });
    }
    Ok(size.div_ceil(u64::from(block_size)) as usize)
}

// Pieces compare by availability only, so sorting yields rarest first.
impl PartialEq for Piece {
    fn eq(&self, other: &Self) -> bool {
        self.availability == other.availability
    }
}

impl Eq for Piece {}

impl PartialOrd for Piece {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Piece {
    fn cmp(&self, other: &Self) -> Ordering {
        self.availability.cmp(&other.availability)
    }
}
