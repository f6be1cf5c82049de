//! Property tests for piece assembly, block claiming and verification.

use std::cmp::Ordering;

use bitster_core::torrent::{Piece, PieceError};
use proptest::prelude::*;
use sha1::{Digest, Sha1};

fn sha1_of(data: &[u8]) -> [u8; 20] {
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&Sha1::digest(data));
    hash
}

/// Piece size, block size and the block offsets in a random arrival order.
fn geometry() -> impl Strategy<Value = (u32, u32, Vec<u32>)> {
    (1u32..4096)
        .prop_flat_map(|size| (Just(size), 1u32..=size))
        .prop_flat_map(|(size, block_size)| {
            let offsets: Vec<u32> = (0..size).step_by(block_size as usize).collect();
            (Just(size), Just(block_size), Just(offsets).prop_shuffle())
        })
}

fn content(size: u32) -> Vec<u8> {
    (0..size).map(|i| (i.wrapping_mul(31) % 251) as u8).collect()
}

#[test]
fn test_three_block_piece_end_to_end() {
    let data: Vec<u8> = (0..100u8).collect();
    let mut piece = Piece::new(0, sha1_of(&data), 40, 100).unwrap();

    assert_eq!(piece.block_count(), 3);
    assert_eq!(piece.size_of(0), Some(40));
    assert_eq!(piece.size_of(1), Some(40));
    assert_eq!(piece.size_of(2), Some(20));

    piece.add_block(80, &data[80..]).unwrap();
    piece.add_block(0, &data[..40]).unwrap();
    assert!(!piece.is_finished());
    assert_eq!(piece.data(), Err(PieceError::NotFinished { piece: 0 }));

    piece.add_block(40, &data[40..80]).unwrap();
    assert!(piece.is_finished());
    assert_eq!(piece.data().unwrap(), data.as_slice());
    assert!(piece.is_valid());
}

proptest! {
    #[test]
    fn prop_blocks_in_any_order_assemble_the_piece((size, block_size, offsets) in geometry()) {
        let data = content(size);
        let mut piece = Piece::new(7, sha1_of(&data), block_size, size).unwrap();

        for (added, &offset) in offsets.iter().enumerate() {
            prop_assert!(!piece.is_finished());
            prop_assert!(piece.data().is_err());

            let end = (offset + block_size).min(size) as usize;
            piece.add_block(offset, &data[offset as usize..end]).unwrap();

            let repeat = piece.add_block(offset, &data[offset as usize..end]);
            let is_already_completed = matches!(repeat, Err(PieceError::AlreadyCompleted { .. }));
            prop_assert!(is_already_completed);
            prop_assert_eq!(piece.is_finished(), added + 1 == offsets.len());
        }

        prop_assert_eq!(piece.data().unwrap(), data.as_slice());
        prop_assert!(piece.is_valid());
    }

    #[test]
    fn prop_any_flipped_byte_fails_verification(
        (size, block_size, _) in geometry(),
        flip in any::<prop::sample::Index>(),
    ) {
        let mut data = content(size);
        let hash = sha1_of(&data);
        let at = flip.index(data.len());
        data[at] ^= 0x01;

        let piece = Piece::from_data(0, hash, block_size, data).unwrap();
        prop_assert!(piece.is_finished());
        prop_assert!(!piece.is_valid());
    }

    #[test]
    fn prop_next_hands_out_each_block_once_in_order(
        (size, block_size, offsets) in geometry(),
        failed in any::<prop::sample::Index>(),
    ) {
        let mut piece = Piece::new(0, [0u8; 20], block_size, size).unwrap();
        let blocks = offsets.len() as u32;

        for expected in 0..blocks {
            prop_assert_eq!(piece.next(), Some(expected));
        }
        prop_assert_eq!(piece.next(), None);
        prop_assert!(piece.is_requested());

        let index = failed.index(offsets.len()) as u32;
        piece.block_fail(index * block_size).unwrap();
        prop_assert!(!piece.is_requested());
        prop_assert_eq!(piece.next(), Some(index));
        prop_assert_eq!(piece.next(), None);
    }

    #[test]
    fn prop_pieces_order_by_availability(a in 0u32..50, b in 0u32..50) {
        let mut first = Piece::new(0, [0u8; 20], 16, 64).unwrap();
        let mut second = Piece::new(1, [0u8; 20], 16, 64).unwrap();
        for _ in 0..a {
            first.inc_available();
        }
        for _ in 0..b {
            second.inc_available();
        }

        prop_assert_eq!(first.cmp(&second), a.cmp(&b));
        prop_assert_eq!(first == second, a == b);
        if a < b {
            prop_assert_eq!(first.partial_cmp(&second), Some(Ordering::Less));
        }
    }
}

#[test]
fn test_rarest_piece_sorts_first() {
    let mut pieces: Vec<Piece> = (0..4)
        .map(|number| Piece::new(number, [0u8; 20], 16, 32).unwrap())
        .collect();
    for _ in 0..3 {
        pieces[0].inc_available();
    }
    pieces[1].inc_available();
    for _ in 0..2 {
        pieces[3].inc_available();
    }

    pieces.sort();
    let order: Vec<u32> = pieces.iter().map(Piece::number).collect();
    assert_eq!(order, vec![2, 1, 3, 0]);
}
