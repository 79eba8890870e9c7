//! Piece decomposition: splits a byte-range request on the virtual
//! address space into per-block operations.
use vdisk_util::error::Error;
use vdisk_util::piece::Piece;

/// Splits `[offset, offset+size)` into an ordered, gap-free, overlap-free
/// sequence of per-block pieces.
pub fn gather_pieces(offset: u64, size: u64, block_size: u64) -> Result<Vec<Piece>, Error> {
	if size == 0 {
		return Err(Error::InvalidGeometry("read/write size must be > 0".into()));
	}

	let start_block = offset / block_size;
	let end_block = (offset + size - 1) / block_size;
	let start_block_pos = offset - start_block * block_size;
	let end_block_pos = (offset + size) - end_block * block_size;

	if start_block == end_block {
		return Ok(vec![Piece::new(start_block as usize, start_block_pos, size)]);
	}

	let mut pieces = Vec::with_capacity((end_block - start_block + 1) as usize);
	for block in start_block..=end_block {
		if block == start_block {
			pieces.push(Piece::new(
				block as usize,
				start_block_pos,
				block_size - start_block_pos,
			));
		} else if block == end_block {
			pieces.push(Piece::new(block as usize, 0, end_block_pos));
		} else {
			pieces.push(Piece::new(block as usize, 0, block_size));
		}
	}
	Ok(pieces)
}
