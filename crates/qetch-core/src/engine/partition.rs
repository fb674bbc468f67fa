//! Byte range partitioning for multi-connection fragment downloads

use qetch_types::ByteRange;

/// Split `length` bytes into at most `connections` contiguous ranges.
///
/// Every range except the last has the same stride (`length / count`); the
/// integer-division remainder is folded into the final range. The result
/// covers `[0, length)` exactly once, in ascending order, with
/// `min(connections, length)` entries. A zero `length` yields no ranges.
pub fn partition(length: u64, connections: usize) -> Vec<ByteRange> {
    if length == 0 {
        return Vec::new();
    }

    let count = (connections.max(1) as u64).min(length);
    let stride = length / count;

    (0..count)
        .map(|i| {
            let start = i * stride;
            let end = if i == count - 1 {
                length - 1
            } else {
                (i + 1) * stride - 1
            };
            ByteRange::new(start, end)
        })
        .collect()
}
