//! Wildcard byte-pattern search over local buffers.
//!
//! Candidates are located with `memchr` on the first literal byte of the
//! pattern, then checked token by token.

use crate::scan::Signature;

/// Lowest offset `>= start` at which `signature` matches `buffer`.
///
/// Out-of-range input (empty buffer, `start` past the end, signature longer
/// than what remains) is "not found" rather than an error.
pub fn find(buffer: &[u8], signature: &Signature, start: usize) -> Option<usize> {
    let len = signature.len();
    if buffer.is_empty() || start >= buffer.len() || len > buffer.len() - start {
        return None;
    }
    let last = buffer.len() - len;

    // all wildcards: every in-bounds offset matches
    let Some((lead, byte)) = signature
        .tokens()
        .iter()
        .enumerate()
        .find_map(|(idx, token)| token.map(|byte| (idx, byte)))
    else {
        return Some(start);
    };

    let mut pos = start;
    while pos <= last {
        let hit = memchr::memchr(byte, &buffer[pos + lead..=last + lead])?;
        let candidate = pos + hit;
        if signature.matches_at(&buffer[candidate..candidate + len]) {
            return Some(candidate);
        }
        pos = candidate + 1;
    }
    None
}

/// Every offset at which `signature` matches, ascending, overlaps included.
pub fn find_all<'a>(buffer: &'a [u8], signature: &'a Signature) -> Matches<'a> {
    Matches {
        buffer,
        signature,
        next: 0,
    }
}

/// Occurrence of `signature` closest to `around`, at most `radius` bytes away.
///
/// Only the window around `around` is searched. Ties go to the lower offset.
pub fn find_near(
    buffer: &[u8],
    signature: &Signature,
    around: usize,
    radius: usize,
) -> Option<usize> {
    let from = around.saturating_sub(radius);
    if from >= buffer.len() {
        return None;
    }
    let end = around
        .saturating_add(radius)
        .saturating_add(signature.len())
        .min(buffer.len());

    find_all(&buffer[from..end], signature)
        .map(|pos| from + pos)
        .min_by_key(|&pos| pos.abs_diff(around))
}

/// Lazy iterator over matches; clone it to restart from the same point.
#[derive(Debug, Clone)]
pub struct Matches<'a> {
    buffer: &'a [u8],
    signature: &'a Signature,
    next: usize,
}

impl Iterator for Matches<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let found = find(self.buffer, self.signature, self.next)?;
        self.next = found + 1;
        Some(found)
    }
}

impl std::iter::FusedIterator for Matches<'_> {}
