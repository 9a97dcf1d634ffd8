//! Blank-line cleanup.
//!
//! Removed declarations leave holes behind; runs of three or more blank
//! lines collapse to exactly one. Blank lines inside template literals are
//! literal content and are kept byte-for-byte, which is why this pass also
//! consults the protection mask. Idempotent by construction: the collapsed
//! output never contains a run long enough to collapse again.

use crate::scan::Source;
use memchr::memchr_iter;

/// Pass 6: collapse runs of three or more blank lines to one.
pub fn collapse_blank_lines(text: &str) -> String {
    let src = Source::new(text);
    let bytes = text.as_bytes();

    // Line segments, each including its `\n` terminator when present.
    let mut segs: Vec<(usize, usize)> = Vec::new();
    let mut start = 0usize;
    for i in memchr_iter(b'\n', bytes) {
        segs.push((start, i + 1));
        start = i + 1;
    }
    if start < text.len() {
        segs.push((start, text.len()));
    }

    let is_blank = |&(s, e): &(usize, usize)| -> bool {
        (s..e).all(|i| src.is_code(i) && bytes[i].is_ascii_whitespace())
    };

    let mut out = String::with_capacity(text.len());
    let mut i = 0usize;
    while i < segs.len() {
        if is_blank(&segs[i]) {
            let mut j = i;
            while j < segs.len() && is_blank(&segs[j]) {
                j += 1;
            }
            if j - i >= 3 {
                out.push('\n');
            } else {
                for &(s, e) in &segs[i..j] {
                    out.push_str(&text[s..e]);
                }
            }
            i = j;
        } else {
            let (s, e) = segs[i];
            out.push_str(&text[s..e]);
            i += 1;
        }
    }
    out
}
