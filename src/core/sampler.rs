// ChapterSleuth - core/sampler.rs
//
// Bounded, line-aligned sample extraction from the decoded text.
// Every window starts and ends on a line boundary so samples never cut a
// code point or a title line in half.

use crate::core::model::SampleWindow;
use crate::core::text::NovelText;
use crate::util::constants;

/// Head, middle, and tail windows of a file.
#[derive(Debug)]
pub struct TriSample {
    pub head: SampleWindow,
    pub middle: SampleWindow,
    pub tail: SampleWindow,
}

/// Extract head/middle/tail windows, each at most `window_bytes` long.
pub fn head_middle_tail(text: &NovelText, window_bytes: usize) -> TriSample {
    let len = text.len_bytes();
    let window = window_bytes.max(1);

    let head = window_at(text, 0, window);

    let mid_point = len / 2;
    let middle = window_at(text, mid_point.saturating_sub(window / 2), window);

    // The tail must end at EOF, so its start snaps forward (a backward
    // snap would grow the window past the requested size).
    let tail_start = snap_up(text, len.saturating_sub(window));
    let tail = SampleWindow {
        start_byte: tail_start,
        end_byte: len,
        text: text.text()[tail_start..].to_string(),
    };

    TriSample { head, middle, tail }
}

/// Smallest line-start offset at or above `offset`.
fn snap_up(text: &NovelText, offset: usize) -> usize {
    let len = text.len_bytes();
    if offset == 0 || offset >= len {
        return offset.min(len);
    }
    let n = text.line_at_offset(offset);
    let start = text.line_start(n);
    if start >= offset {
        start
    } else if n + 1 < text.line_count() {
        text.line_start(n + 1)
    } else {
        len
    }
}

/// Extract up to `radius` bytes on each side of `byte_offset`, line-aligned.
pub fn extract_around(text: &NovelText, byte_offset: usize, radius: usize) -> SampleWindow {
    let start = byte_offset.saturating_sub(radius);
    window_at(text, start, radius.saturating_mul(2))
}

/// Extract `k` windows at equal byte strides across the whole file.
///
/// Windows are deduplicated by start offset, so short files yield fewer
/// than `k` windows rather than repeats.
pub fn uniform_samples(text: &NovelText, k: usize, window_bytes: usize) -> Vec<SampleWindow> {
    let len = text.len_bytes();
    if len == 0 || k == 0 {
        return Vec::new();
    }
    let stride = (len / k).max(1);

    let mut samples: Vec<SampleWindow> = Vec::with_capacity(k);
    for i in 0..k {
        let window = window_at(text, i * stride, window_bytes);
        if window.text.is_empty() {
            continue;
        }
        if samples
            .last()
            .is_some_and(|prev: &SampleWindow| prev.start_byte == window.start_byte)
        {
            continue;
        }
        samples.push(window);
    }
    samples
}

/// Default-size head/middle/tail, used by pattern acquisition.
pub fn default_tri_sample(text: &NovelText) -> TriSample {
    head_middle_tail(text, constants::DEFAULT_SAMPLE_WINDOW_BYTES)
}

fn window_at(text: &NovelText, start: usize, window_bytes: usize) -> SampleWindow {
    let start = text.snap_to_line_start(start);
    let end_raw = start.saturating_add(window_bytes).min(text.len_bytes());
    let end = if end_raw >= text.len_bytes() {
        text.len_bytes()
    } else {
        text.snap_to_line_start(end_raw)
    };
    let end = end.max(start);
    SampleWindow {
        start_byte: start,
        end_byte: end,
        text: text.text()[start..end].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(lines: usize) -> NovelText {
        let mut s = String::new();
        for i in 0..lines {
            s.push_str(&format!("line number {i} with some padding text\n"));
        }
        NovelText::new(s, "UTF-8", 1.0)
    }

    #[test]
    fn test_head_middle_tail_line_aligned() {
        let text = fixture(1000);
        let tri = head_middle_tail(&text, 512);

        for w in [&tri.head, &tri.middle, &tri.tail] {
            assert!(w.end_byte - w.start_byte <= 512 + 64);
            assert!(w.text.starts_with("line number"));
        }
        assert_eq!(tri.head.start_byte, 0);
        assert_eq!(tri.tail.end_byte, text.len_bytes());
    }

    #[test]
    fn test_small_file_windows_clamp() {
        let text = fixture(2);
        let tri = head_middle_tail(&text, 64 * 1024);
        assert_eq!(tri.head.text, text.text());
        assert_eq!(tri.tail.text, text.text());
    }

    #[test]
    fn test_extract_around() {
        let text = fixture(100);
        let mid = text.len_bytes() / 2;
        let w = extract_around(&text, mid, 100);
        assert!(w.start_byte < mid);
        assert!(w.end_byte > w.start_byte);
        assert!(w.text.starts_with("line number"));
    }

    #[test]
    fn test_uniform_samples_cover_file() {
        let text = fixture(500);
        let samples = uniform_samples(&text, 10, 256);
        assert!(!samples.is_empty());
        assert!(samples.len() <= 10);
        for pair in samples.windows(2) {
            assert!(pair[0].start_byte < pair[1].start_byte);
        }
        // First sample starts at the head of the file.
        assert_eq!(samples[0].start_byte, 0);
    }

    #[test]
    fn test_uniform_samples_short_file_dedup() {
        let text = fixture(3);
        let samples = uniform_samples(&text, 30, 4096);
        assert_eq!(samples.len(), 1);
    }
}
