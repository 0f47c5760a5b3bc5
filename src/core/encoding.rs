// ChapterSleuth - core/encoding.rs
//
// Byte-level encoding detection and one-shot decoding.
//
// Detection order: BOM, strict UTF-8 validation, NUL-distribution check for
// BOM-less UTF-16, then chardetng over the sniff window clamped to the
// encodings that actually occur in the corpus (UTF-8, CP949/EUC-KR,
// GB18030, Shift_JIS). Detection never fails; decoding is lossy and only
// reports EncodingUndetermined when the decoded text is mostly replacement
// characters.

use crate::core::text::NovelText;
use crate::util::constants;
use crate::util::error::EncodingError;
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, EUC_KR, GB18030, SHIFT_JIS, UTF_16BE, UTF_16LE, UTF_8};
use std::path::Path;

/// Best encoding candidate with a heuristic confidence in [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct EncodingGuess {
    pub encoding: &'static Encoding,
    pub confidence: f32,
}

/// Detect the encoding of `bytes`, reading at most the first
/// `ENCODING_SNIFF_BYTES`.
pub fn detect(bytes: &[u8]) -> EncodingGuess {
    let sniff = &bytes[..bytes.len().min(constants::ENCODING_SNIFF_BYTES)];

    if let Some((encoding, _bom_len)) = Encoding::for_bom(sniff) {
        return EncodingGuess {
            encoding,
            confidence: 1.0,
        };
    }

    // BOM-less UTF-16 shows up as a high ratio of NUL bytes; their parity
    // tells LE from BE (ASCII code units put the zero in the high byte).
    // Checked before the UTF-8 fast path: NUL bytes are valid UTF-8, so
    // ASCII-heavy UTF-16 would otherwise pass strict validation.
    if let Some(guess) = sniff_utf16(sniff) {
        return guess;
    }

    // Strict UTF-8 fast path: covers the vast majority of the corpus.
    if std::str::from_utf8(sniff).is_ok() {
        return EncodingGuess {
            encoding: UTF_8,
            confidence: 0.99,
        };
    }

    let mut detector = EncodingDetector::new();
    detector.feed(sniff, true);
    let guessed = detector.guess(None, true);

    let candidate = if is_allowed(guessed) { guessed } else { UTF_8 };
    let ratio = replacement_ratio(sniff, candidate);
    let confidence = if is_allowed(guessed) {
        (1.0 - ratio * 10.0).clamp(0.0, 0.95)
    } else {
        // chardetng picked something outside the corpus set; low trust.
        0.5
    };

    if confidence < constants::ENCODING_MIN_CONFIDENCE {
        // Ambiguous: prefer UTF-8, then CP949, whichever decodes cleaner.
        let r_utf8 = replacement_ratio(sniff, UTF_8);
        let r_euckr = replacement_ratio(sniff, EUC_KR);
        let (encoding, ratio) = if r_utf8 <= r_euckr {
            (UTF_8, r_utf8)
        } else {
            (EUC_KR, r_euckr)
        };
        return EncodingGuess {
            encoding,
            confidence: (1.0 - ratio * 10.0).clamp(0.0, confidence),
        };
    }

    EncodingGuess {
        encoding: candidate,
        confidence,
    }
}

/// Decode a whole file into a `NovelText` using the detected encoding.
///
/// Decoding is lossy (invalid sequences become U+FFFD); the operation only
/// fails when the file is empty or the decoded text is unusable.
pub fn decode(bytes: &[u8], path: &Path) -> Result<NovelText, EncodingError> {
    if bytes.is_empty() {
        return Err(EncodingError::EmptyFile {
            path: path.to_path_buf(),
        });
    }

    let guess = detect(bytes);
    let (decoded, actual, _had_errors) = guess.encoding.decode(bytes);

    let total = decoded.chars().count().max(1);
    let replaced = decoded.chars().filter(|&c| c == '\u{FFFD}').count();
    let ratio = replaced as f32 / total as f32;
    if ratio > constants::MAX_REPLACEMENT_RATIO {
        return Err(EncodingError::Undetermined {
            path: path.to_path_buf(),
            encoding: actual.name(),
            replacement_ratio: ratio,
        });
    }

    tracing::debug!(
        path = %path.display(),
        encoding = actual.name(),
        confidence = guess.confidence,
        replacement_ratio = ratio,
        "File decoded"
    );

    Ok(NovelText::new(
        decoded.into_owned(),
        actual.name(),
        guess.confidence,
    ))
}

fn is_allowed(encoding: &'static Encoding) -> bool {
    encoding == UTF_8 || encoding == EUC_KR || encoding == GB18030 || encoding == SHIFT_JIS
}

/// Heuristic UTF-16 sniff for BOM-less files.
fn sniff_utf16(sniff: &[u8]) -> Option<EncodingGuess> {
    if sniff.len() < 4 {
        return None;
    }
    let nul_total = sniff.iter().filter(|&&b| b == 0).count();
    if (nul_total as f32) < sniff.len() as f32 * 0.2 {
        return None;
    }
    let nul_odd = sniff
        .iter()
        .enumerate()
        .filter(|(i, &b)| i % 2 == 1 && b == 0)
        .count();
    let encoding = if nul_odd * 2 > nul_total {
        UTF_16LE
    } else {
        UTF_16BE
    };
    Some(EncodingGuess {
        encoding,
        confidence: 0.8,
    })
}

/// Fraction of replacement characters produced by a trial decode.
fn replacement_ratio(bytes: &[u8], encoding: &'static Encoding) -> f32 {
    let (decoded, _had_errors) = encoding.decode_without_bom_handling(bytes);
    let total = decoded.chars().count().max(1);
    let replaced = decoded.chars().filter(|&c| c == '\u{FFFD}').count();
    replaced as f32 / total as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_plain_utf8() {
        let guess = detect("제1화 만남\n본문이 이어진다.\n".as_bytes());
        assert_eq!(guess.encoding, UTF_8);
        assert!(guess.confidence > 0.9);
    }

    #[test]
    fn test_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("제1화\n".as_bytes());
        let guess = detect(&bytes);
        assert_eq!(guess.encoding, UTF_8);
        assert_eq!(guess.confidence, 1.0);

        // The BOM must not survive into the decoded text.
        let text = decode(&bytes, &PathBuf::from("a.txt")).unwrap();
        assert!(text.text().starts_with("제1화"));
    }

    #[test]
    fn test_utf16le_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "chapter one".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let guess = detect(&bytes);
        assert_eq!(guess.encoding, UTF_16LE);
    }

    #[test]
    fn test_utf16le_without_bom() {
        let mut bytes = Vec::new();
        for unit in "chapter one of the story".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let guess = detect(&bytes);
        assert_eq!(guess.encoding, UTF_16LE);
    }

    #[test]
    fn test_euc_kr() {
        let (encoded, _, _) = EUC_KR.encode("제1화 만남\n주인공은 문을 열었다.\n");
        let text = decode(&encoded, &PathBuf::from("a.txt")).unwrap();
        assert_eq!(text.encoding(), "EUC-KR");
        assert!(text.text().contains("제1화 만남"));
    }

    #[test]
    fn test_empty_file() {
        let err = decode(&[], &PathBuf::from("a.txt")).unwrap_err();
        assert!(matches!(err, EncodingError::EmptyFile { .. }));
    }
}
