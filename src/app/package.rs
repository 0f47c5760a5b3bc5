// ChapterSleuth - app/package.rs
//
// EPUB 3 packaging of a segmented chapter sequence: one escaped XHTML
// document per chapter, an inline table of contents, and chapter-type
// markers on non-main entries.

use crate::core::model::{Chapter, ChapterType};
use crate::util::error::PackageError;
use epub_builder::{EpubBuilder, EpubContent, EpubVersion, ReferenceType, ZipLibrary};
use std::io::Write;
use std::path::Path;

/// EPUB metadata for one work.
#[derive(Debug, Clone)]
pub struct PackageOptions {
    pub title: String,
    pub author: String,
}

/// Assemble an EPUB into `writer`. `path` is used for error context only.
pub fn build_epub<W: Write>(
    chapters: &[Chapter],
    options: &PackageOptions,
    writer: &mut W,
    path: &Path,
) -> Result<(), PackageError> {
    if chapters.is_empty() {
        return Err(PackageError::NoChapters {
            path: path.to_path_buf(),
        });
    }

    let epub_err = |e: &dyn std::fmt::Display| PackageError::Epub {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let zip = ZipLibrary::new().map_err(|e| epub_err(&e))?;
    let mut builder = EpubBuilder::new(zip).map_err(|e| epub_err(&e))?;
    builder.epub_version(EpubVersion::V30);
    builder
        .metadata("title", &options.title)
        .map_err(|e| epub_err(&e))?;
    builder
        .metadata("author", &options.author)
        .map_err(|e| epub_err(&e))?;
    builder
        .metadata("lang", "ko")
        .map_err(|e| epub_err(&e))?;
    builder.inline_toc();

    for chapter in chapters {
        let xhtml = render_xhtml(chapter);
        let file_name = format!("chapter_{:04}.xhtml", chapter.cid);
        builder
            .add_content(
                EpubContent::new(file_name, xhtml.as_bytes())
                    .title(toc_title(chapter))
                    .reftype(ReferenceType::Text),
            )
            .map_err(|e| epub_err(&e))?;
    }

    builder.generate(writer).map_err(|e| epub_err(&e))?;
    Ok(())
}

/// Assemble an EPUB at `out_path`.
pub fn write_epub(
    chapters: &[Chapter],
    options: &PackageOptions,
    out_path: &Path,
) -> Result<(), PackageError> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PackageError::Io {
            path: out_path.to_path_buf(),
            source: e,
        })?;
    }
    let mut file = std::fs::File::create(out_path).map_err(|e| PackageError::Io {
        path: out_path.to_path_buf(),
        source: e,
    })?;
    build_epub(chapters, options, &mut file, out_path)?;
    tracing::info!(path = %out_path.display(), chapters = chapters.len(), "EPUB written");
    Ok(())
}

/// TOC label: the title (falling back to a chapter number), the subtitle,
/// and a type marker for non-main chapters.
fn toc_title(chapter: &Chapter) -> String {
    let mut label = if chapter.title.is_empty() {
        format!("{}", chapter.cid + 1)
    } else {
        chapter.title.clone()
    };
    if !chapter.subtitle.is_empty() {
        label.push_str(" | ");
        label.push_str(&chapter.subtitle);
    }
    if chapter.chapter_type != ChapterType::Main {
        label.push_str(&format!(" [{}]", chapter.chapter_type.label()));
    }
    label
}

fn render_xhtml(chapter: &Chapter) -> String {
    let mut out = String::with_capacity(chapter.body.len() + 512);
    out.push_str(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\">\n<head><title>",
    );
    out.push_str(&html_escape::encode_text(&toc_title(chapter)));
    out.push_str("</title></head>\n<body>\n<h2>");
    out.push_str(&html_escape::encode_text(&toc_title(chapter)));
    out.push_str("</h2>\n");

    // Blank-line separated paragraphs, single newlines become <br/>.
    for paragraph in chapter.body.split("\n\n") {
        let trimmed = paragraph.trim();
        if trimmed.is_empty() {
            continue;
        }
        out.push_str("<p>");
        let mut first = true;
        for line in trimmed.lines() {
            if !first {
                out.push_str("<br />");
            }
            out.push_str(&html_escape::encode_text(line));
            first = false;
        }
        out.push_str("</p>\n");
    }
    out.push_str("</body>\n</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn chapter(cid: u32, title: &str, body: &str) -> Chapter {
        Chapter {
            cid,
            title: title.to_string(),
            subtitle: String::new(),
            body: body.to_string(),
            length: body.chars().count(),
            chapter_type: ChapterType::Main,
            start_offset: 0,
        }
    }

    #[test]
    fn test_xhtml_escapes_markup() {
        let ch = chapter(0, "제1화 <시작>", "본문 & 그리고 <태그>.\n\n다음 단락.");
        let xhtml = render_xhtml(&ch);
        assert!(xhtml.contains("제1화 &lt;시작&gt;"));
        assert!(xhtml.contains("본문 &amp; 그리고 &lt;태그&gt;."));
        assert!(!xhtml.contains("<태그>"));
        assert_eq!(xhtml.matches("<p>").count(), 2);
    }

    #[test]
    fn test_toc_marks_side_stories() {
        let mut ch = chapter(3, "외전 1", "본문");
        ch.chapter_type = ChapterType::Side;
        assert_eq!(toc_title(&ch), "외전 1 [side]");
    }

    #[test]
    fn test_toc_untitled_chapter_numbered() {
        let ch = chapter(0, "", "본문");
        assert_eq!(toc_title(&ch), "1");
    }

    #[test]
    fn test_build_epub_produces_zip() {
        let chapters = vec![
            chapter(0, "제1화", "첫 장 본문."),
            chapter(1, "제2화", "둘째 장 본문."),
        ];
        let options = PackageOptions {
            title: "테스트 소설".to_string(),
            author: "unknown".to_string(),
        };
        let mut buf = Vec::new();
        build_epub(&chapters, &options, &mut buf, &PathBuf::from("t.epub")).unwrap();
        // An EPUB is a zip container.
        assert!(buf.starts_with(b"PK"));
    }

    #[test]
    fn test_empty_chapters_rejected() {
        let options = PackageOptions {
            title: "t".to_string(),
            author: "a".to_string(),
        };
        let mut buf = Vec::new();
        let result = build_epub(&[], &options, &mut buf, &PathBuf::from("t.epub"));
        assert!(matches!(result, Err(PackageError::NoChapters { .. })));
    }
}
