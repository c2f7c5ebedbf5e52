//! Minimal PDF 1.4 writer for text-flow documents.
//!
//! Input is line markup produced by the text templates:
//!
//! * `# text` document title
//! * `## text` section heading
//! * `---` horizontal rule
//! * `[[page]]` page break
//! * blank line: paragraph gap
//! * `\text` literal body paragraph (used for free text that could
//!   otherwise look like markup)
//! * anything else: a body paragraph, wrapped to the content width
//!
//! Only the standard Helvetica fonts are used, so nothing is embedded.

use std::fmt::Write as _;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const CONTENT_TOP: f32 = PAGE_HEIGHT - MARGIN - 10.0;
const CONTENT_BOTTOM: f32 = MARGIN + 20.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;

const TITLE_SIZE: f32 = 18.0;
const HEADING_SIZE: f32 = 13.0;
const BODY_SIZE: f32 = 10.0;
const FOOTER_SIZE: f32 = 8.0;
const LEADING: f32 = 1.4;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }

    /// Average glyph width as a fraction of the font size. Helvetica
    /// averages a little over half an em for mixed-case text.
    fn average_width(&self) -> f32 {
        match self {
            Font::Regular => 0.52,
            Font::Bold => 0.57,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Op {
    Text {
        font: Font,
        size: f32,
        x: f32,
        y: f32,
        text: String,
    },
    Rule {
        y: f32,
    },
}

/// Header and footer decoration applied to every page.
#[derive(Debug, Clone, Default)]
pub struct PageDecor {
    /// Shown in the footer next to the page number
    pub reference: String,
    /// Prints a DRAFT banner in the header
    pub draft: bool,
    /// `/Title` in the document information dictionary
    pub title: String,
}

struct Layout {
    pages: Vec<Vec<Op>>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: CONTENT_TOP,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = CONTENT_TOP;
    }

    fn current(&mut self) -> &mut Vec<Op> {
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn ensure_room(&mut self, height: f32) {
        let page_is_empty = self.pages.last().map_or(true, |p| p.is_empty());
        if self.y - height < CONTENT_BOTTOM && !page_is_empty {
            self.new_page();
        }
    }

    fn paragraph(&mut self, text: &str, font: Font, size: f32, space_before: f32) {
        let line_height = size * LEADING;
        let lines = wrap(text, font, size, CONTENT_WIDTH);
        if self.y < CONTENT_TOP {
            self.y -= space_before;
        }
        for line in lines {
            self.ensure_room(line_height);
            self.y -= line_height;
            let y = self.y;
            self.current().push(Op::Text {
                font,
                size,
                x: MARGIN,
                y,
                text: line,
            });
        }
    }

    fn gap(&mut self) {
        self.y -= BODY_SIZE * 0.6;
    }

    fn rule(&mut self) {
        self.ensure_room(BODY_SIZE);
        self.y -= BODY_SIZE * 0.8;
        let y = self.y;
        self.current().push(Op::Rule { y });
    }
}

/// Greedy word wrap using average glyph widths. Words longer than a line
/// are split.
fn wrap(text: &str, font: Font, size: f32, width: f32) -> Vec<String> {
    let max_chars = ((width / (size * font.average_width())).floor() as usize).max(1);
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > max_chars {
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            let head: String = word.chars().take(max_chars).collect();
            word = word.chars().skip(max_chars).collect();
            lines.push(head);
        }
        let needed = line.chars().count() + usize::from(!line.is_empty()) + word.chars().count();
        if needed > max_chars && !line.is_empty() {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&word);
    }
    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

/// Maps text to WinAnsi bytes inside a PDF string literal. Characters with
/// no WinAnsi code become `?`.
fn encode_text(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        let byte = match c {
            '(' | ')' | '\\' => {
                out.push(b'\\');
                c as u8
            }
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2026}' => 0x85,
            '\u{20AC}' => 0x80,
            c if (' '..='~').contains(&c) => c as u8,
            c if ('\u{A0}'..='\u{FF}').contains(&c) => c as u32 as u8,
            _ => b'?',
        };
        out.push(byte);
    }
    out
}

fn text_op(out: &mut Vec<u8>, font: Font, size: f32, x: f32, y: f32, text: &str) {
    let mut head = String::new();
    let _ = write!(head, "BT /{} {} Tf {:.2} {:.2} Td (", font.resource(), size, x, y);
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(&encode_text(text));
    out.extend_from_slice(b") Tj ET\n");
}

fn content_stream(ops: &[Op], page: usize, page_count: usize, decor: &PageDecor) -> Vec<u8> {
    let mut out = Vec::new();
    if decor.draft {
        text_op(
            &mut out,
            Font::Bold,
            FOOTER_SIZE + 2.0,
            MARGIN,
            PAGE_HEIGHT - MARGIN + 15.0,
            "DRAFT - not for distribution",
        );
    }
    for op in ops {
        match op {
            Op::Text {
                font,
                size,
                x,
                y,
                text,
            } => text_op(&mut out, *font, *size, *x, *y, text),
            Op::Rule { y } => {
                let line = format!(
                    "0.5 w {:.2} {:.2} m {:.2} {:.2} l S\n",
                    MARGIN,
                    y,
                    PAGE_WIDTH - MARGIN,
                    y
                );
                out.extend_from_slice(line.as_bytes());
            }
        }
    }
    let footer = if decor.reference.is_empty() {
        format!("Page {} of {}", page, page_count)
    } else {
        format!("{}, Page {} of {}", decor.reference, page, page_count)
    };
    text_op(&mut out, Font::Regular, FOOTER_SIZE, MARGIN, MARGIN - 20.0, &footer);
    out
}

fn lay_out(markup: &str) -> Vec<Vec<Op>> {
    let mut layout = Layout::new();
    for raw in markup.lines() {
        let line = raw.trim_end();
        if let Some(literal) = line.trim_start().strip_prefix('\\') {
            if !literal.trim().is_empty() {
                layout.paragraph(literal.trim(), Font::Regular, BODY_SIZE, 0.0);
            }
        } else if let Some(title) = line.strip_prefix("# ") {
            layout.paragraph(title.trim(), Font::Bold, TITLE_SIZE, TITLE_SIZE * 0.5);
        } else if let Some(heading) = line.strip_prefix("## ") {
            // keep a heading together with at least one body line
            layout.ensure_room(HEADING_SIZE * LEADING * 2.0 + BODY_SIZE * LEADING);
            layout.paragraph(heading.trim(), Font::Bold, HEADING_SIZE, HEADING_SIZE * 0.8);
        } else if line.trim() == "---" {
            layout.rule();
        } else if line.trim() == "[[page]]" {
            if layout.pages.last().map_or(false, |p| !p.is_empty()) {
                layout.new_page();
            }
        } else if line.trim().is_empty() {
            layout.gap();
        } else {
            layout.paragraph(line.trim(), Font::Regular, BODY_SIZE, 0.0);
        }
    }
    layout.pages
}

/// Renders line markup into a complete PDF file.
pub fn render(markup: &str, decor: &PageDecor) -> Vec<u8> {
    let pages = lay_out(markup);
    let page_count = pages.len();

    // 1 catalog, 2 pages, 3 and 4 fonts, 5 info, then a page and a
    // content stream per page
    let first_page_obj = 6;
    let mut objects: Vec<Vec<u8>> = Vec::new();

    objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());
    let kids: Vec<String> = (0..page_count)
        .map(|i| format!("{} 0 R", first_page_obj + i * 2))
        .collect();
    objects.push(
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            page_count
        )
        .into_bytes(),
    );
    objects.push(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    );
    objects.push(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    );
    let mut info = b"<< /Producer (roof_inspect) /Title (".to_vec();
    info.extend_from_slice(&encode_text(&decor.title));
    info.extend_from_slice(b") >>");
    objects.push(info);

    for (i, ops) in pages.iter().enumerate() {
        let content_obj = first_page_obj + i * 2 + 1;
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                PAGE_WIDTH, PAGE_HEIGHT, content_obj
            )
            .into_bytes(),
        );
        let stream = content_stream(ops, i + 1, page_count, decor);
        let mut obj = format!("<< /Length {} >>\nstream\n", stream.len()).into_bytes();
        obj.extend_from_slice(&stream);
        obj.extend_from_slice(b"endstream");
        objects.push(obj);
    }

    let mut out: Vec<u8> = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_offset = out.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = writeln!(xref, "{:010} 00000 n ", offset);
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R /Info 5 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    );
    out.extend_from_slice(xref.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    #[test]
    fn renders_a_complete_pdf_file() {
        let pdf = render(
            "# Roof Inspection Report\n## Property\nAddress: 1 Main (rear) Road\n",
            &PageDecor {
                reference: "RPT-2026-0001".to_string(),
                draft: false,
                title: "Report".to_string(),
            },
        );
        let text = as_text(&pdf);
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.trim_end().ends_with("%%EOF"));
        assert!(text.contains("/Count 1"));
        assert!(text.contains("(Address: 1 Main \\(rear\\) Road) Tj"));
        assert!(text.contains("(RPT-2026-0001, Page 1 of 1) Tj"));
        assert!(!text.contains("DRAFT"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let pdf = render("# Title\nbody", &PageDecor::default());
        let tail_start = pdf
            .windows(b"startxref\n".len())
            .rposition(|w| w == b"startxref\n")
            .unwrap();
        let tail = as_text(&pdf[tail_start..]);
        let xref_at: usize = tail.lines().nth(1).unwrap().parse().unwrap();
        assert!(pdf[xref_at..].starts_with(b"xref"));

        let xref = as_text(&pdf[xref_at..]);
        let first_entry = xref.lines().nth(3).unwrap();
        let offset: usize = first_entry[..10].parse().unwrap();
        assert!(pdf[offset..].starts_with(b"1 0 obj"));
    }

    #[test]
    fn page_markers_and_overflow_paginate() {
        let pdf = render("first\n[[page]]\nsecond", &PageDecor::default());
        let text = as_text(&pdf);
        assert!(text.contains("/Count 2"));
        assert!(text.contains("(Page 2 of 2) Tj"));

        let long: String = (0..200).map(|i| format!("Line {i}\n")).collect();
        let pdf = render(&long, &PageDecor::default());
        let text = as_text(&pdf);
        assert!(!text.contains("/Count 1 "));
        assert!(text.contains("Page 1 of "));
    }

    #[test]
    fn draft_banner_is_printed_on_every_page() {
        let decor = PageDecor {
            draft: true,
            ..Default::default()
        };
        let text = as_text(&render("a\n[[page]]\nb", &decor));
        assert_eq!(text.matches("DRAFT - not for distribution").count(), 2);
    }

    #[test]
    fn wrap_respects_width_and_splits_long_words() {
        let lines = wrap(&"word ".repeat(60), Font::Regular, BODY_SIZE, CONTENT_WIDTH);
        assert!(lines.len() > 1);
        let max = (CONTENT_WIDTH / (BODY_SIZE * Font::Regular.average_width())) as usize;
        assert!(lines.iter().all(|l| l.chars().count() <= max));

        let long = "x".repeat(max * 2 + 3);
        assert_eq!(wrap(&long, Font::Regular, BODY_SIZE, CONTENT_WIDTH).len(), 3);
    }

    #[test]
    fn escaped_lines_are_never_markup() {
        let text = as_text(&render("\\# not a title\n\\---", &PageDecor::default()));
        assert!(text.contains("/F1 10 Tf 50.00"));
        assert!(text.contains("(# not a title) Tj"));
        assert!(text.contains("(---) Tj"));
        assert!(!text.contains(" l S"));
    }

    #[test]
    fn non_latin_text_is_replaced() {
        assert_eq!(encode_text("Māori “roof” €5"), b"M?ori \x93roof\x94 \x805".to_vec());
        assert_eq!(encode_text("café"), b"caf\xE9".to_vec());
    }
}
