//! PDF text extractor
//!
//! Reads text-showing operators out of each page's content stream, tracks
//! where every run of text lands on the page, then rebuilds rows by
//! clustering runs that share a baseline. Stream order is not trusted:
//! tabular statements are often drawn one column at a time.

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object};

use crate::domain::result::ExtractionError;
use crate::domain::{DocumentBytes, ExtractedDocument, Page, Row, TextCell};
use crate::ports::TextExtractor;

const SUPPORTED_VERSIONS: &[&str] = &[
    "1.0", "1.1", "1.2", "1.3", "1.4", "1.5", "1.6", "1.7", "2.0",
];

/// TJ adjustments at least this wide (thousandths of an em) read as a space
const TJ_SPACE_THRESHOLD: f64 = 250.0;

/// Average glyph width as a fraction of the font size; the extractor does
/// not read font metrics, so run widths are estimates
const AVERAGE_GLYPH_WIDTH: f64 = 0.5;

/// Runs closer than this (points) are pieces of one word
const TOUCHING_GAP: f64 = 0.05;

pub const DEFAULT_ROW_TOLERANCE: f64 = 2.0;
pub const DEFAULT_CELL_GAP: f64 = 1.0;

/// Affine transform `[a b c d e f]` in PDF row-vector convention
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translation(tx: f64, ty: f64) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self` applied first, then `other`
    fn then(&self, other: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn origin(&self) -> (f64, f64) {
        (self.0[4], self.0[5])
    }

    fn horizontal_scale(&self) -> f64 {
        (self.0[0] * self.0[0] + self.0[1] * self.0[1]).sqrt()
    }
}

/// A run of text placed on the page, in device space
#[derive(Debug, Clone)]
struct Fragment {
    text: String,
    x: f64,
    y: f64,
    width: f64,
}

/// Text and graphics state needed to place runs
struct TextState<'a> {
    fonts: &'a BTreeMap<Vec<u8>, &'a Dictionary>,
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    leading: f64,
    font_size: f64,
    font: Option<Vec<u8>>,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scaling: f64,
    /// Run being built; continues until the text position is moved explicitly
    current: Option<Fragment>,
    fragments: Vec<Fragment>,
}

impl<'a> TextState<'a> {
    fn new(fonts: &'a BTreeMap<Vec<u8>, &'a Dictionary>) -> Self {
        Self {
            fonts,
            ctm: Matrix::IDENTITY,
            ctm_stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            leading: 0.0,
            font_size: 0.0,
            font: None,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            current: None,
            fragments: Vec::new(),
        }
    }

    fn flush(&mut self) {
        if let Some(fragment) = self.current.take() {
            if !fragment.text.trim().is_empty() {
                self.fragments.push(fragment);
            }
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.flush();
        self.tlm = Matrix::translation(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn decode(&self, bytes: &[u8]) -> String {
        if bytes.starts_with(&[0xFE, 0xFF]) {
            let units: Vec<u16> = bytes[2..]
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            return String::from_utf16_lossy(&units);
        }
        let encoding = self
            .font
            .as_ref()
            .and_then(|name| self.fonts.get(name))
            .map(|font| font.get_font_encoding());
        match encoding {
            Some("StandardEncoding" | "WinAnsiEncoding" | "MacRomanEncoding") | None => {
                Document::decode_text(encoding, bytes)
            }
            // Unmapped encodings: treat bytes as Latin-1
            Some(_) => bytes.iter().map(|&b| b as char).collect(),
        }
    }

    fn show(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let trm = self.tm.then(&self.ctm);
        let chars = text.chars().count() as f64;
        let spaces = text.chars().filter(|c| *c == ' ').count() as f64;
        let advance = (chars * self.font_size * AVERAGE_GLYPH_WIDTH
            + chars * self.char_spacing
            + spaces * self.word_spacing)
            * self.horizontal_scaling;

        match self.current.as_mut() {
            Some(fragment) => {
                fragment.text.push_str(text);
                fragment.width += advance * trm.horizontal_scale();
            }
            None => {
                let (x, y) = trm.origin();
                self.current = Some(Fragment {
                    text: text.to_string(),
                    x,
                    y,
                    width: advance * trm.horizontal_scale(),
                });
            }
        }
        self.tm = Matrix::translation(advance, 0.0).then(&self.tm);
    }

    fn adjust(&mut self, thousandths: f64) {
        let displacement = -thousandths / 1000.0 * self.font_size * self.horizontal_scaling;
        let scale = self.tm.then(&self.ctm).horizontal_scale();
        if thousandths <= -TJ_SPACE_THRESHOLD {
            if let Some(fragment) = self.current.as_mut() {
                if !fragment.text.ends_with(' ') {
                    fragment.text.push(' ');
                }
            }
        }
        if let Some(fragment) = self.current.as_mut() {
            fragment.width += displacement * scale;
        }
        self.tm = Matrix::translation(displacement, 0.0).then(&self.tm);
    }

    fn apply(&mut self, op: &Operation) {
        let nums: Vec<f64> = op.operands.iter().filter_map(number).collect();
        match op.operator.as_str() {
            "q" => self.ctm_stack.push(self.ctm),
            "Q" => {
                if let Some(ctm) = self.ctm_stack.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" if nums.len() == 6 => {
                let m = Matrix([nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]]);
                self.ctm = m.then(&self.ctm);
            }
            "BT" => {
                self.flush();
                self.tm = Matrix::IDENTITY;
                self.tlm = Matrix::IDENTITY;
            }
            "ET" => self.flush(),
            "Tf" => {
                self.font = op
                    .operands
                    .first()
                    .and_then(|o| o.as_name().ok())
                    .map(|n| n.to_vec());
                if let Some(size) = op.operands.get(1).and_then(number) {
                    self.font_size = size;
                }
            }
            "TL" if !nums.is_empty() => self.leading = nums[0],
            "Tc" if !nums.is_empty() => self.char_spacing = nums[0],
            "Tw" if !nums.is_empty() => self.word_spacing = nums[0],
            "Tz" if !nums.is_empty() => self.horizontal_scaling = nums[0] / 100.0,
            "Td" if nums.len() == 2 => self.move_line(nums[0], nums[1]),
            "TD" if nums.len() == 2 => {
                self.leading = -nums[1];
                self.move_line(nums[0], nums[1]);
            }
            "Tm" if nums.len() == 6 => {
                self.flush();
                self.tlm = Matrix([nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]]);
                self.tm = self.tlm;
            }
            "T*" => self.move_line(0.0, -self.leading),
            "Tj" => {
                if let Some(bytes) = op.operands.first().and_then(|o| o.as_str().ok()) {
                    let text = self.decode(bytes);
                    self.show(&text);
                }
            }
            "'" => {
                self.move_line(0.0, -self.leading);
                if let Some(bytes) = op.operands.first().and_then(|o| o.as_str().ok()) {
                    let text = self.decode(bytes);
                    self.show(&text);
                }
            }
            "\"" => {
                if nums.len() >= 2 {
                    self.word_spacing = nums[0];
                    self.char_spacing = nums[1];
                }
                self.move_line(0.0, -self.leading);
                if let Some(bytes) = op.operands.get(2).and_then(|o| o.as_str().ok()) {
                    let text = self.decode(bytes);
                    self.show(&text);
                }
            }
            "TJ" => {
                if let Some(items) = op.operands.first().and_then(|o| o.as_array().ok()) {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => {
                                let text = self.decode(bytes);
                                self.show(&text);
                            }
                            other => {
                                if let Some(n) = number(other) {
                                    self.adjust(n);
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

fn number(obj: &Object) -> Option<f64> {
    obj.as_float().ok().map(f64::from)
}

/// Extracts positioned text from PDF statements
#[derive(Debug, Clone, Copy)]
pub struct PdfTextExtractor {
    /// Maximum baseline difference (points) for runs to share a row
    row_tolerance: f64,
    /// Runs closer than this (points) are joined into one cell
    cell_gap: f64,
}

impl Default for PdfTextExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_ROW_TOLERANCE, DEFAULT_CELL_GAP)
    }
}

impl PdfTextExtractor {
    pub fn new(row_tolerance: f64, cell_gap: f64) -> Self {
        Self {
            row_tolerance,
            cell_gap,
        }
    }

    fn page_fragments(
        doc: &Document,
        page_id: lopdf::ObjectId,
    ) -> Result<Vec<Fragment>, ExtractionError> {
        let data = doc
            .get_page_content(page_id)
            .map_err(|e| ExtractionError::Malformed(e.to_string()))?;
        let content =
            Content::decode(&data).map_err(|e| ExtractionError::Malformed(e.to_string()))?;
        let fonts = doc.get_page_fonts(page_id);

        let mut state = TextState::new(&fonts);
        for op in &content.operations {
            state.apply(op);
        }
        state.flush();
        Ok(state.fragments)
    }

    /// Cluster runs into rows (top to bottom) and cells (left to right)
    fn layout(&self, mut fragments: Vec<Fragment>) -> Vec<Row> {
        fragments.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

        let mut groups: Vec<(f64, Vec<Fragment>)> = Vec::new();
        for fragment in fragments {
            match groups.last_mut() {
                Some((anchor, members)) if (*anchor - fragment.y).abs() <= self.row_tolerance => {
                    members.push(fragment)
                }
                _ => groups.push((fragment.y, vec![fragment])),
            }
        }

        groups
            .into_iter()
            .map(|(y, mut members)| {
                members.sort_by(|a, b| a.x.total_cmp(&b.x));
                let mut cells: Vec<Fragment> = Vec::new();
                for fragment in members {
                    match cells.last_mut() {
                        Some(prev) if fragment.x - (prev.x + prev.width) <= self.cell_gap => {
                            let gap = fragment.x - (prev.x + prev.width);
                            if gap > TOUCHING_GAP
                                && !prev.text.ends_with(char::is_whitespace)
                                && !fragment.text.starts_with(char::is_whitespace)
                            {
                                prev.text.push(' ');
                            }
                            prev.text.push_str(&fragment.text);
                            prev.width = (fragment.x + fragment.width) - prev.x;
                        }
                        _ => cells.push(fragment),
                    }
                }
                Row::new(
                    y,
                    cells
                        .into_iter()
                        .map(|c| TextCell::new(c.text.trim().to_string(), c.x, y))
                        .collect(),
                )
            })
            .collect()
    }
}

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, document: &DocumentBytes) -> Result<ExtractedDocument, ExtractionError> {
        let doc = Document::load_mem(&document.bytes)
            .map_err(|e| ExtractionError::Malformed(e.to_string()))?;

        let version = doc.version.trim();
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ExtractionError::UnsupportedDocumentVersion(version.to_string()));
        }
        if doc.is_encrypted() {
            return Err(ExtractionError::EncryptedDocument);
        }

        let mut pages = Vec::new();
        for (index, (_number, page_id)) in doc.get_pages().into_iter().enumerate() {
            let fragments = Self::page_fragments(&doc, page_id)?;
            pages.push(Page {
                index,
                rows: self.layout(fragments),
            });
        }

        let extracted = ExtractedDocument::new(pages);
        if !extracted.has_text() {
            return Err(ExtractionError::NoTextLayer);
        }
        Ok(extracted)
    }
}
