//! Minimal FITS primary-HDU writer.
//!
//! Writes a single 16-bit image HDU: an 80-column card header padded to the
//! 2880-byte block size, then big-endian pixel data with the conventional
//! BZERO=32768 offset so unsigned sensor counts fit the signed data type.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::Array2;

const CARD_LEN: usize = 80;
const BLOCK_LEN: usize = 2880;

/// Offset mapping u16 counts into FITS signed 16-bit data.
const BZERO: i32 = 32768;

/// Ordered set of FITS header cards.
#[derive(Debug, Default)]
pub struct FitsHeader {
    cards: Vec<String>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_string(&mut self, keyword: &str, value: &str, comment: &str) {
        // Single quotes in values are escaped by doubling.
        let quoted = format!("'{:<8}'", value.replace('\'', "''"));
        self.push_card(keyword, &quoted, comment);
    }

    pub fn set_int(&mut self, keyword: &str, value: i64, comment: &str) {
        self.push_card(keyword, &format!("{value:>20}"), comment);
    }

    pub fn set_float(&mut self, keyword: &str, value: f64, comment: &str) {
        self.push_card(keyword, &format!("{value:>20}"), comment);
    }

    /// Plain COMMENT card with no value field.
    pub fn add_comment(&mut self, text: &str) {
        let mut card = format!("COMMENT {text}");
        card.truncate(CARD_LEN);
        self.cards.push(card);
    }

    fn push_card(&mut self, keyword: &str, value: &str, comment: &str) {
        let mut card = format!("{keyword:<8}= {value}");
        if !comment.is_empty() {
            card.push_str(" / ");
            card.push_str(comment);
        }
        card.truncate(CARD_LEN);
        self.cards.push(card);
    }

    fn render(&self, image: &Array2<u16>) -> Vec<u8> {
        let (rows, cols) = image.dim();
        let mut cards = Vec::with_capacity(self.cards.len() + 8);
        cards.push(format!("{:<8}= {:>20}", "SIMPLE", "T"));
        cards.push(format!("{:<8}= {:>20}", "BITPIX", 16));
        cards.push(format!("{:<8}= {:>20}", "NAXIS", 2));
        cards.push(format!("{:<8}= {:>20}", "NAXIS1", cols));
        cards.push(format!("{:<8}= {:>20}", "NAXIS2", rows));
        cards.push(format!("{:<8}= {:>20}", "BZERO", BZERO));
        cards.push(format!("{:<8}= {:>20}", "BSCALE", 1));
        cards.extend(self.cards.iter().cloned());
        cards.push("END".to_string());

        let mut bytes = Vec::with_capacity(cards.len() * CARD_LEN);
        for card in &cards {
            let mut buf = card.clone().into_bytes();
            buf.resize(CARD_LEN, b' ');
            bytes.extend_from_slice(&buf);
        }
        pad_to_block(&mut bytes, b' ');
        bytes
    }
}

fn pad_to_block(bytes: &mut Vec<u8>, fill: u8) {
    let rem = bytes.len() % BLOCK_LEN;
    if rem != 0 {
        bytes.resize(bytes.len() + BLOCK_LEN - rem, fill);
    }
}

/// Write an image and its header as a FITS file at `path`.
pub fn write_fits(path: &Path, image: &Array2<u16>, header: &FitsHeader) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&header.render(image))?;

    let mut data = Vec::with_capacity(image.len() * 2);
    for &value in image.iter() {
        let signed = (i32::from(value) - BZERO) as i16;
        data.extend_from_slice(&signed.to_be_bytes());
    }
    pad_to_block(&mut data, 0);
    writer.write_all(&data)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_is_block_aligned() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.fits");
        let image = Array2::<u16>::zeros((10, 7));
        let mut header = FitsHeader::new();
        header.set_float("EXPTIME", 1.5, "exposure time in seconds");
        header.set_string("FILTER", "V", "");
        write_fits(&path, &image, &header).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len() % BLOCK_LEN, 0);
        // One header block plus one data block for 140 pixels.
        assert_eq!(bytes.len(), 2 * BLOCK_LEN);
    }

    #[test]
    fn test_header_layout() {
        let image = Array2::<u16>::zeros((4, 3));
        let mut header = FitsHeader::new();
        header.set_int("EXPNUM", 3, "frames in series");
        header.add_comment("test frame");
        let bytes = header.render(&image);

        assert_eq!(&bytes[..6], b"SIMPLE");
        for card in bytes.chunks(CARD_LEN) {
            assert_eq!(card.len(), CARD_LEN);
        }
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(&format!("{:<8}= {:>20}", "NAXIS1", 3)));
        assert!(text.contains(&format!("{:<8}= {:>20}", "NAXIS2", 4)));
        assert!(text.contains("COMMENT test frame"));
        assert!(text.contains("END"));
    }

    #[test]
    fn test_pixel_encoding_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("px.fits");
        let image = Array2::from_shape_vec((1, 3), vec![0u16, 32768, 65535]).unwrap();
        write_fits(&path, &image, &FitsHeader::new()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let data = &bytes[BLOCK_LEN..];
        let first = i16::from_be_bytes([data[0], data[1]]);
        let mid = i16::from_be_bytes([data[2], data[3]]);
        let last = i16::from_be_bytes([data[4], data[5]]);
        assert_eq!(first, i16::MIN);
        assert_eq!(mid, 0);
        assert_eq!(last, i16::MAX);
    }
}
