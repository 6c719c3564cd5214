//! Drawing primitives for the annotated preview: detection boxes, score
//! labels, and the FPS / inference-time overlay, rendered with a built-in
//! 5x7 bitmap font so no font files are needed at runtime.

use image::{Rgb, RgbImage};

use crate::vision::data::{Detection, ExecutionMode};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const BOX_THICKNESS: i32 = 2;
const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const GLYPH_ADVANCE: i32 = 6;
const LABEL_SCALE: i32 = 1;
const OVERLAY_SCALE: i32 = 2;

/// Values drawn in the top-left corner of every frame.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Overlay {
    pub(crate) fps: f32,
    pub(crate) inference_ms: f32,
    pub(crate) mode: ExecutionMode,
}

/// Draw detections and the overlay onto a copy of `source`.
pub(crate) fn annotate_frame(
    source: &RgbImage,
    detections: &[Detection],
    overlay: &Overlay,
) -> RgbImage {
    let mut image = source.clone();

    for det in detections {
        let [left, top, right, bottom] = det.bbox;
        draw_rectangle(&mut image, left, top, right, bottom, BOX_COLOR);

        let text = format!("{}: {:.2}", det.label, det.confidence);
        let label_y = (top - 10 - GLYPH_HEIGHT * LABEL_SCALE).max(0);
        draw_text_block(&mut image, left.max(0), label_y, &text, LABEL_SCALE);
    }

    let line_height = GLYPH_HEIGHT * OVERLAY_SCALE + 6;
    draw_text_block(
        &mut image,
        10,
        10,
        &format!("FPS: {:.1}", overlay.fps),
        OVERLAY_SCALE,
    );
    draw_text_block(
        &mut image,
        10,
        10 + line_height,
        &format!(
            "Inference: {:.1}ms ({})",
            overlay.inference_ms,
            overlay.mode.label()
        ),
        OVERLAY_SCALE,
    );

    image
}

/// Width in pixels of `text` rendered at `scale`.
pub(crate) fn text_width(text: &str, scale: i32) -> i32 {
    text.chars().count() as i32 * GLYPH_ADVANCE * scale
}

fn draw_text_block(image: &mut RgbImage, x: i32, y: i32, text: &str, scale: i32) {
    let width = text_width(text, scale);
    fill_rect(
        image,
        x - 2,
        y - 2,
        x + width,
        y + GLYPH_HEIGHT * scale + 1,
        TEXT_BACKGROUND,
    );
    draw_label(image, x, y, text, TEXT_COLOR, scale);
}

fn draw_rectangle(
    image: &mut RgbImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgb<u8>,
) {
    for inset in 0..BOX_THICKNESS {
        let (l, t, r, b) = (left + inset, top + inset, right - inset, bottom - inset);
        if l > r || t > b {
            break;
        }
        for x in l..=r {
            put_pixel(image, x, t, color);
            put_pixel(image, x, b, color);
        }
        for y in t..=b {
            put_pixel(image, l, y, color);
            put_pixel(image, r, y, color);
        }
    }
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for y in top..=bottom {
        for x in left..=right {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_label(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>, scale: i32) {
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        let px = x + col * scale;
                        let py = y + row as i32 * scale;
                        for dy in 0..scale {
                            for dx in 0..scale {
                                put_pixel(image, px + dx, py + dy, color);
                            }
                        }
                    }
                }
            }
        }
        x += GLYPH_ADVANCE * scale;
    }
}

fn put_pixel(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let bits = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '%' => [0b10001, 0b10010, 0b00100, 0b01000, 0b10010, 0b10001, 0b00000],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(bits)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn person(bbox: [i32; 4]) -> Detection {
        Detection {
            class_id: 0,
            label: "person".into(),
            bbox,
            confidence: 0.87,
            timestamp: Utc::now(),
        }
    }

    fn overlay() -> Overlay {
        Overlay {
            fps: 12.3,
            inference_ms: 8.4,
            mode: ExecutionMode::Cpu,
        }
    }

    #[test]
    fn draws_box_outline_without_touching_source() {
        let source = RgbImage::new(320, 240);
        let annotated = annotate_frame(&source, &[person([100, 120, 200, 220])], &overlay());

        assert_eq!(annotated.get_pixel(150, 220), &BOX_COLOR);
        assert_eq!(annotated.get_pixel(100, 170), &BOX_COLOR);
        assert_eq!(annotated.get_pixel(101, 170), &BOX_COLOR);
        assert_eq!(annotated.get_pixel(150, 170), &Rgb([0, 0, 0]));
        assert!(source.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn boxes_outside_the_frame_are_clipped() {
        let source = RgbImage::new(64, 48);
        let annotated = annotate_frame(&source, &[person([-20, -20, 500, 500])], &overlay());
        assert_eq!(annotated.dimensions(), (64, 48));
    }

    #[test]
    fn overlay_text_is_rendered() {
        let source = RgbImage::from_pixel(400, 100, Rgb([40, 40, 40]));
        let annotated = annotate_frame(&source, &[], &overlay());
        let lit = (10..10 + text_width("FPS: 12.3", OVERLAY_SCALE))
            .flat_map(|x| (10..10 + GLYPH_HEIGHT * OVERLAY_SCALE).map(move |y| (x, y)))
            .filter(|&(x, y)| annotated.get_pixel(x as u32, y as u32) == &TEXT_COLOR)
            .count();
        assert!(lit > 0);
    }

    #[test]
    fn every_overlay_character_has_a_glyph() {
        for ch in "PERSON: 0.87 FPS INFERENCE MS (TPU) (CPU)".chars() {
            assert!(glyph_bits(ch).is_some(), "missing glyph for {ch:?}");
        }
        assert!(glyph_bits('#').is_none());
    }
}
