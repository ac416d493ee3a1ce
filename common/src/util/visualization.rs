use crate::db::core::ChipDesign;
use image::{ImageResult, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point as ImagePoint;
use imageproc::rect::Rect as ImageRect;
use std::path::Path;

/// Renders component outlines, pins and routed traces to a PNG, `width`
/// pixels wide with the height following the design aspect ratio.
pub fn draw_routed_design(db: &ChipDesign, filename: &str, width: u32) -> ImageResult<()> {
    let Some(extent) = db.extent() else {
        log::warn!("Nothing to draw for {}", filename);
        return Ok(());
    };
    let extent = extent.expanded(0.05 * extent.width().max(extent.height()).max(1e-3));
    let scale = width as f64 / extent.width();
    let height = ((extent.height() * scale).ceil() as u32).max(1);

    let mut img = RgbaImage::from_pixel(width, height, Rgba([15, 15, 20, 255]));
    let map = |x: f64, y: f64| {
        (
            ((x - extent.min.x) * scale) as f32,
            (height as f64 - (y - extent.min.y) * scale) as f32,
        )
    };

    let body = Rgba([45, 45, 60, 255]);
    let edge = Rgba([120, 120, 150, 255]);
    for comp in &db.components {
        let mut poly: Vec<ImagePoint<i32>> = Vec::with_capacity(comp.outline.vertices().len());
        for v in comp.outline.vertices() {
            let (px, py) = map(v.x, v.y);
            let p = ImagePoint::new(px.round() as i32, py.round() as i32);
            if poly.last() != Some(&p) {
                poly.push(p);
            }
        }
        // the filler rejects closed input and degenerate shapes
        while poly.len() > 1 && poly.first() == poly.last() {
            poly.pop();
        }
        if poly.len() >= 3 {
            draw_polygon_mut(&mut img, &poly, body);
        }
        for e in comp.outline.edges() {
            draw_line_segment_mut(&mut img, map(e.a.x, e.a.y), map(e.b.x, e.b.y), edge);
        }
    }

    let ok = Rgba([0, 200, 255, 255]);
    let failed = Rgba([255, 40, 80, 255]);
    for trace in db.routed.iter().flatten() {
        let color = if trace.failed { failed } else { ok };
        for w in trace.points.windows(2) {
            draw_line_segment_mut(&mut img, map(w[0].x, w[0].y), map(w[1].x, w[1].y), color);
        }
    }

    let pin_color = Rgba([255, 215, 0, 255]);
    for pin in &db.pins {
        let (px, py) = map(pin.point.position.x, pin.point.position.y);
        let rect = ImageRect::at(px as i32 - 1, py as i32 - 1).of_size(3, 3);
        draw_filled_rect_mut(&mut img, rect, pin_color);
    }

    img.save(Path::new(filename))?;
    log::info!("Saved {}x{} render to {}", width, height, filename);
    Ok(())
}
