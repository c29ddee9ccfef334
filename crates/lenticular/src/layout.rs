//! Geometry of the quilt: how many tiles, how large, and where each one sits.

use crate::backend::{PixelRect, TextureDesc};
use crate::config::{QuiltSettings, RenderingMethod};
use crate::Result;
use glam::Vec4;

/// Tile grid of one quilt texture. Compared by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileLayout {
    pub render_target_width: u32,
    pub render_target_height: u32,
    pub tile_count_x: u32,
    pub tile_count_y: u32,
    pub rendering_method: RenderingMethod,
}

/// A tile's rectangle in normalized quilt texture space, origin top-left,
/// y growing downwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileScreenRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl TileScreenRect {
    /// NDC center and extent as `(center_x, center_y, width, height)`, the
    /// layout of the `screenRect[]` shader array. NDC y points up.
    pub fn to_ndc(self) -> Vec4 {
        let width = self.width * 2.0;
        let height = self.height * 2.0;
        Vec4::new(
            self.x * 2.0 - 1.0 + width * 0.5,
            1.0 - self.y * 2.0 - height * 0.5,
            width,
            height,
        )
    }
}

impl TileLayout {
    /// Derives the tile grid from a settings snapshot.
    pub fn from_settings(settings: &QuiltSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            render_target_width: settings.render_target_width,
            render_target_height: settings.render_target_height,
            tile_count_x: settings.tile_count_x,
            tile_count_y: settings.tile_count_y,
            rendering_method: settings.rendering_method,
        })
    }

    /// Number of tiles, which is also the number of views.
    #[inline]
    pub fn tile_count(&self) -> u32 {
        self.tile_count_x.saturating_mul(self.tile_count_y)
    }

    /// Tile size in pixels. The remainder of the integer division is padding
    /// on the right and bottom edges.
    #[inline]
    pub fn tile_size(&self) -> (u32, u32) {
        (
            self.render_target_width / self.tile_count_x,
            self.render_target_height / self.tile_count_y,
        )
    }

    /// Fraction of the texture covered by whole tiles on each axis.
    pub fn coverage_portion(&self) -> (f32, f32) {
        let (tile_w, tile_h) = self.tile_size();
        (
            (self.tile_count_x * tile_w) as f32 / self.render_target_width as f32,
            (self.tile_count_y * tile_h) as f32 / self.render_target_height as f32,
        )
    }

    /// Whether a texture allocated for `previous` cannot hold `current`.
    pub fn needs_reallocation(previous: Option<&TileLayout>, current: &TileLayout) -> bool {
        let Some(previous) = previous else {
            return true;
        };
        previous.rendering_method != current.rendering_method
            || previous.render_target_width != current.render_target_width
            || previous.render_target_height != current.render_target_height
            || previous.tile_size() != current.tile_size()
    }

    /// `(row, column)` of a row-major tile index.
    #[inline]
    pub fn tile_coords(&self, index: u32) -> (u32, u32) {
        (index / self.tile_count_x, index % self.tile_count_x)
    }

    #[inline]
    pub fn tile_index(&self, row: u32, column: u32) -> u32 {
        row * self.tile_count_x + column
    }

    pub fn tile_pixel_rect(&self, index: u32) -> PixelRect {
        let (row, column) = self.tile_coords(index);
        let (tile_w, tile_h) = self.tile_size();
        PixelRect::new(column * tile_w, row * tile_h, tile_w, tile_h)
    }

    pub fn tile_screen_rect(&self, index: u32) -> TileScreenRect {
        let (row, column) = self.tile_coords(index);
        let (portion_x, portion_y) = self.coverage_portion();
        let width = portion_x / self.tile_count_x as f32;
        let height = portion_y / self.tile_count_y as f32;
        TileScreenRect {
            x: column as f32 * width,
            y: row as f32 * height,
            width,
            height,
        }
    }

    /// The instancing path draws every tile straight into the quilt and needs
    /// depth there; the multi-pass path only ever copies into it.
    pub fn quilt_texture_desc(&self) -> TextureDesc {
        TextureDesc {
            label: "Quilt Texture",
            width: self.render_target_width,
            height: self.render_target_height,
            depth: self.rendering_method == RenderingMethod::SinglePassInstancing,
        }
    }

    /// Temporary target the multi-pass renderer draws one view into.
    pub fn tile_texture_desc(&self) -> TextureDesc {
        let (width, height) = self.tile_size();
        TextureDesc {
            label: "Quilt Tile Target",
            width,
            height,
            depth: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(width: u32, height: u32, tx: u32, ty: u32) -> TileLayout {
        TileLayout {
            render_target_width: width,
            render_target_height: height,
            tile_count_x: tx,
            tile_count_y: ty,
            rendering_method: RenderingMethod::MultiPass,
        }
    }

    #[test]
    fn even_grid_has_no_padding() {
        let l = layout(4096, 4096, 4, 8);
        assert_eq!(l.tile_size(), (1024, 512));
        assert_eq!(l.coverage_portion(), (1.0, 1.0));
    }

    #[test]
    fn default_settings_pad_vertically() {
        let l = TileLayout::from_settings(&QuiltSettings::default()).unwrap();
        assert_eq!(l.tile_count(), 36);
        assert_eq!(l.tile_size(), (1024, 455));
        let (px, py) = l.coverage_portion();
        assert_eq!(px, 1.0);
        assert!((py - 4095.0 / 4096.0).abs() < 1e-6);
    }

    #[test]
    fn overflowing_grid_never_becomes_a_layout() {
        let settings = QuiltSettings {
            render_target_width: 70_000,
            render_target_height: 70_000,
            tile_count_x: 70_000,
            tile_count_y: 70_000,
            ..Default::default()
        };
        assert!(TileLayout::from_settings(&settings).is_err());
        assert_eq!(layout(70_000, 70_000, 70_000, 70_000).tile_count(), u32::MAX);
    }

    #[test]
    fn portion_is_one_exactly_when_divisible() {
        for width in 1000..1040u32 {
            for tx in 1..9u32 {
                let l = layout(width, 512, tx, 4);
                let (px, py) = l.coverage_portion();
                assert_eq!(px == 1.0, width % tx == 0, "width {width}, tiles {tx}");
                assert_eq!(py, 1.0);
                assert!(px <= 1.0);
            }
        }
    }

    #[test]
    fn reallocation_is_reflexive_and_tracks_method() {
        let l = layout(4096, 4096, 4, 9);
        assert!(!TileLayout::needs_reallocation(Some(&l), &l));
        assert!(TileLayout::needs_reallocation(None, &l));

        let instanced = TileLayout { rendering_method: RenderingMethod::SinglePassInstancing, ..l };
        assert!(TileLayout::needs_reallocation(Some(&l), &instanced));
    }

    #[test]
    fn reallocation_tracks_tile_size_not_tile_count() {
        // 10 / 4 and 10 / 5 both give 2 px tiles: the texture can be reused.
        let four = layout(10, 10, 4, 2);
        let five = layout(10, 10, 5, 2);
        assert!(!TileLayout::needs_reallocation(Some(&four), &five));

        let l = layout(4096, 4096, 4, 8);

        let wider_tiles = layout(4096, 4096, 2, 8);
        assert!(TileLayout::needs_reallocation(Some(&l), &wider_tiles));

        let taller = layout(4096, 2048, 4, 8);
        assert!(TileLayout::needs_reallocation(Some(&l), &taller));
    }

    #[test]
    fn tiles_are_row_major() {
        let l = layout(4096, 4096, 4, 9);
        assert_eq!(l.tile_coords(0), (0, 0));
        assert_eq!(l.tile_coords(3), (0, 3));
        assert_eq!(l.tile_coords(4), (1, 0));
        assert_eq!(l.tile_coords(35), (8, 3));
        for index in 0..l.tile_count() {
            let (row, column) = l.tile_coords(index);
            assert_eq!(l.tile_index(row, column), index);
        }
        assert_eq!(l.tile_pixel_rect(5), PixelRect::new(1024, 455, 1024, 455));
    }

    #[test]
    fn screen_rects_tile_the_covered_area() {
        for l in [layout(4096, 4096, 4, 9), layout(1000, 999, 3, 7), layout(64, 64, 1, 1)] {
            let (px, py) = l.coverage_portion();
            let rects: Vec<_> = (0..l.tile_count()).map(|i| l.tile_screen_rect(i)).collect();

            let area: f32 = rects.iter().map(|r| r.width * r.height).sum();
            assert!((area - px * py).abs() < 1e-4);

            for (i, a) in rects.iter().enumerate() {
                assert!(a.x >= 0.0 && a.y >= 0.0);
                assert!(a.x + a.width <= px + 1e-5 && a.y + a.height <= py + 1e-5);
                for b in &rects[i + 1..] {
                    let overlap_x = (a.x + a.width).min(b.x + b.width) - a.x.max(b.x);
                    let overlap_y = (a.y + a.height).min(b.y + b.height) - a.y.max(b.y);
                    assert!(overlap_x <= 1e-5 || overlap_y <= 1e-5, "{a:?} overlaps {b:?}");
                }
            }

            let pixel_rects: Vec<_> = (0..l.tile_count()).map(|i| l.tile_pixel_rect(i)).collect();
            for (i, a) in pixel_rects.iter().enumerate() {
                assert!(a.right() <= l.render_target_width && a.bottom() <= l.render_target_height);
                assert!(pixel_rects[i + 1..].iter().all(|b| !a.overlaps(b)));
            }
        }
    }

    #[test]
    fn screen_rect_matches_pixel_rect() {
        let l = layout(1000, 999, 3, 7);
        for index in 0..l.tile_count() {
            let px = l.tile_pixel_rect(index);
            let rect = l.tile_screen_rect(index);
            assert!((rect.x * 1000.0 - px.x as f32).abs() < 1e-2);
            assert!((rect.y * 999.0 - px.y as f32).abs() < 1e-2);
        }
    }

    #[test]
    fn ndc_rect_of_first_tile_is_top_left() {
        let l = layout(400, 400, 2, 2);
        let ndc = l.tile_screen_rect(0).to_ndc();
        assert_eq!(ndc, Vec4::new(-0.5, 0.5, 1.0, 1.0));
        let last = l.tile_screen_rect(3).to_ndc();
        assert_eq!(last, Vec4::new(0.5, -0.5, 1.0, 1.0));
    }

    #[test]
    fn depth_only_for_instancing() {
        let l = layout(4096, 4096, 4, 9);
        assert!(!l.quilt_texture_desc().depth);
        let i = TileLayout { rendering_method: RenderingMethod::SinglePassInstancing, ..l };
        assert!(i.quilt_texture_desc().depth);
        assert!(l.tile_texture_desc().depth);
    }
}
