// SPDX-License-Identifier: GPL-3.0-only

//! Letterbox / pillarbox fitting of the preview into the display surface

/// Sub-rectangle of the display surface the preview is drawn into
///
/// Origin is the top-left corner of the surface, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewportRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ViewportRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole `width × height` target
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of bytes an RGBA8 readback of this rectangle occupies
    pub fn rgba_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Bottom-right corner region covering `fraction` of each axis
    pub fn bottom_right(&self, fraction: f32) -> Self {
        let width = ((self.width as f32 * fraction).round() as u32).clamp(1, self.width.max(1));
        let height = ((self.height as f32 * fraction).round() as u32).clamp(1, self.height.max(1));
        Self::new(
            self.x + self.width.saturating_sub(width),
            self.y + self.height.saturating_sub(height),
            width,
            height,
        )
    }
}

impl std::fmt::Display for ViewportRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.x, self.y
        )
    }
}

/// Fit a rectangle of aspect ratio `aspect` (width / height) inside a
/// `surface_width × surface_height` surface, centered on the axis with slack.
///
/// Wider surfaces are height-constrained (pillarbox), taller ones are
/// width-constrained (letterbox). Zero-sized surfaces and non-positive aspect
/// ratios produce an empty rectangle at the origin.
pub fn fit_viewport(surface_width: u32, surface_height: u32, aspect: f32) -> ViewportRect {
    if surface_width == 0 || surface_height == 0 || !(aspect > 0.0) || !aspect.is_finite() {
        return ViewportRect::default();
    }

    let surface_aspect = surface_width as f64 / surface_height as f64;
    let aspect = aspect as f64;

    if surface_aspect > aspect {
        let height = surface_height;
        let width = ((surface_height as f64 * aspect).round() as u32).clamp(1, surface_width);
        ViewportRect::new((surface_width - width) / 2, 0, width, height)
    } else {
        let width = surface_width;
        let height = ((surface_width as f64 / aspect).round() as u32).clamp(1, surface_height);
        ViewportRect::new(0, (surface_height - height) / 2, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TARGET_ASPECT_RATIO;

    #[test]
    fn test_landscape_surface_is_pillarboxed() {
        let rect = fit_viewport(1920, 1080, TARGET_ASPECT_RATIO);
        assert_eq!(rect.height, 1080);
        assert_eq!(rect.width, 608); // round(1080 * 9 / 16) = round(607.5)
        assert_eq!(rect.x, (1920 - 608) / 2);
        assert_eq!(rect.y, 0);
    }

    #[test]
    fn test_tall_surface_is_letterboxed() {
        let rect = fit_viewport(1080, 2400, TARGET_ASPECT_RATIO);
        assert_eq!(rect.width, 1080);
        assert_eq!(rect.height, 1920);
        assert_eq!(rect.x, 0);
        assert_eq!(rect.y, (2400 - 1920) / 2);
    }

    #[test]
    fn test_exact_aspect_fills_surface() {
        let rect = fit_viewport(900, 1600, TARGET_ASPECT_RATIO);
        assert_eq!(rect, ViewportRect::full(900, 1600));
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(fit_viewport(0, 100, TARGET_ASPECT_RATIO).is_empty());
        assert!(fit_viewport(100, 0, TARGET_ASPECT_RATIO).is_empty());
        assert!(fit_viewport(100, 100, 0.0).is_empty());
        assert!(fit_viewport(100, 100, f32::NAN).is_empty());
    }

    #[test]
    fn test_one_pixel_surface() {
        let rect = fit_viewport(1, 1, TARGET_ASPECT_RATIO);
        assert_eq!(rect, ViewportRect::full(1, 1));
    }

    #[test]
    fn test_fit_holds_for_every_surface_size() {
        for aspect in [TARGET_ASPECT_RATIO, 16.0 / 9.0, 1.0] {
            let a = aspect as f64;
            for w in 1..=160u32 {
                for h in 1..=160u32 {
                    let rect = fit_viewport(w, h, aspect);
                    let case = format!("{}x{} aspect {}: {}", w, h, aspect, rect);

                    assert!(!rect.is_empty(), "{}", case);
                    assert!(rect.x + rect.width <= w, "{}", case);
                    assert!(rect.y + rect.height <= h, "{}", case);
                    assert_eq!(rect.x, (w - rect.width) / 2, "{}", case);
                    assert_eq!(rect.y, (h - rect.height) / 2, "{}", case);

                    // Largest fit: one axis spans the surface, the other is
                    // the rounded aspect-correct size
                    let height_bound = rect.height == h
                        && (rect.width as f64 - h as f64 * a).abs() <= 0.5 + 1e-9;
                    let width_bound = rect.width == w
                        && (rect.height as f64 - w as f64 / a).abs() <= 0.5 + 1e-9;
                    assert!(height_bound || width_bound, "{}", case);
                }
            }
        }
    }

    #[test]
    fn test_bottom_right_third() {
        let rect = ViewportRect::full(600, 900).bottom_right(1.0 / 3.0);
        assert_eq!(rect, ViewportRect::new(400, 600, 200, 300));
    }
}
