// Overlay geometry and window attributes
// Pure placement math plus the attribute set applied to the layer surface

use smithay_client_toolkit::shell::wlr_layer::{KeyboardInteractivity, Layer};

/// Size of a display in logical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Where the overlay goes on the screen, relative to the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Placement {
    /// Center a `width` x `height` window on `screen`.
    ///
    /// The origin goes negative when the window is larger than the screen,
    /// keeping the centers aligned.
    pub fn centered(width: u32, height: u32, screen: ScreenSize) -> Self {
        let x = (i64::from(screen.width) - i64::from(width)) / 2;
        let y = (i64::from(screen.height) - i64::from(height)) / 2;
        Self {
            x: clamp_i32(x),
            y: clamp_i32(y),
            width,
            height,
        }
    }
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Attributes of the overlay surface
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Layer shell namespace reported to the compositor
    pub namespace: &'static str,
    /// `Top` floats above normal windows, `Overlay` above fullscreen ones too
    pub layer: Layer,
    /// Forward all pointer input to whatever is beneath the overlay
    pub click_through: bool,
    /// Whether the overlay may take keyboard focus
    pub accepts_focus: bool,
    /// Used when the compositor reports no output at all
    pub fallback_screen: ScreenSize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            namespace: "pinlay",
            layer: Layer::Top,
            click_through: true,
            accepts_focus: false,
            fallback_screen: ScreenSize::new(1920, 1080),
        }
    }
}

impl OverlayConfig {
    pub fn keyboard_interactivity(&self) -> KeyboardInteractivity {
        if self.accepts_focus {
            KeyboardInteractivity::OnDemand
        } else {
            KeyboardInteractivity::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;

    #[test]
    fn photo_on_full_hd_screen() {
        let placement = Placement::centered(400, 300, ScreenSize::new(1920, 1080));
        assert!(
            placement
                == Placement {
                    x: 760,
                    y: 390,
                    width: 400,
                    height: 300,
                }
        );
    }

    #[test]
    fn window_size_equals_image_size() {
        for (w, h) in [(1, 1), (123, 457), (1920, 1080), (5000, 40)] {
            let placement = Placement::centered(w, h, ScreenSize::new(2560, 1440));
            assert!(placement.width == w);
            assert!(placement.height == h);
        }
    }

    #[test]
    fn centers_coincide_within_rounding() {
        let screens = [
            ScreenSize::new(1920, 1080),
            ScreenSize::new(1366, 768),
            ScreenSize::new(3841, 2161),
        ];
        let images = [(1, 1), (399, 301), (640, 480), (4000, 3000)];
        for screen in screens {
            for (w, h) in images {
                let p = Placement::centered(w, h, screen);
                let window_cx2 = 2 * i64::from(p.x) + i64::from(p.width);
                let window_cy2 = 2 * i64::from(p.y) + i64::from(p.height);
                assert!((window_cx2 - i64::from(screen.width)).abs() <= 1);
                assert!((window_cy2 - i64::from(screen.height)).abs() <= 1);
            }
        }
    }

    #[test]
    fn oversized_image_gets_negative_origin() {
        let placement = Placement::centered(3000, 2000, ScreenSize::new(1920, 1080));
        assert!(placement.x == -540);
        assert!(placement.y == -460);
    }

    #[test]
    fn default_config_is_an_unfocusable_click_through_float() {
        let config = OverlayConfig::default();
        assert!(config.click_through);
        assert!(!config.accepts_focus);
        assert!(config.layer == Layer::Top);
        assert!(config.keyboard_interactivity() == KeyboardInteractivity::None);
        assert!(config.fallback_screen == ScreenSize::new(1920, 1080));
    }
}
