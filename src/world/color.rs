// src/world/color.rs
//! Map colour palette, brightness tiers and packed ARGB helpers

/// Packed `0xAARRGGBB` value meaning "nothing to draw here".
pub const NO_DATA: u32 = 0;

/// Shading level applied to a base map colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Brightness {
    Low,
    Normal,
    High,
    Lowest,
}

impl Brightness {
    /// Channel multiplier out of 255.
    pub fn modifier(self) -> u32 {
        match self {
            Brightness::Low => 180,
            Brightness::Normal => 220,
            Brightness::High => 255,
            Brightness::Lowest => 135,
        }
    }
}

/// Base colour a block contributes to a top-down map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapColor {
    pub id: u8,
    pub rgb: u32,
}

impl MapColor {
    pub const NONE: MapColor = MapColor { id: 0, rgb: 0x000000 };
    pub const GRASS: MapColor = MapColor { id: 1, rgb: 0x7FB238 };
    pub const SAND: MapColor = MapColor { id: 2, rgb: 0xF7E9A3 };
    pub const WOOL: MapColor = MapColor { id: 3, rgb: 0xC7C7C7 };
    pub const FIRE: MapColor = MapColor { id: 4, rgb: 0xFF0000 };
    pub const ICE: MapColor = MapColor { id: 5, rgb: 0xA0A0FF };
    pub const METAL: MapColor = MapColor { id: 6, rgb: 0xA7A7A7 };
    pub const PLANT: MapColor = MapColor { id: 7, rgb: 0x007C00 };
    pub const SNOW: MapColor = MapColor { id: 8, rgb: 0xFFFFFF };
    pub const CLAY: MapColor = MapColor { id: 9, rgb: 0xA4A8B8 };
    pub const DIRT: MapColor = MapColor { id: 10, rgb: 0x976D4D };
    pub const STONE: MapColor = MapColor { id: 11, rgb: 0x707070 };
    pub const WATER: MapColor = MapColor { id: 12, rgb: 0x4040FF };
    pub const WOOD: MapColor = MapColor { id: 13, rgb: 0x8F7748 };
    pub const QUARTZ: MapColor = MapColor { id: 14, rgb: 0xFFFCF5 };
    pub const COLOR_ORANGE: MapColor = MapColor { id: 15, rgb: 0xD87F33 };
    pub const COLOR_GRAY: MapColor = MapColor { id: 21, rgb: 0x4C4C4C };
    pub const COLOR_BROWN: MapColor = MapColor { id: 26, rgb: 0x664C33 };
    pub const COLOR_GREEN: MapColor = MapColor { id: 27, rgb: 0x667F33 };
    pub const COLOR_BLACK: MapColor = MapColor { id: 29, rgb: 0x191919 };
    pub const NETHER: MapColor = MapColor { id: 35, rgb: 0x700200 };

    pub fn is_none(self) -> bool {
        self.id == Self::NONE.id
    }

    /// Final opaque pixel for this colour at the given brightness; `NONE` has no pixel.
    pub fn argb(self, brightness: Brightness) -> u32 {
        if self.is_none() {
            return NO_DATA;
        }
        let m = brightness.modifier();
        let r = red(self.rgb) * m / 255;
        let g = green(self.rgb) * m / 255;
        let b = blue(self.rgb) * m / 255;
        color(255, r, g, b)
    }
}

pub fn alpha(color: u32) -> u32 {
    color >> 24
}

pub fn red(color: u32) -> u32 {
    (color >> 16) & 0xFF
}

pub fn green(color: u32) -> u32 {
    (color >> 8) & 0xFF
}

pub fn blue(color: u32) -> u32 {
    color & 0xFF
}

pub fn color(alpha: u32, red: u32, green: u32, blue: u32) -> u32 {
    (alpha & 0xFF) << 24 | (red & 0xFF) << 16 | (green & 0xFF) << 8 | (blue & 0xFF)
}

pub fn opaque(color: u32) -> u32 {
    color | 0xFF00_0000
}

/// Split a packed ARGB value into RGBA byte order.
pub fn to_rgba(color: u32) -> [u8; 4] {
    [red(color) as u8, green(color) as u8, blue(color) as u8, alpha(color) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brightness_scaling() {
        // 0x70 * 220 / 255 = 96
        assert_eq!(MapColor::STONE.argb(Brightness::Normal), 0xFF60_6060);
        assert_eq!(MapColor::STONE.argb(Brightness::High), 0xFF70_7070);
        assert_eq!(MapColor::STONE.argb(Brightness::Low), 0xFF4F_4F4F);
    }

    #[test]
    fn test_none_has_no_pixel() {
        assert_eq!(MapColor::NONE.argb(Brightness::High), NO_DATA);
    }

    #[test]
    fn test_channel_packing() {
        let c = color(0x12, 0x34, 0x56, 0x78);
        assert_eq!(c, 0x1234_5678);
        assert_eq!((alpha(c), red(c), green(c), blue(c)), (0x12, 0x34, 0x56, 0x78));
        assert_eq!(to_rgba(c), [0x34, 0x56, 0x78, 0x12]);
        assert_eq!(opaque(0x0011_2233), 0xFF11_2233);
    }
}
