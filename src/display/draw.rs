// src/display/draw.rs
//! Draw commands emitted by the map views, and a CPU compositor for them

use crate::map::{MemorySurface, SurfaceHandle, TILE_SIZE};
use crate::world::color::{alpha, blue, color, green, red, to_rgba};
use glam::{DAffine2, DMat2, DVec2};
use image::{Rgba, RgbaImage};

/// Approximate glyph metrics used to size labels and markers.
pub const CHAR_WIDTH: f64 = 6.0;
pub const LINE_HEIGHT: f64 = 9.0;

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// Restrict following commands to a screen rectangle, or lift the restriction.
    Scissor(Option<(DVec2, DVec2)>),
    /// Draw a published surface. `transform` maps texel coordinates to the screen.
    Surface {
        handle: SurfaceHandle,
        size: DVec2,
        transform: DAffine2,
    },
    Fill {
        min: DVec2,
        max: DVec2,
        color: u32,
    },
    Outline {
        min: DVec2,
        max: DVec2,
        color: u32,
    },
    /// Text on a filled box. The compositor only draws the box.
    Label {
        center: DVec2,
        half_size: DVec2,
        background: u32,
        text: String,
    },
    /// Viewer arrow; `heading` 0 points up the screen.
    Arrow {
        center: DVec2,
        heading: f64,
        size: f64,
    },
}

#[derive(Debug, Clone, Default)]
pub struct DrawList {
    pub commands: Vec<DrawCommand>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    /// Surface commands in draw order.
    pub fn surfaces(&self) -> impl Iterator<Item = SurfaceHandle> + '_ {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Surface { handle, .. } => Some(*handle),
            _ => None,
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Label { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Half extents of a label box for `text`, padded by `pad` on each side.
pub fn label_half_size(text: &str, pad: f64) -> DVec2 {
    DVec2::new(text.chars().count() as f64 * CHAR_WIDTH / 2.0 + pad, LINE_HEIGHT / 2.0 + pad)
}

/// Paint `list` onto a `width x height` image, reading surfaces from `surfaces`.
pub fn composite(list: &DrawList, surfaces: &MemorySurface, width: u32, height: u32, background: u32) -> RgbaImage {
    let mut canvas = Canvas {
        image: RgbaImage::from_pixel(width, height, Rgba(to_rgba(background))),
        clip: (DVec2::ZERO, DVec2::new(width as f64, height as f64)),
    };
    let full = canvas.clip;

    for command in &list.commands {
        match command {
            DrawCommand::Scissor(rect) => canvas.clip = rect.unwrap_or(full),
            DrawCommand::Surface {
                handle,
                size,
                transform,
            } => match surfaces.texture(*handle) {
                Some(texture) => canvas.blit(texture, *size, transform),
                None => log::debug!("Skipping released surface {:?}", handle),
            },
            DrawCommand::Fill { min, max, color } => canvas.fill(*min, *max, *color),
            DrawCommand::Outline { min, max, color } => {
                canvas.fill(*min, DVec2::new(max.x, min.y + 1.0), *color);
                canvas.fill(DVec2::new(min.x, max.y - 1.0), *max, *color);
                canvas.fill(*min, DVec2::new(min.x + 1.0, max.y), *color);
                canvas.fill(DVec2::new(max.x - 1.0, min.y), *max, *color);
            }
            DrawCommand::Label {
                center,
                half_size,
                background,
                ..
            } => canvas.fill(*center - *half_size, *center + *half_size, *background),
            DrawCommand::Arrow { center, heading, size } => canvas.arrow(*center, *heading, *size),
        }
    }
    canvas.image
}

struct Canvas {
    image: RgbaImage,
    clip: (DVec2, DVec2),
}

impl Canvas {
    // Pixel range covered by [min, max) after clipping.
    fn span(&self, min: DVec2, max: DVec2) -> Option<(u32, u32, u32, u32)> {
        let lo = min.max(self.clip.0).max(DVec2::ZERO);
        let hi = max
            .min(self.clip.1)
            .min(DVec2::new(self.image.width() as f64, self.image.height() as f64));
        if lo.x >= hi.x || lo.y >= hi.y {
            return None;
        }
        Some((lo.x.floor() as u32, lo.y.floor() as u32, hi.x.ceil() as u32, hi.y.ceil() as u32))
    }

    fn put(&mut self, x: u32, y: u32, argb: u32) {
        let a = alpha(argb);
        if a == 0 {
            return;
        }
        let pixel = self.image.get_pixel_mut(x, y);
        if a == 255 {
            *pixel = Rgba(to_rgba(argb));
            return;
        }
        let [r, g, b, _] = pixel.0;
        let mix = |src: u32, dst: u8| (src * a + dst as u32 * (255 - a)) / 255;
        let blended = color(255, mix(red(argb), r), mix(green(argb), g), mix(blue(argb), b));
        *pixel = Rgba(to_rgba(blended));
    }

    fn fill(&mut self, min: DVec2, max: DVec2, argb: u32) {
        let Some((x0, y0, x1, y1)) = self.span(min, max) else {
            return;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                self.put(x, y, argb);
            }
        }
    }

    fn blit(&mut self, texture: &crate::map::PixelBuffer, size: DVec2, transform: &DAffine2) {
        let corners = [DVec2::ZERO, DVec2::new(size.x, 0.0), size, DVec2::new(0.0, size.y)]
            .map(|c| transform.transform_point2(c));
        let min = corners.iter().fold(DVec2::splat(f64::MAX), |a, c| a.min(*c));
        let max = corners.iter().fold(DVec2::splat(f64::MIN), |a, c| a.max(*c));
        let Some((x0, y0, x1, y1)) = self.span(min, max) else {
            return;
        };

        let inverse = transform.inverse();
        let texel_scale = DVec2::new(texture.width() as f64 / size.x, texture.height() as f64 / size.y);
        for y in y0..y1 {
            for x in x0..x1 {
                let local = inverse.transform_point2(DVec2::new(x as f64 + 0.5, y as f64 + 0.5));
                if local.x < 0.0 || local.y < 0.0 || local.x >= size.x || local.y >= size.y {
                    continue;
                }
                let texel = local * texel_scale;
                let argb = texture.get(texel.x as usize, texel.y as usize);
                self.put(x, y, argb);
            }
        }
    }

    fn arrow(&mut self, center: DVec2, heading: f64, size: f64) {
        let rotation = DMat2::from_angle(heading);
        let half = size / 2.0;
        let tip = center + rotation * DVec2::new(0.0, -half);
        let left = center + rotation * DVec2::new(-half * 0.8, half);
        let right = center + rotation * DVec2::new(half * 0.8, half);
        let notch = center + rotation * DVec2::new(0.0, half * 0.4);

        let min = tip.min(left).min(right);
        let max = tip.max(left).max(right);
        let Some((x0, y0, x1, y1)) = self.span(min, max) else {
            return;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                let p = DVec2::new(x as f64 + 0.5, y as f64 + 0.5);
                if in_triangle(p, tip, left, notch) || in_triangle(p, tip, notch, right) {
                    self.put(x, y, 0xFFFF_FFFF);
                }
            }
        }
    }
}

fn in_triangle(p: DVec2, a: DVec2, b: DVec2, c: DVec2) -> bool {
    let side = |u: DVec2, v: DVec2| (v - u).perp_dot(p - u);
    let (d1, d2, d3) = (side(a, b), side(b, c), side(c, a));
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

/// Texel size of a map tile surface.
pub fn tile_size() -> DVec2 {
    DVec2::splat(TILE_SIZE as f64)
}
