// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Aircraft marker icons.
//!
//! Icons are rasterised from an SVG airplane silhouette once per
//! `(size, style)` and shared afterwards. The silhouette points east, so a
//! marker's rotation is its track minus 90 degrees.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use resvg::tiny_skia::{Pixmap, Transform};
use thiserror::Error;

/// Icon edge length at scale 1.0.
pub const BASE_ICON_SIZE: f32 = 75.0;
pub const MIN_ICON_SIZE: u32 = 24;
pub const MAX_ICON_SIZE: u32 = 200;

/// Airplane silhouette in a 24x24 box, nose pointing east.
const AIRPLANE_PATH: &str = "M21 16v-2l-8-5V3.5c0-.83-.67-1.5-1.5-1.5S10 2.67 10 3.5V9l-8 5v2l8-2.5V19l-2 1.5V22l3.5-1 3.5 1v-1.5L13 19v-5.5l8 2.5z";

#[derive(Debug, Error)]
pub enum IconError {
    #[error("invalid icon SVG: {0}")]
    Svg(#[from] usvg::Error),

    #[error("cannot allocate {0}x{0} pixmap")]
    Pixmap(u32),
}

/// Visual variant of a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IconStyle {
    Selected,
    Favorite,
    DefaultDark,
    DefaultLight,
}

impl IconStyle {
    /// The plain style for the current theme.
    #[must_use]
    pub fn default_for(dark_theme: bool) -> Self {
        if dark_theme {
            Self::DefaultDark
        } else {
            Self::DefaultLight
        }
    }

    fn fill(self) -> &'static str {
        match self {
            Self::Selected => "#e53935",
            Self::Favorite => "#ffb300",
            Self::DefaultDark => "#eceff1",
            Self::DefaultLight => "#263238",
        }
    }

    fn outline(self) -> &'static str {
        match self {
            Self::DefaultDark => "#263238",
            _ => "#ffffff",
        }
    }
}

/// Icon edge length in pixels for a preference scale.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    reason = "value is clamped to the icon size range first"
)]
pub fn icon_size(scale: f32) -> u32 {
    if !scale.is_finite() {
        return BASE_ICON_SIZE as u32;
    }
    let size = (BASE_ICON_SIZE * scale).round();
    size.clamp(MIN_ICON_SIZE as f32, MAX_ICON_SIZE as f32) as u32
}

/// A rasterised icon: `size * size` premultiplied RGBA pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconBitmap {
    pub size: u32,
    pub style: IconStyle,
    pub rgba: Vec<u8>,
}

impl IconBitmap {
    /// RGBA of the pixel at `(x, y)`.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.size || y >= self.size {
            return None;
        }
        let offset = ((y * self.size + x) * 4) as usize;
        let px = self.rgba.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// Per-(size, style) icon cache.
#[derive(Debug, Default)]
pub struct IconCache {
    icons: HashMap<(u32, IconStyle), Arc<IconBitmap>>,
    rasterized: usize,
}

impl IconCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the icon, rasterising it on first use.
    pub fn get(&mut self, size: u32, style: IconStyle) -> Result<Arc<IconBitmap>, IconError> {
        let size = size.clamp(MIN_ICON_SIZE, MAX_ICON_SIZE);
        if let Some(icon) = self.icons.get(&(size, style)) {
            return Ok(Arc::clone(icon));
        }

        let icon = Arc::new(rasterize(size, style)?);
        self.rasterized += 1;
        debug!("Rasterised {:?} icon at {}px", style, size);
        self.icons.insert((size, style), Arc::clone(&icon));
        Ok(icon)
    }

    /// Number of rasterisations performed so far.
    #[must_use]
    pub fn rasterized(&self) -> usize {
        self.rasterized
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.icons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }
}

fn airplane_svg(style: IconStyle) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="0 0 24 24">
  <g transform="rotate(90 12 12)">
    <path d="{AIRPLANE_PATH}" fill="{}" stroke="{}" stroke-width="0.6" stroke-linejoin="round"/>
  </g>
</svg>"#,
        style.fill(),
        style.outline()
    )
}

#[allow(clippy::cast_precision_loss, reason = "icon sizes are at most 200")]
fn rasterize(size: u32, style: IconStyle) -> Result<IconBitmap, IconError> {
    let tree = usvg::Tree::from_str(&airplane_svg(style), &usvg::Options::default())?;
    let mut pixmap = Pixmap::new(size, size).ok_or(IconError::Pixmap(size))?;

    let tree_size = tree.size();
    let transform = Transform::from_scale(
        size as f32 / tree_size.width(),
        size as f32 / tree_size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    Ok(IconBitmap {
        size,
        style,
        rgba: pixmap.take(),
    })
}
