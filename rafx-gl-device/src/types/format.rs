#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// Engine-level pixel format. How each format is represented on the GPU depends on the API tier
/// and extensions of the active context, see `RafxFormatTable`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxPixelFormat {
    A8,
    L8,
    LA8,
    Rgb565,
    Rgba5551,
    Rgba4,
    Rgb8,
    Rgba8,
    Dxt1,
    Dxt3,
    Dxt5,
    Etc1,
    Etc2Rgb,
    Etc2Rgba,
    Pvrtc2BppRgb,
    Pvrtc2BppRgba,
    Pvrtc4BppRgb,
    Pvrtc4BppRgba,
    Astc4x4,
    Rgb16F,
    Rgba16F,
    Rgb32F,
    Rgba32F,
    R32F,
    R11G11B10F,
    Depth,
    DepthStencil,
    Srgb,
    Srgba,
    /// Byte-order swapped RGBA. Not representable by the GL family, translation always fails.
    Bgra8,
}

/// Block dimensions of a compressed format
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RafxBlockInfo {
    pub block_width: u32,
    pub block_height: u32,
    pub block_size: u32,
    pub min_width: u32,
    pub min_height: u32,
}

impl RafxPixelFormat {
    pub const ALL: [RafxPixelFormat; 30] = [
        RafxPixelFormat::A8,
        RafxPixelFormat::L8,
        RafxPixelFormat::LA8,
        RafxPixelFormat::Rgb565,
        RafxPixelFormat::Rgba5551,
        RafxPixelFormat::Rgba4,
        RafxPixelFormat::Rgb8,
        RafxPixelFormat::Rgba8,
        RafxPixelFormat::Dxt1,
        RafxPixelFormat::Dxt3,
        RafxPixelFormat::Dxt5,
        RafxPixelFormat::Etc1,
        RafxPixelFormat::Etc2Rgb,
        RafxPixelFormat::Etc2Rgba,
        RafxPixelFormat::Pvrtc2BppRgb,
        RafxPixelFormat::Pvrtc2BppRgba,
        RafxPixelFormat::Pvrtc4BppRgb,
        RafxPixelFormat::Pvrtc4BppRgba,
        RafxPixelFormat::Astc4x4,
        RafxPixelFormat::Rgb16F,
        RafxPixelFormat::Rgba16F,
        RafxPixelFormat::Rgb32F,
        RafxPixelFormat::Rgba32F,
        RafxPixelFormat::R32F,
        RafxPixelFormat::R11G11B10F,
        RafxPixelFormat::Depth,
        RafxPixelFormat::DepthStencil,
        RafxPixelFormat::Srgb,
        RafxPixelFormat::Srgba,
        RafxPixelFormat::Bgra8,
    ];

    pub fn is_compressed(self) -> bool {
        self.block_info().is_some()
    }

    pub fn is_depth(self) -> bool {
        match self {
            RafxPixelFormat::Depth | RafxPixelFormat::DepthStencil => true,
            _ => false,
        }
    }

    pub fn has_stencil(self) -> bool {
        self == RafxPixelFormat::DepthStencil
    }

    pub fn is_half_float(self) -> bool {
        match self {
            RafxPixelFormat::Rgb16F | RafxPixelFormat::Rgba16F => true,
            _ => false,
        }
    }

    pub fn is_float(self) -> bool {
        match self {
            RafxPixelFormat::Rgb32F
            | RafxPixelFormat::Rgba32F
            | RafxPixelFormat::R32F
            | RafxPixelFormat::R11G11B10F => true,
            _ => false,
        }
    }

    pub fn is_srgb(self) -> bool {
        match self {
            RafxPixelFormat::Srgb | RafxPixelFormat::Srgba => true,
            _ => false,
        }
    }

    /// Bytes per pixel of an uncompressed format, as stored on the GPU. 24-bit formats are
    /// counted as 32-bit since drivers pad them.
    pub fn pixel_size(self) -> Option<u32> {
        let size = match self {
            RafxPixelFormat::A8 | RafxPixelFormat::L8 => 1,
            RafxPixelFormat::LA8
            | RafxPixelFormat::Rgb565
            | RafxPixelFormat::Rgba5551
            | RafxPixelFormat::Rgba4 => 2,
            RafxPixelFormat::Rgb8
            | RafxPixelFormat::Rgba8
            | RafxPixelFormat::Srgb
            | RafxPixelFormat::Srgba
            | RafxPixelFormat::Bgra8
            | RafxPixelFormat::R32F
            | RafxPixelFormat::R11G11B10F
            | RafxPixelFormat::Depth
            | RafxPixelFormat::DepthStencil => 4,
            RafxPixelFormat::Rgb16F | RafxPixelFormat::Rgba16F => 8,
            RafxPixelFormat::Rgb32F | RafxPixelFormat::Rgba32F => 16,
            _ => return None,
        };

        Some(size)
    }

    pub fn block_info(self) -> Option<RafxBlockInfo> {
        let (block_width, block_height, block_size, min_width, min_height) = match self {
            RafxPixelFormat::Dxt1 | RafxPixelFormat::Etc1 | RafxPixelFormat::Etc2Rgb => {
                (4, 4, 8, 1, 1)
            }
            RafxPixelFormat::Dxt3
            | RafxPixelFormat::Dxt5
            | RafxPixelFormat::Etc2Rgba
            | RafxPixelFormat::Astc4x4 => (4, 4, 16, 1, 1),
            RafxPixelFormat::Pvrtc2BppRgb | RafxPixelFormat::Pvrtc2BppRgba => (8, 4, 8, 16, 8),
            RafxPixelFormat::Pvrtc4BppRgb | RafxPixelFormat::Pvrtc4BppRgba => (4, 4, 8, 8, 8),
            _ => return None,
        };

        Some(RafxBlockInfo {
            block_width,
            block_height,
            block_size,
            min_width,
            min_height,
        })
    }

    /// Size in bytes of a single mip level of the given dimensions
    pub fn level_size(
        self,
        width: u32,
        height: u32,
        depth: u32,
    ) -> u64 {
        if let Some(pixel_size) = self.pixel_size() {
            return width as u64 * height as u64 * depth as u64 * pixel_size as u64;
        }

        if let Some(block) = self.block_info() {
            let width = width.max(block.min_width);
            let height = height.max(block.min_height);
            let blocks_x = (width + block.block_width - 1) / block.block_width;
            let blocks_y = (height + block.block_height - 1) / block.block_height;
            return blocks_x as u64 * blocks_y as u64 * depth as u64 * block.block_size as u64;
        }

        0
    }
}

impl Default for RafxPixelFormat {
    fn default() -> Self {
        RafxPixelFormat::Rgba8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_format_has_a_size() {
        for &format in RafxPixelFormat::ALL.iter() {
            assert!(
                format.pixel_size().is_some() || format.block_info().is_some(),
                "{:?} has neither a pixel nor a block size",
                format
            );
        }
    }

    #[test]
    fn compressed_level_sizes() {
        assert_eq!(RafxPixelFormat::Dxt1.level_size(4, 4, 1), 8);
        assert_eq!(RafxPixelFormat::Dxt5.level_size(8, 8, 1), 64);
        // Smaller than one block still occupies a full block
        assert_eq!(RafxPixelFormat::Dxt1.level_size(1, 1, 1), 8);
        // PVRTC has a minimum footprint
        assert_eq!(RafxPixelFormat::Pvrtc4BppRgba.level_size(1, 1, 1), 32);
        assert_eq!(RafxPixelFormat::Pvrtc2BppRgb.level_size(1, 1, 1), 32);
    }

    #[test]
    fn uncompressed_level_sizes() {
        assert_eq!(RafxPixelFormat::Rgba8.level_size(16, 16, 1), 1024);
        assert_eq!(RafxPixelFormat::Rgba32F.level_size(2, 2, 2), 128);
        assert_eq!(RafxPixelFormat::LA8.level_size(3, 5, 1), 30);
    }
}
