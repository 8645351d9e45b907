//! unitsync 返回的地图图像
//!
//! 小地图、金属图、高度图统一转换为 RGB888，可导出为 PPM。

use std::io::Write;
use std::path::Path;

use crate::error::Result;

/// 高度图配色，按高度在相邻两色之间线性插值
const HEIGHT_PALETTE: [[u8; 3]; 6] = [
    [0, 0, 0],
    [0, 0, 255],
    [0, 255, 255],
    [0, 255, 0],
    [255, 255, 0],
    [255, 0, 0],
];

/// RGB888 图像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSyncImage {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl UnitSyncImage {
    /// 黑色图像
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * 3],
        }
    }

    /// RGB565 小地图
    pub fn from_rgb565(width: usize, height: usize, colours: &[u16]) -> Self {
        let mut image = Self::new(width, height);
        for (pixel, &c) in image.data.chunks_exact_mut(3).zip(colours) {
            pixel[0] = ((c >> 11) as f64 / 31.0 * 255.0) as u8;
            pixel[1] = (((c >> 5) & 63) as f64 / 63.0 * 255.0) as u8;
            pixel[2] = ((c & 31) as f64 / 31.0 * 255.0) as u8;
        }
        image
    }

    /// 8 位金属图，写入绿色通道
    pub fn from_metal(width: usize, height: usize, values: &[u8]) -> Self {
        let mut image = Self::new(width, height);
        for (pixel, &v) in image.data.chunks_exact_mut(3).zip(values) {
            pixel[1] = v;
        }
        image
    }

    /// 16 位高度图
    ///
    /// 高度全部相同时没有信息可画，返回 1x1 的黑色图像。
    pub fn from_heights(width: usize, height: usize, heights: &[u16]) -> Self {
        let (Some(&min), Some(&max)) = (heights.iter().min(), heights.iter().max()) else {
            return Self::new(1, 1);
        };
        if min == max {
            return Self::new(1, 1);
        }

        let mut image = Self::new(width, height);
        let range = (max - min) as f64 + 1.0;
        let step = range / (HEIGHT_PALETTE.len() - 1) as f64;
        for (pixel, &h) in image.data.chunks_exact_mut(3).zip(heights) {
            let value = (h - min) as f64 / step;
            let idx = value as usize;
            let t = (256.0 * value.fract()) as u32;
            let (from, to) = (HEIGHT_PALETTE[idx], HEIGHT_PALETTE[idx + 1]);
            for j in 0..3 {
                pixel[j] = ((from[j] as u32 * (255 - t) + to[j] as u32 * t) / 255) as u8;
            }
        }
        image
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// 按行排列的 RGB 数据
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 3;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    /// 写出二进制 PPM (P6)
    pub fn write_ppm<W: Write>(&self, mut out: W) -> Result<()> {
        write!(out, "P6\n{} {}\n255\n", self.width, self.height)?;
        out.write_all(&self.data)?;
        Ok(())
    }

    pub fn save_ppm(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_ppm(std::io::BufWriter::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb565_conversion() {
        let image = UnitSyncImage::from_rgb565(3, 1, &[0xFFFF, 0xF800, 0x07E0]);
        assert_eq!(image.pixel(0, 0), Some([255, 255, 255]));
        assert_eq!(image.pixel(1, 0), Some([255, 0, 0]));
        assert_eq!(image.pixel(2, 0), Some([0, 255, 0]));
        assert_eq!(image.pixel(3, 0), None);
    }

    #[test]
    fn test_metal_goes_to_green() {
        let image = UnitSyncImage::from_metal(2, 1, &[0, 200]);
        assert_eq!(image.pixel(0, 0), Some([0, 0, 0]));
        assert_eq!(image.pixel(1, 0), Some([0, 200, 0]));
    }

    #[test]
    fn test_flat_heightmap_is_one_pixel() {
        let image = UnitSyncImage::from_heights(4, 4, &[7; 16]);
        assert_eq!((image.width(), image.height()), (1, 1));
        assert_eq!(image.data(), &[0, 0, 0]);
    }

    #[test]
    fn test_heightmap_palette() {
        // 范围 0..=99，每段 20
        let heights: Vec<u16> = vec![0, 20, 40, 99];
        let image = UnitSyncImage::from_heights(4, 1, &heights);
        assert_eq!(image.pixel(0, 0), Some([0, 0, 0]));
        assert_eq!(image.pixel(1, 0), Some([0, 0, 255]));
        assert_eq!(image.pixel(2, 0), Some([0, 255, 255]));
        // 最高点靠近红色端
        let [r, g, b] = image.pixel(3, 0).unwrap();
        assert_eq!((r, b), (255, 0));
        assert!(g < 20);
    }

    #[test]
    fn test_write_ppm() {
        let image = UnitSyncImage::from_metal(1, 1, &[9]);
        let mut out = Vec::new();
        image.write_ppm(&mut out).unwrap();
        assert_eq!(out, b"P6\n1 1\n255\n\x00\x09\x00");
    }

    #[test]
    fn test_save_ppm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("minimap.ppm");
        UnitSyncImage::new(2, 2).save_ppm(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), "P6\n2 2\n255\n".len() + 12);
    }
}
