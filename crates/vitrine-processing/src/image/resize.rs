use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

/// Stretch mode for width-bound resizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StretchMode {
    On, // Allow upscaling
    #[default]
    Off, // Clamp the target to the original width
}

/// Image resize operations
pub struct ImageResize;

impl ImageResize {
    /// Target dimensions for a width-bound variant, keeping the aspect ratio.
    pub fn calculate_dimensions(
        orig_width: u32,
        orig_height: u32,
        target_width: u32,
        stretch_mode: StretchMode,
    ) -> (u32, u32) {
        if orig_width == 0 || orig_height == 0 {
            return (orig_width, orig_height);
        }
        let width = match stretch_mode {
            StretchMode::On => target_width.max(1),
            StretchMode::Off => target_width.clamp(1, orig_width),
        };
        if width == orig_width {
            return (orig_width, orig_height);
        }
        let aspect_ratio = orig_height as f64 / orig_width as f64;
        let height = (width as f64 * aspect_ratio).round() as u32;
        (width, height.max(1))
    }

    /// Select appropriate filter type based on resize ratio
    pub fn select_filter(orig_width: u32, orig_height: u32, new_width: u32, new_height: u32) -> FilterType {
        let width_ratio = orig_width as f32 / new_width.max(1) as f32;
        let height_ratio = orig_height as f32 / new_height.max(1) as f32;
        let max_ratio = width_ratio.max(height_ratio);

        if max_ratio > 2.0 {
            FilterType::Triangle
        } else if max_ratio > 1.5 {
            FilterType::CatmullRom
        } else {
            FilterType::Lanczos3
        }
    }

    /// Resize to the given width. The image is returned unchanged when no scaling is needed.
    pub fn resize_to_width(img: &DynamicImage, target_width: u32, stretch_mode: StretchMode) -> DynamicImage {
        let (orig_width, orig_height) = img.dimensions();
        let (width, height) =
            Self::calculate_dimensions(orig_width, orig_height, target_width, stretch_mode);
        if (width, height) == (orig_width, orig_height) {
            return img.clone();
        }
        let filter = Self::select_filter(orig_width, orig_height, width, height);
        img.resize_exact(width, height, filter)
    }
}
