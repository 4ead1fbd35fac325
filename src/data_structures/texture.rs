//! Uploaded 2D textures.
//!
//! A [`Texture`] is an RGBA8 image living on the device, sampled with linear
//! filtering and repeat wrapping on both axes. It is immutable after upload.

use anyhow::*;
use image::{GenericImageView, ImageFormat, load_from_memory_with_format};
use log::debug;

use crate::{
    context::GraphicsContext,
    device::{Device, TextureId},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Texture {
    id: TextureId,
    width: u32,
    height: u32,
}

impl Texture {
    /// Decodes an encoded image (PNG, JPEG) and uploads it.
    ///
    /// # Arguments
    ///
    /// * `bytes` are the raw file contents
    /// * `format` is an optional file extension hint (e.g. "png"). If None, the
    ///   format is guessed from the data.
    pub fn from_bytes<D: Device>(
        ctx: &mut GraphicsContext<D>,
        bytes: &[u8],
        format: Option<&str>,
    ) -> Result<Self> {
        let img = match format {
            None => image::load_from_memory(bytes)?,
            Some(ext) => {
                let format = ImageFormat::from_extension(ext)
                    .with_context(|| format!("unknown image format {ext:?}"))?;
                load_from_memory_with_format(bytes, format)?
            }
        };
        Ok(Self::from_image(ctx, &img))
    }

    pub fn from_image<D: Device>(ctx: &mut GraphicsContext<D>, img: &image::DynamicImage) -> Self {
        let (width, height) = img.dimensions();
        Self::upload(ctx, width, height, &img.to_rgba8())
    }

    pub fn from_rgba<D: Device>(ctx: &mut GraphicsContext<D>, img: &image::RgbaImage) -> Self {
        Self::upload(ctx, img.width(), img.height(), img.as_raw())
    }

    fn upload<D: Device>(ctx: &mut GraphicsContext<D>, width: u32, height: u32, rgba: &[u8]) -> Self {
        let id = ctx.device_mut().create_texture(width, height, rgba);
        debug!("uploaded {width}x{height} texture");
        Self { id, width, height }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::device::{Command, Recorder};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn decoded_images_are_uploaded_with_their_size() {
        let mut ctx = GraphicsContext::create_surface(Recorder::new(8, 8), 8, 8);
        let texture = Texture::from_bytes(&mut ctx, &png(3, 2), Some("png")).unwrap();
        assert_eq!((texture.width(), texture.height()), (3, 2));
        assert!(ctx.device().commands().contains(&Command::CreateTexture {
            texture: texture.id(),
            width: 3,
            height: 2
        }));
    }

    #[test]
    fn format_is_guessed_without_a_hint() {
        let mut ctx = GraphicsContext::create_surface(Recorder::new(8, 8), 8, 8);
        assert!(Texture::from_bytes(&mut ctx, &png(1, 1), None).is_ok());
    }

    #[test]
    fn garbage_fails_to_decode() {
        let mut ctx = GraphicsContext::create_surface(Recorder::new(8, 8), 8, 8);
        assert!(Texture::from_bytes(&mut ctx, b"not an image", None).is_err());
        assert!(Texture::from_bytes(&mut ctx, &png(1, 1), Some("nope")).is_err());
    }
}
