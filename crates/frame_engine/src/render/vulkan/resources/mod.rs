//! GPU resources owning device memory

pub mod buffer;
pub mod image;
pub mod texture;

pub use buffer::{DeviceBuffer, HostBuffer};
pub use image::{
    check_uploadable, image_staging_size, layout_transition, mip_blit_chain, mip_level_count, texel_size, Image, ImageInfo,
    ImageLayout, LayoutTransition, MipBlit,
};
pub use texture::{Sampler, Texture};
