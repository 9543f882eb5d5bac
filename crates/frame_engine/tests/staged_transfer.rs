//! Staged transfer tests against a real device
//!
//! These need a Vulkan driver and are ignored by default:
//! `cargo test -p frame_engine -- --ignored`

use ash::vk;
use frame_engine::prelude::*;
use frame_engine::render::vulkan::resources::mip_level_count;
use std::sync::Arc;

fn headless_device() -> Arc<Device> {
    Device::headless(&RendererConfig::new("frame_engine tests")).expect("headless device")
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_buffer_round_trip() {
    let device = headless_device();
    let buffer = DeviceBuffer::vertex(Arc::clone(&device), 4096).unwrap();
    let mut staged = StagedTransfer::new(Arc::clone(&device), buffer).unwrap();
    assert_eq!(staged.staging_size(), 4096);

    let data = pattern(4096, 7);
    staged.update_buffer(&data).unwrap();
    staged.transfer_buffer(None).unwrap();

    assert_eq!(staged.destination().read_back().unwrap(), data);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_repeated_transfer_is_idempotent() {
    let device = headless_device();
    let buffer = DeviceBuffer::uniform(Arc::clone(&device), 256).unwrap();
    let mut staged = StagedTransfer::new(Arc::clone(&device), buffer).unwrap();

    let data = pattern(256, 3);
    staged.upload(&data).unwrap();
    staged.transfer_buffer(None).unwrap();
    staged.transfer_buffer(None).unwrap();

    assert_eq!(staged.destination().read_back().unwrap(), data);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_last_update_wins() {
    let device = headless_device();
    let buffer = DeviceBuffer::index(Arc::clone(&device), 64).unwrap();
    let mut staged = StagedTransfer::new(Arc::clone(&device), buffer).unwrap();

    staged.update::<u32>(&[1; 16]).unwrap();
    staged.update::<u32>(&[9; 16]).unwrap();
    staged.transfer_buffer(None).unwrap();

    let read: Vec<u32> = bytemuck::cast_slice(&staged.destination().read_back().unwrap()).to_vec();
    assert_eq!(read, vec![9; 16]);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_batched_transfers_share_one_submission() {
    let device = headless_device();
    let mut first = StagedTransfer::new(Arc::clone(&device), DeviceBuffer::vertex(Arc::clone(&device), 128).unwrap()).unwrap();
    let mut second = StagedTransfer::new(Arc::clone(&device), DeviceBuffer::vertex(Arc::clone(&device), 512).unwrap()).unwrap();
    let (a, b) = (pattern(128, 1), pattern(512, 2));
    first.update_buffer(&a).unwrap();
    second.update_buffer(&b).unwrap();

    let command_buffer = device.begin_single_use_command_buffer().unwrap();
    first.transfer_buffer(Some(command_buffer.handle())).unwrap();
    second.transfer_buffer(Some(command_buffer.handle())).unwrap();
    command_buffer.end().unwrap();

    assert_eq!(first.destination().read_back().unwrap(), a);
    assert_eq!(second.destination().read_back().unwrap(), b);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_oversized_update_is_rejected() {
    let device = headless_device();
    let buffer = DeviceBuffer::vertex(Arc::clone(&device), 16).unwrap();
    let mut staged = StagedTransfer::new(Arc::clone(&device), buffer).unwrap();

    match staged.update_buffer(&[0u8; 17]) {
        Err(VulkanError::StagingOverflow { requested, capacity }) => {
            assert_eq!(requested, 17);
            assert_eq!(capacity, 16);
        }
        other => panic!("expected StagingOverflow, got {other:?}"),
    }
    assert_eq!(staged.staging_size(), 16);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_mip_chain_ends_shader_readable() {
    let device = headless_device();
    let (width, height) = (256, 128);
    let image = Image::new(
        Arc::clone(&device),
        ImageInfo::sampled(width, height, vk::Format::R8G8B8A8_UNORM, true),
    )
    .unwrap();
    assert_eq!(image.mip_levels(), mip_level_count(width, height));
    assert_eq!(image.mip_levels(), 8);
    assert_eq!(image.layout(), ImageLayout::Undefined);

    let mut staged = StagedTransfer::new(Arc::clone(&device), image).unwrap();
    staged.upload(&pattern((width * height * 4) as usize, 5)).unwrap();
    assert_eq!(staged.destination().layout(), ImageLayout::ShaderReadOnlyOptimal);

    // re-uploading discards the previous contents and is legal
    staged.upload(&pattern((width * height * 4) as usize, 6)).unwrap();
    assert_eq!(staged.destination().layout(), ImageLayout::ShaderReadOnlyOptimal);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_illegal_transition_leaves_layout_unchanged() {
    let device = headless_device();
    let image = Image::new(
        Arc::clone(&device),
        ImageInfo::sampled(32, 32, vk::Format::R8G8B8A8_UNORM, false),
    )
    .unwrap();
    let mut staged = StagedTransfer::new(Arc::clone(&device), image).unwrap();
    staged.upload(&pattern(32 * 32 * 4, 0)).unwrap();

    let command_buffer = device.begin_single_use_command_buffer().unwrap();
    let result = staged
        .destination_mut()
        .transition(command_buffer.handle(), ImageLayout::TransferDstOptimal);
    command_buffer.end().unwrap();

    assert!(matches!(
        result,
        Err(VulkanError::InvalidTransferRequest {
            from: ImageLayout::ShaderReadOnlyOptimal,
            to: ImageLayout::TransferDstOptimal,
        })
    ));
    assert_eq!(staged.destination().layout(), ImageLayout::ShaderReadOnlyOptimal);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_texture_describes_combined_sampler() {
    let device = headless_device();
    let pixels = pattern(64 * 64 * 4, 11);
    let texture = Texture::from_rgba8(Arc::clone(&device), 64, 64, &pixels, true).unwrap();

    assert_eq!(texture.descriptor_type(), vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
    let binding = texture.describe();
    let write = binding.write(vk::DescriptorSet::null(), 1);
    assert_eq!(write.descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
    assert_eq!(write.descriptor_count, 1);
    assert!(!write.p_image_info.is_null());
    assert_eq!(texture.image().layout(), ImageLayout::ShaderReadOnlyOptimal);
    assert_eq!(texture.image().mip_levels(), 6);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_single_use_buffers_run_back_to_back() {
    let device = headless_device();
    for _ in 0..4 {
        device.run_single_use(|_| Ok(())).unwrap();
    }
    device.wait_idle().unwrap();
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_nested_single_use_is_rejected() {
    let device = headless_device();
    let buffer = DeviceBuffer::uniform(Arc::clone(&device), 64).unwrap();
    let mut staged = StagedTransfer::new(Arc::clone(&device), buffer).unwrap();
    staged.update_buffer(&pattern(64, 5)).unwrap();

    let open = device.begin_single_use_command_buffer().unwrap();
    assert!(matches!(
        device.begin_single_use_command_buffer(),
        Err(VulkanError::InvalidOperation { .. })
    ));
    assert!(matches!(
        staged.transfer_buffer(None),
        Err(VulkanError::InvalidOperation { .. })
    ));
    assert!(matches!(
        staged.destination().read_back(),
        Err(VulkanError::InvalidOperation { .. })
    ));
    open.end().unwrap();

    // the slot is free again once the first buffer has ended
    staged.transfer_buffer(None).unwrap();
    assert_eq!(staged.destination().read_back().unwrap(), pattern(64, 5));
}
