use super::*;
use crate::image::{Dimensions, PixelPlane};
use crate::testing::{random_masked_image, small_kernel};

fn constant_image(width: usize, height: usize, value: f32, variance: f32) -> MaskedImage<f32> {
    MaskedImage::from_image(PixelPlane::new_filled(width, height, value), variance)
}

#[test]
fn test_delta_kernel_is_identity() {
    let input = random_masked_image(7, 5, 11).with_origin(3, -2);
    let out = DirectConvolver
        .convolve(&input, &KernelImage::delta())
        .unwrap();
    assert_eq!(out.origin(), (3, -2));
    assert_eq!(out.image().pixels(), input.image().pixels());
    assert_eq!(out.mask().pixels(), input.mask().pixels());
    assert_eq!(out.variance().pixels(), input.variance().pixels());
}

#[test]
fn test_constant_image_interior_and_edge() {
    let input = constant_image(5, 5, 2.0, 1.0);
    let kernel = small_kernel();
    let out = DirectConvolver.convolve(&input, &kernel).unwrap();

    let edge = MaskPlane::Edge.bit();
    for y in 0..5 {
        for x in 0..5 {
            let interior = (1..4).contains(&x) && (1..4).contains(&y);
            if interior {
                assert!((out.image()[(x, y)] - 2.0).abs() < 1e-12);
                // sum(k^2) = 4 * (1/8)^2 + (1/2)^2
                assert!((out.variance()[(x, y)] - 0.3125).abs() < 1e-6);
                assert_eq!(out.mask()[(x, y)], 0);
            } else {
                assert_eq!(out.image()[(x, y)], 0.0);
                assert_eq!(out.variance()[(x, y)], 0.0);
                assert_eq!(out.mask()[(x, y)], edge);
            }
        }
    }
}

#[test]
fn test_convolution_flips_the_kernel() {
    // k = [0, 0, 1] centered at 1 shifts the row one pixel to the right.
    let input = MaskedImage::from_image(PixelPlane::new(5, 1, vec![1.0f64, 2.0, 3.0, 4.0, 5.0]), 1.0);
    let kernel = KernelImage::new(3, 1, vec![0.0, 0.0, 1.0]);
    let out = DirectConvolver.convolve(&input, &kernel).unwrap();
    assert_eq!(&out.image().pixels()[1..4], &[1.0, 2.0, 3.0]);
}

#[test]
fn test_off_center_kernel_moves_the_valid_region() {
    let input = constant_image(6, 1, 1.0, 1.0);
    let kernel = KernelImage::new(3, 1, vec![1.0, 1.0, 1.0]).with_center(0, 0);
    let out = DirectConvolver.convolve(&input, &kernel).unwrap();
    let edge = MaskPlane::Edge.bit();
    assert_eq!(out.mask().pixels(), &[edge, edge, 0, 0, 0, 0]);
    assert_eq!(&out.image().pixels()[2..], &[3.0, 3.0, 3.0, 3.0]);
}

#[test]
fn test_mask_is_ored_over_nonzero_footprint() {
    let mut input = constant_image(5, 5, 0.0, 1.0);
    input.mask_mut()[(2, 2)] = MaskPlane::Sat.bit();
    let out = DirectConvolver.convolve(&input, &small_kernel()).unwrap();
    let sat = MaskPlane::Sat.bit();
    for &(x, y) in &[(2, 2), (1, 2), (3, 2), (2, 1), (2, 3)] {
        assert_eq!(out.mask()[(x, y)], sat, "({x}, {y})");
    }
    // Corner taps of the kernel are zero.
    for &(x, y) in &[(1, 1), (3, 1), (1, 3), (3, 3)] {
        assert_eq!(out.mask()[(x, y)], 0, "({x}, {y})");
    }
}

#[test]
fn test_kernel_larger_than_image_fails() {
    let input = constant_image(3, 10, 1.0, 1.0);
    let kernel = KernelImage::gaussian(1.0);
    assert_eq!(
        DirectConvolver.convolve(&input, &kernel),
        Err(ConvolutionError::KernelTooLarge {
            kernel: Dimensions::new(7, 7),
            image: Dimensions::new(3, 10),
        })
    );
}

#[test]
fn test_empty_kernel_fails() {
    let input = constant_image(3, 3, 1.0, 1.0);
    let kernel = KernelImage::new(0, 0, vec![]);
    assert_eq!(
        DirectConvolver.convolve(&input, &kernel),
        Err(ConvolutionError::EmptyKernel)
    );
}

#[test]
fn test_kernel_as_large_as_image_leaves_one_pixel() {
    let input = constant_image(3, 3, 1.0, 1.0);
    let out = DirectConvolver.convolve(&input, &small_kernel()).unwrap();
    let valid: Vec<_> = out.mask().iter().filter(|&&m| m == 0).collect();
    assert_eq!(valid.len(), 1);
    assert!((out.image()[(1, 1)] - 1.0).abs() < 1e-12);
}
