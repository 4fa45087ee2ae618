//! # Solver scenarios
//!
//! Synthetic stereo pairs with a known displacement, solved end to end.

mod common;

use approx::assert_abs_diff_eq;
use cv_stereotgv::prelude::*;
use cv_stereotgv::stereotgv::depth::disparity_to_depth;

use common::*;

#[test]
fn identical_images_give_zero_disparity() -> Result<(), Error> {
    let (img, _) = shifted_pair(64, 48, 0.0, 1.0, 0.0);

    let mut solver = StereoTgv::new()?;
    solver.initialize(64, 48, params(3, 3, 10))?;
    solver.copy_images_to_device(&img, &img)?;
    solver.solve_stereo_forward()?;

    let u = solver.disparity()?;
    assert!(u.pixels().all(|d| d.abs() < 1e-4));

    // Zero disparity is a point at infinity
    assert!(solver.depth()?.pixels().all(|z| z == Params::default().max_depth));

    Ok(())
}

#[test]
fn recovers_constant_horizontal_shift() -> Result<(), Error> {
    let (img0, img1) = shifted_pair(256, 256, 5.0, 1.0, 0.0);
    let p = params(4, 4, 20);

    let mut solver = StereoTgv::new()?;
    solver.initialize(256, 256, p.clone())?;
    solver.copy_images_to_device(&img0, &img1)?;
    solver.solve_stereo_forward()?;

    let u = solver.disparity()?;
    let mae = mean_abs_error(u, 5.0);
    assert!(mae <= 0.3, "mean absolute error {} px", mae);
    assert!(u.pixels().all(|d| d.is_finite()));

    // Depth of every pixel follows from its disparity
    let depth = solver.depth()?;
    for &(x, y) in &[(128, 128), (10, 200), (250, 3)] {
        let expected = disparity_to_depth(u.get(x, y), p.baseline, p.focal, p.max_depth);
        assert_abs_diff_eq!(depth.get(x, y), expected, epsilon = 1e-5);
    }
    assert_abs_diff_eq!(depth.get(128, 128), 5.0, epsilon = 0.5);

    Ok(())
}

#[test]
fn backward_solve_recovers_shift_of_second_view() -> Result<(), Error> {
    let (img0, img1) = shifted_pair(96, 64, 3.0, 1.0, 0.0);

    let mut solver = StereoTgv::new()?;
    solver.initialize(96, 64, params(3, 4, 20))?;
    solver.copy_images_to_device(&img0, &img1)?;
    solver.solve_stereo_backward()?;

    let mae = mean_abs_error(solver.disparity()?, 3.0);
    assert!(mae <= 0.3, "mean absolute error {} px", mae);

    Ok(())
}

#[test]
fn fisheye_data_term_follows_vector_field() -> Result<(), Error> {
    let (img0, img1) = shifted_pair(128, 128, 4.0, 0.6, 0.8);
    let p = Params {
        data_term: DataTerm::Fisheye,
        ..params(4, 4, 20)
    };

    let mut solver = StereoTgv::new()?;
    solver.initialize(128, 128, p)?;
    solver.load_vector_fields(
        &constant_field(128, 128, 0.6, 0.8),
        &constant_field(128, 128, 0.0, 0.0),
    )?;
    solver.copy_images_to_device(&img0, &img1)?;
    solver.solve_stereo_forward()?;

    let mae = mean_abs_error(solver.disparity()?, 4.0);
    assert!(mae <= 0.3, "mean absolute error {} px", mae);

    Ok(())
}

fn solve_curved(data_term: DataTerm) -> Result<f32, Error> {
    let (img0, img1) = curved_pair(96, 96, 3.0);
    let p = Params {
        data_term,
        ..params(3, 4, 20)
    };

    let mut solver = StereoTgv::new()?;
    solver.initialize(96, 96, p)?;
    solver.load_vector_fields(&curved_field(96, 96), &constant_field(96, 96, 0.0, 0.0))?;
    solver.copy_images_to_device(&img0, &img1)?;
    solver.solve_stereo_forward()?;

    Ok(mean_abs_error(solver.disparity()?, 3.0))
}

#[test]
fn fisheye_data_term_follows_curved_vector_field() -> Result<(), Error> {
    let fisheye = solve_curved(DataTerm::Fisheye)?;
    let planar = solve_curved(DataTerm::Planar)?;

    assert!(fisheye <= 0.1, "fisheye mean absolute error {} px", fisheye);
    assert!(
        1.5 * fisheye < planar,
        "fisheye {} px against planar {} px",
        fisheye,
        planar
    );

    Ok(())
}

#[test]
fn odd_sizes_seed_with_the_rounded_level_ratio() -> Result<(), Error> {
    let (img0, img1) = shifted_pair(203, 131, 5.0, 1.0, 0.0);

    let mut solver = StereoTgv::new()?;
    solver.initialize(203, 131, params(4, 4, 20))?;
    solver.copy_images_to_device(&img0, &img1)?;
    solver.solve_stereo_forward()?;

    let mae = mean_abs_error(solver.disparity()?, 5.0);
    assert!(mae <= 0.1, "mean absolute error {} px", mae);

    Ok(())
}

#[test]
fn calibration_field_is_applied_to_second_image() -> Result<(), Error> {
    // Image 1 carries an extra 2 px offset that the calibration removes
    let img0 = textured_image(96, 64, 0.0, 0.0);
    let img1 = textured_image(96, 64, 5.0, 0.0);

    let mut solver = StereoTgv::new()?;
    solver.initialize(96, 64, params(3, 4, 20))?;
    solver.copy_images_to_device(&img0, &img1)?;
    solver.load_vector_fields(
        &constant_field(96, 64, 1.0, 0.0),
        &constant_field(96, 64, 2.0, 0.0),
    )?;
    solver.solve_stereo_forward()?;

    let mae = mean_abs_error(solver.disparity()?, 3.0);
    assert!(mae <= 0.3, "mean absolute error {} px", mae);

    Ok(())
}

#[test]
fn repeated_solves_are_identical() -> Result<(), Error> {
    let (img0, img1) = shifted_pair(80, 60, 2.0, 1.0, 0.0);

    let mut solver = StereoTgv::new()?;
    solver.initialize(80, 60, params(3, 3, 15))?;
    solver.copy_images_to_device(&img0, &img1)?;

    solver.solve_stereo_forward()?;
    let first = solver.disparity()?.clone();
    solver.solve_stereo_forward()?;

    assert_eq!(&first, solver.disparity()?);

    Ok(())
}

#[test]
fn serial_and_cpu_backends_agree() -> Result<(), Error> {
    let (img0, img1) = shifted_pair(48, 40, 2.0, 1.0, 0.0);
    let p = params(2, 2, 10);

    let mut serial = StereoTgv::with_backend(SerialBackend::new());
    serial.initialize(48, 40, p.clone())?;
    serial.copy_images_to_device(&img0, &img1)?;
    serial.solve_stereo_forward()?;

    let mut cpu = StereoTgv::with_backend(CpuBackend::with_config(LaunchConfig::default(), 4)?);
    cpu.initialize(48, 40, p)?;
    cpu.copy_images_to_device(&img0, &img1)?;
    cpu.solve_stereo_forward()?;

    assert_eq!(serial.disparity()?, cpu.disparity()?);
    assert_eq!(serial.depth()?, cpu.depth()?);

    Ok(())
}

#[test]
fn warp_statistics_are_recorded() -> Result<(), Error> {
    let (img0, img1) = shifted_pair(64, 48, 2.0, 1.0, 0.0);

    let mut solver = StereoTgv::new()?;
    assert!(solver.last_stats().is_empty());

    solver.initialize(64, 48, params(3, 2, 10))?;
    solver.copy_images_to_device(&img0, &img1)?;
    solver.solve_stereo_forward()?;

    let stats = solver.last_stats();
    assert_eq!(stats.len(), 3 * 2);
    assert_eq!((stats[0].level, stats[0].warp), (2, 0));
    assert_eq!((stats[5].level, stats[5].warp), (0, 1));
    assert!(stats.iter().all(|s| s.mean_update.is_finite() && s.mean_update >= 0.0));

    Ok(())
}

#[test]
fn disparity_algorithm_initialises_on_first_frame() -> Result<(), Error> {
    let (left, right) = shifted_pair(96, 64, 3.0, 1.0, 0.0);
    let frame = StereoFrame::new(left, right);

    let mut solver = StereoTgv::new()?;
    let map = solver.compute(&frame)?;

    assert_eq!((map.width(), map.height()), (96, 64));
    assert_eq!(solver.levels().len(), Params::default().n_levels);

    let (min, max) = (map.min_disp.unwrap_or(f32::NAN), map.max_disp.unwrap_or(f32::NAN));
    assert!(min <= max);
    assert_abs_diff_eq!(map.get(48, 32), 3.0, epsilon = 0.5);

    let img = map.to_luma_normalised();
    assert_eq!(img.dimensions(), (96, 64));

    Ok(())
}
