mod common;

use common::*;
use serde_json::json;

#[test]
fn test_gray_region_with_manual_cutoff() -> anyhow::Result<()> {
    let slide = create_solid_slide(32, 32, GRAY);
    let request = manual_request(&slide, vec![Roi::new(5, 5, 10, 10)], 100.0);

    let results = orchestrator().process_rois(&request)?;
    assert_eq!(results.len(), 1);

    let mask = decode_mask(&results[0].mask_png);
    assert_eq!(mask.dimensions(), (10, 10));
    assert!(mask.pixels().all(|p| p[0] == 255));

    assert_eq!(results[0].rgb_samples.len(), 100);
    assert!(results[0].rgb_samples.iter().all(|s| *s == ColorSample::new(128, 128, 128)));
    Ok(())
}

#[test]
fn test_manual_cutoff_from_kwargs() -> anyhow::Result<()> {
    let slide = create_solid_slide(16, 16, GRAY);
    let mut request = manual_request(&slide, vec![Roi::new(0, 0, 4, 4)], 0.0);
    request.manual_value = None;
    let request = with_ops(request, &[], json!({"manual_value": 200}));

    let results = orchestrator().process_rois(&request)?;
    assert!(results[0].rgb_samples.is_empty());
    Ok(())
}

#[test]
fn test_mask_dimensions_match_rois() -> anyhow::Result<()> {
    let slide = create_square_slide();
    let rois = vec![
        Roi::new(0, 0, 64, 64),
        Roi::new(20, 20, 7, 13),
        // Hangs off the bottom-right edge
        Roi::new(50, 50, 30, 20),
    ];
    let mut request = manual_request(&slide, rois.clone(), 0.0);
    request.threshold_type = "otsu".to_string();
    request.manual_value = None;
    let request = with_ops(request, &["opening"], json!({}));

    let results = orchestrator().process_rois(&request)?;
    assert_eq!(results.len(), rois.len());
    for (roi, result) in rois.iter().zip(&results) {
        let mask = decode_mask(&result.mask_png);
        assert_eq!(mask.dimensions(), (roi.width as u32, roi.height as u32));
        assert!(mask.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    // Otsu separates the bright square; opening with the cross rounds its corners
    assert_eq!(results[0].rgb_samples.len(), 16 * 16 - 4);
    assert!(results[0].rgb_samples.iter().all(|s| *s == ColorSample::new(230, 220, 210)));
    Ok(())
}

#[test]
fn test_empty_roi_list_is_invalid() {
    let slide = create_solid_slide(8, 8, GRAY);
    let request = manual_request(&slide, vec![], 100.0);
    let err = orchestrator().process_rois(&request).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidArgument(ref msg) if msg.contains("No ROIs")));
}

#[test]
fn test_zero_width_roi_names_width_and_height() {
    let slide = create_solid_slide(8, 8, GRAY);
    let request = manual_request(&slide, vec![Roi::new(0, 0, 4, 4), Roi::new(1, 1, 0, 5)], 100.0);
    match orchestrator().process_rois(&request) {
        Err(AnalysisError::InvalidArgument(msg)) => {
            assert!(msg.contains("ROI 1"), "{}", msg);
            assert!(msg.contains("w=0"), "{}", msg);
            assert!(msg.contains("h=5"), "{}", msg);
        }
        other => panic!("expected InvalidArgument, got {:?}", other),
    }
}

#[test]
fn test_oversized_roi_is_invalid_before_reading() {
    let slide = create_solid_slide(8, 8, GRAY);
    let huge = Roi::new(0, 0, u32::MAX as i64, u32::MAX as i64);
    let request = manual_request(&slide, vec![Roi::new(0, 0, 4, 4), huge], 100.0);
    match orchestrator().process_rois(&request) {
        Err(AnalysisError::InvalidArgument(msg)) => {
            assert!(msg.contains("ROI 1"), "{}", msg);
            assert!(msg.contains("too large"), "{}", msg);
        }
        other => panic!("expected InvalidArgument, got {:?}", other.map(|r| r.len())),
    }
}

#[test]
fn test_tiff_slide_matches_png_slide() -> anyhow::Result<()> {
    let png = create_square_slide();
    let tiff = create_square_tiff_slide();
    let rois = vec![Roi::new(16, 16, 32, 32), Roi::new(50, 50, 20, 20)];

    let from_png = orchestrator().process_rois(&manual_request(&png, rois.clone(), 128.0))?;
    let from_tiff = orchestrator().process_rois(&manual_request(&tiff, rois, 128.0))?;
    assert_eq!(from_png, from_tiff);
    assert_eq!(from_tiff[0].rgb_samples.len(), 16 * 16);
    Ok(())
}

#[test]
fn test_missing_slide_is_not_found() {
    let slide = create_solid_slide(8, 8, GRAY);
    let mut request = manual_request(&slide, vec![Roi::new(0, 0, 4, 4)], 100.0);
    request.image_path = request.image_path.with_extension("missing.png");
    let err = orchestrator().process_rois(&request).unwrap_err();
    assert!(matches!(err, AnalysisError::NotFound(_)));
}

#[test]
fn test_bad_threshold_parameters_are_invalid() {
    let slide = create_solid_slide(8, 8, GRAY);
    let roi = vec![Roi::new(0, 0, 4, 4)];

    let mut request = manual_request(&slide, roi.clone(), 100.0);
    request.threshold_type = "triangle".to_string();
    assert!(matches!(
        orchestrator().process_rois(&request),
        Err(AnalysisError::InvalidArgument(_))
    ));

    let mut request = manual_request(&slide, roi, 100.0);
    request.manual_value = None;
    assert!(matches!(
        orchestrator().process_rois(&request),
        Err(AnalysisError::InvalidArgument(_))
    ));
}

#[test]
fn test_unknown_op_is_skipped() -> anyhow::Result<()> {
    let slide = create_square_slide();
    let base = manual_request(&slide, vec![Roi::new(10, 10, 40, 40)], 128.0);

    let with_unknown = with_ops(base.clone(), &["dilation", "unknown_op", "erosion"], json!({}));
    let without = with_ops(base, &["dilation", "erosion"], json!({}));

    let orchestrator = orchestrator();
    let a = orchestrator.process_rois(&with_unknown)?;
    let b = orchestrator.process_rois(&without)?;
    assert_eq!(decode_mask(&a[0].mask_png), decode_mask(&b[0].mask_png));
    assert_eq!(a[0].rgb_samples, b[0].rgb_samples);
    Ok(())
}

#[test]
fn test_unknown_op_rejected_when_configured() {
    let slide = create_square_slide();
    let request = with_ops(
        manual_request(&slide, vec![Roi::new(0, 0, 10, 10)], 128.0),
        &["dilation", "unknown_op"],
        json!({}),
    );
    let orchestrator = Orchestrator::new(wsiseg::ImageSlideSource, UnknownOpPolicy::RejectUnknown);
    let err = orchestrator.process_rois(&request).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidArgument(ref msg) if msg.contains("unknown_op")));
}

#[test]
fn test_debug_dir_receives_intermediate_masks() -> anyhow::Result<()> {
    let slide = create_square_slide();
    let debug = tempfile::TempDir::new()?;
    let request = with_ops(
        manual_request(&slide, vec![Roi::new(0, 0, 32, 32)], 128.0),
        &["closing"],
        json!({"closing": {"radius": 2, "shape": "square"}}),
    );

    let orchestrator = orchestrator().with_debug_dir(debug.path().to_path_buf());
    orchestrator.process_rois(&request)?;
    orchestrator.process_rois(&request)?;

    let first = debug.path().join("request_0000");
    let second = debug.path().join("request_0001");
    assert!(first.is_dir());
    assert!(second.is_dir());
    assert_eq!(std::fs::read_dir(first)?.count(), 2);
    Ok(())
}
