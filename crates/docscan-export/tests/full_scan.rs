//! Integration test: scan a synthetic photo end to end and export PNG + manifest.

#![allow(clippy::unwrap_used)]

use docscan_export::{ScanManifest, to_png};
use docscan_pipeline::{
    AreaFilter, Dimensions, Point, ProcessingMode, ScanConfig, Scanner, SignatureLayer,
};
use image::{Rgba, RgbaImage};

/// A gray table with a slightly rotated white sheet carrying a dark bar.
fn photo() -> RgbaImage {
    let corners = [(120.0, 80.0), (520.0, 100.0), (500.0, 620.0), (100.0, 600.0)];
    RgbaImage::from_fn(640, 720, |x, y| {
        let (px, py) = (f64::from(x), f64::from(y));
        let inside = (0..4).all(|i| {
            let (ax, ay) = corners[i];
            let (bx, by) = corners[(i + 1) % 4];
            (bx - ax) * (py - ay) - (by - ay) * (px - ax) >= 0.0
        });
        if !inside {
            Rgba([40, 40, 40, 255])
        } else if (280..340).contains(&y) && (200..420).contains(&x) {
            Rgba([20, 20, 20, 255])
        } else {
            Rgba([245, 245, 245, 255])
        }
    })
}

#[test]
fn scan_and_export_signed_document() {
    let mut config = ScanConfig::one_shot();
    config.detector.area_filter = AreaFilter::Absolute { min_area: 10_000.0 };
    config.detector.dilate = true;
    config.mode = ProcessingMode::BlackAndWhite;
    let scanner = Scanner::new(config).unwrap();

    let result = scanner.scan_frame(photo()).unwrap();
    let tl = result.contour().top_left();
    assert!(tl.distance(Point::new(120.0, 80.0)) < 6.0, "top-left {tl:?}");

    let dims = Dimensions::of(result.rectified());
    let mut layer = SignatureLayer::new(dims).unwrap();
    layer.begin_stroke(Point::new(30.0, 450.0));
    layer.extend_stroke(Point::new(150.0, 470.0));
    layer.end_stroke();

    let output = scanner.finish(result, Some(&layer.freeze()));
    assert!(output.warning.is_none());

    let png = to_png(&output.image).unwrap();
    let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), output.image.dimensions());

    let manifest = ScanManifest::from_output(&output)
        .with_source("synthetic.png")
        .signed(true);
    let json = manifest.to_json().unwrap();
    eprintln!("{json}");
    let back = ScanManifest::from_json(&json).unwrap();
    assert_eq!(back.contour, output.contour.to_pairs());
    assert_eq!(back.dimensions, dims);
    assert_eq!(back.mode, ProcessingMode::BlackAndWhite);
}
