mod common;

use common::{gray_png, portrait_jpeg, ring_face, ScriptedProvider};
use face_mesh_overlay::face_mesh::{ConnectionGraph, DetectorConfig, MeshGraph};
use face_mesh_overlay::overlay::{DrawingSpec, OverlayStatus};
use face_mesh_overlay::pipeline::PREPROCESSED_MESSAGE;
use face_mesh_overlay::{process_upload, ChannelOrder, PipelineError, PipelineOptions};

#[test]
fn gray_png_without_face_passes_through() {
    let provider = ScriptedProvider::no_face();
    let report = process_upload(&gray_png(100, 100), &provider, &PipelineOptions::default()).unwrap();

    assert_eq!(report.status, OverlayStatus::NoFace);
    assert!(report.is_unchanged());
    assert_eq!(report.rendered, report.original);
    assert_eq!(report.shape, (100, 100, 3));
    assert_eq!(report.channels, 3);
    assert_eq!(
        report.messages,
        vec![
            "Image shape: (100, 100, 3)".to_string(),
            "Image channels: 3".to_string(),
            PREPROCESSED_MESSAGE.to_string(),
            "No landmarks detected".to_string(),
        ]
    );
    assert_eq!(provider.counters.acquired(), 1);
    assert_eq!(provider.counters.released(), 1);
}

#[test]
fn detected_face_gets_the_tessellation_drawn() {
    let provider = ScriptedProvider::returning(vec![ring_face(0.97)]);
    let report = process_upload(&portrait_jpeg(320, 240), &provider, &PipelineOptions::default()).unwrap();

    let edges = ConnectionGraph::tessellate(&ring_face(0.97)).len();
    assert!(edges > ConnectionGraph::face_mesh_contours().len());
    assert_eq!(report.shape, (240, 320, 3));
    assert_eq!(report.status, OverlayStatus::FaceFound { segments: edges });
    assert!(!report.is_unchanged());
    assert_eq!(report.rendered.order(), ChannelOrder::Rgb);
    assert_eq!(report.messages.last().map(String::as_str), Some("Facial landmarks detected"));

    // every landmark is a vertex of the triangulation
    let face = ring_face(0.97);
    for index in [10, 338] {
        let (x, y) = face.to_pixel(index, 320, 240).unwrap();
        assert_eq!(report.rendered.pixel(x as usize, y as usize), DrawingSpec::default().color);
    }
}

#[test]
fn contours_can_be_chosen_instead() {
    let provider = ScriptedProvider::returning(vec![ring_face(0.97)]);
    let options = PipelineOptions { mesh: MeshGraph::Contours, ..PipelineOptions::default() };
    let contours = process_upload(&portrait_jpeg(320, 240), &provider, &options).unwrap();
    let tessellated = process_upload(&portrait_jpeg(320, 240), &provider, &PipelineOptions::default()).unwrap();

    assert_eq!(contours.status, OverlayStatus::FaceFound { segments: 124 });
    assert_ne!(contours.rendered, tessellated.rendered);
}

#[test]
fn only_the_first_face_is_drawn() {
    let mut second = ring_face(0.5);
    for landmark in &mut second.landmarks {
        landmark.x *= 0.1;
    }
    let provider = ScriptedProvider::returning(vec![ring_face(0.9), second.clone()]);
    let report = process_upload(&gray_png(200, 200), &provider, &PipelineOptions::default()).unwrap();

    let (x, y) = second.to_pixel(10, 200, 200).unwrap();
    assert_eq!(report.rendered.pixel(x as usize, y as usize), [128, 128, 128]);

    let options = PipelineOptions {
        detector: DetectorConfig { max_num_faces: 2, ..DetectorConfig::default() },
        ..PipelineOptions::default()
    };
    let both = process_upload(&gray_png(200, 200), &provider, &options).unwrap();
    assert!(both.status.face_found());
}

#[test]
fn text_renamed_to_jpg_halts_before_detection() {
    let provider = ScriptedProvider::returning(vec![ring_face(0.9)]);
    let err = process_upload(b"name,score\nalice,3\n", &provider, &PipelineOptions::default()).unwrap_err();

    assert!(matches!(err, PipelineError::Decode(_)), "{err:?}");
    assert_eq!(provider.counters.acquired(), 0);
    assert_eq!(provider.counters.detections(), 0);
}

#[test]
fn detector_failure_still_releases_it() {
    let provider = ScriptedProvider::failing();
    let err = process_upload(&gray_png(16, 16), &provider, &PipelineOptions::default()).unwrap_err();

    assert!(matches!(err, PipelineError::Detector(_)));
    assert_eq!(provider.counters.acquired(), 1);
    assert_eq!(provider.counters.released(), 1);
}

#[test]
fn each_upload_gets_its_own_detector() {
    let provider = ScriptedProvider::no_face();
    for _ in 0..3 {
        process_upload(&gray_png(8, 8), &provider, &PipelineOptions::default()).unwrap();
    }
    assert_eq!(provider.counters.acquired(), 3);
    assert_eq!(provider.counters.released(), 3);
}
