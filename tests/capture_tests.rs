//! Section capture, stitching and orchestration against scripted pages

mod common;

use common::{PageScript, ScriptedEngine};
use fafosnap::browser::ViewportSize;
use fafosnap::capture::{
    CaptureOptions, CaptureOrchestrator, SectionCapture, SectionOptions, StallPolicy, Stitcher,
};
use fafosnap::error::CaptureError;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn quick_sections() -> SectionOptions {
    SectionOptions {
        settle_delay: Duration::ZERO,
        fallback_viewport: ViewportSize {
            width: 100,
            height: 50,
        },
        ..Default::default()
    }
}

fn quick_capture(timeout: Duration) -> CaptureOptions {
    CaptureOptions {
        viewport: ViewportSize {
            width: 100,
            height: 50,
        },
        timeout,
        initial_settle: Duration::ZERO,
        sections: quick_sections(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_sections_partition_page() {
    let engine = ScriptedEngine::new(PageScript::new(200.0));
    let session = engine.session();

    let captured = SectionCapture::new(quick_sections()).run(&session).await.unwrap();

    let offsets: Vec<u32> = captured.chunks.iter().map(|c| c.vertical_offset).collect();
    assert_eq!(offsets, vec![0, 50, 100, 150]);
    assert_eq!(captured.total_height, 200);
    assert_eq!(captured.max_width, 100);
    assert_eq!(captured.last_scroll_height, 200.0);
}

#[tokio::test]
async fn test_clamped_final_scroll_stays_within_one_viewport() {
    let engine = ScriptedEngine::new(PageScript::new(230.0));
    let session = engine.session();

    let captured = SectionCapture::new(quick_sections()).run(&session).await.unwrap();
    let stitched = Stitcher::stitch(&captured.chunks).unwrap();

    let chunk_sum: u32 = captured.chunks.iter().map(|c| c.height()).sum();
    assert_eq!(stitched.height, chunk_sum);
    assert!((stitched.height as f64 - captured.last_scroll_height).abs() <= 50.0);
}

#[tokio::test]
async fn test_device_pixel_ratio_scales_chunks() {
    let mut script = PageScript::new(100.0);
    script.dpr = 2.0;
    let engine = ScriptedEngine::new(script);
    let session = engine.session();

    let captured = SectionCapture::new(quick_sections()).run(&session).await.unwrap();
    assert_eq!(captured.chunks.len(), 2);
    assert_eq!(captured.total_height, 200);
    assert_eq!(captured.max_width, 200);
}

#[tokio::test]
async fn test_zero_height_page_fails() {
    let engine = ScriptedEngine::new(PageScript::new(0.0));
    let session = engine.session();

    let err = SectionCapture::new(quick_sections()).run(&session).await.unwrap_err();
    assert_eq!(err, CaptureError::ZeroHeightPage);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_frozen_scroll_fails_by_default() {
    let mut script = PageScript::new(200.0);
    script.frozen = true;
    let engine = ScriptedEngine::new(script);
    let session = engine.session();

    let err = SectionCapture::new(quick_sections()).run(&session).await.unwrap_err();
    assert!(matches!(
        err,
        CaptureError::ScrollStalled { stalls: 3, .. }
    ));
}

#[tokio::test]
async fn test_frozen_scroll_accept_partial() {
    let mut script = PageScript::new(200.0);
    script.frozen = true;
    let engine = ScriptedEngine::new(script);
    let session = engine.session();

    let options = SectionOptions {
        stall_policy: StallPolicy::AcceptPartial,
        ..quick_sections()
    };
    let captured = SectionCapture::new(options).run(&session).await.unwrap();
    assert_eq!(captured.chunks.len(), 1);
    assert!(captured.iterations <= 500);
}

#[tokio::test]
async fn test_growing_page_stops_at_section_limit() {
    let mut script = PageScript::new(100.0);
    script.grow_by = 50.0;
    let engine = ScriptedEngine::new(script);
    let session = engine.session();

    let options = SectionOptions {
        max_sections: 10,
        ..quick_sections()
    };
    let captured = SectionCapture::new(options).run(&session).await.unwrap();
    assert_eq!(captured.iterations, 10);
    assert_eq!(captured.chunks.len(), 10);
    assert_eq!(captured.total_height, 500);
}

#[tokio::test]
async fn test_orchestrator_captures_and_closes_session() {
    let engine = Arc::new(ScriptedEngine::new(PageScript::new(200.0)));
    let orchestrator = CaptureOrchestrator::new(engine.clone(), quick_capture(Duration::from_secs(5)));

    let image = orchestrator.capture_url("https://a.example").await.unwrap();
    assert_eq!((image.width, image.height), (100, 200));
    let decoded = image::load_from_memory(&image.png).unwrap();
    assert_eq!(decoded.height(), 200);

    assert_eq!(engine.sessions_opened(), 1);
    assert_eq!(engine.sessions_closed(), 1);
}

#[tokio::test]
async fn test_orchestrator_deadline_closes_session() {
    let mut script = PageScript::new(200.0);
    script.hang_navigation = true;
    let engine = Arc::new(ScriptedEngine::new(script));
    let orchestrator =
        CaptureOrchestrator::new(engine.clone(), quick_capture(Duration::from_millis(200)));

    let err = orchestrator.capture_url("https://slow.example").await.unwrap_err();
    assert_eq!(err, CaptureError::Timeout(200));
    assert_eq!(engine.sessions_closed(), 1);
}

#[tokio::test]
async fn test_orchestrator_rejects_invalid_url_without_session() {
    let engine = Arc::new(ScriptedEngine::new(PageScript::new(200.0)));
    let orchestrator = CaptureOrchestrator::new(engine.clone(), quick_capture(Duration::from_secs(5)));

    let err = orchestrator.capture_url("ftp://a.example").await.unwrap_err();
    assert!(matches!(err, CaptureError::InvalidUrl(_)));
    assert!(!err.is_retryable());
    assert_eq!(engine.sessions_opened(), 0);
}

#[tokio::test]
async fn test_orchestrator_zero_height_never_succeeds() {
    let engine = Arc::new(ScriptedEngine::new(PageScript::new(0.0)));
    let orchestrator = CaptureOrchestrator::new(engine.clone(), quick_capture(Duration::from_secs(5)));

    let err = orchestrator.capture_url("https://empty.example").await.unwrap_err();
    assert_eq!(err, CaptureError::ZeroHeightPage);
    assert_eq!(engine.sessions_closed(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_stitched_height_matches_chunks(height in 1u32..1500, viewport in 10u32..300) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let mut script = PageScript::new(height as f64);
        script.viewport_height = viewport as f64;
        let engine = ScriptedEngine::new(script);
        let session = engine.session();

        let captured = runtime
            .block_on(SectionCapture::new(quick_sections()).run(&session))
            .unwrap();
        let stitched = Stitcher::stitch(&captured.chunks).unwrap();

        let chunk_sum: u32 = captured.chunks.iter().map(|c| c.height()).sum();
        prop_assert_eq!(stitched.height, chunk_sum);
        prop_assert!(stitched.height >= height);
        prop_assert!(stitched.height - height < viewport);

        let mut expected_offset = 0;
        for chunk in &captured.chunks {
            prop_assert_eq!(chunk.vertical_offset, expected_offset);
            expected_offset += chunk.height();
        }
    }
}
