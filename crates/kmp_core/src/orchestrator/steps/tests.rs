use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::{tempdir, TempDir};

use super::*;
use crate::error::ErrorKind;
use crate::jobs::StageOutcome;
use crate::models::{AudioFormat, Backend, EffectChain, ExportMode, JobRequest};
use crate::orchestrator::create_standard_pipeline;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::testing::{
    context_for, test_source, FakeDownloader, FakeMedia, FakeSeparator, FakeTools,
    FakeTranscriber,
};
use crate::orchestrator::types::{Context, JobState, StepOutcome};
use crate::tools::MediaInfo;

fn video_media() -> FakeMedia {
    FakeMedia::with_info(MediaInfo {
        duration_secs: 10.0,
        has_video: true,
    })
}

fn local_request(dir: &TempDir) -> JobRequest {
    JobRequest::new(test_source(dir.path(), "Song.wav").to_string_lossy())
}

fn outcome<'a>(state: &'a JobState, stage: &str) -> &'a StageOutcome {
    &state
        .records
        .iter()
        .find(|r| r.stage == stage)
        .unwrap_or_else(|| panic!("no record for {}", stage))
        .outcome
}

fn skipped_because(state: &JobState, stage: &str) -> String {
    match outcome(state, stage) {
        StageOutcome::Skipped { reason } => reason.clone(),
        other => panic!("{} was not skipped: {:?}", stage, other),
    }
}

#[test]
fn acquire_resolves_local_file() {
    let dir = tempdir().unwrap();
    let tools = FakeTools::default();
    let ctx = context_for(&dir, local_request(&dir), &tools, Backend::General);
    let mut state = JobState::new("job-0001");
    let step = AcquireStep::new();

    step.validate_input(&ctx, &state).unwrap();
    assert_eq!(step.execute(&ctx, &mut state).unwrap(), StepOutcome::Success);
    step.validate_output(&ctx, &state).unwrap();

    let acquire = state.acquire.as_ref().unwrap();
    assert_eq!(acquire.title, "Song");
    assert!(acquire.audio_path.is_file());
    assert!(acquire.video_path.is_none());
}

#[test]
fn acquire_retries_download() {
    let dir = tempdir().unwrap();
    let tools = FakeTools::default()
        .with_downloader(FakeDownloader::new("Live: Song?").with_video().failing(1));
    let request = JobRequest::new("https://www.youtube.com/watch?v=abc123");
    let ctx = context_for(&dir, request, &tools, Backend::General);
    let mut state = JobState::new("job-0001");

    AcquireStep::new().execute(&ctx, &mut state).unwrap();

    assert_eq!(tools.downloader.attempts(), 2);
    let acquire = state.acquire.as_ref().unwrap();
    assert_eq!(acquire.title, "Live Song");
    assert!(acquire.video_path.as_ref().unwrap().ends_with("video.mp4"));
}

#[test]
fn missing_source_fails_acquire() {
    let dir = tempdir().unwrap();
    let tools = FakeTools::default();
    let request = JobRequest::new(dir.path().join("nope.mp3").to_string_lossy());
    let ctx = context_for(&dir, request, &tools, Backend::General);
    let mut state = JobState::new("job-0001");

    let err = create_standard_pipeline().run(&ctx, &mut state).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSource);
    assert_eq!(state.records.len(), 1);
    assert_eq!(tools.separator.call_count(), 0);
}

#[test]
fn unity_audio_job_skips_separation() {
    let dir = tempdir().unwrap();
    let tools = FakeTools::default();
    let mut request = local_request(&dir);
    request.export_mode = ExportMode::AudioOnly;
    let ctx = context_for(&dir, request, &tools, Backend::General);
    let mut state = JobState::new("job-0001");

    create_standard_pipeline().run(&ctx, &mut state).unwrap();

    assert!(skipped_because(&state, "Separate").contains("unity"));
    assert_eq!(skipped_because(&state, "Effects"), "no effects requested");
    assert_eq!(tools.separator.call_count(), 0);
    assert_eq!(tools.media.encode_calls(), vec!["libmp3lame".to_string()]);

    let artifact = state.artifact().unwrap();
    assert!(artifact.starts_with(dir.path().join("out")));
    let name = artifact.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("Song_audio_"));
    assert!(name.ends_with(".mp3"));
}

#[test]
fn stem_gains_mix_before_effects() {
    let dir = tempdir().unwrap();
    let tools = FakeTools::default();
    let mut request = local_request(&dir);
    request.export_mode = ExportMode::AudioOnly;
    request.stem_gains.insert("vocals".to_string(), 0.0);
    request.effects = EffectChain::new(-2.0, 1.0, false);
    let ctx = context_for(&dir, request, &tools, Backend::General);
    let mut state = JobState::new("job-0001");

    create_standard_pipeline().run(&ctx, &mut state).unwrap();

    let separate = state.separate.as_ref().unwrap();
    assert_eq!(separate.stems.len(), 4);
    let mix = separate.mix_path.as_ref().unwrap();
    assert!(mix.is_file());

    // Effects read the mix, not the original audio
    let calls = tools.media.filter_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0][0].starts_with("rubberband="));
    assert!(state.effects.as_ref().unwrap().audio_path.is_file());

    let name = state.artifact().unwrap().to_string_lossy().to_string();
    assert!(name.contains("_audio_v0d1b1o1_"));
}

#[test]
fn karaoke_video_burns_tempo_scaled_subtitles() {
    let dir = tempdir().unwrap();
    let tools = FakeTools::default().with_media(video_media());
    let mut request = local_request(&dir);
    request.effects = EffectChain::new(0.0, 1.25, false);
    let ctx = context_for(&dir, request, &tools, Backend::General);
    let mut state = JobState::new("job-0001");

    let run = create_standard_pipeline().run(&ctx, &mut state).unwrap();
    assert_eq!(run.steps_completed.len(), 6);

    let words = &state.transcribe.as_ref().unwrap().words;
    assert!((words[0].start - 0.8).abs() < 1e-9);

    let subtitles = state.subtitles.as_ref().unwrap();
    assert!(subtitles.cue_count > 0);
    let ass = std::fs::read_to_string(&subtitles.ass_path).unwrap();
    assert!(ass.contains("[Events]"));
    assert!(ass.contains("\\k"));

    let calls = tools.media.mux_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0.as_deref(), Some(subtitles.ass_path.as_path()));
    assert_eq!(calls[0].1, 1.25);

    let name = state.artifact().unwrap().to_string_lossy().to_string();
    assert!(name.contains("_karaoke_"));
    assert!(name.ends_with(".mp4"));
}

#[test]
fn subtitles_disabled_skips_transcription() {
    let dir = tempdir().unwrap();
    let tools = FakeTools::default().with_media(video_media());
    let mut request = local_request(&dir);
    request.subtitles = false;
    let ctx = context_for(&dir, request, &tools, Backend::General);
    let mut state = JobState::new("job-0001");

    create_standard_pipeline().run(&ctx, &mut state).unwrap();

    assert_eq!(
        skipped_because(&state, "Transcribe"),
        "karaoke subtitles not requested"
    );
    assert_eq!(skipped_because(&state, "Subtitles"), "no transcript");
    assert_eq!(tools.transcriber.call_count(), 0);
    assert_eq!(tools.media.mux_calls()[0].0, None);
}

#[test]
fn video_export_of_audio_source_yields_audio() {
    let dir = tempdir().unwrap();
    let tools = FakeTools::default();
    let ctx = context_for(&dir, local_request(&dir), &tools, Backend::General);
    let mut state = JobState::new("job-0001");

    create_standard_pipeline().run(&ctx, &mut state).unwrap();

    assert_eq!(
        skipped_because(&state, "Transcribe"),
        "source has no video stream"
    );
    assert!(tools.media.mux_calls().is_empty());
    assert!(state.artifact().unwrap().to_string_lossy().ends_with(".mp3"));
    assert!(skipped_because(&state, "Separate").contains("unity"));
    assert_eq!(tools.separator.call_count(), 0);
}

fn acquired_state(ctx: &Context) -> JobState {
    let mut state = JobState::new("job-0001");
    AcquireStep::new().execute(ctx, &mut state).unwrap();
    state
}

#[test]
fn separation_needed_for_gains_karaoke_or_stems() {
    let dir = tempdir().unwrap();
    let audio_tools = FakeTools::default();
    let video_tools = FakeTools::default().with_media(video_media());

    // Karaoke request, unity mix: only a picture makes vocals necessary
    let ctx = context_for(&dir, local_request(&dir), &audio_tools, Backend::General);
    assert!(!SeparateStep::needed(&ctx, &acquired_state(&ctx)));
    let ctx = context_for(&dir, local_request(&dir), &video_tools, Backend::General);
    assert!(SeparateStep::needed(&ctx, &acquired_state(&ctx)));

    let mut request = local_request(&dir);
    request.export_mode = ExportMode::AudioOnly;
    request.stem_gains.insert("bass".to_string(), 0.5);
    let ctx = context_for(&dir, request, &audio_tools, Backend::General);
    assert!(SeparateStep::needed(&ctx, &acquired_state(&ctx)));

    let mut request = local_request(&dir);
    request.export_mode = ExportMode::StemsOnly;
    let ctx = context_for(&dir, request, &audio_tools, Backend::General);
    assert!(SeparateStep::needed(&ctx, &acquired_state(&ctx)));
}

#[test]
fn stems_export_ignores_effects() {
    let dir = tempdir().unwrap();
    let tools = FakeTools::default();
    let mut request = local_request(&dir);
    request.export_mode = ExportMode::StemsOnly;
    request.audio_format = AudioFormat::Flac;
    request.stems_to_export = vec!["vocals".to_string(), "bass".to_string()];
    request.effects = EffectChain::new(3.0, 1.0, true);
    let ctx = context_for(&dir, request, &tools, Backend::General);
    let mut state = JobState::new("job-0001");

    create_standard_pipeline().run(&ctx, &mut state).unwrap();

    assert_eq!(
        skipped_because(&state, "Effects"),
        "stems are exported unprocessed"
    );
    assert!(state.separate.as_ref().unwrap().mix_path.is_none());
    let artifact = state.artifact().unwrap();
    assert!(artifact.is_dir());
    assert!(artifact.join("Song_vocals.flac").is_file());
    assert!(artifact.join("Song_bass.flac").is_file());
    assert!(!artifact.join("Song_drums.flac").exists());
    assert!(tools.media.filter_calls().is_empty());
}

#[test]
fn transcription_falls_back_with_warning() {
    let dir = tempdir().unwrap();
    let tools = FakeTools::default()
        .with_media(video_media())
        .with_transcriber(FakeTranscriber::default().failing_on(Backend::Accelerated));
    let warnings = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&warnings);
    let ctx = context_for(&dir, local_request(&dir), &tools, Backend::Accelerated)
        .with_warning_callback(Box::new(move |step, msg| {
            sink.lock().push((step.to_string(), msg.to_string()));
        }));
    let mut state = JobState::new("job-0001");

    create_standard_pipeline().run(&ctx, &mut state).unwrap();

    assert_eq!(tools.transcriber.call_count(), 2);
    assert_eq!(tools.separator.backends_seen(), vec![Backend::Accelerated]);
    let warnings = warnings.lock();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].0, "Transcribe");
}

#[test]
fn effect_failure_stops_before_mux() {
    let dir = tempdir().unwrap();
    let tools = FakeTools::default().with_media(FakeMedia::failing_filters());
    let mut request = local_request(&dir);
    request.effects = EffectChain::new(2.0, 1.0, false);
    let ctx = context_for(&dir, request, &tools, Backend::General);
    let mut state = JobState::new("job-0001");

    let err = create_standard_pipeline().run(&ctx, &mut state).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Effect);
    assert_eq!(err.step_name(), "Effects");
    assert!(state.records.iter().all(|r| r.stage != "Mux"));
    assert!(std::fs::read_dir(dir.path().join("out")).is_err());
}

#[test]
fn separation_failure_names_stage() {
    let dir = tempdir().unwrap();
    let tools = FakeTools::default().with_separator(FakeSeparator::always_failing());
    let mut request = local_request(&dir);
    request.stem_gains.insert("drums".to_string(), 0.5);
    let ctx = context_for(&dir, request, &tools, Backend::General);
    let mut state = JobState::new("job-0001");

    let err = create_standard_pipeline().run(&ctx, &mut state).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Separation);
    assert!(matches!(
        outcome(&state, "Separate"),
        StageOutcome::Failed {
            kind: ErrorKind::Separation,
            ..
        }
    ));
}

#[test]
fn karaoke_needs_video_stream() {
    let dir = tempdir().unwrap();
    let tools = FakeTools::default();
    let ctx = context_for(&dir, local_request(&dir), &tools, Backend::General);
    let state = JobState::new("job-0001");
    assert!(ctx.config.wants_subtitles());
    assert!(!wants_karaoke(&ctx, &state));
}
